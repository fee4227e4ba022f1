//! Shared data models for the frame extraction worker.
//!
//! This crate provides Serde-serializable types for:
//! - Trigger events and the source objects they reference
//! - Run identifiers
//! - Completion records and failure reports
//! - Frame naming and archive key conventions

pub mod frames;
pub mod record;
pub mod run;
pub mod source;

// Re-export common types
pub use frames::{archive_key, frame_sequence, ARCHIVE_CONTENT_TYPE, ARCHIVE_SUFFIX, DEFAULT_INTERVAL_SECS};
pub use record::{CompletionRecord, FailureReport, PipelineStage, RecordParseError};
pub use run::RunId;
pub use source::{SourceReference, TriggerEvent, TriggerParseError};
