//! S3-compatible object storage.
//!
//! This crate provides:
//! - The `ObjectStore` capability the pipeline depends on
//! - Streaming download of source objects to local files
//! - Upload of local files to a destination container
//! - An S3 (or S3-compatible endpoint) implementation

pub mod client;
pub mod error;
pub mod store;

pub use client::{S3Config, S3Store};
pub use error::{StorageError, StorageResult};
pub use store::ObjectStore;
