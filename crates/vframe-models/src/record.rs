//! Completion records and failure reports emitted by the pipeline.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::source::SourceReference;

/// Separator used in completion message bodies.
pub const FIELD_SEPARATOR: char = ';';

/// Stage of the frame extraction pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Reading the trigger event itself
    Trigger,
    /// Downloading the source video
    Fetch,
    /// Running the transcoder and collecting frames
    Sample,
    /// Writing the frame archive
    Package,
    /// Storing the archive in the destination container
    Upload,
    /// Sending the completion record
    Notify,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Trigger => "trigger",
            PipelineStage::Fetch => "fetch",
            PipelineStage::Sample => "sample",
            PipelineStage::Package => "package",
            PipelineStage::Upload => "upload",
            PipelineStage::Notify => "notify",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordParseError {
    #[error("Expected objectKey;startedAt;finishedAt, got: {0}")]
    WrongShape(String),

    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },
}

/// Message sent once per successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    pub object_key: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CompletionRecord {
    pub fn new(object_key: impl Into<String>, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        Self {
            object_key: object_key.into(),
            started_at,
            finished_at,
        }
    }

    /// Wire form: `objectKey;startedAt;finishedAt` with RFC 3339 UTC timestamps.
    pub fn to_message_body(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.object_key,
            format_timestamp(&self.started_at),
            format_timestamp(&self.finished_at),
            sep = FIELD_SEPARATOR
        )
    }

    /// Parse a message body produced by [`Self::to_message_body`].
    ///
    /// Timestamps never contain the separator, so the key is whatever
    /// precedes the last two fields.
    pub fn from_message_body(body: &str) -> Result<Self, RecordParseError> {
        let mut fields = body.rsplitn(3, FIELD_SEPARATOR);
        let (finished, started, key) = match (fields.next(), fields.next(), fields.next()) {
            (Some(finished), Some(started), Some(key)) if !key.is_empty() => (finished, started, key),
            _ => return Err(RecordParseError::WrongShape(body.to_string())),
        };

        Ok(Self {
            object_key: key.to_string(),
            started_at: parse_timestamp(started)?,
            finished_at: parse_timestamp(finished)?,
        })
    }
}

/// Report routed to the error queue when a record fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    /// Source bucket, when the record got far enough to name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_key: Option<String>,
    pub stage: PipelineStage,
    pub error: String,
    pub started_at: DateTime<Utc>,
    pub failed_at: DateTime<Utc>,
}

impl FailureReport {
    /// Report for a run that failed while processing `source`.
    pub fn for_source(
        source: &SourceReference,
        stage: PipelineStage,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            bucket: Some(source.bucket.clone()),
            object_key: Some(source.key.clone()),
            stage,
            error: error.into(),
            started_at,
            failed_at: Utc::now(),
        }
    }

    /// Report for a trigger that could not be resolved to a source.
    pub fn for_trigger(error: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            bucket: None,
            object_key: None,
            stage: PipelineStage::Trigger,
            error: error.into(),
            started_at: now,
            failed_at: now,
        }
    }

    pub fn to_message_body(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RecordParseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RecordParseError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}
