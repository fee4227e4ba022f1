//! Trigger events and source object references.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while reading a trigger event.
#[derive(Debug, Error)]
pub enum TriggerParseError {
    #[error("Malformed trigger event: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Record {index} has no bucket name")]
    MissingBucket { index: usize },

    #[error("Record {index} has no object key")]
    MissingKey { index: usize },

    #[error("Record {index} has an undecodable object key: {key}")]
    InvalidKey { index: usize, key: String },
}

/// The video object that triggered a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReference {
    /// Container (bucket) holding the object
    pub bucket: String,
    /// Object key, already URL-decoded
    pub key: String,
}

impl SourceReference {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// File extension of the object key, if any.
    pub fn extension(&self) -> Option<&str> {
        let name = self.key.rsplit('/').next()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            None
        } else {
            Some(ext)
        }
    }
}

impl fmt::Display for SourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Object-created notification delivered by the storage service.
///
/// Only the fields the worker reads are modeled; everything else in the
/// document is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Entity>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Entity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<BucketEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<ObjectEntity>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketEntity {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectEntity {
    /// URL-encoded key, as the storage service sends it
    #[serde(default)]
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl TriggerEvent {
    /// Parse a trigger event from its JSON document.
    pub fn parse(json: &str) -> Result<Self, TriggerParseError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build an event referencing the given objects (keys are encoded the
    /// way the storage service encodes them).
    pub fn for_sources<'a>(sources: impl IntoIterator<Item = &'a SourceReference>) -> Self {
        let records = sources
            .into_iter()
            .map(|source| EventRecord {
                s3: Some(S3Entity {
                    bucket: Some(BucketEntity {
                        name: source.bucket.clone(),
                    }),
                    object: Some(ObjectEntity {
                        key: encode_key(&source.key),
                        size: None,
                    }),
                }),
            })
            .collect();

        Self { records }
    }

    /// Resolve every record into a source reference, in record order.
    ///
    /// Each record resolves independently; a bad record does not hide the
    /// others.
    pub fn sources(&self) -> Vec<Result<SourceReference, TriggerParseError>> {
        self.records
            .iter()
            .enumerate()
            .map(|(index, record)| record.source(index))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl EventRecord {
    fn source(&self, index: usize) -> Result<SourceReference, TriggerParseError> {
        let entity = self.s3.as_ref();

        let bucket = entity
            .and_then(|s3| s3.bucket.as_ref())
            .map(|b| b.name.as_str())
            .filter(|name| !name.is_empty())
            .ok_or(TriggerParseError::MissingBucket { index })?;

        let raw_key = entity
            .and_then(|s3| s3.object.as_ref())
            .map(|o| o.key.as_str())
            .filter(|key| !key.is_empty())
            .ok_or(TriggerParseError::MissingKey { index })?;

        let key = decode_key(raw_key).ok_or_else(|| TriggerParseError::InvalidKey {
            index,
            key: raw_key.to_string(),
        })?;

        Ok(SourceReference::new(bucket, key))
    }
}

/// Decode an event object key: `+` stands for a space, the rest is
/// percent-encoded UTF-8.
fn decode_key(raw: &str) -> Option<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).ok().map(|key| key.into_owned())
}

fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).replace("%20", "+"))
        .collect::<Vec<_>>()
        .join("/")
}
