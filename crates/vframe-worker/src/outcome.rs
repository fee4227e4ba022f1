//! Per-record results and their aggregation per trigger event.

use chrono::{DateTime, Utc};
use vframe_models::{CompletionRecord, FailureReport, PipelineStage, RunId, SourceReference, TriggerEvent};

/// A run that uploaded its archive and sent its completion record.
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub run_id: RunId,
    pub source: SourceReference,
    pub record: CompletionRecord,
    pub frame_count: usize,
    /// Destination key of the uploaded archive
    pub archive_key: String,
    pub archive_bytes: u64,
}

/// A record that did not make it through the pipeline.
#[derive(Debug, Clone)]
pub struct FailedRun {
    /// Absent when the trigger record could not be resolved
    pub run_id: Option<RunId>,
    pub source: Option<SourceReference>,
    pub stage: PipelineStage,
    pub error: String,
    pub started_at: DateTime<Utc>,
}

impl FailedRun {
    /// Failure of a trigger record that never reached the pipeline.
    pub fn trigger(error: impl Into<String>) -> Self {
        Self {
            run_id: None,
            source: None,
            stage: PipelineStage::Trigger,
            error: error.into(),
            started_at: Utc::now(),
        }
    }

    /// Report for the error queue.
    pub fn to_report(&self) -> FailureReport {
        match &self.source {
            Some(source) => FailureReport::for_source(source, self.stage, &self.error, self.started_at),
            None => FailureReport {
                stage: self.stage,
                started_at: self.started_at,
                ..FailureReport::for_trigger(&self.error)
            },
        }
    }
}

/// Result of processing one trigger record.
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    Completed(CompletedRun),
    Failed(FailedRun),
}

impl RecordOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RecordOutcome::Completed(_))
    }

    /// Label used for logs and the runs counter.
    pub fn label(&self) -> &'static str {
        match self {
            RecordOutcome::Completed(_) => "completed",
            RecordOutcome::Failed(failed) => failed.stage.as_str(),
        }
    }

    pub fn failure(&self) -> Option<&FailedRun> {
        match self {
            RecordOutcome::Completed(_) => None,
            RecordOutcome::Failed(failed) => Some(failed),
        }
    }
}

/// Outcomes of every record of one trigger event, in record order.
#[derive(Debug, Clone, Default)]
pub struct InvocationReport {
    pub outcomes: Vec<RecordOutcome>,
}

impl InvocationReport {
    pub fn new(outcomes: Vec<RecordOutcome>) -> Self {
        Self { outcomes }
    }

    /// Report for an event that could not be decoded at all.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self::new(vec![RecordOutcome::Failed(FailedRun::trigger(error))])
    }

    /// Report for an event whose earlier delivery was never acknowledged.
    ///
    /// The records are not run again; each one fails at the trigger stage
    /// with `reason`, keeping its bucket and key when the record names them.
    pub fn abandoned(event: &TriggerEvent, reason: &str) -> Self {
        let outcomes = event
            .sources()
            .into_iter()
            .map(|source| {
                let failed = match source {
                    Ok(source) => FailedRun {
                        source: Some(source),
                        ..FailedRun::trigger(reason)
                    },
                    Err(e) => FailedRun::trigger(e.to_string()),
                };
                RecordOutcome::Failed(failed)
            })
            .collect();

        Self::new(outcomes)
    }

    pub fn completed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_completed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.completed()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FailedRun> {
        self.outcomes.iter().filter_map(RecordOutcome::failure)
    }

    /// True when no record failed. An empty event is a success.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Human-readable summary for the invoking host.
    pub fn status_message(&self) -> String {
        if self.outcomes.is_empty() {
            "completed with no records processed".to_string()
        } else if self.is_success() {
            "completed".to_string()
        } else {
            format!("completed with {} failed records", self.failed())
        }
    }
}
