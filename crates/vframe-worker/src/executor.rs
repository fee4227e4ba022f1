//! Trigger executor.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;
use vframe_models::TriggerEvent;
use vframe_queue::{Notifier, TriggerMessage, TriggerQueue};

use crate::error::WorkerResult;
use crate::outcome::InvocationReport;
use crate::pipeline::FramePipeline;

/// Pause after a failed read before polling the stream again.
const CONSUME_BACKOFF: Duration = Duration::from_secs(5);

/// How often abandoned entries are looked for.
const CLAIM_INTERVAL: Duration = Duration::from_secs(30);

/// Consumes trigger events from the stream and runs them through the
/// pipeline, one entry at a time.
pub struct TriggerExecutor {
    pipeline: Arc<FramePipeline>,
    queue: TriggerQueue,
    notifier: Arc<dyn Notifier>,
    consumer_name: String,
}

impl TriggerExecutor {
    pub fn new(pipeline: Arc<FramePipeline>, queue: TriggerQueue, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            pipeline,
            queue,
            notifier,
            consumer_name: format!("worker-{}", Uuid::new_v4()),
        }
    }

    /// Consume until `shutdown` turns true.
    ///
    /// The signal is checked between reads, so a read that returned an
    /// entry always reaches processing. Entries another consumer read but
    /// never acknowledged are claimed at startup and every
    /// [`CLAIM_INTERVAL`] and reported as failed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WorkerResult<()> {
        info!(
            "Starting trigger executor '{}' on stream {}",
            self.consumer_name,
            self.queue.config().stream_name
        );

        self.queue.init().await?;
        let mut last_claim: Option<Instant> = None;

        loop {
            if *shutdown.borrow() {
                info!("Shutdown signal received, stopping executor");
                break;
            }

            if last_claim.map_or(true, |at| at.elapsed() >= CLAIM_INTERVAL) {
                self.reclaim_abandoned().await;
                last_claim = Some(Instant::now());
            }

            match self.queue.next(&self.consumer_name).await {
                Ok(Some(message)) => self.handle(message).await,
                Ok(None) => {}
                Err(e) => {
                    error!("Error consuming triggers: {}", e);
                    if !pause_unless_shutdown(&mut shutdown, CONSUME_BACKOFF).await {
                        info!("Shutdown channel closed, stopping executor");
                        break;
                    }
                }
            }
        }

        info!("Trigger executor stopped");
        Ok(())
    }

    async fn handle(&self, message: TriggerMessage) {
        let report = match message.event() {
            Ok(event) => self.pipeline.process_event(&event).await,
            Err(e) => {
                warn!("Trigger {} is not a valid event: {}", message.message_id, e);
                InvocationReport::rejected(e.to_string())
            }
        };

        self.finish(&message, &report).await;
    }

    /// Report every entry abandoned by another consumer as failed.
    async fn reclaim_abandoned(&self) {
        let messages = match self.queue.claim_stale(&self.consumer_name).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Failed to claim abandoned triggers: {}", e);
                return;
            }
        };

        for message in messages {
            warn!("Trigger {} was abandoned by its consumer", message.message_id);
            let report = abandoned_report(&message);
            self.finish(&message, &report).await;
        }
    }

    async fn finish(&self, message: &TriggerMessage, report: &InvocationReport) {
        route_failures(self.notifier.as_ref(), report).await;
        info!("Trigger {}: {}", message.message_id, report.status_message());

        // Failures were already routed to the error queue; an entry whose ack
        // fails is picked up by the next claim pass
        if let Err(e) = self.queue.ack(&message.message_id).await {
            error!("Failed to ack trigger {}: {}", message.message_id, e);
        }
    }
}

/// Sleep for `pause` unless the shutdown signal changes first.
///
/// Returns false when the shutdown sender is gone.
async fn pause_unless_shutdown(shutdown: &mut watch::Receiver<bool>, pause: Duration) -> bool {
    tokio::select! {
        changed = shutdown.changed() => changed.is_ok(),
        _ = tokio::time::sleep(pause) => true,
    }
}

/// Report for an entry claimed from a consumer that never acknowledged it.
///
/// The records are not run again: the earlier attempt may have been cut
/// short by the host at any stage.
pub fn abandoned_report(message: &TriggerMessage) -> InvocationReport {
    match message.event() {
        Ok(event) => InvocationReport::abandoned(
            &event,
            &format!(
                "Trigger {} was delivered but never acknowledged; its run did not finish",
                message.message_id
            ),
        ),
        Err(e) => InvocationReport::rejected(e.to_string()),
    }
}

/// Publish a failure report for every failed record.
///
/// Returns how many reports were sent. A report that cannot be sent is
/// logged and otherwise ignored.
pub async fn route_failures(notifier: &dyn Notifier, report: &InvocationReport) -> usize {
    let mut sent = 0;

    for failure in report.failures() {
        match notifier.notify_failed(&failure.to_report()).await {
            Ok(_) => sent += 1,
            Err(e) => error!(
                stage = %failure.stage,
                "Failed to report failure for {}: {}",
                failure
                    .source
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "<trigger>".to_string()),
                e
            ),
        }
    }

    sent
}

/// Process the trigger event stored in a JSON file once.
///
/// An unreadable file is an error; an undecodable document becomes a
/// rejected report like any other failed trigger.
pub async fn process_event_file(
    pipeline: &FramePipeline,
    notifier: &dyn Notifier,
    path: &Path,
) -> WorkerResult<InvocationReport> {
    let json = tokio::fs::read_to_string(path).await?;

    let report = match TriggerEvent::parse(&json) {
        Ok(event) => pipeline.process_event(&event).await,
        Err(e) => {
            warn!("Event file {} is not a valid event: {}", path.display(), e);
            InvocationReport::rejected(e.to_string())
        }
    };

    route_failures(notifier, &report).await;
    Ok(report)
}
