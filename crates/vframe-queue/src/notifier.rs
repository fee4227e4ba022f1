//! Completion and failure notifications.

use async_trait::async_trait;
use tracing::{debug, info, warn};
use vframe_models::{CompletionRecord, FailureReport};

use crate::error::{QueueError, QueueResult};

/// Stream field carrying the message body.
pub const BODY_FIELD: &str = "body";

/// Notification destinations.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream receiving completion records
    pub success_queue: String,
    /// Stream receiving failure reports
    pub error_queue: String,
}

impl NotifierConfig {
    /// Create config from environment variables.
    ///
    /// Both destinations are mandatory; there is no default queue.
    pub fn from_env() -> QueueResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> QueueResult<Self> {
        let required = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| QueueError::configuration(format!("{} is not set or empty", name)))
        };

        Ok(Self {
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| "redis://localhost:6379".to_string()),
            success_queue: required("VFRAME_SUCCESS_QUEUE")?,
            error_queue: required("VFRAME_ERROR_QUEUE")?,
        })
    }
}

/// Sends pipeline results to their queues.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send one completion record to the success queue.
    ///
    /// Returns the message ID assigned by the queue.
    async fn notify_completed(&self, record: &CompletionRecord) -> QueueResult<String>;

    /// Send one failure report to the error queue.
    async fn notify_failed(&self, report: &FailureReport) -> QueueResult<String>;
}

/// Notifier publishing to Redis streams.
pub struct RedisNotifier {
    client: redis::Client,
    config: NotifierConfig,
}

impl RedisNotifier {
    /// Create a new notifier.
    pub fn new(config: NotifierConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(NotifierConfig::from_env()?)
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    async fn publish(&self, queue: &str, body: &str) -> QueueResult<String> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;

        let message_id: String = redis::cmd("XADD")
            .arg(queue)
            .arg("*")
            .arg(BODY_FIELD)
            .arg(body)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::send_failed(queue, e.to_string()))?;

        debug!("Published to {} with message ID {}", queue, message_id);
        Ok(message_id)
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    async fn notify_completed(&self, record: &CompletionRecord) -> QueueResult<String> {
        let message_id = self
            .publish(&self.config.success_queue, &record.to_message_body())
            .await?;

        info!(
            "Completion for {} sent with message ID {}",
            record.object_key, message_id
        );
        Ok(message_id)
    }

    async fn notify_failed(&self, report: &FailureReport) -> QueueResult<String> {
        let body = report.to_message_body()?;
        let message_id = self.publish(&self.config.error_queue, &body).await?;

        warn!(
            stage = %report.stage,
            "Failure for {} sent to {} with message ID {}",
            report.object_key.as_deref().unwrap_or("<unknown>"),
            self.config.error_queue,
            message_id
        );
        Ok(message_id)
    }
}
