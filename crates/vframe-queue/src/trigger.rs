//! Trigger intake using Redis Streams.

use redis::AsyncCommands;
use tracing::{debug, info, warn};
use vframe_models::{TriggerEvent, TriggerParseError};

use crate::error::{QueueError, QueueResult};

/// Stream field carrying the trigger event document.
pub const EVENT_FIELD: &str = "event";

/// Trigger queue configuration.
#[derive(Debug, Clone)]
pub struct TriggerQueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream carrying trigger events
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// How long one read blocks waiting for an event
    pub block_ms: u64,
    /// Idle time after which a delivered but unacknowledged entry is
    /// considered abandoned by its consumer
    pub claim_min_idle_ms: u64,
    /// Maximum number of abandoned entries claimed per pass
    pub claim_count: usize,
}

impl Default for TriggerQueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vframe:triggers".to_string(),
            consumer_group: "vframe:workers".to_string(),
            block_ms: 5000,
            claim_min_idle_ms: 3_600_000,
            claim_count: 10,
        }
    }
}

impl TriggerQueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("VFRAME_TRIGGER_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("VFRAME_CONSUMER_GROUP").unwrap_or(defaults.consumer_group),
            block_ms: std::env::var("VFRAME_TRIGGER_BLOCK_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.block_ms),
            claim_min_idle_ms: std::env::var("VFRAME_CLAIM_MIN_IDLE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.claim_min_idle_ms),
            claim_count: defaults.claim_count,
        }
    }
}

/// One trigger entry read from the stream.
#[derive(Debug, Clone)]
pub struct TriggerMessage {
    /// Stream entry ID, used for acknowledgement
    pub message_id: String,
    /// Raw event document
    pub payload: String,
}

impl TriggerMessage {
    fn from_entry(entry: redis::streams::StreamId) -> Self {
        let payload = match entry.map.get(EVENT_FIELD) {
            Some(redis::Value::BulkString(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
            Some(redis::Value::SimpleString(text)) => text.clone(),
            _ => {
                warn!("Trigger {} has no {} field", entry.id, EVENT_FIELD);
                String::new()
            }
        };

        Self {
            message_id: entry.id,
            payload,
        }
    }

    /// Decode the event document.
    pub fn event(&self) -> Result<TriggerEvent, TriggerParseError> {
        TriggerEvent::parse(&self.payload)
    }
}

/// Trigger queue client.
pub struct TriggerQueue {
    client: redis::Client,
    config: TriggerQueueConfig,
}

impl TriggerQueue {
    /// Create a new trigger queue.
    pub fn new(config: TriggerQueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(TriggerQueueConfig::from_env())
    }

    pub fn config(&self) -> &TriggerQueueConfig {
        &self.config
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Add a trigger event to the stream.
    pub async fn enqueue(&self, event: &TriggerEvent) -> QueueResult<String> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(event)?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg(EVENT_FIELD)
            .arg(&payload)
            .query_async(&mut conn)
            .await?;

        info!("Enqueued trigger with message ID {}", message_id);
        Ok(message_id)
    }

    /// Read the next trigger for `consumer_name`, waiting up to the
    /// configured block time.
    ///
    /// Entries are handed out one at a time; the caller acknowledges each
    /// after processing it.
    pub async fn next(&self, consumer_name: &str) -> QueueResult<Option<TriggerMessage>> {
        let mut conn = self.connection().await?;

        let reply: Option<redis::streams::StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(self.config.block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let entry = reply
            .into_iter()
            .flat_map(|reply| reply.keys)
            .flat_map(|stream| stream.ids)
            .next();

        Ok(entry.map(|entry| {
            debug!("Consumed trigger {}", entry.id);
            TriggerMessage::from_entry(entry)
        }))
    }

    /// Take over entries that were delivered to some consumer but not
    /// acknowledged within `claim_min_idle_ms`.
    ///
    /// Such entries belong to a consumer that stopped mid-run; reads with
    /// `>` never return them again.
    pub async fn claim_stale(&self, consumer_name: &str) -> QueueResult<Vec<TriggerMessage>> {
        let mut conn = self.connection().await?;

        let reply: redis::streams::StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(self.config.claim_min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(self.config.claim_count)
            .query_async(&mut conn)
            .await?;

        let messages: Vec<TriggerMessage> = reply
            .claimed
            .into_iter()
            .map(TriggerMessage::from_entry)
            .collect();

        if !messages.is_empty() {
            info!("Claimed {} abandoned triggers for {}", messages.len(), consumer_name);
        }

        Ok(messages)
    }

    /// Acknowledge a trigger and remove it from the stream.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged trigger: {}", message_id);
        Ok(())
    }

    /// Number of entries in the trigger stream.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }
}
