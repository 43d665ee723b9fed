use async_trait::async_trait;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, options::BasicPublishOptions,
};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{RwLock, watch};

pub const MESSAGE_CONTENT_TYPE: &str = "text/plain";

/// AMQP delivery mode 1: not persisted by the broker.
const TRANSIENT_DELIVERY: u8 = 1;

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("broker is not connected")]
    NotConnected,

    #[error("broker connect failed: {0}")]
    Connect(lapin::Error),

    #[error("failed to open a channel: {0}")]
    Channel(lapin::Error),

    #[error("publish failed: {0}")]
    Publish(lapin::Error),

    #[error("broker call timed out after {0:?}")]
    Timeout(Duration),
}

/// One upload notification: the composite key sent to the uploader queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub destination: String,
    pub payload: String,
}

#[async_trait]
pub trait UploadNotifier: Send + Sync {
    /// Fire-and-forget: no acknowledgement is awaited and nothing is retried.
    async fn notify(&self, message: &NotificationMessage) -> Result<(), PublishError>;

    async fn is_healthy(&self) -> bool;
}

/// Exponential backoff with jitter for broker reconnects.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    /// Base delay before attempt `attempt` (0-based), capped at `max`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter_ms = (base.as_millis() as u64) / 4;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Long-lived broker connection with an explicit lifecycle: connect,
/// health-check, reconnect with backoff.
pub struct BrokerConnection {
    url: String,
    backoff: Backoff,
    timeout: Duration,
    current: RwLock<Option<Arc<Connection>>>,
}

impl BrokerConnection {
    /// Starts without a connection; call [`reconnect`](Self::reconnect) or
    /// run [`supervise`](Self::supervise) to establish one.
    pub fn disconnected(url: String, backoff: Backoff, timeout: Duration) -> Self {
        Self {
            url,
            backoff,
            timeout,
            current: RwLock::new(None),
        }
    }

    async fn dial(&self) -> Result<Connection, PublishError> {
        tokio::time::timeout(
            self.timeout,
            Connection::connect(&self.url, ConnectionProperties::default()),
        )
        .await
        .map_err(|_| PublishError::Timeout(self.timeout))?
        .map_err(PublishError::Connect)
    }

    /// Dials up to `max_attempts` times, sleeping with backoff in between.
    pub async fn reconnect(&self, max_attempts: u32) -> Result<(), PublishError> {
        let mut last_err = PublishError::NotConnected;
        for attempt in 0..max_attempts.max(1) {
            if attempt > 0 {
                let delay = self.backoff.delay(attempt - 1);
                tracing::info!("Retrying broker connection in {:?} (attempt {})", delay, attempt + 1);
                tokio::time::sleep(delay).await;
            }
            match self.dial().await {
                Ok(conn) => {
                    *self.current.write().await = Some(Arc::new(conn));
                    tracing::info!("🐇 Broker connected");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Broker connection attempt {} failed: {}", attempt + 1, e);
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    pub async fn is_healthy(&self) -> bool {
        self.current
            .read()
            .await
            .as_ref()
            .is_some_and(|c| c.status().connected())
    }

    /// The live connection, if any.
    pub async fn connection(&self) -> Result<Arc<Connection>, PublishError> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|c| c.status().connected())
            .cloned()
            .ok_or(PublishError::NotConnected)
    }

    /// Re-establishes a dropped connection until `shutdown` flips.
    pub async fn supervise(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("🚀 Broker supervisor started");
        let mut attempt = 0u32;

        loop {
            let wait = if attempt == 0 {
                HEALTH_CHECK_INTERVAL
            } else {
                self.backoff.delay(attempt - 1)
            };

            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("🛑 Broker supervisor shutting down");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            if self.is_healthy().await {
                attempt = 0;
                continue;
            }

            match self.reconnect(1).await {
                Ok(()) => attempt = 0,
                Err(_) => attempt = attempt.saturating_add(1),
            }
        }

        self.close().await;
    }

    pub async fn close(&self) {
        if let Some(conn) = self.current.write().await.take() {
            if let Err(e) = conn.close(200, "shutdown").await {
                tracing::debug!("Broker close failed: {}", e);
            }
        }
    }
}

/// Publishes upload notifications over AMQP, one short-lived channel per message.
pub struct AmqpNotifier {
    broker: Arc<BrokerConnection>,
    timeout: Duration,
}

impl AmqpNotifier {
    pub fn new(broker: Arc<BrokerConnection>, timeout: Duration) -> Self {
        Self { broker, timeout }
    }

    async fn open_channel(&self, conn: &Connection) -> Result<Channel, PublishError> {
        tokio::time::timeout(self.timeout, conn.create_channel())
            .await
            .map_err(|_| PublishError::Timeout(self.timeout))?
            .map_err(PublishError::Channel)
    }

    async fn publish_on(
        &self,
        channel: &Channel,
        message: &NotificationMessage,
    ) -> Result<(), PublishError> {
        let properties = BasicProperties::default()
            .with_content_type(MESSAGE_CONTENT_TYPE.into())
            .with_delivery_mode(TRANSIENT_DELIVERY);

        // The returned confirm is dropped: confirms are not enabled on the channel.
        let publish = channel.basic_publish(
            "",
            &message.destination,
            BasicPublishOptions {
                mandatory: false,
                ..BasicPublishOptions::default()
            },
            message.payload.as_bytes(),
            properties,
        );

        tokio::time::timeout(self.timeout, publish)
            .await
            .map_err(|_| PublishError::Timeout(self.timeout))?
            .map(|_| ())
            .map_err(PublishError::Publish)
    }
}

#[async_trait]
impl UploadNotifier for AmqpNotifier {
    async fn notify(&self, message: &NotificationMessage) -> Result<(), PublishError> {
        let conn = self.broker.connection().await?;
        let channel = self.open_channel(&conn).await?;

        let published = self.publish_on(&channel, message).await;

        // Released whether or not the publish went through.
        match tokio::time::timeout(self.timeout, channel.close(200, "OK")).await {
            Ok(Err(e)) => tracing::debug!("Channel close failed: {}", e),
            Err(_) => tracing::debug!("Channel close timed out"),
            Ok(Ok(())) => {}
        }

        published
    }

    async fn is_healthy(&self) -> bool {
        self.broker.is_healthy().await
    }
}
