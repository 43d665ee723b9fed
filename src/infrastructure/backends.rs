use crate::config::AppConfig;
use crate::services::notifier::{AmqpNotifier, Backoff, BrokerConnection};
use crate::services::presence::{self, CacheError, DisabledPresenceCache, PresenceCache};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Startup attempts before the broker is left to the supervisor.
const STARTUP_CONNECT_ATTEMPTS: u32 = 5;

pub async fn setup_presence(config: &AppConfig) -> Result<Arc<dyn PresenceCache>, CacheError> {
    if !config.deployment_mode.writes_presence_markers() {
        info!("🏷️  External platform mode: presence markers disabled");
        return Ok(Arc::new(DisabledPresenceCache));
    }

    let cache = presence::connect(&config.redis_url, config.backend_timeout).await?;
    if cache.ping().await {
        info!("✅ Presence cache ready");
    } else {
        warn!("⚠️  Presence cache did not answer PING; uploads will fail until it does");
    }
    Ok(cache)
}

/// Connects to the broker and spawns the reconnect supervisor. Publishing
/// is best-effort, so the service still starts if the broker is down.
pub async fn setup_notifier(
    config: &AppConfig,
    shutdown: watch::Receiver<bool>,
) -> Arc<AmqpNotifier> {
    let backoff = Backoff::new(
        config.reconnect_initial_backoff,
        config.reconnect_max_backoff,
    );
    let broker = Arc::new(BrokerConnection::disconnected(
        config.amqp_url(),
        backoff,
        config.backend_timeout,
    ));

    info!(
        "🐇 Broker: {}:{} (queue: {})",
        config.rabbitmq_host, config.rabbitmq_port, config.upload_queue
    );
    if let Err(e) = broker.reconnect(STARTUP_CONNECT_ATTEMPTS).await {
        warn!(
            "⚠️  Broker unreachable at startup ({}); notifications are dropped until it reconnects",
            e
        );
    }

    tokio::spawn(broker.clone().supervise(shutdown));

    Arc::new(AmqpNotifier::new(broker, config.backend_timeout))
}
