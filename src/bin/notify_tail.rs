//! Notification tail
//!
//! Opens an authenticated notification session and logs every message,
//! entity update and status change until Ctrl+C.

use alertsockets::{
    CacheUpdateHook, ConnectionStatus, CredentialSource, EntityUpdate, Envelope,
    NotificationSession, TokenStore,
};
use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};
use triage_notifier::bin_common::{load_config_from_env, BinaryRunner, ConfigType, RunConfig};
use triage_notifier::config::{env_token, NotifierConfig, TOKEN_ENV_VAR};
use triage_notifier::logging::init_tracing;
use triage_notifier::refresh::HttpCredentialRefresher;
use triage_notifier::shutdown::ShutdownManager;

/// Logs entity updates in place of a real query cache
struct LoggingCache;

impl CacheUpdateHook for LoggingCache {
    fn entity_updated(&self, update: &EntityUpdate) {
        info!(
            "Cache: entity {} is now at version {}",
            update.entity_id, update.version
        );
    }
}

struct TailApp {
    run_config: RunConfig,
    session: NotificationSession,
    status: watch::Receiver<ConnectionStatus>,
    shutdown: ShutdownManager,
}

impl BinaryRunner for TailApp {
    async fn run(&mut self) -> Result<()> {
        // One ticker for the whole run, so status changes do not push
        // the next summary back
        let mut heartbeat = self.run_config.heartbeat_ticker();

        loop {
            tokio::select! {
                changed = self.status.changed() => {
                    if changed.is_err() {
                        warn!("Session driver stopped");
                        break;
                    }
                    let status = *self.status.borrow_and_update();
                    info!("Connection status: {}", status);
                }
                _ = heartbeat.tick() => {
                    let metrics = self.session.metrics();
                    info!(
                        "Status {} | attempts {} | received {} | sent {} | failures {}",
                        self.session.status(),
                        metrics.connect_attempts,
                        metrics.frames_received,
                        metrics.frames_sent,
                        metrics.failure_count
                    );
                }
                _ = self.shutdown.stopped() => break,
            }
        }

        Ok(())
    }

    fn config(&self) -> &RunConfig {
        &self.run_config
    }

    fn stats(&self) -> Option<String> {
        let metrics = self.session.metrics();
        Some(format!(
            "Received {} messages over {} connection attempts",
            metrics.frames_received, metrics.connect_attempts
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenv::dotenv().ok();

    let config_path = load_config_from_env(ConfigType::Notifier);
    let config = NotifierConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    init_tracing(&config.log_level);
    config.log();

    let store = TokenStore::new(env_token());
    if store.token().is_none() {
        warn!("{} is not set; waiting for a token before connecting", TOKEN_ENV_VAR);
    }

    let shutdown = ShutdownManager::new();
    shutdown.spawn_signal_handler();

    // Prefer a refreshed token, fall back to whatever the environment holds now
    let source = {
        let store = store.clone();
        move || store.token().or_else(env_token)
    };

    let builder = alertsockets::builder()
        .url(config.endpoint())
        .credentials(source)
        .cache_hook(LoggingCache)
        .reconnect_strategy(config.backoff())
        .entity_update_type(config.entity_update_type.clone())
        .shutdown_flag(shutdown.flag());

    let session = match &config.refresh_url {
        Some(url) => {
            let refresher = HttpCredentialRefresher::new(url.clone(), store.clone())
                .context("Failed to build HTTP client")?;
            builder.refresher(refresher).build().await?
        }
        None => builder.build().await?,
    };

    session.add_listener("tail", |envelope: &Envelope| {
        if envelope.is_failure() {
            warn!(
                "[{}] status {}: {}",
                envelope.kind, envelope.status, envelope.message
            );
        } else {
            info!("[{}] {}", envelope.kind, envelope.message);
        }
    });

    let mut app = TailApp {
        run_config: RunConfig::new("notify_tail").with_heartbeat(config.heartbeat_secs),
        status: session.status_watch(),
        session,
        shutdown,
    };

    let result = app.execute().await;
    app.session.shutdown().await;
    result
}
