//! Shared lifecycle for long-running binaries
//!
//! A binary implements [`BinaryRunner::run`]; [`BinaryRunner::execute`]
//! wraps it with start and stop banners.

use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::info;

const RULE: &str = "========================================";

/// Name and heartbeat cadence of a binary
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub name: String,
    /// Seconds between status summaries
    pub heartbeat_interval_secs: u64,
}

impl RunConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            heartbeat_interval_secs: 300,
        }
    }

    pub fn with_heartbeat(mut self, secs: u64) -> Self {
        self.heartbeat_interval_secs = secs;
        self
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Ticker for status summaries; the first tick is one period away
    /// and a zero setting is treated as one second
    pub fn heartbeat_ticker(&self) -> Interval {
        let period = self.heartbeat().max(Duration::from_secs(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}

#[allow(async_fn_in_trait)]
pub trait BinaryRunner {
    /// Main loop; returns once shutdown is requested
    async fn run(&mut self) -> anyhow::Result<()>;

    fn config(&self) -> &RunConfig;

    /// Summary logged in the stop banner
    fn stats(&self) -> Option<String> {
        None
    }

    async fn execute(&mut self) -> anyhow::Result<()> {
        let name = self.config().name.clone();
        info!("{}", RULE);
        info!("{} started, Ctrl+C to stop", name);
        info!("{}", RULE);

        let result = self.run().await;

        info!("{}", RULE);
        match &result {
            Ok(()) => info!("{} stopped", name),
            Err(e) => info!("{} stopped with error: {:#}", name, e),
        }
        if let Some(stats) = self.stats() {
            info!("{}", stats);
        }
        info!("{}", RULE);

        result
    }
}
