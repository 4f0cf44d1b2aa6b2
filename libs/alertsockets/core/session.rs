use crate::config::SessionConfig;
use crate::connection_state::{ConnectionStatus, MetricsSnapshot, SessionMetrics};
use crate::machine::{ConnectionMachine, Directive};
use crate::registry::{self, ListenerRegistry};
use crate::transport::{TaggedEvent, TransportEvent, TransportHandle};
use crate::traits::*;
use parking_lot::RwLock;
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, error, info, warn};

/// How often the external shutdown flag is polled
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Commands from the facade to the driver task
#[derive(Debug)]
enum SessionCommand {
    Emit(String),
    Reconnect,
    Shutdown,
}

/// Real-time notification session
///
/// The one object consumers touch. Owns a driver task that holds the
/// connection state machine and the single transport handle; every
/// method here is synchronous and never fails; problems surface as
/// status changes and log output.
///
/// Create one per application session with
/// [`alertsockets::builder()`](crate::builder) and share it by reference.
/// Dropping it tears the session down.
pub struct NotificationSession {
    config: Arc<SessionConfig>,
    registry: Arc<RwLock<ListenerRegistry>>,
    metrics: Arc<SessionMetrics>,
    status_rx: watch::Receiver<ConnectionStatus>,
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    task_handle: Option<JoinHandle<()>>,
}

impl NotificationSession {
    /// Spawn the driver; called by the builder's `build()` method
    pub(crate) fn start(config: SessionConfig, strategy: Box<dyn ReconnectionStrategy>) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(RwLock::new(ListenerRegistry::new()));
        let metrics = Arc::new(SessionMetrics::new());
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Closed);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let driver = SessionDriver {
            config: Arc::clone(&config),
            machine: ConnectionMachine::new(strategy),
            registry: Arc::clone(&registry),
            metrics: Arc::clone(&metrics),
            status_tx,
            events_tx,
            transport: None,
            next_generation: 0,
            retry_timer: None,
            refresh_task: None,
        };

        let task_handle = tokio::spawn(driver.run(command_rx, events_rx));

        Self {
            config,
            registry,
            metrics,
            status_rx,
            command_tx,
            task_handle: Some(task_handle),
        }
    }

    /// Current connection status
    #[inline]
    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Check if the session is OPEN
    #[inline]
    pub fn is_open(&self) -> bool {
        self.status().is_open()
    }

    /// Receiver that observes every status change
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Register `listener` under `key`
    ///
    /// Replaces any listener already registered under `key`. Takes effect
    /// on the next inbound message if the session is OPEN, otherwise on
    /// the next OPEN.
    pub fn add_listener(&self, key: impl Into<String>, listener: impl MessageListener) {
        let key = key.into();
        debug!("Adding listener '{}'", key);
        self.registry.write().add(key, Arc::new(listener));
    }

    /// Remove the listener under `key`; unknown keys are ignored
    pub fn remove_listener(&self, key: &str) {
        if self.registry.write().remove(key) {
            debug!("Removed listener '{}'", key);
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Send `data` to the server
    ///
    /// Strings go out raw, anything else as JSON. Dropped with a warning
    /// when the session is not OPEN; nothing is queued.
    pub fn emit<T>(&self, data: &T)
    where
        T: Serialize + ?Sized,
    {
        if !self.is_open() {
            warn!("Socket is {}, dropping outbound message", self.status());
            self.metrics.increment_dropped();
            return;
        }

        let text = match encode_outbound(data) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode outbound message: {}", e);
                self.metrics.increment_dropped();
                return;
            }
        };

        if self.command_tx.send(SessionCommand::Emit(text)).is_err() {
            warn!("Session stopped, dropping outbound message");
            self.metrics.increment_dropped();
        }
    }

    /// Request a connection attempt now
    ///
    /// No-op while OPEN or CONNECTING. This is the only way out of a
    /// terminal close (policy violation other than 401, unknown close code).
    pub fn reconnect(&self) {
        info!("Manual reconnect requested");
        let _ = self.command_tx.send(SessionCommand::Reconnect);
    }

    /// Get current metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Shutdown the session and wait for the driver to finish
    pub async fn shutdown(mut self) {
        info!("Shutting down notification session");
        let _ = self.command_tx.send(SessionCommand::Shutdown);

        if let Some(handle) = self.task_handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for NotificationSession {
    fn drop(&mut self) {
        if self.task_handle.is_some() {
            let _ = self.command_tx.send(SessionCommand::Shutdown);
        }
    }
}

/// What woke the driver loop
enum Wake {
    Command(Option<SessionCommand>),
    Transport(TaggedEvent),
    RetryDue,
    RefreshDone(bool),
    ShutdownPoll,
}

/// Driver task state
///
/// Everything here is owned by a single task, so no field is ever
/// mutated concurrently.
struct SessionDriver {
    config: Arc<SessionConfig>,
    machine: ConnectionMachine,
    registry: Arc<RwLock<ListenerRegistry>>,
    metrics: Arc<SessionMetrics>,
    status_tx: watch::Sender<ConnectionStatus>,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    transport: Option<TransportHandle>,
    next_generation: u64,
    retry_timer: Option<Pin<Box<Sleep>>>,
    refresh_task: Option<JoinHandle<Result<()>>>,
}

impl SessionDriver {
    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
        mut events_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    ) {
        let mut shutdown_poll = tokio::time::interval(SHUTDOWN_POLL_INTERVAL);
        shutdown_poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // Initial mount
        self.machine.request_retry();

        loop {
            self.evaluate();

            let wake = tokio::select! {
                command = command_rx.recv() => Wake::Command(command),
                Some(event) = events_rx.recv() => Wake::Transport(event),
                _ = wait_retry(&mut self.retry_timer) => Wake::RetryDue,
                refreshed = wait_refresh(&mut self.refresh_task) => Wake::RefreshDone(refreshed),
                _ = shutdown_poll.tick() => Wake::ShutdownPoll,
            };

            match wake {
                Wake::Command(None) | Wake::Command(Some(SessionCommand::Shutdown)) => break,
                Wake::Command(Some(SessionCommand::Reconnect)) => self.machine.request_retry(),
                Wake::Command(Some(SessionCommand::Emit(text))) => self.send(text),
                Wake::Transport(tagged) => self.handle_transport_event(tagged),
                Wake::RetryDue => {
                    self.retry_timer = None;
                    debug!("Backoff elapsed, retry allowed");
                    self.machine.request_retry();
                }
                Wake::RefreshDone(refreshed) => {
                    self.refresh_task = None;
                    self.machine.on_refresh_complete(refreshed);
                }
                Wake::ShutdownPoll => {
                    if self.config.shutdown_requested() {
                        info!("Shutdown flag cleared, stopping session");
                        break;
                    }
                }
            }

            self.publish_status();
        }

        self.teardown();
    }

    fn evaluate(&mut self) {
        if !self.machine.retry_requested() {
            return;
        }

        let directives = self.machine.evaluate(self.config.token());
        self.apply(directives);
        self.publish_status();
    }

    fn handle_transport_event(&mut self, tagged: TaggedEvent) {
        let current = self.transport.as_ref().map(TransportHandle::generation);
        if current != Some(tagged.generation) {
            debug!(
                "Ignoring event from released transport generation {}",
                tagged.generation
            );
            return;
        }

        match tagged.event {
            TransportEvent::Opened => debug!("Transport open, authenticating"),
            TransportEvent::Authenticated(_) => {
                let directives = self.machine.on_authenticated();
                self.apply(directives);
            }
            TransportEvent::Rejected(reply) => {
                let directives = self.machine.on_auth_rejected(&reply);
                self.apply(directives);
            }
            TransportEvent::Message(text) => self.dispatch(&text),
            TransportEvent::Closed { code, reason } => {
                let directives = self.machine.on_close(code, &reason);
                self.apply(directives);
            }
            TransportEvent::Error(e) => {
                error!("Transport error: {}", e);
                let directives = self.machine.on_transport_error();
                self.apply(directives);
                self.publish_status();
                let directives = self.machine.settle_after_error();
                self.apply(directives);
            }
        }
    }

    fn dispatch(&self, text: &str) {
        if !self.machine.status().is_open() {
            debug!("Dropping inbound message received while {}", self.machine.status());
            return;
        }

        // Snapshot first so listeners can (un)register without deadlocking
        let listeners = self.registry.read().attached_snapshot();
        registry::route_inbound(
            text,
            &self.config.entity_update_type,
            self.config.cache_hook.as_ref(),
            &listeners,
        );
    }

    fn send(&self, text: String) {
        match (&self.transport, self.machine.status()) {
            (Some(transport), ConnectionStatus::Open) => {
                if let Err(e) = transport.send(text) {
                    warn!("Failed to queue outbound message: {}", e);
                    self.metrics.increment_dropped();
                }
            }
            (_, status) => {
                warn!("Socket is {}, dropping outbound message", status);
                self.metrics.increment_dropped();
            }
        }
    }

    fn apply(&mut self, directives: Vec<Directive>) {
        for directive in directives {
            match directive {
                Directive::Connect { token } => self.open_transport(token),
                Directive::ReleaseTransport => {
                    if let Some(transport) = self.transport.take() {
                        transport.release();
                    }
                }
                Directive::AttachListeners => self.registry.write().attach_all(),
                Directive::DetachListeners => self.registry.write().detach_all(),
                Directive::ScheduleRetry(delay) => {
                    self.retry_timer = Some(Box::pin(tokio::time::sleep(delay)));
                }
                Directive::RefreshCredential => self.start_refresh(),
            }
        }

        self.metrics.set_failure_count(self.machine.failure_count());
    }

    fn open_transport(&mut self, token: String) {
        // At most one live handle
        if let Some(stale) = self.transport.take() {
            warn!("Replacing transport generation {}", stale.generation());
            stale.release();
        }

        self.next_generation += 1;
        self.metrics.increment_attempts();
        self.transport = Some(TransportHandle::spawn(
            self.next_generation,
            self.config.url.clone(),
            token,
            self.events_tx.clone(),
            Arc::clone(&self.metrics),
        ));
    }

    fn start_refresh(&mut self) {
        if let Some(previous) = self.refresh_task.take() {
            previous.abort();
        }

        let refresher = Arc::clone(&self.config.refresher);
        self.refresh_task = Some(tokio::spawn(async move { refresher.refresh().await }));
    }

    fn publish_status(&self) {
        let status = self.machine.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                debug!("Status {} -> {}", current, status);
                *current = status;
                true
            }
        });
    }

    fn teardown(&mut self) {
        let directives = self.machine.shutdown();
        self.apply(directives);

        // Cancels any pending retry deterministically
        self.retry_timer = None;
        if let Some(task) = self.refresh_task.take() {
            task.abort();
        }

        self.publish_status();
        info!("Notification session stopped");
    }
}

async fn wait_retry(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn wait_refresh(task: &mut Option<JoinHandle<Result<()>>>) -> bool {
    match task {
        Some(handle) => match handle.await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Credential refresh failed: {}", e);
                false
            }
            Err(e) => {
                error!("Credential refresh task failed: {}", e);
                false
            }
        },
        None => std::future::pending().await,
    }
}
