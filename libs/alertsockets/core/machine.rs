//! Connection state machine
//!
//! Pure transition logic for one session: status, retry flag and
//! failure count. It performs no I/O; every transition returns the
//! [`Directive`]s the driver must carry out (open a transport, schedule
//! a retry, refresh the credential, ...). This keeps the close-code
//! policy testable without a socket.
//!
//! ```text
//!            retry && token           auth accepted
//!   CLOSED ─────────────────> CONNECTING ─────────────> OPEN
//!     ^                           │                      │
//!     │        close event        │      close event     │
//!     └───────────────────────────┴──────────────────────┘
//!     ^                                                  │
//!     │   settle (backoff retry)         transport error │
//!     └──────────────────── CLOSING <────────────────────┘
//! ```

use crate::connection_state::ConnectionStatus;
use crate::envelope::Envelope;
use crate::traits::ReconnectionStrategy;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Abnormal closure: no close frame was received
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Policy violation: the reason may carry an envelope
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Normal closure, sent on teardown
pub const CLOSE_NORMAL: u16 = 1000;

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Open a new transport and authenticate with `token`
    Connect { token: String },
    /// Close and drop the live transport handle
    ReleaseTransport,
    /// Attach every registered listener to the live transport
    AttachListeners,
    /// Detach all listeners from the transport being released
    DetachListeners,
    /// Set the retry flag after `delay`
    ScheduleRetry(Duration),
    /// Run the external credential refresh, then set the retry flag
    RefreshCredential,
}

pub struct ConnectionMachine {
    status: ConnectionStatus,
    retry: bool,
    failures: u32,
    strategy: Box<dyn ReconnectionStrategy>,
}

impl ConnectionMachine {
    pub fn new(strategy: Box<dyn ReconnectionStrategy>) -> Self {
        Self {
            status: ConnectionStatus::Closed,
            retry: false,
            failures: 0,
            strategy,
        }
    }

    #[inline]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    #[inline]
    pub fn retry_requested(&self) -> bool {
        self.retry
    }

    #[inline]
    pub fn failure_count(&self) -> u32 {
        self.failures
    }

    /// Ask for a connection attempt on the next evaluation
    ///
    /// Used on start-up, by manual reconnects, when a backoff timer fires
    /// and after a successful credential refresh.
    pub fn request_retry(&mut self) {
        self.retry = true;
    }

    /// Start a connection attempt if one is due
    ///
    /// Fires only when the retry flag is set, a token is available and no
    /// handle is held. A retry requested while already live is discarded.
    pub fn evaluate(&mut self, token: Option<String>) -> Vec<Directive> {
        if !self.retry {
            return Vec::new();
        }

        match self.status {
            ConnectionStatus::Open | ConnectionStatus::Connecting => {
                debug!("Retry requested while {}, ignoring", self.status);
                self.retry = false;
                Vec::new()
            }
            // The previous handle is still being released
            ConnectionStatus::Closing => Vec::new(),
            ConnectionStatus::Closed => match token {
                Some(token) => {
                    self.retry = false;
                    self.status = ConnectionStatus::Connecting;
                    info!("Opening notification socket (failures so far: {})", self.failures);
                    vec![Directive::Connect { token }]
                }
                None => {
                    debug!("No credential available, connection attempt deferred");
                    Vec::new()
                }
            },
        }
    }

    /// The server acknowledged the credential
    pub fn on_authenticated(&mut self) -> Vec<Directive> {
        if self.status != ConnectionStatus::Connecting {
            warn!("Authentication ack while {}, ignoring", self.status);
            return Vec::new();
        }

        info!("Notification socket authenticated");
        self.status = ConnectionStatus::Open;
        self.failures = 0;
        self.retry = false;
        vec![Directive::AttachListeners]
    }

    /// The server answered the credential with an error envelope
    ///
    /// A 401 goes straight to credential refresh; any other rejection is
    /// terminal until a manual reconnect. The handle is released here
    /// rather than waiting for the server to close it.
    pub fn on_auth_rejected(&mut self, reply: &Envelope) -> Vec<Directive> {
        if self.status != ConnectionStatus::Connecting {
            warn!("Authentication rejection while {}, ignoring", self.status);
            return Vec::new();
        }

        self.status = ConnectionStatus::Closed;

        if reply.is_unauthorized() {
            warn!("Credential rejected ({}), refreshing", reply.message);
            vec![Directive::ReleaseTransport, Directive::RefreshCredential]
        } else {
            error!(
                "Authentication failed with status {}: {}",
                reply.status, reply.message
            );
            vec![Directive::ReleaseTransport]
        }
    }

    /// The transport closed with `code` and `reason`
    pub fn on_close(&mut self, code: u16, reason: &str) -> Vec<Directive> {
        if !self.status.is_live() {
            debug!("Close event ({}) while {}, ignoring", code, self.status);
            return Vec::new();
        }

        let was_open = self.status.is_open();
        self.status = ConnectionStatus::Closed;

        let mut directives = Vec::new();
        if was_open {
            directives.push(Directive::DetachListeners);
        }
        directives.push(Directive::ReleaseTransport);

        match code {
            CLOSE_ABNORMAL => {
                let delay = self.schedule_backoff();
                warn!("Socket closed abnormally, retrying in {:?}", delay);
                directives.push(Directive::ScheduleRetry(delay));
            }
            CLOSE_POLICY_VIOLATION => match Envelope::decode(reason) {
                Ok(envelope) if envelope.is_unauthorized() => {
                    warn!("Socket closed with 401, refreshing credential");
                    directives.push(Directive::RefreshCredential);
                }
                Ok(envelope) => {
                    error!(
                        "Socket closed by policy (status {}): {}",
                        envelope.status, envelope.message
                    );
                }
                Err(_) => {
                    error!("Socket closed by policy: {}", reason);
                }
            },
            other => {
                info!("Socket closed with code {}, not retrying", other);
            }
        }

        directives
    }

    /// Transport-level error: begin closing the handle
    ///
    /// Must be followed by [`ConnectionMachine::settle_after_error`] once
    /// the handle has been released.
    pub fn on_transport_error(&mut self) -> Vec<Directive> {
        if !self.status.is_live() {
            debug!("Transport error while {}, ignoring", self.status);
            return Vec::new();
        }

        let was_open = self.status.is_open();
        self.status = ConnectionStatus::Closing;

        let mut directives = Vec::new();
        if was_open {
            directives.push(Directive::DetachListeners);
        }
        directives.push(Directive::ReleaseTransport);
        directives
    }

    /// Finish an error-driven close and schedule the backoff retry
    pub fn settle_after_error(&mut self) -> Vec<Directive> {
        if self.status != ConnectionStatus::Closing {
            return Vec::new();
        }

        self.status = ConnectionStatus::Closed;
        let delay = self.schedule_backoff();
        warn!("Socket errored, retrying in {:?}", delay);
        vec![Directive::ScheduleRetry(delay)]
    }

    /// Outcome of an external credential refresh
    pub fn on_refresh_complete(&mut self, refreshed: bool) {
        if refreshed {
            debug!("Credential refreshed, retrying immediately");
            self.retry = true;
        } else {
            error!("Credential refresh failed, waiting for a manual reconnect");
        }
    }

    /// Tear down regardless of state
    pub fn shutdown(&mut self) -> Vec<Directive> {
        let was_open = self.status.is_open();
        let was_live = self.status.is_live();
        self.status = ConnectionStatus::Closed;
        self.retry = false;

        let mut directives = Vec::new();
        if was_open {
            directives.push(Directive::DetachListeners);
        }
        if was_live {
            directives.push(Directive::ReleaseTransport);
        }
        directives
    }

    // Delay uses the pre-increment failure count.
    fn schedule_backoff(&mut self) -> Duration {
        let delay = self.strategy.next_delay(self.failures);
        self.failures = self.failures.saturating_add(1);
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ExponentialBackoff;

    fn machine() -> ConnectionMachine {
        ConnectionMachine::new(Box::new(ExponentialBackoff::default()))
    }

    fn token() -> Option<String> {
        Some("bearer-token".to_string())
    }

    fn envelope(json: &str) -> Envelope {
        Envelope::decode(json).unwrap()
    }

    fn open_machine() -> ConnectionMachine {
        let mut m = machine();
        m.request_retry();
        m.evaluate(token());
        m.on_authenticated();
        m
    }

    #[test]
    fn test_connects_and_opens_on_ack() {
        let mut m = machine();
        assert_eq!(m.status(), ConnectionStatus::Closed);

        m.request_retry();
        let directives = m.evaluate(token());
        assert_eq!(
            directives,
            vec![Directive::Connect {
                token: "bearer-token".to_string()
            }]
        );
        assert_eq!(m.status(), ConnectionStatus::Connecting);
        assert!(!m.retry_requested());

        assert_eq!(m.on_authenticated(), vec![Directive::AttachListeners]);
        assert_eq!(m.status(), ConnectionStatus::Open);
        assert_eq!(m.failure_count(), 0);
    }

    #[test]
    fn test_no_attempt_without_retry_flag_or_token() {
        let mut m = machine();
        assert!(m.evaluate(token()).is_empty());

        m.request_retry();
        assert!(m.evaluate(None).is_empty());
        assert_eq!(m.status(), ConnectionStatus::Closed);
        assert!(m.retry_requested());

        // Token shows up later
        assert_eq!(m.evaluate(token()).len(), 1);
    }

    #[test]
    fn test_abnormal_close_backs_off_with_pre_increment_count() {
        let mut m = open_machine();

        let directives = m.on_close(CLOSE_ABNORMAL, "");
        assert_eq!(
            directives,
            vec![
                Directive::DetachListeners,
                Directive::ReleaseTransport,
                Directive::ScheduleRetry(Duration::from_millis(1000)),
            ]
        );
        assert_eq!(m.status(), ConnectionStatus::Closed);
        assert_eq!(m.failure_count(), 1);

        // Retry fires, attempt fails again before opening
        m.request_retry();
        m.evaluate(token());
        let directives = m.on_close(CLOSE_ABNORMAL, "");
        assert_eq!(
            directives.last(),
            Some(&Directive::ScheduleRetry(Duration::from_millis(2000)))
        );
        assert_eq!(m.failure_count(), 2);
    }

    #[test]
    fn test_successful_open_resets_failures() {
        let mut m = open_machine();
        m.on_close(CLOSE_ABNORMAL, "");
        m.request_retry();
        m.evaluate(token());
        m.on_close(CLOSE_ABNORMAL, "");
        assert_eq!(m.failure_count(), 2);

        m.request_retry();
        m.evaluate(token());
        m.on_authenticated();
        assert_eq!(m.failure_count(), 0);
    }

    #[test]
    fn test_policy_close_with_401_refreshes_without_backoff() {
        let mut m = open_machine();

        let directives = m.on_close(
            CLOSE_POLICY_VIOLATION,
            r#"{"error":true,"status":401,"message":"token expired","type":"AUTH"}"#,
        );
        assert!(directives.contains(&Directive::RefreshCredential));
        assert!(!directives
            .iter()
            .any(|d| matches!(d, Directive::ScheduleRetry(_))));
        assert_eq!(m.failure_count(), 0);
        assert!(!m.retry_requested());

        m.on_refresh_complete(true);
        assert!(m.retry_requested());
        assert_eq!(m.evaluate(token()).len(), 1);
        assert_eq!(m.status(), ConnectionStatus::Connecting);
    }

    #[test]
    fn test_policy_close_with_403_is_terminal() {
        let mut m = open_machine();

        let directives = m.on_close(
            CLOSE_POLICY_VIOLATION,
            r#"{"error":true,"status":403,"message":"forbidden","type":"AUTH"}"#,
        );
        assert_eq!(
            directives,
            vec![Directive::DetachListeners, Directive::ReleaseTransport]
        );
        assert_eq!(m.status(), ConnectionStatus::Closed);
        assert!(!m.retry_requested());
        assert!(m.evaluate(token()).is_empty());

        // Only a manual reconnect brings it back
        m.request_retry();
        assert_eq!(m.evaluate(token()).len(), 1);
        assert_eq!(m.status(), ConnectionStatus::Connecting);
    }

    #[test]
    fn test_policy_close_with_unparseable_reason_is_terminal() {
        let mut m = open_machine();
        let directives = m.on_close(CLOSE_POLICY_VIOLATION, "go away");
        assert!(!directives.contains(&Directive::RefreshCredential));
        assert!(!m.retry_requested());
    }

    #[test]
    fn test_other_close_codes_do_not_retry() {
        for code in [CLOSE_NORMAL, 1001, 1005, 1011, 4000] {
            let mut m = open_machine();
            let directives = m.on_close(code, "");
            assert!(
                !directives
                    .iter()
                    .any(|d| matches!(d, Directive::ScheduleRetry(_) | Directive::RefreshCredential)),
                "code {} should be terminal",
                code
            );
            assert_eq!(m.status(), ConnectionStatus::Closed);
        }
    }

    #[test]
    fn test_transport_error_goes_through_closing() {
        let mut m = open_machine();

        let directives = m.on_transport_error();
        assert_eq!(
            directives,
            vec![Directive::DetachListeners, Directive::ReleaseTransport]
        );
        assert_eq!(m.status(), ConnectionStatus::Closing);

        // Nothing can start while the handle is being released
        m.request_retry();
        assert!(m.evaluate(token()).is_empty());

        let directives = m.settle_after_error();
        assert_eq!(
            directives,
            vec![Directive::ScheduleRetry(Duration::from_millis(1000))]
        );
        assert_eq!(m.status(), ConnectionStatus::Closed);
        assert_eq!(m.failure_count(), 1);
    }

    #[test]
    fn test_close_after_error_is_ignored() {
        let mut m = open_machine();
        m.on_transport_error();
        m.settle_after_error();

        assert!(m.on_close(CLOSE_ABNORMAL, "").is_empty());
        assert_eq!(m.failure_count(), 1);
    }

    #[test]
    fn test_reconnect_while_live_is_noop() {
        let mut m = open_machine();
        m.request_retry();
        assert!(m.evaluate(token()).is_empty());
        assert!(!m.retry_requested());
        assert_eq!(m.status(), ConnectionStatus::Open);
    }

    #[test]
    fn test_handshake_rejection_401_refreshes() {
        let mut m = machine();
        m.request_retry();
        m.evaluate(token());

        let directives = m.on_auth_rejected(&envelope(r#"{"error":true,"status":401}"#));
        assert_eq!(
            directives,
            vec![Directive::ReleaseTransport, Directive::RefreshCredential]
        );
        assert_eq!(m.status(), ConnectionStatus::Closed);

        // The server's follow-up close is stale
        assert!(m.on_close(CLOSE_POLICY_VIOLATION, r#"{"status":401}"#).is_empty());
    }

    #[test]
    fn test_handshake_rejection_other_is_terminal() {
        let mut m = machine();
        m.request_retry();
        m.evaluate(token());

        let directives = m.on_auth_rejected(&envelope(r#"{"error":true,"status":403}"#));
        assert_eq!(directives, vec![Directive::ReleaseTransport]);
        assert!(!m.retry_requested());
        assert_eq!(m.failure_count(), 0);
    }

    #[test]
    fn test_failed_refresh_waits_for_manual_reconnect() {
        let mut m = open_machine();
        m.on_close(CLOSE_POLICY_VIOLATION, r#"{"status":401}"#);
        m.on_refresh_complete(false);
        assert!(!m.retry_requested());
        assert!(m.evaluate(token()).is_empty());
    }

    #[test]
    fn test_shutdown_releases_live_handle() {
        let mut m = open_machine();
        assert_eq!(
            m.shutdown(),
            vec![Directive::DetachListeners, Directive::ReleaseTransport]
        );
        assert_eq!(m.status(), ConnectionStatus::Closed);

        let mut idle = machine();
        assert!(idle.shutdown().is_empty());
    }
}
