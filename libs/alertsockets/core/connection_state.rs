//! Connection status and atomic session counters

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Lifecycle status of the session's transport
///
/// Exactly one value at any time. Only the session driver changes it;
/// consumers read it through the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    #[default]
    Closed,
    Closing,
    Connecting,
    Open,
}

impl ConnectionStatus {
    /// Status values in which a transport handle is held
    #[inline]
    pub fn is_live(self) -> bool {
        matches!(self, ConnectionStatus::Connecting | ConnectionStatus::Open)
    }

    #[inline]
    pub fn is_open(self) -> bool {
        self == ConnectionStatus::Open
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionStatus::Closed => "CLOSED",
            ConnectionStatus::Closing => "CLOSING",
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Open => "OPEN",
        };
        f.write_str(label)
    }
}

/// Lock-free session counters
#[derive(Debug, Default)]
pub struct SessionMetrics {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    emits_dropped: AtomicU64,
    connect_attempts: AtomicU64,
    failure_count: AtomicU32,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_dropped(&self) {
        self.emits_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_attempts(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_failure_count(&self, failures: u32) {
        self.failure_count.store(failures, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            emits_dropped: self.emits_dropped.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SessionMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub emits_dropped: u64,
    pub connect_attempts: u64,
    pub failure_count: u32,
}
