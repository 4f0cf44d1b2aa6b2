//! # AlertSockets
//!
//! Real-time notification client for the alert-triage application.
//!
//! ## Features
//!
//! - **Single session object**: one authenticated, reconnecting socket per app session
//! - **Explicit state machine**: CLOSED → CONNECTING → OPEN, close-code driven retries
//! - **Token handshake**: raw bearer token first, server verdict before anything else
//! - **Keyed listeners**: independent subscribers that survive reconnects
//! - **Cache side effect**: entity-update notifications refresh caches without re-fetching

pub mod traits;
pub mod core;

// Re-export all traits
pub use traits::*;

// Re-export core session functionality
pub use self::core::{
    builder, config, connection_state, endpoint, handshake, machine, registry, session,
    transport,
    builder::{states, SessionBuilder},
    config::{SessionConfig, DEFAULT_ENTITY_UPDATE_TYPE},
    connection_state::{ConnectionStatus, MetricsSnapshot, SessionMetrics},
    endpoint::{is_socket_url, resolve_endpoint, DEFAULT_DEV_HOST, SOCKET_PATH},
    registry::ListenerRegistry,
    session::NotificationSession,
};

// Convenience function
pub use self::core::builder as session_builder;
