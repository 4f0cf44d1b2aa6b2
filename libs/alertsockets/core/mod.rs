//! # AlertSockets
//!
//! Authenticated, self-healing notification socket for the triage app.
//!
//! ## Example
//!
//! ```rust,ignore
//! use alertsockets::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let tokens = TokenStore::new(Some(std::env::var("NOTIFIER_TOKEN").unwrap()));
//!
//!     let session = alertsockets::builder()
//!         .url(resolve_endpoint("triage.example.com", DEFAULT_DEV_HOST))
//!         .credentials(tokens.clone())
//!         .cache_hook(MyAlertCache::new())
//!         .build()
//!         .await?;
//!
//!     session.add_listener("inbox", |envelope: &Envelope| {
//!         println!("{} -> {}", envelope.kind, envelope.message);
//!     });
//!
//!     let mut status = session.status_watch();
//!     while status.changed().await.is_ok() {
//!         println!("Status: {}", *status.borrow());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config;
pub mod connection_state;
pub mod endpoint;
pub mod handshake;
pub mod machine;
pub mod registry;
pub mod session;
pub mod transport;

// Re-export main types
pub use builder::{states, SessionBuilder};
pub use config::{SessionConfig, DEFAULT_ENTITY_UPDATE_TYPE};
pub use connection_state::{ConnectionStatus, MetricsSnapshot, SessionMetrics};
pub use endpoint::{resolve_endpoint, DEFAULT_DEV_HOST, SOCKET_PATH};
pub use machine::{ConnectionMachine, Directive};
pub use registry::ListenerRegistry;
pub use session::NotificationSession;

// Re-export traits for convenience
pub use crate::traits::*;

/// Create a new session builder
///
/// This is a convenience function for starting the builder pattern.
///
/// # Example
/// ```ignore
/// let session = alertsockets::builder()
///     .url("wss://triage.example.com/socket/v1/connect")
///     .credentials(token_store)
///     .refresher(MyRefresher)
///     .build()
///     .await?;
/// ```
pub fn builder() -> SessionBuilder<builder::states::NoUrl, builder::states::NoCredentials> {
    SessionBuilder::new()
}
