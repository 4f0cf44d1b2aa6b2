//! # AlertSockets Traits
//!
//! Seams and shared types used throughout the session library:
//!
//! - **CredentialSource** / **CredentialRefresher**: where the bearer token
//!   comes from and how it gets renewed after a 401
//! - **ReconnectionStrategy**: delay before retrying after a failure
//! - **MessageListener** / **CacheUpdateHook**: subscribers to inbound traffic
//! - **Envelope**: decoded shape of every inbound frame

pub mod auth;
pub mod envelope;
pub mod error;
pub mod listener;
pub mod reconnect;

// Re-export commonly used types
pub use auth::{CredentialRefresher, CredentialSource, NoRefresh, TokenStore};
pub use envelope::{encode_outbound, EntityUpdate, Envelope};
pub use error::{Result, SessionError};
pub use listener::{CacheUpdateHook, MessageListener, NoCache};
pub use reconnect::{ExponentialBackoff, ReconnectionStrategy};
