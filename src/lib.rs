//! Triage Notifier - Main Library
//!
//! Real-time notification client for the alert-triage backend: one
//! authenticated WebSocket session per user session, with reconnection,
//! credential refresh and keyed message listeners.
//!
//! ## Architecture
//!
//! - **alertsockets**: Session library (re-exported from workspace)
//! - **config**: YAML configuration and environment secrets
//! - **refresh**: HTTP credential refresher
//! - **logging** / **shutdown**: Process-level plumbing for binaries
//! - **bin_common**: Common utilities for binary executables (CLI, runners)
//!
//! ## Usage in Binaries
//!
//! ```rust
//! use triage_notifier::bin_common::{load_config_from_env, ConfigType};
//! use triage_notifier::config::NotifierConfig;
//! ```

// Re-export workspace libraries for convenience
pub use alertsockets;

pub mod config;
pub mod logging;
pub mod refresh;
pub mod shutdown;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod runner;

    pub use cli::{load_config_from_env, ConfigType};
    pub use runner::{BinaryRunner, RunConfig};
}
