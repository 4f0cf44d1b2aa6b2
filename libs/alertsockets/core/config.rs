use crate::traits::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Message type of the reserved entity-update category
pub const DEFAULT_ENTITY_UPDATE_TYPE: &str = "ENTITY_UPDATE";

/// Configuration for a NotificationSession
///
/// Built with the type-state [`SessionBuilder`](crate::builder::SessionBuilder)
/// and shared read-only with the driver task.
pub struct SessionConfig {
    /// WebSocket URL (wss:// or ws://)
    pub(crate) url: String,

    /// Bearer token source, read at the start of every attempt
    pub(crate) credentials: Arc<dyn CredentialSource>,

    /// Renews the credential after a 401-class rejection
    pub(crate) refresher: Arc<dyn CredentialRefresher>,

    /// Side effect for successful entity updates
    pub(crate) cache_hook: Arc<dyn CacheUpdateHook>,

    /// `type` value of entity-update envelopes
    pub(crate) entity_update_type: String,

    /// External shutdown flag - when false, the session tears down
    pub(crate) shutdown_flag: Option<Arc<AtomicBool>>,
}

impl SessionConfig {
    /// Get a reference to the URL
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn entity_update_type(&self) -> &str {
        &self.entity_update_type
    }

    /// Current token from the credential source
    ///
    /// Empty or whitespace-only tokens count as absent.
    pub(crate) fn token(&self) -> Option<String> {
        self.credentials
            .token()
            .filter(|token| !token.trim().is_empty())
    }

    /// True once the external shutdown flag has been cleared
    pub(crate) fn shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .map(|flag| !flag.load(Ordering::Acquire))
            .unwrap_or(false)
    }
}
