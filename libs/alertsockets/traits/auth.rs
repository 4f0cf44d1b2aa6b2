use crate::error::{Result, SessionError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

/// Source of the bearer token sent as the first frame of every connection
///
/// Read synchronously at the start of each connection attempt and never
/// cached by the session, so a refreshed credential is picked up on the
/// next attempt.
pub trait CredentialSource: Send + Sync {
    /// Current bearer token, or `None` if the user is not signed in.
    /// No connection attempt starts while this returns `None`.
    fn token(&self) -> Option<String>;
}

/// Trigger for an external credential refresh
///
/// Invoked when the server rejects the current credential with a
/// 401-class response. Completion with `Ok(())` means a retry may
/// proceed immediately.
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    async fn refresh(&self) -> Result<()>;
}

/// A shared, swappable token
///
/// Doubles as a credential source for the session and as the place a
/// refresher writes the new token into.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    inner: Arc<RwLock<Option<String>>>,
}

impl TokenStore {
    pub fn new(token: Option<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(token)),
        }
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.inner.write() = Some(token.into());
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }
}

impl CredentialSource for TokenStore {
    fn token(&self) -> Option<String> {
        self.inner.read().clone()
    }
}

impl<F> CredentialSource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}

/// Used when no refresher is configured
///
/// Always fails, so a 401 leaves the session CLOSED until a manual
/// reconnect instead of retrying with the same rejected token.
pub struct NoRefresh;

#[async_trait]
impl CredentialRefresher for NoRefresh {
    async fn refresh(&self) -> Result<()> {
        Err(SessionError::CredentialRefresh(
            "no refresher configured".to_string(),
        ))
    }
}
