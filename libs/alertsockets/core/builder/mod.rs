pub mod states;

use crate::config::{SessionConfig, DEFAULT_ENTITY_UPDATE_TYPE};
use crate::endpoint::is_socket_url;
use crate::session::NotificationSession;
use crate::traits::*;
use states::*;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Optional settings carried through every type-state transition
struct Options {
    refresher: Option<Arc<dyn CredentialRefresher>>,
    cache_hook: Option<Arc<dyn CacheUpdateHook>>,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    entity_update_type: Option<String>,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

/// Type-state builder for NotificationSession
///
/// The endpoint URL and the credential source are required and enforced
/// at compile time; everything else has a default.
pub struct SessionBuilder<U, C>
where
    U: UrlState,
    C: CredentialState,
{
    _state: TypeState<U, C>,
    url: Option<String>,
    credentials: Option<Arc<dyn CredentialSource>>,
    options: Options,
}

impl SessionBuilder<NoUrl, NoCredentials> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            url: None,
            credentials: None,
            options: Options {
                refresher: None,
                cache_hook: None,
                reconnect_strategy: None,
                entity_update_type: None,
                shutdown_flag: None,
            },
        }
    }
}

impl Default for SessionBuilder<NoUrl, NoCredentials> {
    fn default() -> Self {
        Self::new()
    }
}

// URL setting
impl<C> SessionBuilder<NoUrl, C>
where
    C: CredentialState,
{
    /// Socket endpoint, usually from [`resolve_endpoint`](crate::endpoint::resolve_endpoint)
    pub fn url(self, url: impl Into<String>) -> SessionBuilder<HasUrl, C> {
        SessionBuilder {
            _state: TypeState::new(),
            url: Some(url.into()),
            credentials: self.credentials,
            options: self.options,
        }
    }
}

// Credential setting
impl<U> SessionBuilder<U, NoCredentials>
where
    U: UrlState,
{
    /// Where the bearer token is read from on every attempt
    pub fn credentials(
        self,
        source: impl CredentialSource + 'static,
    ) -> SessionBuilder<U, HasCredentials> {
        SessionBuilder {
            _state: TypeState::new(),
            url: self.url,
            credentials: Some(Arc::new(source)),
            options: self.options,
        }
    }
}

// Optional configuration methods
impl<U, C> SessionBuilder<U, C>
where
    U: UrlState,
    C: CredentialState,
{
    /// Credential refresh run after a 401-class rejection
    ///
    /// Defaults to [`NoRefresh`]: a 401 then leaves the session CLOSED
    /// until [`reconnect`](crate::session::NotificationSession::reconnect).
    pub fn refresher(mut self, refresher: impl CredentialRefresher + 'static) -> Self {
        self.options.refresher = Some(Arc::new(refresher));
        self
    }

    /// Cache side effect for successful entity updates
    pub fn cache_hook(mut self, hook: impl CacheUpdateHook + 'static) -> Self {
        self.options.cache_hook = Some(Arc::new(hook));
        self
    }

    /// Backoff used after abnormal closures and transport errors
    ///
    /// Defaults to [`ExponentialBackoff::default`] (1s doubling, uncapped).
    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.options.reconnect_strategy = Some(Box::new(strategy));
        self
    }

    /// `type` value that marks entity-update envelopes
    pub fn entity_update_type(mut self, kind: impl Into<String>) -> Self {
        self.options.entity_update_type = Some(kind.into());
        self
    }

    /// Set a shutdown flag shared with other components
    ///
    /// When the flag is set to `false` the session closes its transport,
    /// cancels pending retries and stops.
    ///
    /// # Example
    /// ```ignore
    /// let running = Arc::new(AtomicBool::new(true));
    ///
    /// let session = alertsockets::builder()
    ///     .url("wss://triage.example.com/socket/v1/connect")
    ///     .credentials(token_store.clone())
    ///     .shutdown_flag(Arc::clone(&running))
    ///     .build()
    ///     .await?;
    ///
    /// // Later, from anywhere:
    /// running.store(false, Ordering::Release);
    /// ```
    pub fn shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.options.shutdown_flag = Some(flag);
        self
    }
}

// Build method - only available when all required fields are set
impl SessionBuilder<HasUrl, HasCredentials> {
    /// Validate the configuration and start the session driver
    ///
    /// The first connection attempt starts immediately if the credential
    /// source has a token.
    pub async fn build(self) -> Result<NotificationSession> {
        let url = self
            .url
            .ok_or_else(|| SessionError::Configuration("URL must be set".into()))?;
        let credentials = self
            .credentials
            .ok_or_else(|| SessionError::Configuration("Credential source must be set".into()))?;

        if !is_socket_url(&url) {
            return Err(SessionError::Configuration(format!(
                "Expected a ws:// or wss:// URL, got '{}'",
                url
            )));
        }

        let options = self.options;
        let strategy = options
            .reconnect_strategy
            .unwrap_or_else(|| Box::new(ExponentialBackoff::default()));

        let config = SessionConfig {
            url,
            credentials,
            refresher: options.refresher.unwrap_or_else(|| Arc::new(NoRefresh)),
            cache_hook: options.cache_hook.unwrap_or_else(|| Arc::new(NoCache)),
            entity_update_type: options
                .entity_update_type
                .unwrap_or_else(|| DEFAULT_ENTITY_UPDATE_TYPE.to_string()),
            shutdown_flag: options.shutdown_flag,
        };

        Ok(NotificationSession::start(config, strategy))
    }
}
