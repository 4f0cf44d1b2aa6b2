//! HTTP credential refresher
//!
//! Exchanges the current bearer token for a fresh one at a configured
//! endpoint and writes the result into the shared [`TokenStore`] the
//! session reads its credential from.

use alertsockets::{CredentialRefresher, CredentialSource, SessionError, TokenStore};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    token: String,
}

/// Refreshes the credential with a POST to `refresh_url`
pub struct HttpCredentialRefresher {
    refresh_url: String,
    store: TokenStore,
    client: Client,
}

impl HttpCredentialRefresher {
    pub fn new(refresh_url: impl Into<String>, store: TokenStore) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            refresh_url: refresh_url.into(),
            store,
            client,
        })
    }
}

#[async_trait]
impl CredentialRefresher for HttpCredentialRefresher {
    async fn refresh(&self) -> alertsockets::Result<()> {
        let current = self
            .store
            .token()
            .ok_or_else(|| SessionError::CredentialRefresh("no token to refresh".into()))?;

        debug!("Requesting fresh credential from {}", self.refresh_url);

        let response = self
            .client
            .post(&self.refresh_url)
            .json(&RefreshRequest { token: &current })
            .send()
            .await
            .map_err(|e| SessionError::CredentialRefresh(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!("Credential refresh rejected ({}): {}", status, body);
            return Err(SessionError::CredentialRefresh(format!(
                "refresh endpoint returned {}",
                status
            )));
        }

        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| SessionError::CredentialRefresh(e.to_string()))?;

        if refreshed.token.is_empty() {
            return Err(SessionError::CredentialRefresh(
                "refresh endpoint returned an empty token".into(),
            ));
        }

        self.store.set(refreshed.token);
        info!("Credential refreshed");
        Ok(())
    }
}
