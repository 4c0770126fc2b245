//! The credential renewal exchange.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::types::Credential;
use crate::error::ApiError;

/// Path of the renewal endpoint, relative to the API root.
pub const TOKEN_REFRESH_PATH: &str = "auth/token/refresh/";

/// Exchanges a refresh token for a new credential.
#[async_trait]
pub trait TokenRenewer: Send + Sync {
    async fn renew(&self, refresh_token: &str) -> Result<Credential, ApiError>;
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
    /// Present only when the server rotates refresh tokens.
    #[serde(default)]
    refresh: Option<String>,
}

/// Renewal against `POST auth/token/refresh/`.
///
/// The exchange is sent without an `Authorization` header and is never itself
/// subject to renewal.
pub struct HttpTokenRenewer {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpTokenRenewer {
    pub fn new(client: reqwest::Client, base_url: &Url) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            endpoint: base_url.join(TOKEN_REFRESH_PATH)?,
        })
    }
}

#[async_trait]
impl TokenRenewer for HttpTokenRenewer {
    async fn renew(&self, refresh_token: &str) -> Result<Credential, ApiError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&serde_json::json!({ "refresh": refresh_token }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, body));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        let rotated = body.refresh.is_some();
        debug!(rotated, "Renewal exchange succeeded");

        Ok(Credential::new(
            body.access,
            body.refresh.unwrap_or_else(|| refresh_token.to_string()),
        ))
    }
}
