//! Authenticated HTTP transport.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use super::descriptor::{ApiResponse, RequestDescriptor};
use crate::credentials::RefreshCoordinator;
use crate::error::ApiError;

/// Sends [`RequestDescriptor`]s, attaching the stored credential and
/// renewing it once on a 401.
pub struct TransportClient {
    http: reqwest::Client,
    base_url: Url,
    coordinator: Arc<RefreshCoordinator>,
}

/// What came back from one attempt.
struct Attempt {
    status: StatusCode,
    body: String,
    /// Access token the attempt carried, if any.
    sent_token: Option<String>,
}

impl TransportClient {
    pub fn new(http: reqwest::Client, base_url: Url, coordinator: Arc<RefreshCoordinator>) -> Self {
        Self {
            http,
            base_url,
            coordinator,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Send a request.
    ///
    /// - 2xx: returned as [`ApiResponse`].
    /// - 401 on an authenticated, not yet replayed request: the credential is
    ///   renewed (single-flight) and the request is replayed once. A 401 on
    ///   the replay ends the session with [`ApiError::AuthExpired`].
    /// - Anything else is classified and returned without retry.
    #[instrument(skip(self, descriptor), fields(method = %descriptor.method(), path = %descriptor.path()))]
    pub async fn send(&self, descriptor: &RequestDescriptor) -> Result<ApiResponse, ApiError> {
        let mut attempt = self.dispatch(descriptor).await?;

        if attempt.status == StatusCode::UNAUTHORIZED && descriptor.requires_auth() {
            debug!("Request rejected; renewing credential");
            self.coordinator
                .ensure_replacing(attempt.sent_token.as_deref())
                .await?;

            let replay = descriptor.replay();
            attempt = self.dispatch(&replay).await?;

            if attempt.status == StatusCode::UNAUTHORIZED {
                warn!("Replay rejected after renewal; ending session");
                self.coordinator.expire().await;
                return Err(ApiError::AuthExpired);
            }
        }

        classify(attempt.status, attempt.body)
    }

    /// Send a request and decode the body.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<T, ApiError> {
        self.send(descriptor).await?.json()
    }

    /// Send a request, giving up with [`ApiError::Cancelled`] as soon as
    /// `cancel` fires. Dropping the call aborts the underlying HTTP request.
    pub async fn send_cancellable(
        &self,
        descriptor: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, ApiError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(path = %descriptor.path(), "Request cancelled by consumer");
                Err(ApiError::Cancelled)
            }
            result = self.send(descriptor) => result,
        }
    }

    async fn dispatch(&self, descriptor: &RequestDescriptor) -> Result<Attempt, ApiError> {
        let url = self
            .base_url
            .join(descriptor.path())
            .map_err(|e| ApiError::Network(format!("invalid request path: {e}")))?;

        let mut request = self.http.request(descriptor.method().clone(), url);
        if !descriptor.query().is_empty() {
            request = request.query(descriptor.query());
        }
        if let Some(body) = descriptor.body() {
            request = request.json(body);
        }

        let mut sent_token = None;
        if descriptor.requires_auth()
            && let Some(credential) = self.coordinator.store().read().await
        {
            request = request.bearer_auth(&credential.access_token);
            sent_token = Some(credential.access_token);
        }

        let response = request.send().await.map_err(|e| {
            warn!(error = %e, retried = descriptor.retried(), "Request failed without a response");
            ApiError::Network(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        debug!(status = status.as_u16(), retried = descriptor.retried(), "Response received");

        Ok(Attempt {
            status,
            body,
            sent_token,
        })
    }
}

/// Map a final status and body to the caller-facing result.
fn classify(status: StatusCode, body: String) -> Result<ApiResponse, ApiError> {
    if status.is_success() {
        let body = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))?
        };
        return Ok(ApiResponse {
            status: status.as_u16(),
            body,
        });
    }

    Err(ApiError::from_status(status, body))
}
