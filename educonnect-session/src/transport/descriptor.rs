//! Immutable description of one logical API call.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

/// One logical call against the REST service.
///
/// `path` is relative to the API root (`courses/12/`). A descriptor is replayed
/// at most once after an authorization failure; the replay is an identical
/// copy with `retried` set.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    requires_auth: bool,
    retried: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            method,
            path: path.trim_start_matches('/').to_string(),
            query: Vec::new(),
            body: None,
            requires_auth: true,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append query parameters.
    pub fn with_query<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Attach a JSON body.
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Send without credentials and never renew (login, registration).
    pub fn anonymous(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    /// The copy sent after a successful renewal.
    pub(crate) fn replay(&self) -> Self {
        Self {
            retried: true,
            ..self.clone()
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }

    pub fn retried(&self) -> bool {
        self.retried
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Decoded JSON body; `Value::Null` for an empty body (e.g. 204).
    pub body: Value,
}

impl ApiResponse {
    /// Decode the body into a typed value.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        serde_json::from_value(self.body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}
