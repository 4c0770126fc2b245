//! Wire shapes the session layer interprets.
//!
//! Everything else the service returns stays an opaque `serde_json::Value`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Paginated list envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Body of a successful login.
#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    pub access: String,
    pub refresh: String,
    #[serde(default)]
    pub user: Value,
}
