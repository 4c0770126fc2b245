//! Core credential types.

use serde::{Deserialize, Serialize};

/// Store key of the access token.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// Store key of the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Access/refresh token pair identifying an authenticated session.
///
/// Both tokens are opaque; nothing here looks inside them.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Check if this credential can be renewed.
    #[inline]
    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }
}

// Tokens never end up in logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// On-disk shape of the credential pair.
///
/// Either key may be missing in a document written by someone else; a pair
/// with a missing or empty half reads as unauthenticated.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct StoredCredential {
    #[serde(rename = "accessToken", default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(rename = "refreshToken", default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl StoredCredential {
    pub fn into_credential(self) -> Option<Credential> {
        match (self.access_token, self.refresh_token) {
            (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
                Some(Credential::new(access, refresh))
            }
            _ => None,
        }
    }
}

impl From<&Credential> for StoredCredential {
    fn from(credential: &Credential) -> Self {
        Self {
            access_token: Some(credential.access_token.clone()),
            refresh_token: Some(credential.refresh_token.clone()),
        }
    }
}
