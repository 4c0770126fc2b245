//! Credential management module.
//!
//! # Architecture
//!
//! - [`Credential`]: The access/refresh token pair
//! - [`CredentialStore`]: Durable storage of the current pair
//! - [`TokenRenewer`]: The renewal exchange with the server
//! - [`RefreshCoordinator`]: Single-flight renewal and the only store writer
//! - [`SessionEvents`]: Lifecycle notifications for the UI layer

mod coordinator;
mod events;
mod renewer;
mod store;
mod types;

pub use coordinator::{RefreshCoordinator, RefreshState};
pub use events::{SessionEvent, SessionEvents};
pub use renewer::{HttpTokenRenewer, TOKEN_REFRESH_PATH, TokenRenewer};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use types::{ACCESS_TOKEN_KEY, Credential, REFRESH_TOKEN_KEY};
