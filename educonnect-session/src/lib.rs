//! EduConnect session layer.
//!
//! Authenticated access to the EduConnect catalog REST service: a durable
//! credential store, an HTTP transport that renews the access token once per
//! burst of 401s and replays the rejected requests, a query cache with
//! request deduplication and prefix invalidation, and the course filter state
//! with its canonical query-string form.

pub mod api;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod error;
pub mod filter;
pub mod logging;
pub mod transport;
pub mod utils;

pub use api::{CatalogClient, Page};
pub use config::SessionConfig;
pub use error::{ApiError, Error, Result};
