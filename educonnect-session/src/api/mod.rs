//! Typed facade over the catalog REST service.

mod client;
mod models;

pub use client::CatalogClient;
pub use models::Page;
