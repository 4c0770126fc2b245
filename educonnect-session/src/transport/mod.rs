//! HTTP transport: request descriptors, credential attachment, renewal on 401.

mod client;
mod descriptor;

pub use client::TransportClient;
pub use descriptor::{ApiResponse, RequestDescriptor};
