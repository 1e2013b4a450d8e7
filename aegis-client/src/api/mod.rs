//! REST backend access
//!
//! This module provides everything the client needs from the REST API:
//! - Wire models
//! - Response-shape normalization
//! - `RemoteRepository`, the authenticated HTTP data-access layer

pub mod models;
pub mod payload;
pub mod repository;

pub use models::*;
pub use repository::RemoteRepository;

use crate::error::Result;
use std::time::Duration;

/// Build the HTTP client shared by every repository
pub fn create_http_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("aegis-client/", env!("CARGO_PKG_VERSION")))
        .build()?;

    Ok(client)
}
