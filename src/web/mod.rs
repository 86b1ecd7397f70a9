//! HTTP layer for filedrop.
//!
//! Serves the HTML upload page, the JSON file API and raw file downloads.
//! Upload and delete requests pass through a per-client rate limit.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use router::{create_router, ApiDoc};
pub use server::WebServer;
