//! filedrop - a small self-hosted file drop.
//!
//! Uploads land under a single root directory, upload times are kept in a
//! JSON table beside them, and a web page lists, serves and deletes them.

pub mod config;
pub mod datetime;
pub mod error;
pub mod logging;
pub mod rate_limit;
pub mod storage;
pub mod template;
pub mod web;

pub use config::Config;
pub use error::{FiledropError, Result};
pub use storage::FileService;
pub use web::WebServer;
