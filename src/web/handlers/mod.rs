//! Request handlers for the web layer.

pub mod files;
pub mod page;

pub use files::*;
pub use page::*;

use std::sync::Arc;

use axum::http::{header, HeaderMap};

use crate::storage::FileService;
use crate::template::TemplateEngine;
use crate::web::error::ApiError;

/// Shared application state.
pub struct AppState {
    /// File operations facade.
    pub service: Arc<FileService>,
    /// Parsed page templates.
    pub templates: TemplateEngine,
    /// Display timezone for upload times.
    pub timezone: String,
    /// Request body limit, shown on the listing page.
    pub max_upload_mb: u64,
}

impl AppState {
    /// Create a new application state.
    pub fn new(service: Arc<FileService>, templates: TemplateEngine) -> Self {
        Self {
            service,
            templates,
            timezone: "UTC".to_string(),
            max_upload_mb: 1024,
        }
    }

    /// Set the display timezone.
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    /// Set the advertised upload limit.
    pub fn with_max_upload_mb(mut self, max_upload_mb: u64) -> Self {
        self.max_upload_mb = max_upload_mb;
        self
    }
}

/// Run a filesystem-bound closure against the service on the blocking pool.
pub(crate) async fn with_service<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&FileService) -> T + Send + 'static,
    T: Send + 'static,
{
    let service = Arc::clone(&state.service);
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| {
            tracing::error!("Blocking task failed: {}", e);
            ApiError::internal("An internal error occurred")
        })
}

/// Whether the client asked for an HTML response (a browser form post).
pub(crate) fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

/// Percent-encode each segment of a relative path, keeping the `/` separators.
pub(crate) fn encode_path(rel: &str) -> String {
    rel.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_wants_html() {
        let mut headers = HeaderMap::new();
        assert!(!wants_html(&headers));

        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,*/*;q=0.8"),
        );
        assert!(wants_html(&headers));

        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        assert!(!wants_html(&headers));
    }

    #[test]
    fn test_encode_path() {
        assert_eq!(encode_path("a b/c&d.txt"), "a%20b/c%26d.txt");
        assert_eq!(encode_path("日本.txt"), "%E6%97%A5%E6%9C%AC.txt");
    }
}
