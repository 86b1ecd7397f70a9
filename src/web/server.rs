//! Web server for filedrop.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::storage::FileService;
use crate::template::TemplateLoader;
use crate::{FiledropError, Result};

use super::handlers::AppState;
use super::middleware::RateLimitState;
use super::router::create_router;

/// HTTP server serving the upload page and file API.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Application state.
    app_state: Arc<AppState>,
    /// Rate limit state for upload and delete.
    rate_limit: Arc<RateLimitState>,
    /// Request body limit in bytes.
    max_body_bytes: usize,
}

impl WebServer {
    /// Create a new web server.
    ///
    /// Opens the upload root and parses the page templates, so storage and
    /// template errors surface before anything is bound.
    pub fn new(config: &Config) -> Result<Self> {
        let addr = format!("{}:{}", config.server.host, config.server.port)
            .parse::<SocketAddr>()
            .map_err(|e| {
                FiledropError::Config(format!(
                    "invalid listen address {}:{}: {e}",
                    config.server.host, config.server.port
                ))
            })?;

        let service = FileService::open(&config.storage)?;
        tracing::info!(
            root = %service.root().display(),
            policy = ?service.policy(),
            "Upload storage ready"
        );

        let loader = match &config.templates.path {
            Some(dir) => TemplateLoader::with_override(dir),
            None => TemplateLoader::builtin(),
        };
        let templates = loader.load_engine()?;

        let app_state = AppState::new(Arc::new(service), templates)
            .with_timezone(&config.server.timezone)
            .with_max_upload_mb(config.storage.max_upload_size_mb);

        Ok(Self {
            addr,
            app_state: Arc::new(app_state),
            rate_limit: Arc::new(RateLimitState::new(&config.rate_limit)),
            max_body_bytes: config.storage.max_upload_bytes(),
        })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn into_router(self) -> (Router, Arc<RateLimitState>) {
        let rate_limit = self.rate_limit.clone();
        let router = create_router(self.app_state, self.rate_limit, self.max_body_bytes);
        (router, rate_limit)
    }

    async fn bind(self) -> Result<(TcpListener, Router)> {
        let addr = self.addr;
        let (router, rate_limit) = self.into_router();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| FiledropError::file(addr.to_string(), e))?;

        // Start the rate limit sweep after a successful bind
        rate_limit.start_cleanup_task();

        Ok((listener, router))
    }

    /// Run the web server until it fails.
    pub async fn run(self) -> Result<()> {
        let (listener, router) = self.bind().await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Web server listening on http://{}", local_addr);

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
        Ok(())
    }

    /// Run the server in the background and return the actual bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> Result<SocketAddr> {
        let (listener, router) = self.bind().await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Web server listening on http://{}", local_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0; // Use random port
        config.storage.upload_root = dir.path().join("uploads").display().to_string();
        config
    }

    #[test]
    fn test_web_server_new() {
        let dir = TempDir::new().unwrap();
        let config = create_test_config(&dir);

        let server = WebServer::new(&config).unwrap();
        assert_eq!(server.addr().ip().to_string(), "127.0.0.1");
        assert!(dir.path().join("uploads").is_dir());
    }

    #[test]
    fn test_web_server_invalid_host() {
        let dir = TempDir::new().unwrap();
        let mut config = create_test_config(&dir);
        config.server.host = "not an address".to_string();

        let result = WebServer::new(&config);
        assert!(matches!(result, Err(FiledropError::Config(_))));
    }

    #[test]
    fn test_web_server_rejects_broken_template_override() {
        let dir = TempDir::new().unwrap();
        let templates = dir.path().join("templates");
        std::fs::create_dir_all(&templates).unwrap();
        std::fs::write(templates.join("index.html"), "{{#if open}}never closed").unwrap();

        let mut config = create_test_config(&dir);
        config.templates.path = Some(templates.display().to_string());

        let result = WebServer::new(&config);
        assert!(matches!(result, Err(FiledropError::Template(_))));
    }

    #[tokio::test]
    async fn test_web_server_run() {
        let dir = TempDir::new().unwrap();
        let config = create_test_config(&dir);

        let server = WebServer::new(&config).unwrap();
        let addr = server.run_with_addr().await.unwrap();

        // Test health endpoint
        let client = reqwest::Client::new();
        let resp = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap();

        assert!(resp.status().is_success());
        assert_eq!(resp.text().await.unwrap(), "OK");
    }
}
