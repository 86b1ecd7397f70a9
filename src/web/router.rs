//! Router configuration for the web server.

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use utoipa::OpenApi;

use super::dto::{FileInfoResponse, MessageResponse, UploadFailureResponse, UploadResponse};
use super::error::{ErrorBody, ErrorCode, ErrorDetail};
use super::handlers::{self, delete_path, index, list_files, serve_file, upload_files, AppState};
use super::middleware::{mutation_rate_limit, RateLimitState};

/// OpenAPI document for the JSON endpoints.
#[derive(OpenApi)]
#[openapi(
    info(title = "filedrop", description = "File upload and sharing API"),
    paths(
        handlers::files::list_files,
        handlers::files::upload_files,
        handlers::files::serve_file,
        handlers::files::delete_path,
    ),
    components(schemas(
        FileInfoResponse,
        MessageResponse,
        UploadFailureResponse,
        UploadResponse,
        ErrorBody,
        ErrorDetail,
        ErrorCode,
    )),
    tags((name = "files", description = "Upload, list, download and delete"))
)]
pub struct ApiDoc;

/// Create the application router.
///
/// Upload and delete share one rate limit; reads are not limited.
pub fn create_router(
    app_state: Arc<AppState>,
    rate_limit: Arc<RateLimitState>,
    max_body_bytes: usize,
) -> Router {
    let read_routes = Router::new()
        .route("/", get(index))
        .route("/api/files", get(list_files))
        .route("/uploads/*path", get(serve_file))
        .route("/health", get(health_check))
        .route("/api-docs/openapi.json", get(openapi_spec));

    let mutation_routes = Router::new()
        .route("/", post(upload_files))
        .route("/delete/*path", post(delete_path))
        .layer(middleware::from_fn(move |req, next| {
            let state = rate_limit.clone();
            mutation_rate_limit(state, req, next)
        }));

    Router::new()
        .merge(read_routes)
        .merge(mutation_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(DefaultBodyLimit::max(max_body_bytes)),
        )
        .with_state(app_state)
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}

async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_file_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();

        for expected in ["/", "/api/files", "/uploads/{path}", "/delete/{path}"] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {expected} in {paths:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_health_check() {
        assert_eq!(health_check().await, "OK");
    }
}
