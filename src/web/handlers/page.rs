//! HTML listing page.

use std::sync::Arc;

use axum::{extract::State, response::Html};

use super::{encode_path, with_service, AppState};
use crate::datetime::format_timestamp_default;
use crate::storage::FileEntry;
use crate::template::{TemplateContext, Value, INDEX};
use crate::web::error::ApiError;
use crate::FiledropError;

/// Page heading and document title.
const TITLE: &str = "File Drop";

/// GET / - Render the upload form and the file listing.
pub async fn index(State(state): State<Arc<AppState>>) -> Result<Html<String>, ApiError> {
    let (entries, snapshot) =
        with_service(&state, |service| (service.list(), service.snapshot())).await?;
    let entries = entries?;

    let mut context = TemplateContext::new();
    context.set("title", TITLE);
    context.set(
        "max_upload_mb",
        i64::try_from(state.max_upload_mb).unwrap_or(i64::MAX),
    );

    match snapshot {
        Ok(snapshot) => {
            context.set("storage_available", true);
            context.set("total_gb", format!("{:.2}", snapshot.total_gb()));
            context.set("used_gb", format!("{:.2}", snapshot.used_gb()));
            context.set("free_gb", format!("{:.2}", snapshot.free_gb()));
        }
        Err(e) => {
            tracing::warn!("Storage statistics unavailable: {}", e);
            context.set("storage_available", false);
        }
    }

    let files: Vec<Value> = entries
        .iter()
        .map(|entry| entry_value(entry, &state.timezone))
        .collect();
    context.set("files", files);

    let html = state
        .templates
        .render(INDEX, &context)
        .map_err(FiledropError::from)?;
    Ok(Html(html))
}

fn entry_value(entry: &FileEntry, timezone: &str) -> Value {
    let encoded = encode_path(&entry.path);
    let uploaded = entry
        .uploaded_at
        .as_deref()
        .map(|ts| format_timestamp_default(ts, timezone))
        .unwrap_or_default();

    Value::object([
        ("name", Value::from(entry.path.as_str())),
        ("href", Value::from(format!("/uploads/{encoded}"))),
        ("delete_action", Value::from(format!("/delete/{encoded}"))),
        ("size", Value::from(entry.size_label())),
        ("is_dir", Value::from(entry.is_dir())),
        ("uploaded", Value::from(uploaded)),
    ])
}
