//! HTTP surface — liveness, conversation browser, CSV export.
//!
//! In webhook mode the channel's router is merged in as well, so the bot
//! and the pages share one port.

mod export;
mod templates;

pub use export::{CSV_HEADER, records_to_csv};
pub use templates::render_messages;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use handlebars::Handlebars;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::store::{ConversationStore, SortOrder};

/// Plain-text liveness reply on `/`.
pub const LIVENESS_TEXT: &str = "🤖 AI Bot is running!";

const DEFAULT_BROWSE_LIMIT: usize = 50;

#[derive(Clone)]
struct WebState {
    store: Arc<dyn ConversationStore>,
    templates: Arc<Handlebars<'static>>,
}

/// Failure inside a handler; the detail is logged, the client gets a
/// generic 500.
struct WebError(String);

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "Request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong").into_response()
    }
}

impl<E: std::fmt::Display> From<E> for WebError {
    fn from(err: E) -> Self {
        Self(err.to_string())
    }
}

/// Build the web router. `extra` is merged in before the trace layer is
/// applied (used for the webhook endpoint).
pub fn web_routes(
    store: Arc<dyn ConversationStore>,
    extra: Option<Router>,
) -> Result<Router, handlebars::TemplateError> {
    let state = WebState {
        store,
        templates: Arc::new(templates::templates()?),
    };

    let mut router = Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/messages", get(browse_messages))
        .route("/export_csv", get(export_csv))
        .with_state(state);

    if let Some(extra) = extra {
        router = router.merge(extra);
    }

    Ok(router.layer(TraceLayer::new_for_http()))
}

async fn home() -> &'static str {
    LIVENESS_TEXT
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chat-relay"
    }))
}

#[derive(Debug, Deserialize)]
struct BrowseParams {
    limit: Option<usize>,
    order: Option<SortOrder>,
}

async fn browse_messages(
    State(state): State<WebState>,
    Query(params): Query<BrowseParams>,
) -> Result<Html<String>, WebError> {
    let order = params.order.unwrap_or(SortOrder::Desc);
    let limit = params.limit.unwrap_or(DEFAULT_BROWSE_LIMIT);

    let records = state.store.list(Some(limit), order).await?;
    let label = match order {
        SortOrder::Asc => "oldest first",
        SortOrder::Desc => "newest first",
    };
    let html = render_messages(&state.templates, &records, label)?;
    Ok(Html(html))
}

async fn export_csv(State(state): State<WebState>) -> Result<Response, WebError> {
    let records = state.store.list(None, SortOrder::Asc).await?;
    let body = records_to_csv(&records)?;
    tracing::info!(rows = records.len(), "CSV export");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"messages.csv\"",
            ),
        ],
        body,
    )
        .into_response())
}
