// src/api.rs
//! HTTP/JSON boundary consumed by the dashboard UI.
//!
//! Every response uses the `{success, data?, error?}` envelope; a failed
//! connector run during run-all is reported inside the aggregate result,
//! never as a transport-level error.
//!
//! # Cache contract for read clients
//!
//! Connectors only add and update items, never remove them, so a client may
//! cache page results keyed by their full filter set. Any successful run
//! completion (single or run-all) invalidates every cached page whose
//! `source_type`/`source_id` filters could have matched that source;
//! dropping the whole page cache on any completion is always safe.
//! Single-item lookups by id stay valid indefinitely, unless bit-exact
//! freshness of `content`/`content_preview` is required, in which case they
//! follow the same rule. [`ItemStore::generation`] is the freshness token:
//! an unchanged generation proves every cached page is still exact.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query as QueryParams, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use tower_http::cors::CorsLayer;

use crate::coordinator::{RunCoordinator, RunOutcome};
use crate::error::RunError;
use crate::model::{NewsItem, Page, Pagination, Query, SourceType, DEFAULT_PAGE_SIZE};
use crate::store::ItemStore;

/// Upper bound on `page_size`; larger requests are clamped.
const MAX_PAGE_SIZE: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ItemStore>,
    pub coordinator: Arc<RunCoordinator>,
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/news", get(get_news_list))
        .route("/news/{id}", get(get_news_by_id))
        .route("/connectors/run/{connector_id}", post(run_connector))
        .route("/connectors/run-all", post(run_all_connectors));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/api", api)
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Standardized response envelope.
#[derive(Debug, serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn ok<T: serde::Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }),
    )
}

fn err<T: serde::Serialize>(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<ApiResponse<T>>) {
    (
        status,
        Json(ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }),
    )
}

#[derive(Debug, serde::Deserialize)]
struct NewsListParams {
    source_type: Option<String>,
    source_id: Option<String>,
    query: Option<String>,
    from_date: Option<String>,
    to_date: Option<String>,
    page: Option<usize>,
    page_size: Option<usize>,
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

async fn get_news_list(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<NewsListParams>,
) -> (StatusCode, Json<ApiResponse<Page>>) {
    let page = params.page.filter(|&p| p > 0).unwrap_or(1);
    let page_size = params
        .page_size
        .filter(|&s| s > 0)
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .min(MAX_PAGE_SIZE);

    // A source_type value outside the known set can't match anything.
    let source_type = match params.source_type.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => match SourceType::from_str(raw) {
            Ok(t) => Some(t),
            Err(()) => {
                return ok(Page {
                    items: Vec::new(),
                    pagination: Pagination {
                        page,
                        page_size,
                        total_pages: 1,
                        total_items: 0,
                    },
                });
            }
        },
        None => None,
    };

    let q = Query {
        source_type,
        source_id: params.source_id.filter(|s| !s.is_empty()),
        query: params.query.filter(|s| !s.is_empty()),
        // Unparseable dates are ignored rather than rejected.
        from_date: params.from_date.as_deref().and_then(parse_rfc3339),
        to_date: params.to_date.as_deref().and_then(parse_rfc3339),
        page,
        page_size,
    };

    ok(state.store.query(&q))
}

async fn get_news_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<ApiResponse<NewsItem>>) {
    match state.store.get(&id) {
        Ok(item) => ok(item),
        Err(e) => err(StatusCode::NOT_FOUND, e.to_string()),
    }
}

#[derive(Debug, serde::Serialize)]
struct RunData {
    processed: usize,
    connector: String,
}

async fn run_connector(
    State(state): State<AppState>,
    Path(connector_id): Path<String>,
) -> (StatusCode, Json<ApiResponse<RunData>>) {
    match state.coordinator.run_one(&connector_id).await {
        Ok(run) => ok(RunData {
            processed: run.processed_count,
            connector: connector_id,
        }),
        Err(e @ RunError::NotFound(_)) => err(StatusCode::NOT_FOUND, e.to_string()),
        Err(e @ RunError::AlreadyRunning(_)) => err(StatusCode::CONFLICT, e.to_string()),
        Err(e @ RunError::Fetch(_)) => err(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

#[derive(Debug, serde::Serialize)]
struct RunAllData {
    results: std::collections::BTreeMap<String, RunOutcome>,
}

async fn run_all_connectors(
    State(state): State<AppState>,
) -> (StatusCode, Json<ApiResponse<RunAllData>>) {
    let results = state.coordinator.run_all().await;
    ok(RunAllData { results })
}
