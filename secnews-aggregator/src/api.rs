use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::live::LiveOptions;
use crate::normalizer::{self, derive_id, recency_label};
use crate::query::{self, ListRequest, QueryService, ServeMode};
use crate::store::NewsStore;
use crate::sync::{SyncEngine, SyncReport};
use crate::traits::FeedFetcher;
use crate::types::{AggregatorError, Category, FeedSource, NewsRecord, RecordPatch, Severity, StoreError};

#[derive(Clone)]
pub struct AppState {
    query: Arc<QueryService>,
    sync: Arc<SyncEngine>,
    store: Arc<dyn NewsStore>,
    sources: Arc<Vec<FeedSource>>,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        store: Arc<dyn NewsStore>,
        fetcher: Arc<dyn FeedFetcher>,
        sources: Vec<FeedSource>,
        options: LiveOptions,
        shutdown: CancellationToken,
    ) -> Self {
        let query = QueryService::new(store.clone(), fetcher.clone(), sources.clone(), options)
            .with_cancellation(shutdown.clone());
        let sync = SyncEngine::new(store.clone(), fetcher, options);

        Self {
            query: Arc::new(query),
            sync: Arc::new(sync),
            store,
            sources: Arc::new(sources),
            shutdown,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/news", get(list_news))
        .route("/news/breaking", get(list_breaking))
        .route("/news/counts", get(counts))
        .route("/news/{id}", get(get_news))
        .route("/news/{id}/view", post(record_view))
        .route("/sync", post(run_sync))
        .route("/admin/news", post(create_news))
        .route("/admin/news/{id}", patch(update_news).delete(delete_news))
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            StoreError::Conflict { .. } => ApiError::Conflict(e.to_string()),
            other => {
                warn!("Store error: {}", other);
                ApiError::Unavailable("store unavailable".to_string())
            }
        }
    }
}

/// A record as list and detail consumers render it
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItemView {
    #[serde(flatten)]
    pub record: NewsRecord,
    pub time_ago: String,
    pub illustration: String,
}

impl NewsItemView {
    fn at(record: NewsRecord, now: DateTime<Utc>) -> Self {
        Self {
            time_ago: recency_label(record.published_at, now),
            illustration: record.illustration().to_string(),
            record,
        }
    }

    fn all(records: Vec<NewsRecord>) -> Vec<Self> {
        let now = Utc::now();
        records.into_iter().map(|r| Self::at(r, now)).collect()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PageView {
    items: Vec<NewsItemView>,
    next_cursor: Option<String>,
    mode: ServeMode,
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    category: Option<String>,
    search: Option<String>,
    #[serde(alias = "pageSize")]
    page_size: Option<usize>,
    cursor: Option<String>,
}

async fn list_news(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<PageView>, ApiError> {
    let category = query::parse_category_filter(params.category.as_deref())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let request = ListRequest {
        category,
        search: params.search,
        page_size: params.page_size.unwrap_or(query::DEFAULT_PAGE_SIZE),
        cursor: params.cursor,
    };
    let page = state.query.list_news(&request).await;

    Ok(Json(PageView {
        items: NewsItemView::all(page.records),
        next_cursor: page.next_cursor,
        mode: page.mode,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct BreakingParams {
    limit: Option<usize>,
}

async fn list_breaking(
    State(state): State<AppState>,
    Query(params): Query<BreakingParams>,
) -> Json<Vec<NewsItemView>> {
    let limit = params.limit.unwrap_or(query::DEFAULT_BREAKING_LIMIT);
    Json(NewsItemView::all(state.query.list_breaking(limit).await))
}

async fn counts(State(state): State<AppState>) -> Json<BTreeMap<String, u64>> {
    Json(state.query.counts().await)
}

async fn get_news(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<NewsItemView>, ApiError> {
    match state.query.get_by_id(&id).await {
        Some(record) => Ok(Json(NewsItemView::at(record, Utc::now()))),
        None => Err(ApiError::NotFound(format!("no news item {}", id))),
    }
}

async fn record_view(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<serde_json::Value>, ApiError> {
    let view_count = state.store.increment_views(&id).await?;
    Ok(Json(json!({ "id": id, "viewCount": view_count })))
}

async fn run_sync(State(state): State<AppState>) -> Result<Json<SyncReport>, ApiError> {
    let cancel = state.shutdown.child_token();
    match state.sync.sync(&state.sources, &cancel).await {
        Ok(report) => Ok(Json(report)),
        Err(AggregatorError::Cancelled) => Err(ApiError::Unavailable("sync cancelled".to_string())),
        Err(e) => {
            warn!("Sync failed: {}", e);
            Err(ApiError::Unavailable("sync failed".to_string()))
        }
    }
}

/// Hand-authored record. Fields the editor leaves out are derived the same
/// way the feed path derives them.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsDraft {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub content: String,
    pub category: Category,
    pub severity: Option<Severity>,
    #[serde(default = "editorial_source")]
    pub source: String,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub is_breaking: Option<bool>,
    #[serde(default = "published_by_default")]
    pub is_published: bool,
    #[serde(default)]
    pub image_url: String,
}

fn editorial_source() -> String {
    "Editorial".to_string()
}

fn published_by_default() -> bool {
    true
}

impl NewsDraft {
    pub fn into_record(self, now: DateTime<Utc>) -> NewsRecord {
        let haystack = format!("{} {}", self.title, self.content).to_lowercase();
        let summary = if self.summary.is_empty() {
            normalizer::smart_truncate(&self.content, normalizer::SUMMARY_LEN)
        } else {
            self.summary
        };

        NewsRecord {
            id: derive_id(&self.url, &self.title),
            severity: self.severity.unwrap_or_else(|| normalizer::classify_severity(&haystack)),
            is_breaking: self.is_breaking.unwrap_or_else(|| normalizer::is_breaking(&haystack)),
            read_time_minutes: normalizer::read_time_minutes(&self.content),
            published_at: self.published_at.unwrap_or(now),
            view_count: 0,
            created_at: now,
            updated_at: now,
            title: self.title,
            summary,
            content: self.content,
            category: self.category,
            source: self.source,
            url: self.url,
            tags: self.tags,
            is_published: self.is_published,
            image_url: self.image_url,
        }
    }
}

async fn create_news(
    State(state): State<AppState>,
    Json(draft): Json<NewsDraft>,
) -> Result<(StatusCode, Json<NewsItemView>), ApiError> {
    if draft.title.trim().is_empty() || draft.url.trim().is_empty() {
        return Err(ApiError::BadRequest("title and url are required".to_string()));
    }

    let now = Utc::now();
    let record = draft.into_record(now);
    state.store.insert(&record).await?;
    info!("Created news item {} ({})", record.id, record.url);

    Ok((StatusCode::CREATED, Json(NewsItemView::at(record, now))))
}

async fn update_news(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<RecordPatch>,
) -> Result<Json<NewsItemView>, ApiError> {
    match state.store.update(&id, &patch).await? {
        Some(record) => {
            info!("Updated news item {}", id);
            Ok(Json(NewsItemView::at(record, Utc::now())))
        }
        None => Err(ApiError::NotFound(format!("no news item {}", id))),
    }
}

async fn delete_news(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    if state.store.delete(&id).await? {
        info!("Deleted news item {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("no news item {}", id)))
    }
}
