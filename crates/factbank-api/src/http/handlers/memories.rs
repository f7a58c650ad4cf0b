//! Memory REST API handlers.
//!
//! POST   /api/v1/memories         - Reconcile content into the store
//! POST   /api/v1/memories/search  - Semantic search (no reconciliation)
//! GET    /api/v1/memories         - Page through stored memories
//! GET    /api/v1/memories/{id}    - Fetch one memory
//! DELETE /api/v1/memories/{id}    - Remove one memory (idempotent)

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use factbank_types::memory::{ListOptions, Memory, MemoryId, RankedMemory, SearchOptions};

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// Upper bound on page and result sizes accepted over HTTP.
pub const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct AddMemoryRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: Option<usize>,
    pub threshold: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub cursor: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

/// A search hit as returned over the API: the memory without its embedding.
#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub memory: Memory,
    pub distance: f32,
}

impl From<RankedMemory> for SearchHit {
    fn from(hit: RankedMemory) -> Self {
        Self {
            memory: Memory::from(hit.record),
            distance: hit.distance,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeletedMemory {
    pub id: MemoryId,
}

/// POST /api/v1/memories - Extract facts from `content` and reconcile them.
///
/// Returns the memories created or updated by this call; 201 when there are any.
pub async fn add_memory(
    State(state): State<AppState>,
    Json(body): Json<AddMemoryRequest>,
) -> Result<ApiResponse<Vec<Memory>>, AppError> {
    let timer = RequestTimer::start();

    let changed = state.engine.add(&body.content).await?;
    let status = if changed.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Ok(timer
        .respond(changed)
        .with_status(status)
        .with_link("list", "/api/v1/memories"))
}

/// POST /api/v1/memories/search - Closest memories first.
pub async fn search_memories(
    State(state): State<AppState>,
    Json(body): Json<SearchRequest>,
) -> Result<ApiResponse<Vec<SearchHit>>, AppError> {
    let timer = RequestTimer::start();
    let options = search_options(&state.engine.settings().search, &body)?;

    let hits = state.engine.search_with(&body.query, &options).await?;

    Ok(timer.respond(hits.into_iter().map(SearchHit::from).collect()))
}

/// GET /api/v1/memories?cursor=&offset=&limit= - One page, ordered by id.
///
/// When the page is full a `next` link carries the cursor for the following page.
pub async fn list_memories(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<ApiResponse<Vec<Memory>>, AppError> {
    let timer = RequestTimer::start();
    let options = list_options(&query)?;

    let page = state.engine.list(&options).await?;

    let next = match page.last() {
        Some(last) if page.len() == options.limit => Some(format!(
            "/api/v1/memories?cursor={}&limit={}",
            last.id, options.limit
        )),
        _ => None,
    };
    let mut resp = timer.respond(page);
    if let Some(next) = next {
        resp = resp.with_link("next", &next);
    }
    Ok(resp)
}

/// GET /api/v1/memories/{id}
pub async fn get_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<Memory>, AppError> {
    let timer = RequestTimer::start();

    let memory = state
        .engine
        .get(&MemoryId::from(id.as_str()))
        .await?
        .ok_or(AppError::NotFound(id))?;

    let self_link = format!("/api/v1/memories/{}", memory.id);
    Ok(timer.respond(memory).with_link("self", &self_link))
}

/// DELETE /api/v1/memories/{id} - Succeeds whether or not the memory existed.
pub async fn delete_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<DeletedMemory>, AppError> {
    let timer = RequestTimer::start();
    let id = MemoryId::from(id);

    state.engine.delete(&id).await?;

    Ok(timer.respond(DeletedMemory { id }))
}

fn search_options(defaults: &SearchOptions, body: &SearchRequest) -> Result<SearchOptions, AppError> {
    let top_k = body.top_k.unwrap_or(defaults.top_k);
    if top_k == 0 || top_k > MAX_PAGE_SIZE {
        return Err(AppError::Validation(format!(
            "top_k must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    let threshold = body.threshold.unwrap_or(defaults.threshold);
    if !(0.0..=2.0).contains(&threshold) {
        return Err(AppError::Validation(
            "threshold must be a cosine distance between 0 and 2".to_string(),
        ));
    }
    Ok(SearchOptions { top_k, threshold })
}

fn list_options(query: &ListQuery) -> Result<ListOptions, AppError> {
    let defaults = ListOptions::default();
    let limit = query.limit.unwrap_or(defaults.limit);
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok(ListOptions {
        cursor: query
            .cursor
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(MemoryId::from),
        offset: query.offset.unwrap_or(0),
        limit,
    })
}
