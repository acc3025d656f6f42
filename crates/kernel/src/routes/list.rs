//! List and single-record endpoints.
//!
//! `POST /api/{entity}/list` takes a query descriptor as its JSON body and
//! answers with a paginated response. `GET /api/{entity}/{id}` returns one
//! record within the caller's scope.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use talentdesk_query::{PaginatedResponse, QueryDescriptor};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::Caller;
use crate::state::AppState;

/// Create the list router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/{entity}/list", post(list))
        .route("/api/{entity}/{id}", get(show))
}

async fn list(
    State(state): State<AppState>,
    caller: Caller,
    Path(entity): Path<String>,
    body: Bytes,
) -> AppResult<Json<PaginatedResponse<Value>>> {
    // An empty body lists with defaults
    let query = if body.iter().all(u8::is_ascii_whitespace) {
        QueryDescriptor::new()
    } else {
        serde_json::from_slice::<Option<QueryDescriptor>>(&body)
            .map_err(|e| AppError::BadRequest(format!("invalid query: {e}")))?
            .unwrap_or_default()
    };

    let page = state.lists().list(&entity, &caller, query).await?;
    Ok(Json(page))
}

async fn show(
    State(state): State<AppState>,
    caller: Caller,
    Path((entity, id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let id = Uuid::parse_str(&id).map_err(|_| AppError::NotFound)?;
    let record = state.lists().get(&entity, &caller, id).await?;
    Ok(Json(record))
}
