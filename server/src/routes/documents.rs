//! Document endpoint routes.

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

use crate::error::Result;
use crate::handlers::{
    handle_create, handle_get, handle_increment, handle_subscription, parse_document_id,
    CreateResponse, DocumentResponse, IncrementRequest,
};
use crate::AppState;

/// Create document routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/documents/{id}", get(get_handler).put(put_handler))
        .route("/documents/{id}/increment", post(increment_handler))
        .route("/documents/{id}/subscribe", get(subscribe_handler))
}

/// GET /documents/{id} - Read a document once.
async fn get_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentResponse>> {
    let document_id = parse_document_id(&id)?;
    Ok(Json(handle_get(&state, document_id).await?))
}

/// PUT /documents/{id} - Create a document unless it exists.
async fn put_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(fields): Json<Value>,
) -> Result<(StatusCode, Json<CreateResponse>)> {
    let document_id = parse_document_id(&id)?;
    let response = handle_create(&state, document_id, fields).await?;
    let status = if response.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(response)))
}

/// POST /documents/{id}/increment - Add to one word's counter.
async fn increment_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<IncrementRequest>,
) -> Result<StatusCode> {
    let document_id = parse_document_id(&id)?;
    handle_increment(&state, document_id, request).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /documents/{id}/subscribe - Stream snapshots over WebSocket.
async fn subscribe_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let document_id = parse_document_id(&id)?;
    let pool = state.pool.clone();
    let subscriptions = state.subscriptions.clone();
    Ok(ws.on_upgrade(move |socket| {
        handle_subscription(socket, pool, subscriptions, document_id)
    }))
}
