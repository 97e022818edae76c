//! Word Cloud Server - realtime counter documents for word cloud widgets.
//!
//! Stores one counter document per widget in PostgreSQL. Clients read a
//! document once, create it from seed fields if absent, increment single
//! words and subscribe to snapshots over WebSocket.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod websocket;

use crate::config::Config;
use crate::db::Pool;
use crate::websocket::SubscriptionManager;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<Config>,
    pub subscriptions: Arc<SubscriptionManager>,
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
