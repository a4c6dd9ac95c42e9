//! Cask Server - reference record service for the Cask sync client.
//!
//! Exposes each logical table of the collection schema as a REST resource
//! (`/tables/{table}/records`) backed by a single PostgreSQL table. The
//! client's queue replay calls these endpoints; list results feed its merge
//! layer.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod routes;

use crate::db::Pool;
use axum::Router;
use cask_engine::Schema;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub schema: Arc<Schema>,
}

impl AppState {
    /// State serving the whiskey collection tables.
    pub fn new(pool: Pool) -> Self {
        Self::with_schema(pool, Schema::whiskey_collection())
    }

    /// State serving a custom set of tables.
    pub fn with_schema(pool: Pool, schema: Schema) -> Self {
        Self {
            pool,
            schema: Arc::new(schema),
        }
    }
}

/// Build the application router with tracing and CORS layers.
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
