//! Record endpoint routes.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::handlers;
use crate::AppState;

/// Create record routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tables/{table}/records", get(list_handler).post(insert_handler))
        .route(
            "/tables/{table}/records/{id}",
            patch(update_handler).delete(delete_handler),
        )
}

/// Unwrap a JSON body, reporting malformed input as a bad request.
fn body(payload: std::result::Result<Json<Value>, JsonRejection>) -> Result<Value> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// GET /tables/{table}/records - List a table.
async fn list_handler(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> Result<Json<Vec<Value>>> {
    let records = handlers::list_records(&state, &table).await?;
    Ok(Json(records))
}

/// POST /tables/{table}/records - Create or overwrite a record.
async fn insert_handler(
    State(state): State<AppState>,
    Path(table): Path<String>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>)> {
    let record = handlers::insert_record(&state, &table, body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// PATCH /tables/{table}/records/{id} - Merge fields into a record.
async fn update_handler(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>> {
    let record = handlers::update_record(&state, &table, &id, body(payload)?).await?;
    Ok(Json(record))
}

/// DELETE /tables/{table}/records/{id} - Remove a record.
async fn delete_handler(
    State(state): State<AppState>,
    Path((table, id)): Path<(String, String)>,
) -> Result<StatusCode> {
    handlers::delete_record(&state, &table, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
