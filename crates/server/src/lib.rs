//! HTTP front end: a single `POST /query` endpoint accepting a
//! `;`-separated statement batch and returning the last statement's
//! result plus the wall-clock runtime of the whole batch.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use common::DbError;
use database::{Engine, QueryResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use types::Value;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub result: serde_json::Value,
    pub runtime: f64,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Build the application router. CORS permits any origin so browser
/// frontends can talk to the endpoint directly.
pub fn router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .route("/query", post(handle_query))
        .layer(cors)
        .with_state(engine)
}

async fn handle_query(
    State(engine): State<Arc<Engine>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let start = Instant::now();
    let sql = request.query;
    tracing::debug!(sql = %truncate(&sql, 120), "incoming query");

    // the engine does blocking file I/O; keep it off the async runtime
    let result = tokio::task::spawn_blocking(move || engine.execute(&sql))
        .await
        .map_err(|e| ApiError(DbError::Storage(format!("executor task failed: {e}"))))??;

    let runtime = start.elapsed().as_secs_f64();
    tracing::debug!(runtime, "query completed");
    Ok(Json(QueryResponse {
        result: result_to_json(result),
        runtime,
    }))
}

fn result_to_json(result: QueryResult) -> serde_json::Value {
    match result {
        QueryResult::Rows(batch) => {
            let rows: Vec<serde_json::Value> = batch
                .rows
                .iter()
                .map(|row| {
                    let record: serde_json::Map<String, serde_json::Value> = batch
                        .columns
                        .iter()
                        .zip(&row.values)
                        .map(|(label, value)| (label.clone(), value_to_json(value)))
                        .collect();
                    serde_json::Value::Object(record)
                })
                .collect();
            serde_json::Value::Array(rows)
        }
        QueryResult::Count(count) => serde_json::Value::from(count),
        QueryResult::None => serde_json::Value::Null,
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Int(i) => (*i).into(),
        Value::Double(d) => serde_json::Number::from_f64(*d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => s.clone().into(),
        Value::Null => serde_json::Value::Null,
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((at, _)) => &s[..at],
        None => s,
    }
}

/// Every engine error surfaces verbatim as a 400 response.
pub struct ApiError(pub DbError);

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: self.0.to_string(),
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}
