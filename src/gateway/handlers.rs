use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
};
use std::sync::Arc;
use std::time::Instant;

use super::protocol::{QueryRequest, QueryResponse};
use super::service::QueryGateway;
use crate::error::DispatchError;

pub async fn handle_query(
    Extension(gateway): Extension<Arc<QueryGateway>>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> (StatusCode, Json<QueryResponse>) {
    let started = Instant::now();

    let sql = match body {
        Ok(Json(QueryRequest { sql: Some(sql) })) if !sql.trim().is_empty() => sql,
        Ok(_) => return error_response(DispatchError::Parse("missing 'sql'".to_string()), started),
        Err(rejection) => {
            return error_response(DispatchError::Parse(rejection.body_text()), started);
        }
    };

    match gateway.execute(&sql).await {
        Ok(result) => (StatusCode::OK, Json(QueryResponse::from_result(result))),
        Err(e) => error_response(e, started),
    }
}

fn error_response(e: DispatchError, started: Instant) -> (StatusCode, Json<QueryResponse>) {
    (
        e.status_code(),
        Json(QueryResponse::from_error(&e, started.elapsed())),
    )
}

pub async fn handle_health() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}
