use axum::{Extension, Json, Router, http::StatusCode, routing::post};
use std::sync::Arc;

use super::DataSink;
use crate::rpc::protocol::{
    ENDPOINT_SINK_FETCH, ENDPOINT_SINK_WRITE, FetchLinesRequest, FetchLinesResponse,
    WriteResultRequest,
};

pub fn router(sink: Arc<dyn DataSink>) -> Router {
    Router::new()
        .route(ENDPOINT_SINK_FETCH, post(handle_fetch_lines))
        .route(ENDPOINT_SINK_WRITE, post(handle_write_result))
        .layer(Extension(sink))
}

pub async fn handle_fetch_lines(
    Extension(sink): Extension<Arc<dyn DataSink>>,
    Json(req): Json<FetchLinesRequest>,
) -> (StatusCode, Json<FetchLinesResponse>) {
    match sink.fetch_lines(req.split).await {
        Ok(lines) => (StatusCode::OK, Json(FetchLinesResponse { lines })),
        Err(e) => {
            tracing::error!(split_id = req.split.id, "Failed to serve split: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(FetchLinesResponse { lines: Vec::new() }),
            )
        }
    }
}

pub async fn handle_write_result(
    Extension(sink): Extension<Arc<dyn DataSink>>,
    Json(req): Json<WriteResultRequest>,
) -> StatusCode {
    if req.results.len() != req.splits.len() {
        tracing::warn!(
            "Rejected write: {} results for {} splits",
            req.results.len(),
            req.splits.len()
        );
        return StatusCode::BAD_REQUEST;
    }

    match sink.write_result(req.results, req.splits).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(e) => {
            tracing::error!("Failed to enqueue result: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
