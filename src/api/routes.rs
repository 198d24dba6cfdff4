use std::any::Any;
use std::time::Instant;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Json, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::api::models::{CrawlRequest, HealthResponse};
use crate::api::response;
use crate::error::{AppError, Result};

pub fn create_router(app_state: AppState) -> Router {
    let body_limit = app_state.config.body_limit;

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/crawl", post(crawl_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(AnyOrigin)
                .allow_methods(AnyOrigin)
                .allow_headers(AnyOrigin),
        )
        .with_state(app_state)
}

async fn health_handler() -> impl IntoResponse {
    response::success(HealthResponse { status: "ok" })
}

async fn crawl_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CrawlRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(req) = payload.map_err(reject)?;
    let job = req.into_job().inspect_err(|err| {
        tracing::info!(error = %err, "crawl request rejected");
    })?;

    tracing::info!(url = %job.url, skip_chapters = job.skip_chapters, "processing crawl request");
    let start_time = Instant::now();

    let result = state.runner.run(job).await;
    tracing::info!(elapsed = ?start_time.elapsed(), ok = result.is_ok(), "crawl finished");

    response::crawled(result?)
}

fn reject(rejection: JsonRejection) -> AppError {
    let message = rejection.body_text();
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(message)
    } else {
        AppError::InvalidRequest(message)
    }
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Không thể khởi chạy crawler.".to_string()
    };
    tracing::error!(%message, "crawl handler panicked");

    AppError::Internal(message).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn panic_becomes_internal_error_with_empty_logs() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await, json!({ "error": "boom", "logs": [] }));

        let response = panic_response(Box::new(String::from("formatted boom")));
        assert_eq!(body_json(response).await["error"], "formatted boom");
    }

    #[tokio::test]
    async fn unknown_panic_payload_still_has_a_message() {
        let response = panic_response(Box::new(42_u8));
        let body = body_json(response).await;
        assert!(!body["error"].as_str().unwrap().is_empty());
        assert_eq!(body["logs"], json!([]));
    }
}
