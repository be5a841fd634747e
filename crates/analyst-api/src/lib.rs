//! Thin HTTP front over [`analyst_core::api::JobApi`] (spec §4.7). Every
//! handler validates nothing itself — it extracts, delegates, and encodes
//! the result. `stream` is served as Server-Sent Events, matching spec §6's
//! `ProgressEvent` wire shape field-for-field.

use analyst_core::api::JobApi;
use analyst_core::{BrokerClient, CoreError, JobId};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

/// Build the router. Generic over the broker backend so a test harness can
/// mount this over `InMemoryBrokerClient` without pulling in Postgres.
pub fn router<B: BrokerClient + 'static>(api: Arc<JobApi<B>>) -> Router {
    Router::new()
        .route("/jobs", post(submit::<B>))
        .route("/jobs/:id", get(status::<B>))
        .route("/jobs/:id/stream", get(stream::<B>))
        .route("/jobs/:id/cancel", post(cancel::<B>))
        .with_state(api)
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    question: String,
    primary_file: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
    job_id: JobId,
}

async fn submit<B: BrokerClient + 'static>(
    State(api): State<Arc<JobApi<B>>>,
    Json(payload): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let job_id = api.submit(payload.question, payload.primary_file).await?;
    Ok(Json(SubmitResponse { job_id }))
}

async fn status<B: BrokerClient + 'static>(
    State(api): State<Arc<JobApi<B>>>,
    Path(id): Path<JobId>,
) -> Result<impl IntoResponse, ApiError> {
    let view = api.status(id).await?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    from_seq: Option<u64>,
}

async fn stream<B: BrokerClient + 'static>(
    State(api): State<Arc<JobApi<B>>>,
    Path(id): Path<JobId>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let events = api.stream(id, query.from_seq).await?;
    let sse_stream = events.map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().data(data))
    });
    Ok(Sse::new(sse_stream))
}

async fn cancel<B: BrokerClient + 'static>(
    State(api): State<Arc<JobApi<B>>>,
    Path(id): Path<JobId>,
) -> Result<StatusCode, ApiError> {
    api.cancel(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Maps [`CoreError`] onto the HTTP status a caller should act on:
/// `InputRejected`/`UnsupportedFormat`-style faults are the client's fault,
/// `NotFound` is a 404, everything else is the API's problem to log and
/// report as a 500 rather than leak internal detail.
struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::InputRejected(_) | CoreError::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            other => {
                tracing::error!(error = %other, "unhandled core error at API boundary");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "error": self.0.kind(), "message": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analyst_core::inmemory::InMemoryBrokerClient;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let broker = Arc::new(InMemoryBrokerClient::new());
        let api = Arc::new(JobApi::new(broker, 1));
        router(api)
    }

    #[tokio::test]
    async fn submit_then_status_round_trips() {
        let app = test_router();

        let submit_req = Request::builder()
            .method("POST")
            .uri("/jobs")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"question": "what is the median?"}"#))
            .unwrap();
        let response = app.clone().oneshot(submit_req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: SubmitResponse = serde_json::from_slice(&body).unwrap();

        let status_req = Request::builder()
            .uri(format!("/jobs/{}", parsed.job_id))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(status_req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn empty_question_is_bad_request() {
        let app = test_router();
        let req = Request::builder()
            .method("POST")
            .uri("/jobs")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"question": "   "}"#))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_job_status_is_not_found() {
        let app = test_router();
        let req = Request::builder()
            .uri(format!("/jobs/{}", uuid::Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
