use askcorpus_lib::Error;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::server::AppState;

#[derive(serde::Deserialize)]
pub(crate) struct QueryRequest {
    #[serde(default)]
    pub question: String,
}

#[derive(serde::Serialize)]
struct AnswerResponse {
    success: bool,
    question: String,
    answer: String,
}

#[derive(serde::Serialize)]
struct FailureResponse {
    success: bool,
    error: &'static str,
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    app: &'static str,
    rag_initialized: bool,
}

#[derive(serde::Serialize)]
struct ReadyResponse {
    status: &'static str,
    rag_initialized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
}

fn failure(status: StatusCode, error: &'static str) -> Response {
    (status, Json(FailureResponse { success: false, error })).into_response()
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        Error::CorpusNotFound(_)
        | Error::CorpusParse { .. }
        | Error::CorpusFormat(_)
        | Error::IndexUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

const MALFORMED_BODY: &str = "Send a JSON body like {\"question\": \"...\"}.";

pub(crate) async fn query_handler(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "rejected query body");
            return failure(StatusCode::BAD_REQUEST, MALFORMED_BODY);
        }
    };

    let question = payload.question.trim().to_string();
    if question.is_empty() {
        return failure(StatusCode::BAD_REQUEST, Error::EmptyQuestion.user_message());
    }

    tracing::info!(question = %question, "received query");

    let assistant = state.assistant.clone();
    let top_k = state.top_k;
    let q = question.clone();
    let result = tokio::task::spawn_blocking(move || assistant.answer(&q, top_k)).await;

    match result {
        Ok(Ok(answer)) => Json(AnswerResponse {
            success: true,
            question,
            answer,
        })
        .into_response(),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "query failed");
            failure(status_for(&e), e.user_message())
        }
        Err(e) => {
            tracing::error!(error = %e, "query task panicked");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong while answering your question.")
        }
    }
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        app: "running",
        rag_initialized: state.assistant.is_ready(),
    })
}

pub(crate) async fn ready_handler(State(state): State<AppState>) -> Response {
    let assistant = state.assistant.clone();
    let result = tokio::task::spawn_blocking(move || assistant.ensure_ready()).await;

    let error = match result {
        Ok(Ok(())) => {
            return Json(ReadyResponse {
                status: "ready",
                rag_initialized: true,
                error: None,
            })
            .into_response();
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "readiness check failed");
            e.user_message()
        }
        Err(e) => {
            tracing::error!(error = %e, "readiness task panicked");
            "Something went wrong while preparing the knowledge base."
        }
    };

    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ReadyResponse {
            status: "not ready",
            rag_initialized: false,
            error: Some(error),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_request_missing_question_is_blank() {
        let payload: QueryRequest = serde_json::from_str("{}").unwrap();
        assert!(payload.question.is_empty());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&Error::EmptyQuestion), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&Error::IndexUnavailable("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&Error::Generation("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_ready_response_omits_empty_error() {
        let json = serde_json::to_string(&ReadyResponse {
            status: "ready",
            rag_initialized: true,
            error: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"status":"ready","rag_initialized":true}"#);
    }
}
