//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use factbank_types::error::{ReconcileError, RepositoryError};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Engine failure.
    Reconcile(ReconcileError),
    /// No memory with the requested id.
    NotFound(String),
    /// Malformed request.
    Validation(String),
}

impl From<ReconcileError> for AppError {
    fn from(e: ReconcileError) -> Self {
        AppError::Reconcile(e)
    }
}

impl AppError {
    /// Status code, machine-readable code and message for this error.
    pub fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                "MEMORY_NOT_FOUND",
                format!("Memory '{id}' not found"),
            ),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Reconcile(e) => reconcile_parts(e),
        }
    }
}

fn reconcile_parts(err: &ReconcileError) -> (StatusCode, &'static str, String) {
    match err {
        ReconcileError::ReferenceNotFound { .. } => {
            (StatusCode::NOT_FOUND, "REFERENCE_NOT_FOUND", err.to_string())
        }
        ReconcileError::Timeout { .. } => {
            (StatusCode::GATEWAY_TIMEOUT, "COLLABORATOR_TIMEOUT", err.to_string())
        }
        ReconcileError::Extraction(_) | ReconcileError::Decision(_) => {
            (StatusCode::BAD_GATEWAY, "LLM_ERROR", err.to_string())
        }
        ReconcileError::Embedding(_) => {
            (StatusCode::BAD_GATEWAY, "EMBEDDING_ERROR", err.to_string())
        }
        ReconcileError::Store(RepositoryError::Connection) => {
            (StatusCode::BAD_GATEWAY, "STORE_UNAVAILABLE", err.to_string())
        }
        ReconcileError::Store(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", err.to_string())
        }
        ReconcileError::ApplyFailed { source, .. } => {
            // Report the underlying failure; the applied prefix goes in details.
            let (status, code, _) = reconcile_parts(source);
            (status, code, err.to_string())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        if status.is_server_error() {
            tracing::error!(code, "{message}");
        }

        let mut error = json!({
            "code": code,
            "message": message,
        });
        if let AppError::Reconcile(e) = &self {
            if e.is_partial() {
                error["details"] = json!({ "applied": e.applied() });
            }
        }

        let body = json!({
            "data": null,
            "meta": {
                "request_id": uuid::Uuid::now_v7().to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "response_time_ms": 0
            },
            "errors": [error]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factbank_types::error::Stage;
    use factbank_types::llm::LlmError;
    use factbank_types::memory::MemoryId;
    use factbank_types::reconcile::{ActionKind, AppliedAction, UnresolvedReference};

    fn applied_add() -> AppliedAction {
        AppliedAction {
            index: 0,
            kind: ActionKind::Add,
            memory_id: Some(MemoryId::from("m-1")),
        }
    }

    #[test]
    fn test_reference_not_found_is_404() {
        let err = AppError::from(ReconcileError::ReferenceNotFound {
            reference: UnresolvedReference::Temporary(3),
            action_index: 1,
            applied: vec![applied_add()],
        });
        let (status, code, _) = err.parts();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(code, "REFERENCE_NOT_FOUND");
    }

    #[test]
    fn test_collaborator_errors_are_502() {
        let err = AppError::from(ReconcileError::Extraction(LlmError::AuthenticationFailed));
        assert_eq!(err.parts().0, StatusCode::BAD_GATEWAY);

        let err = AppError::from(ReconcileError::Embedding(RepositoryError::Connection));
        assert_eq!(err.parts().0, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_timeout_is_504() {
        let err = AppError::from(ReconcileError::Timeout {
            stage: Stage::Decision,
            after_ms: 100,
        });
        assert_eq!(err.parts().0, StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_apply_failed_reports_underlying_status() {
        let err = AppError::from(ReconcileError::ApplyFailed {
            action_index: 1,
            applied: vec![applied_add()],
            source: Box::new(ReconcileError::Store(RepositoryError::Query("disk full".into()))),
        });
        let (status, code, message) = err.parts();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, "STORE_ERROR");
        assert!(message.contains("after 1 applied action(s)"));
    }

    #[test]
    fn test_validation_and_not_found() {
        assert_eq!(
            AppError::Validation("empty".into()).parts().0,
            StatusCode::BAD_REQUEST
        );
        let (status, _, message) = AppError::NotFound("abc".into()).parts();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(message, "Memory 'abc' not found");
    }

    #[test]
    fn test_into_response_status() {
        let response = AppError::NotFound("abc".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
