use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rtmon_common::retry::RetryError;
use rtmon_common::types::ModelError;
use rtmon_security::SecurityError;
use rtmon_storage::StorageError;
use serde::Serialize;

/// Every failure a handler or middleware can answer with. The status code
/// follows from the variant alone.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("metric not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("bad Content-Type")]
    UnsupportedContentType,

    #[error("{0}")]
    Security(#[from] SecurityError),

    #[error("request ip is not trusted")]
    Forbidden,

    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    err_msg: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::UnsupportedContentType | ApiError::Security(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(ErrorBody { err_msg: self.to_string() })).into_response()
    }
}

impl From<ModelError> for ApiError {
    fn from(e: ModelError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("deserialize error: {e}"))
    }
}

impl From<RetryError<StorageError>> for ApiError {
    fn from(e: RetryError<StorageError>) -> Self {
        match e {
            RetryError::Operation(StorageError::NotFound { kind, name }) => ApiError::NotFound(format!("{kind} {name}")),
            RetryError::Operation(e) => {
                tracing::error!(error = %e, "Storage call failed");
                ApiError::Internal("storage error".to_string())
            }
            RetryError::MaxRetryReached => ApiError::Internal("storage unavailable".to_string()),
            RetryError::Cancelled => ApiError::Internal("server is shutting down".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtmon_common::types::MetricKind;

    #[test]
    fn status_mapping() {
        let not_found: ApiError = RetryError::Operation(StorageError::not_found(MetricKind::Gauge, "Alloc")).into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let exhausted: ApiError = RetryError::<StorageError>::MaxRetryReached.into();
        assert_eq!(exhausted.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(ApiError::from(ModelError::EmptyId).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(SecurityError::SignatureMismatch).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::UnsupportedContentType.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
    }
}
