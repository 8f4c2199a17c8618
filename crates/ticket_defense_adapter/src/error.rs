#![forbid(unsafe_code)]

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use ticket_defense_contracts::ContractViolation;
use ticket_defense_engines::analysis::AnalysisError;
use ticket_defense_engines::tracking::TrackingMintError;
use ticket_defense_storage::cases::StorageError;

/// Every failure a route can return. The message is the whole response body,
/// so it never carries secrets or upstream payloads.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge("request body is too large".to_string())
        } else {
            ApiError::BadRequest(format!("invalid JSON body: {}", rejection.body_text()))
        }
    }
}

impl From<ContractViolation> for ApiError {
    fn from(v: ContractViolation) -> Self {
        ApiError::BadRequest(v.to_string())
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::MissingInput | AnalysisError::InvalidInput(_) => {
                ApiError::BadRequest(err.to_string())
            }
            AnalysisError::PayloadTooLarge { .. } => ApiError::PayloadTooLarge(err.to_string()),
            AnalysisError::UnreadableText => ApiError::Unprocessable(err.to_string()),
            AnalysisError::OcrUnavailable(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ContractViolation(v) => ApiError::from(v),
            StorageError::NotFound { .. } => ApiError::NotFound("case not found".to_string()),
            other => {
                tracing::error!(error = %other, "case store failure");
                ApiError::Internal("case store unavailable".to_string())
            }
        }
    }
}

impl From<TrackingMintError<StorageError>> for ApiError {
    fn from(err: TrackingMintError<StorageError>) -> Self {
        match err {
            TrackingMintError::Exhausted { attempts } => {
                tracing::error!(attempts, "tracking code space exhausted for this request");
                ApiError::Internal("could not allocate a unique tracking code".to_string())
            }
            TrackingMintError::Store(err) => ApiError::from(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticket_defense_engines::provider_http::ProviderCallError;

    #[test]
    fn at_api_error_01_analysis_errors_map_to_http_categories() {
        assert_eq!(
            ApiError::from(AnalysisError::MissingInput).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(AnalysisError::PayloadTooLarge {
                what: "image",
                limit: 10
            })
            .status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::from(AnalysisError::UnreadableText).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(AnalysisError::OcrUnavailable(ProviderCallError::new(
                "google_vision",
                "timeout",
                None
            )))
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn at_api_error_02_store_errors_hide_upstream_detail() {
        let err = ApiError::from(StorageError::Upstream {
            status: 401,
            code: None,
            message: "Invalid API key".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.to_string().contains("API key"));

        let err = ApiError::from(TrackingMintError::<StorageError>::Exhausted { attempts: 5 });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = ApiError::from(StorageError::ContractViolation(
            ContractViolation::InvalidValue {
                field: "case.contact_email",
                reason: "must be an email address",
            },
        ));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
