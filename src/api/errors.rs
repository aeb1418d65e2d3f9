use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::errors::EngineError;
use crate::services::session_registry::AdmissionError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    UnprocessableEntity(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    fn status_and_detail(self) -> (StatusCode, String) {
        match self {
            Self::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message.to_string()),
            Self::Forbidden(message) => (StatusCode::FORBIDDEN, message.to_string()),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::Conflict(message) => (StatusCode::CONFLICT, message),
            Self::UnprocessableEntity(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
            Self::ServiceUnavailable(message) => {
                tracing::error!(error = %message, "Service unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, message)
            }
            Self::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let challenge = matches!(self, Self::Unauthorized(_));
        let (status, detail) = self.status_and_detail();

        let mut response =
            (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response();
        if challenge {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let detail = err.to_string();
        match err {
            EngineError::InvalidPosition { .. } | EngineError::InvalidOption { .. } => {
                Self::BadRequest(detail)
            }
            EngineError::SessionNotActive(_) => Self::Conflict(detail),
            EngineError::ExamNotFound(_) => Self::NotFound(detail),
            EngineError::EmptyExam
            | EngineError::UnknownQuestion(_)
            | EngineError::InvalidQuestion { .. }
            | EngineError::InvalidExamDefinition { .. } => Self::UnprocessableEntity(detail),
            EngineError::ResultPersistenceExhausted { .. }
            | EngineError::SourceUnavailable(_) => Self::ServiceUnavailable(detail),
            EngineError::SessionUnavailable => Self::Conflict(detail),
            EngineError::ResultPersistenceFailure(_) => {
                Self::internal(detail, "Result persistence failed")
            }
        }
    }
}

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::AtCapacity { .. } => Self::ServiceUnavailable(err.to_string()),
            AdmissionError::Engine(err) => err.into(),
        }
    }
}
