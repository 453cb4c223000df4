//! Crate-wide error type mapped onto the JSON error envelope.
//!
//! Every failure surfaced over HTTP renders as
//! `{error, statusCode, validation?, details?}`.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// Wire shape of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    /// Schema-level failures; each entry names one offending field
    #[error("Invalid request body")]
    Validation(Vec<String>),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Internal {
        message: String,
        details: Option<String>,
    },
}

impl ApiError {
    /// Internal error that keeps the underlying engine's detail message
    /// for operational diagnosis.
    pub fn internal(message: &str, details: impl ToString) -> Self {
        Self::Internal {
            message: message.to_string(),
            details: Some(details.to_string()),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.to_string(),
            status_code: status.as_u16(),
            validation: match self {
                ApiError::Validation(messages) => Some(messages.clone()),
                _ => None,
            },
            details: match self {
                ApiError::Internal { details, .. } => details.clone(),
                _ => None,
            },
        };
        HttpResponse::build(status).json(body)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::internal("Database error", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_error_kinds() {
        assert_eq!(ApiError::BadRequest("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthorized("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::internal("x", "boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn envelope_carries_validation_and_details() {
        let err = ApiError::Validation(vec!["capabilities: at most 25 entries".into()]);
        let body = serde_json::to_value(ErrorBody {
            error: err.to_string(),
            status_code: 400,
            validation: Some(vec!["capabilities: at most 25 entries".into()]),
            details: None,
        })
        .unwrap();
        assert_eq!(body["statusCode"], 400);
        assert_eq!(body["validation"][0], "capabilities: at most 25 entries");
        assert!(body.get("details").is_none());
    }
}
