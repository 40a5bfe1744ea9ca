use axum::{
    Json,
    extract::{
        FromRequest, Request,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

use crate::{models::ErrorResponse, repository::RepoError};

/// ApiError
///
/// Every handler failure funnels through this enum. The response body is always
/// `{"error": "<message>"}`; internal details are logged, never returned.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed or missing input (400).
    #[error("{0}")]
    Validation(String),
    /// Missing, invalid or expired token, or bad credentials (401).
    #[error("{0}")]
    Unauthorized(&'static str),
    /// Valid token, insufficient role (403).
    #[error("admin access required")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    /// Duplicate unique field (409).
    #[error("{0}")]
    Conflict(String),
    /// Upload body or part over the configured limit (413).
    #[error("{0}")]
    PayloadTooLarge(String),
    /// Store, hashing or storage failure (500). The payload is the logged detail.
    #[error("internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn authorization_required() -> Self {
        ApiError::Unauthorized("authorization required")
    }

    pub fn invalid_credentials() -> Self {
        ApiError::Unauthorized("invalid credentials")
    }

    pub fn internal(detail: impl std::fmt::Display) -> Self {
        ApiError::Internal(detail.to_string())
    }

    /// Keeps an extractor's 413 and reports every other rejection as a 400.
    pub fn rejected(status: StatusCode, body_text: String) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(body_text)
        } else {
            ApiError::Validation(body_text)
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!(detail = %detail, "request failed with internal error");
        }
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::UniqueViolation(_) => {
                ApiError::Conflict("email or username already exists".to_string())
            }
            RepoError::ForeignKeyViolation(constraint) if constraint.contains("restaurant_id") => {
                ApiError::NotFound("restaurant not found".to_string())
            }
            RepoError::ForeignKeyViolation(_) => ApiError::NotFound("user not found".to_string()),
            RepoError::Database(e) => ApiError::internal(e),
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::rejected(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::rejected(err.status(), err.body_text())
    }
}

/// Flattens validator output into one stable, human-readable line.
pub fn describe_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .filter_map(|(field, errs)| {
            // First failure per field is enough for the client.
            errs.first().map(|e| match (&e.message, e.code.as_ref()) {
                (Some(message), _) => message.to_string(),
                (None, "required") => format!("{field} is required"),
                (None, "email") => format!("{field} must be a valid email address"),
                (None, code) => format!("{field} is invalid ({code})"),
            })
        })
        .collect();
    messages.sort();
    messages.join("; ")
}

/// ValidatedJson
///
/// `Json<T>` followed by `Validate::validate`. Both failure modes are reported as
/// `ApiError::Validation` so malformed bodies share the uniform error shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| {
                ApiError::rejected(rejection.status(), rejection.body_text())
            })?;

        value
            .validate()
            .map_err(|errors| ApiError::Validation(describe_validation_errors(&errors)))?;

        Ok(ValidatedJson(value))
    }
}

/// Parses a numeric path segment, reporting failures in the uniform error shape.
pub fn parse_id(raw: &str, what: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::Validation(format!("invalid {what} ID")))
}
