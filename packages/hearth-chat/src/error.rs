//! HTTP error mapping.
//!
//! Every REST handler returns `Result<_, ApiError>`. The response body is
//! always `{"message": "..."}`.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hearth_core::StatusClass;
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] hearth_core::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Request body could not be parsed
    #[error("{0}")]
    BadRequest(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(e) => match e.status_class() {
                StatusClass::BadRequest => StatusCode::BAD_REQUEST,
                StatusClass::Forbidden => StatusCode::FORBIDDEN,
                StatusClass::NotFound => StatusCode::NOT_FOUND,
                StatusClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Core(e) if !e.is_client_error() => {
                tracing::error!(error = %e, code = e.code(), "Request failed");
                "Server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::Error;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(Error::MissingFields("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(Error::NotAuthorized("edit")).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(Error::MessageNotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(Error::DatabaseError("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(AuthError::MissingCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_internal_errors_are_not_leaked() {
        let response = ApiError::from(Error::DatabaseError("disk on fire".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Server error");
    }
}
