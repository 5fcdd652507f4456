// src/error.rs
use crate::ai_client::AiError;
use crate::models::response::ApiResponse;
use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Failures of the chat session/message operations.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("AI responder failed: {0}")]
    Upstream(#[from] AiError),
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ChatError::Upstream(_) | ChatError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Caller-facing text. Upstream and store details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ChatError::Validation(msg) | ChatError::NotFound(msg) => msg.clone(),
            ChatError::RateLimited => {
                "Too many messages sent. Please wait a minute before sending again.".to_string()
            }
            ChatError::Upstream(_) => "Failed to get AI response".to_string(),
            ChatError::Store(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        match &self {
            ChatError::Upstream(e) => tracing::error!(error = %e, "AI responder call failed"),
            ChatError::Store(e) => tracing::error!(error = %e, "store operation failed"),
            _ => {}
        }
        (self.status(), Json(ApiResponse::failure(self.public_message()))).into_response()
    }
}

impl From<JsonRejection> for ChatError {
    fn from(rejection: JsonRejection) -> Self {
        ChatError::Validation(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for ChatError {
    fn from(rejection: PathRejection) -> Self {
        ChatError::Validation(format!("Invalid path parameter: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ChatError {
    fn from(rejection: QueryRejection) -> Self {
        ChatError::Validation(format!("Invalid query parameters: {}", rejection.body_text()))
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Access token required")]
    MissingToken,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("User not found or inactive")]
    Inactive,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("{0}")]
    Validation(String),
    #[error("User with this email or username already exists")]
    Conflict,
    #[error("internal auth failure: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingToken | AuthError::InvalidToken | AuthError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::Inactive => StatusCode::FORBIDDEN,
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::Conflict => StatusCode::CONFLICT,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => AuthError::Conflict,
            other => AuthError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        AuthError::Validation(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match &self {
            AuthError::Internal(detail) => {
                tracing::error!(error = %detail, "authentication failure");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (self.status(), Json(ApiResponse::failure(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_status_mapping() {
        assert_eq!(ChatError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ChatError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ChatError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ChatError::Store(StoreError::Corrupt("bad".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let err = ChatError::Upstream(AiError::Status {
            status: 502,
            body: "secret upstream trace".into(),
        });
        assert_eq!(err.public_message(), "Failed to get AI response");

        let err = ChatError::Store(StoreError::Corrupt("row 12 broken".into()));
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn test_auth_error_status_mapping() {
        assert_eq!(AuthError::MissingToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::Inactive.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AuthError::from(StoreError::Conflict("email".into())).status(),
            StatusCode::CONFLICT
        );
    }
}
