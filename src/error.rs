//! Error Types
//!
//! Centralized error handling for authentication, verification and invitation
//! operations. Every variant renders as `{"error": <code>, "message": <reason>}`.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::mailer::MailError;

/// Service errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// Missing, invalid or expired credentials
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Validation(String),

    /// A referenced verification code, invite or room does not exist
    #[error("{0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Email delivery failed: {0}")]
    Mail(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error")]
    Internal,
}

impl AuthError {
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        AuthError::Unauthenticated(reason.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AuthError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AuthError::NotFound(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AuthError::Validation(_) | AuthError::NotFound(_) => StatusCode::BAD_REQUEST,
            AuthError::Database(_)
            | AuthError::Mail(_)
            | AuthError::Config(_)
            | AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (error_code, message) = match &self {
            AuthError::Unauthenticated(reason) => ("unauthorized", reason.clone()),
            AuthError::Validation(msg) => ("validation_error", msg.clone()),
            AuthError::NotFound(msg) => ("not_found", msg.clone()),
            AuthError::Mail(_) => ("email_failed", "failed to send email".to_string()),
            AuthError::Config(msg) => ("configuration_error", msg.clone()),
            AuthError::Database(_) | AuthError::Internal => {
                ("internal_error", "An internal error occurred".to_string())
            }
        };

        (
            self.status(),
            Json(serde_json::json!({
                "error": error_code,
                "message": message
            })),
        )
            .into_response()
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AuthError::Database(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        tracing::error!("Password hashing error: {:?}", err);
        AuthError::Internal
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        tracing::error!("JWT encoding error: {:?}", err);
        AuthError::Internal
    }
}

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!("Rejected request body: {}", rejection.body_text());
        match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                AuthError::validation("expected a JSON request body")
            }
            _ => AuthError::validation("invalid request body"),
        }
    }
}

impl From<MailError> for AuthError {
    fn from(err: MailError) -> Self {
        tracing::warn!("Email delivery failed: {}", err);
        AuthError::Mail(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: AuthError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_unauthenticated_carries_reason() {
        let (status, body) = body_json(AuthError::unauthenticated("refresh token expired")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
        assert_eq!(body["message"], "refresh token expired");
    }

    #[tokio::test]
    async fn test_validation_and_not_found_are_bad_request() {
        let (status, _) = body_json(AuthError::validation("invalid code")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = body_json(AuthError::not_found("no code sent")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "no code sent");
    }

    #[tokio::test]
    async fn test_database_error_hides_details() {
        let (status, body) =
            body_json(AuthError::Database("relation \"users\" does not exist".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn test_mail_error_is_distinct() {
        let (status, body) = body_json(AuthError::Mail("relay returned 502".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "email_failed");
    }
}
