//! Authentication Extractors

use crate::error::AuthError;
use crate::models::SessionClaims;

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use uuid::Uuid;
use validator::Validate;

/// Authenticated user placed in request extensions by the session middleware
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
}

impl AuthUser {
    /// Create user from JWT claims
    pub fn from_claims(claims: &SessionClaims) -> Self {
        Self {
            id: claims.sub,
            username: claims.username.clone(),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Only the middleware validates tokens; a route without it has no identity
        parts
            .extensions
            .get::<SessionClaims>()
            .map(AuthUser::from_claims)
            .ok_or_else(|| AuthError::unauthenticated("not authorized"))
    }
}

/// JSON body that has been deserialized and passed its `validator` rules.
///
/// Both failure kinds come back as a 400 `validation_error`.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;

        value
            .validate()
            .map_err(|e| AuthError::Validation(e.to_string()))?;

        Ok(ValidatedJson(value))
    }
}
