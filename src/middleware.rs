//! Session Middleware
//!
//! Gates every authenticated route. A valid access cookie passes straight
//! through. An expired one is silently replaced when the refresh cookie is
//! both present in the store and still cryptographically valid; the refresh
//! token itself is left untouched on that path.

use crate::cookies::{self, ACCESS_COOKIE, REFRESH_COOKIE};
use crate::error::AuthError;
use crate::handlers::AppState;
use crate::models::SessionClaims;
use crate::service::AuthService;
use crate::tokens::TokenError;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

/// Result of inspecting a request's session cookies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Access token verified as-is
    Valid(SessionClaims),
    /// Access token had expired and a new one was minted from the refresh token
    Refreshed {
        claims: SessionClaims,
        access_token: String,
    },
}

impl SessionOutcome {
    pub fn claims(&self) -> &SessionClaims {
        match self {
            SessionOutcome::Valid(claims) | SessionOutcome::Refreshed { claims, .. } => claims,
        }
    }
}

/// Resolve the session carried by the request cookies
pub async fn resolve_session(
    auth: &AuthService,
    headers: &HeaderMap,
) -> Result<SessionOutcome, AuthError> {
    let access_token = cookies::get_cookie(headers, ACCESS_COOKIE)
        .ok_or_else(|| AuthError::unauthenticated("not authorized"))?;

    match auth.issuer().verify_access_token(&access_token) {
        Ok(claims) => return Ok(SessionOutcome::Valid(claims)),
        Err(TokenError::Invalid) => {
            return Err(AuthError::unauthenticated("invalid access token"));
        }
        Err(TokenError::Expired) => {}
    }

    let refresh_token = cookies::get_cookie(headers, REFRESH_COOKIE)
        .ok_or_else(|| AuthError::unauthenticated("no refresh token"))?;

    // Revocation overrides validity: the store is consulted before decoding
    if !auth.store().refresh_token_exists(&refresh_token).await? {
        return Err(AuthError::unauthenticated("refresh token not found"));
    }

    match auth.issuer().verify_refresh_token(&refresh_token) {
        Ok(claims) => {
            let access_token = auth
                .issuer()
                .issue_access_token(claims.sub, &claims.username)?;
            tracing::debug!(user_id = %claims.sub, "Access token reissued from refresh token");
            Ok(SessionOutcome::Refreshed {
                claims,
                access_token,
            })
        }
        Err(TokenError::Expired) => {
            auth.store().delete_refresh_token(&refresh_token).await?;
            tracing::warn!("Expired refresh token presented, revoked");
            Err(AuthError::unauthenticated("refresh token expired"))
        }
        // Left in place: forgery and corruption are indistinguishable here
        Err(TokenError::Invalid) => Err(AuthError::unauthenticated("invalid refresh token")),
    }
}

/// Require an authenticated session
///
/// Stores the session claims in request extensions for the `AuthUser`
/// extractor and sets a new access cookie when one was reissued.
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let outcome = resolve_session(&state.auth, req.headers()).await?;

    req.extensions_mut().insert(outcome.claims().clone());

    let mut response = next.run(req).await;

    if let SessionOutcome::Refreshed { access_token, .. } = outcome {
        let cookie = cookies::session_cookie(
            ACCESS_COOKIE,
            access_token,
            state.auth.issuer().access_lifetime(),
            state.auth.config().secure_cookies,
        );
        cookies::append_cookie(response.headers_mut(), &cookie)?;
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::store::{CredentialStore, MemoryStore};

    use axum::http::{header, HeaderValue};
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use uuid::Uuid;

    fn service() -> (AuthService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (AuthService::new(store.clone(), test_config()), store)
    }

    fn cookie_headers(access: Option<&str>, refresh: Option<&str>) -> HeaderMap {
        let mut parts = Vec::new();
        if let Some(a) = access {
            parts.push(format!("{}={}", ACCESS_COOKIE, a));
        }
        if let Some(r) = refresh {
            parts.push(format!("{}={}", REFRESH_COOKIE, r));
        }
        let mut headers = HeaderMap::new();
        if !parts.is_empty() {
            headers.insert(header::COOKIE, HeaderValue::from_str(&parts.join("; ")).unwrap());
        }
        headers
    }

    fn expired_access(auth: &AuthService, user_id: Uuid) -> String {
        auth.issuer()
            .issue_access_token_at(user_id, "alice", Utc::now() - Duration::minutes(15) - Duration::seconds(1))
            .unwrap()
    }

    fn reason(result: Result<SessionOutcome, AuthError>) -> String {
        match result {
            Err(AuthError::Unauthenticated(reason)) => reason,
            other => panic!("expected 401, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_cookie() {
        let (auth, _) = service();
        let result = resolve_session(&auth, &HeaderMap::new()).await;
        assert_eq!(reason(result), "not authorized");
    }

    #[tokio::test]
    async fn test_valid_access_token() {
        let (auth, _) = service();
        let user_id = Uuid::new_v4();
        let token = auth.issuer().issue_access_token(user_id, "alice").unwrap();

        let outcome = resolve_session(&auth, &cookie_headers(Some(&token), None))
            .await
            .unwrap();
        assert!(matches!(outcome, SessionOutcome::Valid(ref c) if c.sub == user_id));
    }

    #[tokio::test]
    async fn test_forged_access_token_skips_refresh() {
        let (auth, store) = service();
        let user_id = Uuid::new_v4();
        let tokens = auth.rotate_session(user_id, "alice").await.unwrap();

        // A refresh token in the access slot must not be accepted
        let headers = cookie_headers(Some(&tokens.refresh_token), Some(&tokens.refresh_token));
        let result = resolve_session(&auth, &headers).await;

        assert_eq!(reason(result), "invalid access token");
        assert!(store.refresh_token_exists(&tokens.refresh_token).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_access_without_refresh_cookie() {
        let (auth, _) = service();
        let access = expired_access(&auth, Uuid::new_v4());

        let result = resolve_session(&auth, &cookie_headers(Some(&access), None)).await;
        assert_eq!(reason(result), "no refresh token");
    }

    #[tokio::test]
    async fn test_expired_access_with_valid_refresh_reissues() {
        let (auth, store) = service();
        let user_id = Uuid::new_v4();
        let tokens = auth.rotate_session(user_id, "alice").await.unwrap();
        let access = expired_access(&auth, user_id);

        let outcome = resolve_session(&auth, &cookie_headers(Some(&access), Some(&tokens.refresh_token)))
            .await
            .unwrap();

        let SessionOutcome::Refreshed { claims, access_token } = outcome else {
            panic!("expected refreshed session");
        };
        assert_eq!(claims.sub, user_id);
        let fresh = auth.issuer().verify_access_token(&access_token).unwrap();
        assert_eq!(fresh.sub, user_id);
        assert_eq!(fresh.username, "alice");

        // Refresh token is not rotated on this path
        let rows = store.refresh_tokens_for_user(user_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].token, tokens.refresh_token);
    }

    #[tokio::test]
    async fn test_revoked_refresh_token_rejected() {
        let (auth, store) = service();
        let user_id = Uuid::new_v4();
        let tokens = auth.rotate_session(user_id, "alice").await.unwrap();
        store.delete_refresh_token(&tokens.refresh_token).await.unwrap();

        let access = expired_access(&auth, user_id);
        let result =
            resolve_session(&auth, &cookie_headers(Some(&access), Some(&tokens.refresh_token))).await;

        assert_eq!(reason(result), "refresh token not found");
    }

    #[tokio::test]
    async fn test_expired_refresh_token_is_revoked() {
        let (auth, store) = service();
        let user_id = Uuid::new_v4();
        let refresh = auth
            .issuer()
            .issue_refresh_token_at(user_id, "alice", Utc::now() - Duration::days(15))
            .unwrap();
        store.replace_refresh_token(user_id, &refresh).await.unwrap();

        let access = expired_access(&auth, user_id);
        let result = resolve_session(&auth, &cookie_headers(Some(&access), Some(&refresh))).await;

        assert_eq!(reason(result), "refresh token expired");
        assert!(!store.refresh_token_exists(&refresh).await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_refresh_token_kept() {
        let (auth, store) = service();
        let user_id = Uuid::new_v4();
        // An access token stored as if it were a refresh token fails the refresh key
        let bogus = auth.issuer().issue_access_token(user_id, "alice").unwrap();
        store.replace_refresh_token(user_id, &bogus).await.unwrap();

        let access = expired_access(&auth, user_id);
        let result = resolve_session(&auth, &cookie_headers(Some(&access), Some(&bogus))).await;

        assert_eq!(reason(result), "invalid refresh token");
        assert!(store.refresh_token_exists(&bogus).await.unwrap());
    }
}
