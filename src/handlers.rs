//! HTTP Handlers
//!
//! The canonical routing table. Session cookies are set on signup and login,
//! cleared on logout, and refreshed by the session middleware.

use crate::config::AuthConfig;
use crate::cookies::{self, ACCESS_COOKIE, REFRESH_COOKIE};
use crate::error::AuthError;
use crate::extractors::{AuthUser, ValidatedJson};
use crate::invitation::InvitationService;
use crate::mailer::Mailer;
use crate::middleware;
use crate::models::*;
use crate::service::AuthService;
use crate::store::CredentialStore;
use crate::verification::VerificationService;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

/// Shared service handles, constructed once at startup
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub verification: Arc<VerificationService>,
    pub invitations: Arc<InvitationService>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn Mailer>,
        config: AuthConfig,
    ) -> Self {
        let verification = VerificationService::new(
            store.clone(),
            mailer.clone(),
            config.verification_code_expiration,
        );
        let invitations = InvitationService::new(store.clone(), mailer, &config);
        let auth = AuthService::new(store, config);

        Self {
            auth: Arc::new(auth),
            verification: Arc::new(verification),
            invitations: Arc::new(invitations),
        }
    }
}

// ============================================
// Route Builder
// ============================================

/// Create all routes
pub fn create_routes(state: AppState) -> Router {
    // Public routes (no authentication required)
    let public = Router::new()
        .route("/api/auth/send-code", post(send_code))
        .route("/api/auth/verify-code", post(verify_code))
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/health", get(health));

    // Protected routes (require a session)
    let protected = Router::new()
        .route("/api/auth/me", get(get_current_user))
        .route("/api/invite/send-invite", post(send_invite))
        .route("/api/invite/accept-invite", post(accept_invite))
        .route("/api/room/create-room", post(create_room))
        .route("/api/room/my-rooms", get(my_rooms))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_session,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state)
}

/// `Set-Cookie` headers for a freshly rotated session
fn session_headers(auth: &AuthService, tokens: SessionTokens) -> Result<HeaderMap, AuthError> {
    let secure = auth.config().secure_cookies;
    let mut headers = HeaderMap::new();

    cookies::append_cookie(
        &mut headers,
        &cookies::session_cookie(
            ACCESS_COOKIE,
            tokens.access_token,
            auth.issuer().access_lifetime(),
            secure,
        ),
    )?;
    cookies::append_cookie(
        &mut headers,
        &cookies::session_cookie(
            REFRESH_COOKIE,
            tokens.refresh_token,
            auth.issuer().refresh_lifetime(),
            secure,
        ),
    )?;

    Ok(headers)
}

async fn health() -> &'static str {
    "OK"
}

// ============================================
// Verification
// ============================================

/// POST /api/auth/send-code
pub async fn send_code(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SendCodeRequest>,
) -> Result<impl IntoResponse, AuthError> {
    state.verification.request_code(&req.email).await?;

    Ok(Json(MessageResponse::new("Verification code sent")))
}

/// POST /api/auth/verify-code
pub async fn verify_code(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<VerifyCodeRequest>,
) -> Result<impl IntoResponse, AuthError> {
    state
        .verification
        .verify_code(&req.email, &req.code.to_string())
        .await?;

    Ok(Json(MessageResponse::new("Email verified")))
}

// ============================================
// Signup / Login / Logout
// ============================================

/// POST /api/auth/signup
pub async fn signup(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SignupRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let (user, tokens) = state.auth.signup(req).await?;
    let headers = session_headers(&state.auth, tokens)?;

    Ok((
        StatusCode::CREATED,
        headers,
        Json(serde_json::json!({
            "message": "Signup successful",
            "user": UserResponse::from(user)
        })),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let (user, tokens) = state.auth.login(req).await?;
    let headers = session_headers(&state.auth, tokens)?;

    Ok((
        headers,
        Json(serde_json::json!({
            "message": "Login successful",
            "user": UserResponse::from(user)
        })),
    ))
}

/// POST /api/auth/logout
///
/// Revokes the refresh cookie's token and clears both cookies.
pub async fn logout(
    State(state): State<AppState>,
    request_headers: HeaderMap,
) -> Result<impl IntoResponse, AuthError> {
    let refresh_token = cookies::get_cookie(&request_headers, REFRESH_COOKIE);
    state.auth.logout(refresh_token.as_deref()).await?;

    let secure = state.auth.config().secure_cookies;
    let mut headers = HeaderMap::new();
    cookies::append_cookie(&mut headers, &cookies::removal_cookie(ACCESS_COOKIE, secure))?;
    cookies::append_cookie(&mut headers, &cookies::removal_cookie(REFRESH_COOKIE, secure))?;

    Ok((headers, Json(MessageResponse::new("Logged out successfully"))))
}

/// GET /api/auth/me
pub async fn get_current_user(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AuthError> {
    let user = state.auth.current_user(user.id).await?;

    Ok(Json(serde_json::json!({
        "user": UserResponse::from(user)
    })))
}

// ============================================
// Invitations
// ============================================

/// POST /api/invite/send-invite
pub async fn send_invite(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<SendInviteRequest>,
) -> Result<impl IntoResponse, AuthError> {
    // The plaintext token only leaves the service inside the email
    state
        .invitations
        .send_invite(user.id, &req.email, req.room_id)
        .await?;

    Ok(Json(MessageResponse::new("invite sent")))
}

/// POST /api/invite/accept-invite
pub async fn accept_invite(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<AcceptInviteRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let room_id = state
        .invitations
        .accept_invite(&req.email, &req.token, user.id)
        .await?;

    Ok(Json(serde_json::json!({
        "message": "Invite accepted",
        "roomId": room_id
    })))
}

// ============================================
// Rooms
// ============================================

/// POST /api/room/create-room
pub async fn create_room(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateRoomRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let room = state.invitations.create_room(user.id, &req.name).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "room created",
            "room": room
        })),
    ))
}

/// GET /api/room/my-rooms
pub async fn my_rooms(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AuthError> {
    let rooms = state.invitations.rooms_for_user(user.id).await?;

    Ok(Json(serde_json::json!({ "rooms": rooms })))
}
