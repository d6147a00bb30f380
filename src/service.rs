//! Authentication Service
//!
//! Password hashing, session rotation, signup, login and logout.

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::models::*;
use crate::store::CredentialStore;
use crate::tokens::TokenIssuer;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Authentication service
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    config: AuthConfig,
    issuer: TokenIssuer,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(store: Arc<dyn CredentialStore>, config: AuthConfig) -> Self {
        let issuer = TokenIssuer::new(&config);

        Self {
            store,
            config,
            issuer,
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Get reference to config
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    // ============================================
    // Password Hashing
    // ============================================

    fn argon2(&self) -> Result<Argon2<'static>, AuthError> {
        let params = Params::new(
            self.config.argon2_memory_cost,
            self.config.argon2_time_cost,
            self.config.argon2_parallelism,
            None,
        )
        .map_err(|_| AuthError::Internal)?;

        Ok(Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            params,
        ))
    }

    /// Hash a password using Argon2id
    pub fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);

        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)?
            .to_string();

        Ok(hash)
    }

    /// Verify a password against a hash
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::Internal)?;

        Ok(self
            .argon2()?
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    // ============================================
    // Sessions
    // ============================================

    /// Issue a fresh access/refresh pair and make the new refresh token the
    /// only one stored for the user
    pub async fn rotate_session(
        &self,
        user_id: Uuid,
        username: &str,
    ) -> Result<SessionTokens, AuthError> {
        let access_token = self.issuer.issue_access_token(user_id, username)?;
        let refresh_token = self.issuer.issue_refresh_token(user_id, username)?;

        self.store
            .replace_refresh_token(user_id, &refresh_token)
            .await?;

        tracing::debug!(user_id = %user_id, "Session rotated");

        Ok(SessionTokens {
            access_token,
            refresh_token,
        })
    }

    // ============================================
    // Signup / Login / Logout
    // ============================================

    /// Create an account for a verified Gmail address and open a session
    pub async fn signup(&self, req: SignupRequest) -> Result<(User, SessionTokens), AuthError> {
        if let Some(confirm) = &req.password_confirm {
            if confirm != &req.password {
                return Err(AuthError::validation("passwords do not match"));
            }
        }

        if self.store.find_user_by_email(&req.email).await?.is_some() {
            return Err(AuthError::validation("email already registered"));
        }

        if self.store.find_user_by_username(&req.username).await?.is_some() {
            return Err(AuthError::validation("username already taken"));
        }

        let verified_at = self
            .store
            .email_verified_at(&req.email)
            .await?
            .ok_or_else(|| AuthError::validation("email not verified"))?;

        if verified_at + Duration::seconds(self.config.verified_email_window) < Utc::now() {
            self.store.delete_email_verification(&req.email).await?;
            return Err(AuthError::validation("email verification expired"));
        }

        let password_hash = self.hash_password(&req.password)?;

        let user = self
            .store
            .create_user(NewUser {
                username: req.username,
                email: req.email,
                password_hash,
            })
            .await?;

        // Only a created account uses up the verification
        self.store.delete_email_verification(&user.email).await?;

        let tokens = self.rotate_session(user.id, &user.username).await?;

        tracing::info!(user_id = %user.id, "User signed up");
        Ok((user, tokens))
    }

    /// Check credentials and open a session
    pub async fn login(&self, req: LoginRequest) -> Result<(User, SessionTokens), AuthError> {
        let user = self
            .store
            .find_user_by_username(&req.username)
            .await?
            .ok_or_else(|| AuthError::unauthenticated("Invalid user"))?;

        if !self.verify_password(&req.password, &user.password_hash)? {
            tracing::info!(user_id = %user.id, "Login rejected: wrong password");
            return Err(AuthError::unauthenticated("Invalid password"));
        }

        let tokens = self.rotate_session(user.id, &user.username).await?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok((user, tokens))
    }

    /// Revoke the presented refresh token, if any
    pub async fn logout(&self, refresh_token: Option<&str>) -> Result<(), AuthError> {
        if let Some(token) = refresh_token {
            if self.store.delete_refresh_token(token).await? {
                tracing::info!("Refresh token revoked on logout");
            }
        }
        Ok(())
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::unauthenticated("not authorized"))
    }
}
