//! Credential Store
//!
//! Persistence contract for users, refresh tokens, verification codes,
//! invitations and rooms. Everything the service needs is a point lookup,
//! insert or delete; the two multi-row writes (`accept_invitation`,
//! `create_room`) and the refresh token replacement are atomic.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{run_migrations, PgStore};

use crate::error::AuthError;
use crate::models::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    // Users

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AuthError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError>;

    /// Insert a user. Username or email collisions fail with `Validation`.
    async fn create_user(&self, user: NewUser) -> Result<User, AuthError>;

    // Refresh tokens

    /// Delete every refresh token owned by `user_id`, then store `token`
    async fn replace_refresh_token(&self, user_id: Uuid, token: &str) -> Result<(), AuthError>;

    /// Exact-value existence check
    async fn refresh_token_exists(&self, token: &str) -> Result<bool, AuthError>;

    /// Returns whether a row was removed
    async fn delete_refresh_token(&self, token: &str) -> Result<bool, AuthError>;

    async fn refresh_tokens_for_user(&self, user_id: Uuid)
        -> Result<Vec<RefreshTokenRecord>, AuthError>;

    // Verification codes

    /// Delete any code for the email, then store `code`
    async fn replace_verification_code(&self, code: VerificationCode) -> Result<(), AuthError>;

    async fn find_verification_code(&self, email: &str)
        -> Result<Option<VerificationCode>, AuthError>;

    async fn delete_verification_code(&self, email: &str) -> Result<(), AuthError>;

    /// Record that the email passed verification at `at`
    async fn mark_email_verified(&self, email: &str, at: DateTime<Utc>) -> Result<(), AuthError>;

    /// When the email passed verification, if it has an unused record
    async fn email_verified_at(&self, email: &str) -> Result<Option<DateTime<Utc>>, AuthError>;

    async fn delete_email_verification(&self, email: &str) -> Result<(), AuthError>;

    // Invitations

    async fn insert_invitation(&self, invitation: NewInvitation) -> Result<Invitation, AuthError>;

    /// Most recently created pending invitation for the email
    async fn latest_pending_invitation(&self, email: &str)
        -> Result<Option<Invitation>, AuthError>;

    /// Flip the invitation to accepted and add the membership in one unit.
    /// Returns false when the invitation was no longer pending.
    async fn accept_invitation(&self, invitation_id: Uuid, user_id: Uuid)
        -> Result<bool, AuthError>;

    // Rooms

    /// Insert the room and its creator's membership in one unit
    async fn create_room(&self, name: &str, created_by: Uuid) -> Result<Room, AuthError>;

    async fn rooms_for_user(&self, user_id: Uuid) -> Result<Vec<Room>, AuthError>;

    async fn is_room_member(&self, room_id: Uuid, user_id: Uuid) -> Result<bool, AuthError>;
}
