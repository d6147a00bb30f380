//! Room Invitations
//!
//! Invite tokens are 32 random bytes, hex encoded. Only an HMAC-SHA256 digest
//! of the token is stored; the plaintext lives solely in the emailed link.

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::mailer::{self, Mailer};
use crate::models::{NewInvitation, Room};
use crate::store::CredentialStore;

use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::sync::Arc;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub struct InvitationService {
    store: Arc<dyn CredentialStore>,
    mailer: Arc<dyn Mailer>,
    token_key: Vec<u8>,
    base_url: String,
    lifetime: Duration,
}

impl InvitationService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn Mailer>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            store,
            mailer,
            token_key: config.invite_token_secret.as_bytes().to_vec(),
            base_url: config.invite_base_url.clone(),
            lifetime: Duration::seconds(config.invite_expiration),
        }
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(&self.token_key).map_err(|_| AuthError::Internal)
    }

    /// Keyed digest of an invite token, hex encoded
    pub fn hash_token(&self, token: &str) -> Result<String, AuthError> {
        let mut mac = self.mac()?;
        mac.update(token.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Constant-time comparison of a presented token against a stored digest
    fn token_matches(&self, token: &str, stored_hash: &str) -> Result<bool, AuthError> {
        let Ok(expected) = hex::decode(stored_hash) else {
            return Ok(false);
        };
        let mut mac = self.mac()?;
        mac.update(token.as_bytes());
        Ok(mac.verify_slice(&expected).is_ok())
    }

    fn invite_link(&self, token: &str) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        format!("{}{}token={}", self.base_url, separator, token)
    }

    /// Invite `email` into a room the inviter belongs to.
    ///
    /// Returns the plaintext token; the caller must not persist or echo it.
    pub async fn send_invite(
        &self,
        inviter_id: Uuid,
        email: &str,
        room_id: Uuid,
    ) -> Result<String, AuthError> {
        if !self.store.is_room_member(room_id, inviter_id).await? {
            return Err(AuthError::not_found("room not found"));
        }

        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let invitation = self
            .store
            .insert_invitation(NewInvitation {
                email: email.to_string(),
                token_hash: self.hash_token(&token)?,
                room_id,
                invited_by: inviter_id,
            })
            .await?;

        let (subject, html) =
            mailer::invite_email(&self.invite_link(&token), self.lifetime.num_hours());
        self.mailer.send(email, &subject, &html).await?;

        tracing::info!(
            invitation_id = %invitation.id,
            room_id = %room_id,
            invited_by = %inviter_id,
            "Invitation sent"
        );
        Ok(token)
    }

    /// Redeem the newest pending invite for `email` on behalf of `user_id`
    pub async fn accept_invite(
        &self,
        email: &str,
        token: &str,
        user_id: Uuid,
    ) -> Result<Uuid, AuthError> {
        let invitation = self
            .store
            .latest_pending_invitation(email)
            .await?
            .ok_or_else(|| AuthError::not_found("no pending invite for this email"))?;

        if invitation.created_at + self.lifetime < Utc::now() {
            return Err(AuthError::validation("invite expired"));
        }

        if !self.token_matches(token, &invitation.token_hash)? {
            return Err(AuthError::validation("invalid token"));
        }

        if !self.store.accept_invitation(invitation.id, user_id).await? {
            // Lost a race with a concurrent accept
            return Err(AuthError::not_found("no pending invite for this email"));
        }

        tracing::info!(
            invitation_id = %invitation.id,
            room_id = %invitation.room_id,
            user_id = %user_id,
            "Invitation accepted"
        );
        Ok(invitation.room_id)
    }

    pub async fn create_room(&self, user_id: Uuid, name: &str) -> Result<Room, AuthError> {
        let room = self.store.create_room(name.trim(), user_id).await?;
        tracing::info!(room_id = %room.id, user_id = %user_id, "Room created");
        Ok(room)
    }

    pub async fn rooms_for_user(&self, user_id: Uuid) -> Result<Vec<Room>, AuthError> {
        self.store.rooms_for_user(user_id).await
    }
}
