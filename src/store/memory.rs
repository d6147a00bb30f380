//! In-memory credential store
//!
//! Single `RwLock` around all tables, so every trait method is atomic with
//! respect to the others. Used by the test suite and `STORE=memory` runs.

use super::CredentialStore;
use crate::error::AuthError;
use crate::models::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    refresh_tokens: Vec<RefreshTokenRecord>,
    verification_codes: HashMap<String, VerificationCode>,
    verified_emails: HashMap<String, DateTime<Utc>>,
    invitations: Vec<Invitation>,
    rooms: HashMap<Uuid, Room>,
    room_members: HashSet<(Uuid, Uuid)>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of membership rows for a room
    pub async fn member_count(&self, room_id: Uuid) -> usize {
        self.tables
            .read()
            .await
            .room_members
            .iter()
            .filter(|(room, _)| *room == room_id)
            .count()
    }

    /// Overwrite an invitation's creation time
    pub async fn backdate_invitation(&self, invitation_id: Uuid, created_at: DateTime<Utc>) {
        let mut tables = self.tables.write().await;
        if let Some(inv) = tables.invitations.iter_mut().find(|i| i.id == invitation_id) {
            inv.created_at = created_at;
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AuthError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, AuthError> {
        let mut tables = self.tables.write().await;

        if tables.users.values().any(|u| u.email == user.email) {
            return Err(AuthError::validation("email already registered"));
        }
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(AuthError::validation("username already taken"));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn replace_refresh_token(&self, user_id: Uuid, token: &str) -> Result<(), AuthError> {
        let mut tables = self.tables.write().await;

        tables.refresh_tokens.retain(|t| t.user_id != user_id);
        tables.refresh_tokens.push(RefreshTokenRecord {
            id: Uuid::new_v4(),
            user_id,
            token: token.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn refresh_token_exists(&self, token: &str) -> Result<bool, AuthError> {
        let tables = self.tables.read().await;
        Ok(tables.refresh_tokens.iter().any(|t| t.token == token))
    }

    async fn delete_refresh_token(&self, token: &str) -> Result<bool, AuthError> {
        let mut tables = self.tables.write().await;
        let before = tables.refresh_tokens.len();
        tables.refresh_tokens.retain(|t| t.token != token);
        Ok(tables.refresh_tokens.len() < before)
    }

    async fn refresh_tokens_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RefreshTokenRecord>, AuthError> {
        let tables = self.tables.read().await;
        Ok(tables
            .refresh_tokens
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn replace_verification_code(&self, code: VerificationCode) -> Result<(), AuthError> {
        let mut tables = self.tables.write().await;
        tables.verification_codes.insert(code.email.clone(), code);
        Ok(())
    }

    async fn find_verification_code(
        &self,
        email: &str,
    ) -> Result<Option<VerificationCode>, AuthError> {
        Ok(self.tables.read().await.verification_codes.get(email).cloned())
    }

    async fn delete_verification_code(&self, email: &str) -> Result<(), AuthError> {
        self.tables.write().await.verification_codes.remove(email);
        Ok(())
    }

    async fn mark_email_verified(&self, email: &str, at: DateTime<Utc>) -> Result<(), AuthError> {
        self.tables
            .write()
            .await
            .verified_emails
            .insert(email.to_string(), at);
        Ok(())
    }

    async fn email_verified_at(&self, email: &str) -> Result<Option<DateTime<Utc>>, AuthError> {
        Ok(self.tables.read().await.verified_emails.get(email).copied())
    }

    async fn delete_email_verification(&self, email: &str) -> Result<(), AuthError> {
        self.tables.write().await.verified_emails.remove(email);
        Ok(())
    }

    async fn insert_invitation(&self, invitation: NewInvitation) -> Result<Invitation, AuthError> {
        let mut tables = self.tables.write().await;

        if !tables.rooms.contains_key(&invitation.room_id) {
            return Err(AuthError::Database("invitations_room_id_fkey".to_string()));
        }

        let invitation = Invitation {
            id: Uuid::new_v4(),
            email: invitation.email,
            token_hash: invitation.token_hash,
            room_id: invitation.room_id,
            invited_by: invitation.invited_by,
            status: InvitationStatus::Pending,
            created_at: Utc::now(),
            accepted_at: None,
        };
        tables.invitations.push(invitation.clone());
        Ok(invitation)
    }

    async fn latest_pending_invitation(
        &self,
        email: &str,
    ) -> Result<Option<Invitation>, AuthError> {
        let tables = self.tables.read().await;
        // Later pushes win ties on created_at
        Ok(tables
            .invitations
            .iter()
            .enumerate()
            .filter(|(_, i)| i.email == email && i.is_pending())
            .max_by_key(|(pos, i)| (i.created_at, *pos))
            .map(|(_, i)| i.clone()))
    }

    async fn accept_invitation(
        &self,
        invitation_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, AuthError> {
        let mut tables = self.tables.write().await;

        let Some(invitation) = tables
            .invitations
            .iter_mut()
            .find(|i| i.id == invitation_id && i.is_pending())
        else {
            return Ok(false);
        };

        invitation.status = InvitationStatus::Accepted;
        invitation.accepted_at = Some(Utc::now());
        let room_id = invitation.room_id;

        tables.room_members.insert((room_id, user_id));
        Ok(true)
    }

    async fn create_room(&self, name: &str, created_by: Uuid) -> Result<Room, AuthError> {
        let mut tables = self.tables.write().await;

        let room = Room {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_by,
            created_at: Utc::now(),
        };
        tables.rooms.insert(room.id, room.clone());
        tables.room_members.insert((room.id, created_by));
        Ok(room)
    }

    async fn rooms_for_user(&self, user_id: Uuid) -> Result<Vec<Room>, AuthError> {
        let tables = self.tables.read().await;

        let mut rooms: Vec<Room> = tables
            .room_members
            .iter()
            .filter(|(_, member)| *member == user_id)
            .filter_map(|(room_id, _)| tables.rooms.get(room_id).cloned())
            .collect();
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rooms)
    }

    async fn is_room_member(&self, room_id: Uuid, user_id: Uuid) -> Result<bool, AuthError> {
        Ok(self
            .tables
            .read()
            .await
            .room_members
            .contains(&(room_id, user_id)))
    }
}
