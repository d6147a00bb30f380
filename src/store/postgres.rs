//! PostgreSQL credential store

use super::CredentialStore;
use crate::error::AuthError;
use crate::models::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Credential store backed by a shared connection pool
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Map unique violations on `users` to the user-facing message
fn user_conflict(err: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return match db_err.constraint() {
                Some(c) if c.contains("username") => {
                    AuthError::validation("username already taken")
                }
                _ => AuthError::validation("email already registered"),
            };
        }
    }
    err.into()
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> Result<User, AuthError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(user_conflict)
    }

    async fn replace_refresh_token(&self, user_id: Uuid, token: &str) -> Result<(), AuthError> {
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO refresh_tokens (user_id, token) VALUES ($1, $2)")
            .bind(user_id)
            .bind(token)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn refresh_token_exists(&self, token: &str) -> Result<bool, AuthError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM refresh_tokens WHERE token = $1)")
                .bind(token)
                .fetch_one(&self.db)
                .await?;
        Ok(exists)
    }

    async fn delete_refresh_token(&self, token: &str) -> Result<bool, AuthError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn refresh_tokens_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RefreshTokenRecord>, AuthError> {
        let tokens = sqlx::query_as("SELECT * FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.db)
            .await?;
        Ok(tokens)
    }

    async fn replace_verification_code(&self, code: VerificationCode) -> Result<(), AuthError> {
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM verification_codes WHERE email = $1")
            .bind(&code.email)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO verification_codes (email, code, expires_at) VALUES ($1, $2, $3)")
            .bind(&code.email)
            .bind(code.code)
            .bind(code.expires_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_verification_code(
        &self,
        email: &str,
    ) -> Result<Option<VerificationCode>, AuthError> {
        let code = sqlx::query_as("SELECT email, code, expires_at FROM verification_codes WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(code)
    }

    async fn delete_verification_code(&self, email: &str) -> Result<(), AuthError> {
        sqlx::query("DELETE FROM verification_codes WHERE email = $1")
            .bind(email)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn mark_email_verified(&self, email: &str, at: DateTime<Utc>) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO verified_emails (email, verified_at) VALUES ($1, $2)
            ON CONFLICT (email) DO UPDATE SET verified_at = EXCLUDED.verified_at
            "#,
        )
        .bind(email)
        .bind(at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn email_verified_at(&self, email: &str) -> Result<Option<DateTime<Utc>>, AuthError> {
        let row: Option<(DateTime<Utc>,)> =
            sqlx::query_as("SELECT verified_at FROM verified_emails WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.db)
                .await?;
        Ok(row.map(|(at,)| at))
    }

    async fn delete_email_verification(&self, email: &str) -> Result<(), AuthError> {
        sqlx::query("DELETE FROM verified_emails WHERE email = $1")
            .bind(email)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn insert_invitation(&self, invitation: NewInvitation) -> Result<Invitation, AuthError> {
        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            INSERT INTO invitations (email, token_hash, room_id, invited_by, status)
            VALUES ($1, $2, $3, $4, 'pending')
            RETURNING *
            "#,
        )
        .bind(&invitation.email)
        .bind(&invitation.token_hash)
        .bind(invitation.room_id)
        .bind(invitation.invited_by)
        .fetch_one(&self.db)
        .await?;
        Ok(invitation)
    }

    async fn latest_pending_invitation(
        &self,
        email: &str,
    ) -> Result<Option<Invitation>, AuthError> {
        let invitation = sqlx::query_as(
            r#"
            SELECT * FROM invitations
            WHERE email = $1 AND status = 'pending'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(invitation)
    }

    async fn accept_invitation(
        &self,
        invitation_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, AuthError> {
        let mut tx = self.db.begin().await?;

        let room: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE invitations SET status = 'accepted', accepted_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING room_id
            "#,
        )
        .bind(invitation_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((room_id,)) = room else {
            // Dropping the transaction rolls it back
            return Ok(false);
        };

        sqlx::query(
            "INSERT INTO room_members (room_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(room_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn create_room(&self, name: &str, created_by: Uuid) -> Result<Room, AuthError> {
        let mut tx = self.db.begin().await?;

        let room = sqlx::query_as::<_, Room>(
            "INSERT INTO rooms (name, created_by) VALUES ($1, $2) RETURNING *",
        )
        .bind(name)
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO room_members (room_id, user_id) VALUES ($1, $2)")
            .bind(room.id)
            .bind(created_by)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(room)
    }

    async fn rooms_for_user(&self, user_id: Uuid) -> Result<Vec<Room>, AuthError> {
        let rooms = sqlx::query_as(
            r#"
            SELECT r.* FROM rooms r
            JOIN room_members m ON m.room_id = r.id
            WHERE m.user_id = $1
            ORDER BY r.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rooms)
    }

    async fn is_room_member(&self, room_id: Uuid, user_id: Uuid) -> Result<bool, AuthError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM room_members WHERE room_id = $1 AND user_id = $2)",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;
        Ok(exists)
    }
}

/// Create tables, types and indexes. Every statement is idempotent.
pub async fn run_migrations(db: &PgPool) -> Result<(), AuthError> {
    tracing::info!("Running authentication database migrations");

    // Create invitation status enum
    sqlx::query(
        r#"
        DO $$ BEGIN
            CREATE TYPE invitation_status AS ENUM ('pending', 'accepted');
        EXCEPTION
            WHEN duplicate_object THEN null;
        END $$;
        "#,
    )
    .execute(db)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            username VARCHAR(50) NOT NULL,
            email VARCHAR(255) NOT NULL,
            password_hash VARCHAR(255) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT users_username_key UNIQUE (username),
            CONSTRAINT users_email_key UNIQUE (email)
        );
        "#,
    )
    .execute(db)
    .await?;

    // One active token per user is enforced by delete-then-insert, not a constraint
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS refresh_tokens (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            token TEXT NOT NULL UNIQUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(db)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user ON refresh_tokens(user_id);")
        .execute(db)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS verification_codes (
            email VARCHAR(255) PRIMARY KEY,
            code INTEGER NOT NULL,
            expires_at BIGINT NOT NULL
        );
        "#,
    )
    .execute(db)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS verified_emails (
            email VARCHAR(255) PRIMARY KEY,
            verified_at TIMESTAMPTZ NOT NULL
        );
        "#,
    )
    .execute(db)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rooms (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name VARCHAR(100) NOT NULL,
            created_by UUID NOT NULL REFERENCES users(id),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(db)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS room_members (
            room_id UUID NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (room_id, user_id)
        );
        "#,
    )
    .execute(db)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS invitations (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            email VARCHAR(255) NOT NULL,
            token_hash VARCHAR(64) NOT NULL,
            room_id UUID NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
            invited_by UUID NOT NULL REFERENCES users(id),
            status invitation_status NOT NULL DEFAULT 'pending',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            accepted_at TIMESTAMPTZ
        );
        "#,
    )
    .execute(db)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_invitations_email_status ON invitations(email, status);",
    )
    .execute(db)
    .await?;

    tracing::info!("Authentication migrations completed successfully");
    Ok(())
}
