//! Token Issuer
//!
//! Signs and verifies the two session token kinds. Access and refresh tokens
//! share a claim shape but are signed with distinct secrets, so a token minted
//! for one purpose never verifies as the other.

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::models::SessionClaims;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use uuid::Uuid;

/// Why a presented token was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("token invalid")]
    Invalid,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => {
                tracing::debug!("JWT validation failed: {:?}", err);
                TokenError::Invalid
            }
        }
    }
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

impl KeyPair {
    fn new(secret: &str, lifetime_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime: Duration::seconds(lifetime_secs),
        }
    }
}

/// Issues and verifies access and refresh tokens
pub struct TokenIssuer {
    access: KeyPair,
    refresh: KeyPair,
    validation: Validation,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            access: KeyPair::new(&config.access_token_secret, config.access_token_expiration),
            refresh: KeyPair::new(&config.refresh_token_secret, config.refresh_token_expiration),
            validation,
        }
    }

    /// Access token lifetime
    pub fn access_lifetime(&self) -> Duration {
        self.access.lifetime
    }

    /// Refresh token lifetime
    pub fn refresh_lifetime(&self) -> Duration {
        self.refresh.lifetime
    }

    pub fn issue_access_token(&self, user_id: Uuid, username: &str) -> Result<String, AuthError> {
        self.issue_access_token_at(user_id, username, Utc::now())
    }

    pub fn issue_refresh_token(&self, user_id: Uuid, username: &str) -> Result<String, AuthError> {
        self.issue_refresh_token_at(user_id, username, Utc::now())
    }

    /// Issue an access token as if the current time were `now`
    pub fn issue_access_token_at(
        &self,
        user_id: Uuid,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        sign(&self.access, user_id, username, now)
    }

    /// Issue a refresh token as if the current time were `now`
    pub fn issue_refresh_token_at(
        &self,
        user_id: Uuid,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        sign(&self.refresh, user_id, username, now)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let data = decode::<SessionClaims>(token, &self.access.decoding, &self.validation)?;
        Ok(data.claims)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let data = decode::<SessionClaims>(token, &self.refresh.decoding, &self.validation)?;
        Ok(data.claims)
    }
}

fn sign(
    keys: &KeyPair,
    user_id: Uuid,
    username: &str,
    now: DateTime<Utc>,
) -> Result<String, AuthError> {
    let exp = now + keys.lifetime;

    let claims = SessionClaims {
        sub: user_id,
        username: username.to_string(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
        jti: Uuid::new_v4(),
    };

    let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)?;
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(&test_config())
    }

    #[test]
    fn test_access_token_round_trip() {
        let issuer = issuer();
        let user_id = Uuid::new_v4();

        let token = issuer.issue_access_token(user_id, "alice").unwrap();
        let claims = issuer.verify_access_token(&token).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn test_access_token_expires_after_fifteen_minutes() {
        let issuer = issuer();
        let user_id = Uuid::new_v4();

        let just_inside = Utc::now() - Duration::minutes(14);
        let token = issuer.issue_access_token_at(user_id, "alice", just_inside).unwrap();
        assert!(issuer.verify_access_token(&token).is_ok());

        let just_past = Utc::now() - Duration::minutes(15) - Duration::seconds(1);
        let token = issuer.issue_access_token_at(user_id, "alice", just_past).unwrap();
        assert_eq!(issuer.verify_access_token(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_refresh_token_lives_seven_days() {
        let issuer = issuer();
        let user_id = Uuid::new_v4();

        let six_days_ago = Utc::now() - Duration::days(6);
        let token = issuer.issue_refresh_token_at(user_id, "alice", six_days_ago).unwrap();
        assert!(issuer.verify_refresh_token(&token).is_ok());

        let eight_days_ago = Utc::now() - Duration::days(8);
        let token = issuer.issue_refresh_token_at(user_id, "alice", eight_days_ago).unwrap();
        assert_eq!(issuer.verify_refresh_token(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_keys_are_not_interchangeable() {
        let issuer = issuer();
        let user_id = Uuid::new_v4();

        let access = issuer.issue_access_token(user_id, "alice").unwrap();
        let refresh = issuer.issue_refresh_token(user_id, "alice").unwrap();

        assert_eq!(issuer.verify_refresh_token(&access), Err(TokenError::Invalid));
        assert_eq!(issuer.verify_access_token(&refresh), Err(TokenError::Invalid));
    }

    #[test]
    fn test_tampered_token_is_invalid_not_expired() {
        let issuer = issuer();
        let token = issuer.issue_access_token(Uuid::new_v4(), "alice").unwrap();
        let tampered = format!("{}x", token);

        assert_eq!(issuer.verify_access_token(&tampered), Err(TokenError::Invalid));
        assert_eq!(issuer.verify_access_token("not-a-jwt"), Err(TokenError::Invalid));
    }

    #[test]
    fn test_same_second_tokens_differ() {
        let issuer = issuer();
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let first = issuer.issue_refresh_token_at(user_id, "alice", now).unwrap();
        let second = issuer.issue_refresh_token_at(user_id, "alice", now).unwrap();
        assert_ne!(first, second);
    }
}
