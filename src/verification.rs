//! Email Verification
//!
//! One-time six digit codes proving control of a Gmail address before an
//! account is created for it. A code is single-use and a newer code for the
//! same email replaces the older one.

use crate::error::AuthError;
use crate::mailer::{self, Mailer};
use crate::models::VerificationCode;
use crate::store::CredentialStore;

use chrono::Utc;
use rand::Rng;
use regex::Regex;
use std::sync::Arc;

lazy_static::lazy_static! {
    static ref GMAIL_ADDRESS: Regex = Regex::new(r"^[A-Za-z0-9._%+-]+@gmail\.com$")
        .expect("gmail pattern is valid");
}

pub const CODE_MIN: i32 = 100_000;
pub const CODE_MAX: i32 = 999_999;

pub fn is_gmail_address(email: &str) -> bool {
    GMAIL_ADDRESS.is_match(email)
}

/// Exactly six ASCII digits, surrounding whitespace ignored
fn parse_code(input: &str) -> Option<i32> {
    let digits = input.trim();
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

pub struct VerificationService {
    store: Arc<dyn CredentialStore>,
    mailer: Arc<dyn Mailer>,
    code_lifetime_secs: i64,
}

impl VerificationService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn Mailer>,
        code_lifetime_secs: i64,
    ) -> Self {
        Self {
            store,
            mailer,
            code_lifetime_secs,
        }
    }

    /// Generate, persist and email a fresh code for `email`.
    ///
    /// The code is stored before the email is sent, so a delivery failure
    /// still leaves a usable code behind.
    pub async fn request_code(&self, email: &str) -> Result<(), AuthError> {
        if !is_gmail_address(email) {
            return Err(AuthError::validation("Invalid Gmail address"));
        }

        if self.store.find_user_by_email(email).await?.is_some() {
            return Err(AuthError::validation("email already registered"));
        }

        let code = rand::thread_rng().gen_range(CODE_MIN..=CODE_MAX);
        let expires_at = Utc::now().timestamp_millis() + self.code_lifetime_secs * 1000;

        self.store
            .replace_verification_code(VerificationCode {
                email: email.to_string(),
                code,
                expires_at,
            })
            .await?;

        let (subject, html) = mailer::verification_email(code, self.code_lifetime_secs / 60);
        self.mailer.send(email, &subject, &html).await?;

        tracing::info!(email = %email, "Verification code sent");
        Ok(())
    }

    /// Check a submitted code. Success consumes the code and marks the email
    /// as verified for signup.
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<(), AuthError> {
        let record = self
            .store
            .find_verification_code(email)
            .await?
            .ok_or_else(|| AuthError::not_found("no code sent"))?;

        let now = Utc::now();
        if record.is_expired_at(now.timestamp_millis()) {
            self.store.delete_verification_code(email).await?;
            return Err(AuthError::validation("code expired"));
        }

        if parse_code(code) != Some(record.code) {
            return Err(AuthError::validation("invalid code"));
        }

        self.store.delete_verification_code(email).await?;
        self.store.mark_email_verified(email, now).await?;

        tracing::info!(email = %email, "Email verified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::testing::{FailingMailer, RecordingMailer};
    use crate::models::NewUser;
    use crate::store::MemoryStore;

    const EMAIL: &str = "a@gmail.com";

    fn service() -> (VerificationService, Arc<MemoryStore>, Arc<RecordingMailer>) {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        (
            VerificationService::new(store.clone(), mailer.clone(), 300),
            store,
            mailer,
        )
    }

    async fn stored_code(store: &MemoryStore, email: &str) -> i32 {
        store.find_verification_code(email).await.unwrap().unwrap().code
    }

    #[test]
    fn test_gmail_pattern() {
        assert!(is_gmail_address("first.last+tag@gmail.com"));
        assert!(is_gmail_address("A_b%9-z@gmail.com"));
        assert!(!is_gmail_address("a@googlemail.com"));
        assert!(!is_gmail_address("a@gmail.com.evil"));
        assert!(!is_gmail_address("@gmail.com"));
        assert!(!is_gmail_address("a b@gmail.com"));
        assert!(!is_gmail_address("a@GMAIL.COM"));
    }

    #[test]
    fn test_parse_code_requires_six_digits() {
        assert_eq!(parse_code("123456"), Some(123456));
        assert_eq!(parse_code(" 654321\n"), Some(654321));
        assert_eq!(parse_code("+123456"), None);
        assert_eq!(parse_code("0123456"), None);
        assert_eq!(parse_code("12345"), None);
        assert_eq!(parse_code("12 456"), None);
        assert_eq!(parse_code("-12345"), None);
    }

    #[tokio::test]
    async fn test_request_code_persists_and_emails() {
        let (svc, store, mailer) = service();
        svc.request_code(EMAIL).await.unwrap();

        let record = store.find_verification_code(EMAIL).await.unwrap().unwrap();
        assert!((CODE_MIN..=CODE_MAX).contains(&record.code));

        let remaining = record.expires_at - Utc::now().timestamp_millis();
        assert!(remaining > 290_000 && remaining <= 300_000);

        let mail = mailer.last_to(EMAIL).await.unwrap();
        assert!(mail.html.contains(&record.code.to_string()));
    }

    #[tokio::test]
    async fn test_request_code_rejects_non_gmail() {
        let (svc, store, _) = service();
        let err = svc.request_code("a@yahoo.com").await.unwrap_err();

        assert_eq!(err.to_string(), "Invalid Gmail address");
        assert!(store.find_verification_code("a@yahoo.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_request_code_rejects_registered_email() {
        let (svc, store, _) = service();
        store
            .create_user(NewUser {
                username: "alice".into(),
                email: EMAIL.into(),
                password_hash: "h".into(),
            })
            .await
            .unwrap();

        let err = svc.request_code(EMAIL).await.unwrap_err();
        assert_eq!(err.to_string(), "email already registered");
    }

    #[tokio::test]
    async fn test_mail_failure_keeps_code() {
        let store = Arc::new(MemoryStore::new());
        let svc = VerificationService::new(store.clone(), Arc::new(FailingMailer), 300);

        let err = svc.request_code(EMAIL).await.unwrap_err();
        assert!(matches!(err, AuthError::Mail(_)));

        let code = stored_code(&store, EMAIL).await;
        svc.verify_code(EMAIL, &code.to_string()).await.unwrap();
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let (svc, store, _) = service();
        svc.request_code(EMAIL).await.unwrap();
        let code = stored_code(&store, EMAIL).await.to_string();

        svc.verify_code(EMAIL, &code).await.unwrap();
        let err = svc.verify_code(EMAIL, &code).await.unwrap_err();

        assert_eq!(err.to_string(), "no code sent");
        assert!(store.email_verified_at(EMAIL).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_new_code_supersedes_old() {
        let (svc, store, _) = service();
        svc.request_code(EMAIL).await.unwrap();
        let first = stored_code(&store, EMAIL).await;

        // Force a distinct second code
        let mut second = first;
        while second == first {
            svc.request_code(EMAIL).await.unwrap();
            second = stored_code(&store, EMAIL).await;
        }

        let err = svc.verify_code(EMAIL, &first.to_string()).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid code");
        svc.verify_code(EMAIL, &second.to_string()).await.unwrap();
    }

    #[tokio::test]
    async fn test_wrong_code_allows_retry() {
        let (svc, store, _) = service();
        svc.request_code(EMAIL).await.unwrap();
        let code = stored_code(&store, EMAIL).await;
        let wrong = if code == CODE_MAX { CODE_MIN } else { code + 1 };

        let err = svc.verify_code(EMAIL, &wrong.to_string()).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid code");
        let err = svc.verify_code(EMAIL, "not-a-number").await.unwrap_err();
        assert_eq!(err.to_string(), "invalid code");
        let err = svc.verify_code(EMAIL, &format!("+{}", code)).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid code");
        let err = svc.verify_code(EMAIL, &format!("0{}", code)).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid code");

        svc.verify_code(EMAIL, &format!(" {} ", code)).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_code_is_deleted() {
        let (svc, store, _) = service();
        store
            .replace_verification_code(VerificationCode {
                email: EMAIL.into(),
                code: 123456,
                expires_at: Utc::now().timestamp_millis() - 1,
            })
            .await
            .unwrap();

        let err = svc.verify_code(EMAIL, "123456").await.unwrap_err();
        assert_eq!(err.to_string(), "code expired");
        assert!(store.find_verification_code(EMAIL).await.unwrap().is_none());

        let err = svc.verify_code(EMAIL, "123456").await.unwrap_err();
        assert_eq!(err.to_string(), "no code sent");
    }
}
