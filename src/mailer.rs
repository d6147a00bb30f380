//! Email Dispatch
//!
//! The service only ever needs `send(to, subject, html)`. Delivery goes
//! through an HTTP mail relay when one is configured, otherwise messages are
//! written to the log so local development works without credentials.

use crate::config::MailConfig;

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Email delivery failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum MailError {
    #[error("mail relay request failed: {0}")]
    Transport(String),

    #[error("mail relay rejected message with status {0}")]
    Rejected(u16),
}

/// Outbound email transport
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), MailError>;
}

/// Delivers mail by POSTing JSON to a relay API
pub struct HttpMailer {
    http: Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(api_url: String, api_key: Option<String>, from: String) -> Result<Self, MailError> {
        let http = Client::builder()
            .user_agent("expense-auth")
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| MailError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_url,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), MailError> {
        let mut request = self.http.post(&self.api_url).json(&serde_json::json!({
            "from": self.from,
            "to": [to],
            "subject": subject,
            "html": html,
        }));

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MailError::Rejected(response.status().as_u16()));
        }

        tracing::debug!(to = %to, subject = %subject, "Email handed to relay");
        Ok(())
    }
}

/// Logs messages instead of sending them
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), MailError> {
        tracing::info!(to = %to, subject = %subject, body = %html, "Email delivery disabled, logging message");
        Ok(())
    }
}

/// Build the configured mailer
pub fn from_config(config: &MailConfig) -> Result<Box<dyn Mailer>, MailError> {
    match &config.api_url {
        Some(url) => Ok(Box::new(HttpMailer::new(
            url.clone(),
            config.api_key.clone(),
            config.from.clone(),
        )?)),
        None => {
            tracing::warn!("MAIL_API_URL not set; emails will only be logged");
            Ok(Box::new(LogMailer))
        }
    }
}

// ============================================
// Templates
// ============================================

pub fn verification_email(code: i32, expires_in_minutes: i64) -> (String, String) {
    (
        "Your Verification Code".to_string(),
        format!(
            "<p>Your verification code is:</p>\n<h2>{}</h2>\n<p>This code expires in {} minutes.</p>",
            code, expires_in_minutes
        ),
    )
}

pub fn invite_email(invite_link: &str, expires_in_hours: i64) -> (String, String) {
    (
        "You're Invited!".to_string(),
        format!(
            "<p>Hello,</p>\n\
             <p>You've been invited to join <b>Expense Tracker</b>.</p>\n\
             <p>Click the link below to accept your invite:</p>\n\
             <a href=\"{link}\" target=\"_blank\">{link}</a>\n\
             <p>This link will expire in {hours} hours.</p>",
            link = invite_link,
            hours = expires_in_hours
        ),
    )
}
