//! Expense Tracker Authentication
//!
//! Account and session subsystem for the expense tracker:
//! - Gmail address verification with six digit one-time codes
//! - Signup and login with Argon2id password hashing
//! - Dual JWT sessions (15 minute access, 7 day refresh) carried in cookies
//! - Silent access token renewal from a stored refresh token
//! - Room creation and emailed, single-use room invitations
//!
//! # Configuration
//!
//! All configuration is loaded from environment variables:
//! - `ACCESS_TOKEN_SECRET` - HMAC key for access tokens (required, min 32 chars)
//! - `REFRESH_TOKEN_SECRET` - HMAC key for refresh tokens (required, min 32 chars)
//! - `INVITE_TOKEN_SECRET` - Key for invite token digests
//! - `DATABASE_URL` - PostgreSQL connection string (required unless `STORE=memory`)
//! - `MAIL_API_URL` - Mail relay endpoint (unset logs mail instead of sending)
//!
//! # Usage
//!
//! ```rust,ignore
//! use expense_auth::{create_routes, AppState, AuthConfig, MemoryStore, LogMailer};
//!
//! let state = AppState::new(Arc::new(MemoryStore::new()), Arc::new(LogMailer), AuthConfig::from_env()?);
//! let app = create_routes(state);
//! ```

pub mod config;
pub mod cookies;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod invitation;
pub mod mailer;
pub mod middleware;
pub mod models;
pub mod service;
pub mod store;
pub mod tokens;
pub mod verification;

// Re-export commonly used types
pub use config::{AuthConfig, MailConfig, ServerConfig, StoreKind};
pub use error::AuthError;
pub use extractors::{AuthUser, ValidatedJson};
pub use handlers::{create_routes, AppState};
pub use invitation::InvitationService;
pub use mailer::{HttpMailer, LogMailer, Mailer};
pub use models::*;
pub use service::AuthService;
pub use store::{CredentialStore, MemoryStore, PgStore};
pub use tokens::{TokenError, TokenIssuer};
pub use verification::VerificationService;
