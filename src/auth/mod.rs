//! Identity: sign-up, sign-in and token lookup against an external provider.

pub mod firebase;
pub mod session;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use firebase::FirebaseIdentityProvider;
pub use session::AuthSession;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedIn {
    pub id_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub user: CurrentUser,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication failed: {0}")]
    InvalidCredentials(String),

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Authentication is not configured")]
    NotConfigured,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignedIn, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn, AuthError>;

    /// Exchanges a Google ID token for a session with this provider.
    async fn sign_in_with_google(&self, google_id_token: &str) -> Result<SignedIn, AuthError>;

    /// Resolves an ID token issued by this provider to its user.
    async fn lookup(&self, id_token: &str) -> Result<CurrentUser, AuthError>;
}
