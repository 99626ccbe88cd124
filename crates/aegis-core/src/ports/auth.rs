//! Authentication port.

use async_trait::async_trait;

use crate::domain::Principal;

/// Validates a caller's bearer credential.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolve a credential to the principal it belongs to.
    async fn authenticate(&self, credential: &str) -> Result<Principal, AuthError>;
}

/// Authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingCredential,

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Credential expired")]
    Expired,

    #[error("Authentication backend error: {0}")]
    Backend(String),
}
