//! Static API key authentication.

use std::collections::HashMap;

use async_trait::async_trait;

use aegis_core::domain::Principal;
use aegis_core::ports::{AuthError, Authenticator};

/// Authenticates bearer tokens against a fixed set of API keys.
pub struct ApiKeyAuthenticator {
    keys: HashMap<String, Principal>,
}

impl ApiKeyAuthenticator {
    pub fn new(keys: impl IntoIterator<Item = (String, Principal)>) -> Self {
        let keys: HashMap<_, _> = keys.into_iter().collect();
        if keys.is_empty() {
            tracing::warn!("No API keys configured - every request will be rejected");
        }
        Self { keys }
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, credential: &str) -> Result<Principal, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        self.keys
            .get(credential)
            .cloned()
            .ok_or_else(|| AuthError::InvalidCredential("Unknown API key".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> ApiKeyAuthenticator {
        ApiKeyAuthenticator::new([
            ("sk-alpha".to_string(), Principal::new("alpha")),
            ("sk-beta".to_string(), Principal::new("beta")),
        ])
    }

    #[tokio::test]
    async fn test_known_key_resolves_principal() {
        let principal = authenticator().authenticate("sk-beta").await.unwrap();
        assert_eq!(principal.id, "beta");
    }

    #[tokio::test]
    async fn test_unknown_key_rejected() {
        let result = authenticator().authenticate("sk-gamma").await;
        assert!(matches!(result, Err(AuthError::InvalidCredential(_))));
    }

    #[tokio::test]
    async fn test_empty_key_is_missing() {
        let result = authenticator().authenticate("").await;
        assert!(matches!(result, Err(AuthError::MissingCredential)));
    }
}
