use serde::{Deserialize, Serialize};

/// Authenticated identity attached to a request once the auth gate has passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Stable identifier, used for rate-limit bucketing.
    pub id: String,
    /// Display name for logs.
    pub name: String,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
        }
    }
}
