use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Internal catalog entry for a model that usage can be booked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: Uuid,
    /// Human-readable model name, as sent by callers (e.g. `gpt-4o`).
    pub name: String,
    pub provider: String,
}

impl ModelRecord {
    pub fn new(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            provider: provider.into(),
        }
    }
}

/// One entry of a backend's model listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub id: String,
    #[serde(default = "model_object")]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub owned_by: String,
}

fn model_object() -> String {
    "model".to_string()
}

/// Full description of one model. Fields the gateway does not know about
/// are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDetail {
    #[serde(flatten)]
    pub summary: ModelSummary,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl From<ModelSummary> for ModelDetail {
    fn from(summary: ModelSummary) -> Self {
        Self {
            summary,
            extra: serde_json::Map::new(),
        }
    }
}
