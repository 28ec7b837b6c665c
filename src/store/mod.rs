//! History of captioned images.

pub mod memory;
pub mod planetscale;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::constants::HISTORY_LIMIT;

pub use memory::InMemoryHistoryStore;
pub use planetscale::PlanetScaleHistoryStore;

/// A persisted, immutable history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    #[serde(alias = "_id")]
    pub id: String,
    pub image_data: String,
    pub caption: Option<String>,
    pub style: String,
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Body of a save request. Absent fields are left out of the JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHistoryRecord {
    #[serde(default)]
    pub image_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Image data is required")]
    MissingImageData,

    #[error("History store error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Persists a record and returns its id.
    async fn save(&self, record: NewHistoryRecord) -> Result<String, StoreError>;

    /// Newest records first, never more than `HISTORY_LIMIT`.
    async fn list(&self, limit: usize) -> Result<Vec<HistoryRecord>, StoreError>;
}

pub fn effective_limit(limit: usize) -> usize {
    limit.min(HISTORY_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_record_omits_absent_fields() {
        let record = NewHistoryRecord {
            image_data: "data:image/png;base64,AAAA".to_string(),
            caption: Some("A cat".to_string()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"imageData": "data:image/png;base64,AAAA", "caption": "A cat"})
        );
    }

    #[test]
    fn test_record_accepts_document_store_id() {
        let record: HistoryRecord = serde_json::from_value(json!({
            "_id": "65f1c0",
            "imageData": "data:image/png;base64,AAAA",
            "caption": null,
            "style": "default",
            "context": null,
            "createdAt": "2026-10-18T08:30:00Z"
        }))
        .unwrap();
        assert_eq!(record.id, "65f1c0");
        assert_eq!(record.caption, None);
    }

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(effective_limit(5), 5);
        assert_eq!(effective_limit(20), 20);
        assert_eq!(effective_limit(500), 20);
    }
}
