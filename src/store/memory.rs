use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{HistoryRecord, HistoryStore, NewHistoryRecord, StoreError, effective_limit};
use crate::core::caption::non_blank;
use crate::utils::constants::DEFAULT_STYLE;
use crate::utils::hash::generate_record_id;

/// Process-local history, used when no database is configured and in tests.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    records: RwLock<Vec<HistoryRecord>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_records(records: Vec<HistoryRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn save(&self, record: NewHistoryRecord) -> Result<String, StoreError> {
        if record.image_data.trim().is_empty() {
            return Err(StoreError::MissingImageData);
        }

        let id = generate_record_id();
        let stored = HistoryRecord {
            id: id.clone(),
            image_data: record.image_data,
            caption: non_blank(record.caption.as_deref()),
            style: non_blank(record.style.as_deref()).unwrap_or_else(|| DEFAULT_STYLE.to_string()),
            context: non_blank(record.context.as_deref()),
            created_at: Utc::now(),
        };
        self.records.write().await.push(stored);
        Ok(id)
    }

    async fn list(&self, limit: usize) -> Result<Vec<HistoryRecord>, StoreError> {
        let records = self.records.read().await;
        // later inserts win ties on created_at
        let mut newest_first: Vec<HistoryRecord> = records.iter().rev().cloned().collect();
        newest_first.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        newest_first.truncate(effective_limit(limit));
        Ok(newest_first)
    }
}
