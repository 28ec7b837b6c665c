use async_trait::async_trait;
use chrono::{DateTime, Utc};
use planetscale_driver::{Database, PSConnection, query};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{HistoryRecord, HistoryStore, NewHistoryRecord, StoreError, effective_limit};
use crate::core::caption::non_blank;
use crate::utils::constants::DEFAULT_STYLE;
use crate::utils::hash::generate_record_id;

const CREATE_IMAGES_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS images (
        id VARCHAR(66) NOT NULL PRIMARY KEY,
        image_data LONGTEXT NOT NULL,
        caption TEXT NOT NULL,
        style VARCHAR(32) NOT NULL,
        context TEXT NOT NULL,
        created_at BIGINT UNSIGNED NOT NULL,
        INDEX images_created_at (created_at)
    )";

/// Row shape of the `images` table. Absent caption/context are stored as ''.
#[derive(Debug, Serialize, Deserialize, Database)]
pub struct ImageRow {
    pub id: String,
    pub image_data: String,
    pub caption: String,
    pub style: String,
    pub context: String,
    pub created_at: u64,
}

impl From<ImageRow> for HistoryRecord {
    fn from(row: ImageRow) -> Self {
        HistoryRecord {
            id: row.id,
            image_data: row.image_data,
            caption: non_blank(Some(row.caption.as_str())),
            style: row.style,
            context: non_blank(Some(row.context.as_str())),
            created_at: DateTime::from_timestamp_millis(row.created_at as i64).unwrap_or_default(),
        }
    }
}

#[derive(Clone)]
pub struct PlanetScaleHistoryStore {
    host: String,
    username: String,
    password: String,
}

impl PlanetScaleHistoryStore {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    fn connection(&self) -> PSConnection {
        PSConnection::new(&self.host, &self.username, &self.password)
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let conn = self.connection();
        query(CREATE_IMAGES_TABLE)
            .execute(&conn)
            .await
            .map_err(backend_error)?;
        info!(host = %self.host, "images table ready");
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for PlanetScaleHistoryStore {
    async fn save(&self, record: NewHistoryRecord) -> Result<String, StoreError> {
        if record.image_data.trim().is_empty() {
            return Err(StoreError::MissingImageData);
        }

        let id = generate_record_id();
        let query_str = insert_statement(&id, &record, Utc::now().timestamp_millis() as u64);

        let conn = self.connection();
        query(&query_str)
            .execute(&conn)
            .await
            .map_err(backend_error)?;
        debug!(%id, "history record inserted");
        Ok(id)
    }

    async fn list(&self, limit: usize) -> Result<Vec<HistoryRecord>, StoreError> {
        let limit = effective_limit(limit);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query_str = format!(
            "SELECT id, image_data, caption, style, context, created_at FROM images ORDER BY created_at DESC LIMIT {}",
            limit
        );
        let conn = self.connection();
        let rows: Vec<ImageRow> = query(&query_str)
            .fetch_all(&conn)
            .await
            .map_err(backend_error)?;

        Ok(rows.into_iter().map(HistoryRecord::from).collect())
    }
}

fn insert_statement(id: &str, record: &NewHistoryRecord, created_at: u64) -> String {
    let style = non_blank(record.style.as_deref()).unwrap_or_else(|| DEFAULT_STYLE.to_string());
    format!(
        "INSERT INTO images(id, image_data, caption, style, context, created_at) VALUES({}, {}, {}, {}, {}, {})",
        sql_string(id),
        sql_string(&record.image_data),
        sql_string(&non_blank(record.caption.as_deref()).unwrap_or_default()),
        sql_string(&style),
        sql_string(&non_blank(record.context.as_deref()).unwrap_or_default()),
        created_at
    )
}

/// Quotes a value as a MySQL string literal.
fn sql_string(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        match c {
            '\'' => quoted.push_str("''"),
            '\\' => quoted.push_str("\\\\"),
            '\0' => quoted.push_str("\\0"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            _ => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

fn backend_error(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}
