//! Attachment record enumeration.

use chrono::{DateTime, Utc};
use tokio_rusqlite::Connection;
use tracing::warn;

use crate::attachments::metadata::{AttachmentMetadata, AttachmentRecord};
use crate::core::StoreFuture;
use crate::core::config::StorageConfig;
use crate::core::errors::CoachResult;

/// Source of attachment records for the retention sweep.
pub trait AttachmentSource: Send + Sync {
    /// Every attachment record. Malformed rows are skipped.
    ///
    /// # Errors
    /// Returns an error if the records cannot be enumerated.
    fn list_all(&self) -> StoreFuture<'_, CoachResult<Vec<AttachmentRecord>>>;
}

/// `SQLite` attachment table with JSON metadata.
pub struct SqliteAttachmentSource {
    conn: Connection,
    table: String,
}

impl SqliteAttachmentSource {
    /// Open the source at the configured path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn new(config: &StorageConfig) -> CoachResult<Self> {
        let conn = Connection::open(&config.sqlite_path).await?;
        Self::with_connection(conn, config.attachment_table.clone()).await
    }

    /// Open a private in-memory source.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub async fn in_memory() -> CoachResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::with_connection(conn, StorageConfig::default().attachment_table).await
    }

    async fn with_connection(conn: Connection, table: String) -> CoachResult<Self> {
        let table_name = table.clone();
        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    metadata TEXT NOT NULL,
                    uploaded_at INTEGER NOT NULL
                );"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }

    /// Store an attachment record.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert(&self, record: &AttachmentRecord) -> CoachResult<()> {
        let table = self.table.clone();
        let id = record.id.to_string();
        let user_id = record.user_id.to_string();
        let metadata = record.metadata.to_json().to_string();
        let uploaded_at = record.uploaded_at.timestamp_millis();

        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO {table} (id, user_id, metadata, uploaded_at)
                         VALUES (?1, ?2, ?3, ?4)"
                    ),
                    rusqlite::params![id, user_id, metadata, uploaded_at],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    #[cfg(test)]
    async fn insert_raw(&self, id: &str, user_id: &str, metadata: &str) -> CoachResult<()> {
        let table = self.table.clone();
        let values = (id.to_string(), user_id.to_string(), metadata.to_string());
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO {table} (id, user_id, metadata, uploaded_at)
                         VALUES (?1, ?2, ?3, 0)"
                    ),
                    rusqlite::params![values.0, values.1, values.2],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

struct AttachmentRow {
    id: String,
    user_id: String,
    metadata: String,
    uploaded_at: i64,
}

impl AttachmentRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            metadata: row.get(2)?,
            uploaded_at: row.get(3)?,
        })
    }

    fn into_record(self) -> Option<AttachmentRecord> {
        let id = self.id.parse().ok()?;
        let user_id = self.user_id.parse().ok()?;
        let value = serde_json::from_str(&self.metadata).ok()?;
        let metadata = AttachmentMetadata::from_json(&value)?;
        let uploaded_at = DateTime::<Utc>::from_timestamp_millis(self.uploaded_at)?;

        Some(AttachmentRecord {
            id,
            user_id,
            metadata,
            uploaded_at,
        })
    }
}

impl AttachmentSource for SqliteAttachmentSource {
    fn list_all(&self) -> StoreFuture<'_, CoachResult<Vec<AttachmentRecord>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT id, user_id, metadata, uploaded_at FROM {table} ORDER BY uploaded_at"
                    ))?;
                    let rows = stmt
                        .query_map([], AttachmentRow::from_row)?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    Ok(rows)
                })
                .await?;

            let mut records = Vec::with_capacity(rows.len());
            for row in rows {
                let id = row.id.clone();
                match row.into_record() {
                    Some(record) => records.push(record),
                    None => warn!(%id, "Skipping malformed attachment record"),
                }
            }
            Ok(records)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::{RecordId, UserId};

    #[tokio::test]
    async fn test_insert_and_list() {
        let source = SqliteAttachmentSource::in_memory().await.unwrap();
        let record = AttachmentRecord {
            id: RecordId::new(),
            user_id: UserId::new(),
            metadata: AttachmentMetadata::new("labs.pdf").with_mime_type("application/pdf"),
            uploaded_at: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
        };
        source.insert(&record).await.unwrap();

        assert_eq!(source.list_all().await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_malformed_rows_are_skipped() {
        let source = SqliteAttachmentSource::in_memory().await.unwrap();
        let user = UserId::new().to_string();
        source
            .insert_raw(&RecordId::new().to_string(), &user, "not json")
            .await
            .unwrap();
        source
            .insert_raw(&RecordId::new().to_string(), &user, r#"{"mimeType":"image/png"}"#)
            .await
            .unwrap();
        source
            .insert_raw("not-a-uuid", &user, r#"{"filename":"a.png"}"#)
            .await
            .unwrap();
        source
            .insert_raw(&RecordId::new().to_string(), &user, r#"{"filename":"ok.png"}"#)
            .await
            .unwrap();

        let records = source.list_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].metadata.filename, "ok.png");
    }
}
