//! Health record persistence.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_rusqlite::Connection;
use tracing::warn;

use crate::core::StoreFuture;
use crate::core::config::StorageConfig;
use crate::core::errors::CoachResult;
use crate::core::ids::UserId;
use crate::nutrition::types::HealthRecord;

/// Health record store trait.
pub trait HealthRecordStore: Send + Sync {
    /// Persist a record.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn insert(&self, record: HealthRecord) -> StoreFuture<'_, CoachResult<()>>;

    /// Records of `user_id` in `category` with `start <= timestamp <= end`,
    /// oldest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn records_between(
        &self,
        user_id: UserId,
        category: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreFuture<'_, CoachResult<Vec<HealthRecord>>>;
}

/// `SQLite` implementation of the health record store.
pub struct SqliteHealthRecordStore {
    conn: Connection,
    table: String,
}

impl SqliteHealthRecordStore {
    /// Open the store at the configured path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn new(config: &StorageConfig) -> CoachResult<Self> {
        let conn = Connection::open(&config.sqlite_path).await?;
        Self::with_connection(conn, config.health_table.clone()).await
    }

    /// Open a private in-memory store.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub async fn in_memory() -> CoachResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::with_connection(conn, StorageConfig::default().health_table).await
    }

    async fn with_connection(conn: Connection, table: String) -> CoachResult<Self> {
        let table_name = table.clone();
        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    category TEXT NOT NULL,
                    data_type TEXT NOT NULL,
                    timestamp INTEGER NOT NULL,
                    value TEXT NOT NULL,
                    metadata TEXT NOT NULL DEFAULT '{{}}'
                );
                CREATE INDEX IF NOT EXISTS idx_{table_name}_user_category_time
                    ON {table_name} (user_id, category, timestamp);"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }
}

struct HealthRow {
    id: String,
    user_id: String,
    category: String,
    data_type: String,
    timestamp: i64,
    value: String,
    metadata: String,
}

impl HealthRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            category: row.get(2)?,
            data_type: row.get(3)?,
            timestamp: row.get(4)?,
            value: row.get(5)?,
            metadata: row.get(6)?,
        })
    }

    fn into_record(self) -> Option<HealthRecord> {
        Some(HealthRecord {
            id: self.id.parse().ok()?,
            user_id: self.user_id.parse().ok()?,
            category: self.category,
            data_type: self.data_type,
            timestamp: DateTime::<Utc>::from_timestamp_millis(self.timestamp)?,
            value: self.value,
            metadata: serde_json::from_str(&self.metadata).unwrap_or(Value::Null),
        })
    }
}

impl HealthRecordStore for SqliteHealthRecordStore {
    fn insert(&self, record: HealthRecord) -> StoreFuture<'_, CoachResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            let metadata = serde_json::to_string(&record.metadata)?;

            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT INTO {table}
                            (id, user_id, category, data_type, timestamp, value, metadata)
                            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                        ),
                        rusqlite::params![
                            record.id.to_string(),
                            record.user_id.to_string(),
                            record.category,
                            record.data_type,
                            record.timestamp.timestamp_millis(),
                            record.value,
                            metadata,
                        ],
                    )?;
                    Ok(())
                })
                .await?;

            Ok(())
        })
    }

    fn records_between(
        &self,
        user_id: UserId,
        category: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreFuture<'_, CoachResult<Vec<HealthRecord>>> {
        let category = category.to_string();
        Box::pin(async move {
            let table = self.table.clone();
            let user_id_str = user_id.to_string();
            let start_ms = start.timestamp_millis();
            let end_ms = end.timestamp_millis();

            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT id, user_id, category, data_type, timestamp, value, metadata
                         FROM {table}
                         WHERE user_id = ?1 AND category = ?2 AND timestamp BETWEEN ?3 AND ?4
                         ORDER BY timestamp"
                    ))?;
                    let rows = stmt
                        .query_map(
                            rusqlite::params![user_id_str, category, start_ms, end_ms],
                            HealthRow::from_row,
                        )?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    Ok(rows)
                })
                .await?;

            let mut records = Vec::with_capacity(rows.len());
            for row in rows {
                let id = row.id.clone();
                match row.into_record() {
                    Some(record) => records.push(record),
                    None => warn!(%id, "Skipping malformed health record"),
                }
            }
            Ok(records)
        })
    }
}
