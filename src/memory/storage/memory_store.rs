//! Memory entry persistence.

use chrono::{DateTime, Utc};
use tokio_rusqlite::Connection;
use tracing::warn;

use crate::core::config::StorageConfig;
use crate::core::errors::{CoachError, CoachResult};
use crate::core::ids::{MemoryId, UserId};
use crate::core::StoreFuture;
use crate::memory::core::item::MemoryEntry;
use crate::memory::core::kinds::MemoryCategory;

/// Memory store trait.
pub trait MemoryStore: Send + Sync {
    /// Persist a new entry.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn insert(&self, entry: MemoryEntry) -> StoreFuture<'_, CoachResult<()>>;

    /// Active entries of `user_id` whose content contains `fragment`.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn find_active_containing(
        &self,
        user_id: UserId,
        fragment: &str,
    ) -> StoreFuture<'_, CoachResult<Vec<MemoryEntry>>>;

    /// Active entries of `user_id`, importance descending then newest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn top_active(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> StoreFuture<'_, CoachResult<Vec<MemoryEntry>>>;

    /// Mark an entry inactive. Returns whether a row changed.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn deactivate(&self, id: MemoryId) -> StoreFuture<'_, CoachResult<bool>>;
}

/// `SQLite` implementation of the memory store.
pub struct SqliteMemoryStore {
    conn: Connection,
    table: String,
}

impl SqliteMemoryStore {
    /// Open the store at the configured path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn new(config: &StorageConfig) -> CoachResult<Self> {
        let conn = Connection::open(&config.sqlite_path).await?;
        Self::with_connection(conn, config.memory_table.clone()).await
    }

    /// Open a private in-memory store.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub async fn in_memory() -> CoachResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::with_connection(conn, StorageConfig::default().memory_table).await
    }

    async fn with_connection(conn: Connection, table: String) -> CoachResult<Self> {
        let table_name = table.clone();
        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    content TEXT NOT NULL,
                    category TEXT NOT NULL,
                    importance_score REAL NOT NULL,
                    keywords TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    is_active INTEGER NOT NULL DEFAULT 1
                );
                CREATE INDEX IF NOT EXISTS idx_{table_name}_user_rank
                    ON {table_name} (user_id, is_active, importance_score, created_at);"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }
}

/// Raw row as read from `SQLite`.
struct MemoryRow {
    id: String,
    user_id: String,
    content: String,
    category: String,
    importance_score: f64,
    keywords: String,
    created_at: i64,
    is_active: bool,
}

impl MemoryRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            content: row.get(2)?,
            category: row.get(3)?,
            importance_score: row.get(4)?,
            keywords: row.get(5)?,
            created_at: row.get(6)?,
            is_active: row.get(7)?,
        })
    }
}

impl MemoryRow {
    fn into_entry(self) -> CoachResult<MemoryEntry> {
        let category = self
            .category
            .parse::<MemoryCategory>()
            .map_err(|err| CoachError::InvalidRecord(err.to_string()))?;
        let created_at = DateTime::<Utc>::from_timestamp_millis(self.created_at).ok_or_else(|| {
            CoachError::InvalidRecord(format!("invalid created_at {}", self.created_at))
        })?;

        Ok(MemoryEntry {
            id: self.id.parse()?,
            user_id: self.user_id.parse()?,
            content: self.content,
            category,
            importance_score: self.importance_score,
            keywords: serde_json::from_str(&self.keywords)?,
            created_at,
            is_active: self.is_active,
        })
    }
}

impl SqliteMemoryStore {
    #[cfg(test)]
    async fn insert_raw(&self, id: &str, user_id: &str, category: &str, keywords: &str) -> CoachResult<()> {
        let table = self.table.clone();
        let values = (
            id.to_string(),
            user_id.to_string(),
            category.to_string(),
            keywords.to_string(),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO {table}
                        (id, user_id, content, category, importance_score, keywords, created_at, is_active)
                        VALUES (?1, ?2, 'legacy row', ?3, 0.95, ?4, 0, 1)"
                    ),
                    rusqlite::params![values.0, values.1, values.2, values.3],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

const SELECT_COLUMNS: &str =
    "id, user_id, content, category, importance_score, keywords, created_at, is_active";

fn readable_rows(
    rows: impl Iterator<Item = rusqlite::Result<MemoryRow>>,
) -> Vec<MemoryRow> {
    rows.filter_map(|row| match row {
        Ok(row) => Some(row),
        Err(err) => {
            warn!(error = %err, "Skipping unreadable memory row");
            None
        }
    })
    .collect()
}

fn rows_to_entries(rows: Vec<MemoryRow>) -> Vec<MemoryEntry> {
    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.id.clone();
        match row.into_entry() {
            Ok(entry) => entries.push(entry),
            Err(err) => warn!(%id, error = %err, "Skipping malformed memory"),
        }
    }
    entries
}

impl MemoryStore for SqliteMemoryStore {
    fn insert(&self, entry: MemoryEntry) -> StoreFuture<'_, CoachResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            let keywords = serde_json::to_string(&entry.keywords)?;

            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT INTO {table}
                            (id, user_id, content, category, importance_score, keywords, created_at, is_active)
                            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                        ),
                        rusqlite::params![
                            entry.id.to_string(),
                            entry.user_id.to_string(),
                            entry.content,
                            entry.category.as_str(),
                            entry.importance_score,
                            keywords,
                            entry.created_at.timestamp_millis(),
                            entry.is_active,
                        ],
                    )?;
                    Ok(())
                })
                .await?;

            Ok(())
        })
    }

    fn find_active_containing(
        &self,
        user_id: UserId,
        fragment: &str,
    ) -> StoreFuture<'_, CoachResult<Vec<MemoryEntry>>> {
        let fragment = fragment.to_string();
        Box::pin(async move {
            let table = self.table.clone();
            let user_id_str = user_id.to_string();

            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLUMNS} FROM {table}
                         WHERE user_id = ?1 AND is_active = 1 AND instr(content, ?2) > 0"
                    ))?;
                    let rows = readable_rows(
                        stmt.query_map(rusqlite::params![user_id_str, fragment], MemoryRow::from_row)?,
                    );
                    Ok(rows)
                })
                .await?;

            Ok(rows_to_entries(rows))
        })
    }

    fn top_active(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> StoreFuture<'_, CoachResult<Vec<MemoryEntry>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let user_id_str = user_id.to_string();
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);

            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {SELECT_COLUMNS} FROM {table}
                         WHERE user_id = ?1 AND is_active = 1
                         ORDER BY importance_score DESC, created_at DESC
                         LIMIT ?2"
                    ))?;
                    let rows = readable_rows(
                        stmt.query_map(rusqlite::params![user_id_str, limit], MemoryRow::from_row)?,
                    );
                    Ok(rows)
                })
                .await?;

            Ok(rows_to_entries(rows))
        })
    }

    fn deactivate(&self, id: MemoryId) -> StoreFuture<'_, CoachResult<bool>> {
        Box::pin(async move {
            let table = self.table.clone();
            let id_str = id.to_string();

            let changed = self
                .conn
                .call(move |conn| {
                    let changed = conn.execute(
                        &format!("UPDATE {table} SET is_active = 0 WHERE id = ?1 AND is_active = 1"),
                        rusqlite::params![id_str],
                    )?;
                    Ok(changed)
                })
                .await?;

            Ok(changed > 0)
        })
    }
}
