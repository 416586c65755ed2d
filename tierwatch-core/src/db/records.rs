//! Labeled record store over sqlx
//!
//! Table `classified_messages` holds operator-labeled messages. `trained` and
//! `checked` are tri-state (NULL, 0, 1); NULL and 0 both mean "not consumed".

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tierwatch_common::Result;

use crate::models::{RecordId, RemoteRecord, Tier};
use crate::services::record_source::RecordSource;
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Ids bound per UPDATE statement (SQLite host parameter limit is 999 on old builds)
const MARK_CHUNK: usize = 500;

/// Record source backed by a sqlx pool
#[derive(Clone)]
pub struct SqlRecordSource {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqlRecordSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_max_lock_wait_ms(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a labeled message with `trained`/`checked` left NULL
    pub async fn insert_labeled(&self, text: &str, classification: &str) -> Result<RecordId> {
        let id = sqlx::query("INSERT INTO classified_messages (text, classification) VALUES (?, ?)")
            .bind(text)
            .bind(classification)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(RecordId(id))
    }

    /// Current `(trained, checked)` flags for one record
    pub async fn flags(&self, id: RecordId) -> Result<Option<(Option<bool>, Option<bool>)>> {
        let row = sqlx::query("SELECT trained, checked FROM classified_messages WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<_> { Ok((row.try_get("trained")?, row.try_get("checked")?)) })
            .transpose()
    }
}

fn known_labels_sql() -> String {
    Tier::ALL
        .iter()
        .map(|tier| format!("'{}'", tier.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl RecordSource for SqlRecordSource {
    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS classified_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                text TEXT,
                classification TEXT,
                trained BOOLEAN NULL,
                checked BOOLEAN NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Tables created by older writers may predate the bookkeeping columns
        let columns: Vec<String> = sqlx::query("PRAGMA table_info(classified_messages)")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<std::result::Result<_, _>>()?;

        for column in ["trained", "checked"] {
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                tracing::info!(column, "Adding missing column to classified_messages");
                sqlx::query(&format!(
                    "ALTER TABLE classified_messages ADD COLUMN {column} BOOLEAN NULL"
                ))
                .execute(&self.pool)
                .await?;
            }
        }

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_classified_messages_trained ON classified_messages(trained)",
        )
        .execute(&self.pool)
        .await?;

        tracing::debug!("Record store schema ready");
        Ok(())
    }

    async fn fetch_untrained(&self) -> Result<Vec<RemoteRecord>> {
        let sql = format!(
            r#"
            SELECT id, text, classification, trained, checked
            FROM classified_messages
            WHERE text IS NOT NULL
              AND (trained IS NULL OR trained = 0)
              AND LOWER(TRIM(classification)) IN ({})
            ORDER BY id
            "#,
            known_labels_sql()
        );

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let records = rows
            .iter()
            .map(|row| -> Result<RemoteRecord> {
                Ok(RemoteRecord {
                    id: RecordId(row.try_get("id")?),
                    text: row.try_get("text")?,
                    label: row.try_get("classification")?,
                    trained: row.try_get("trained")?,
                    checked: row.try_get("checked")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(count = records.len(), "Fetched untrained records");
        Ok(records)
    }

    async fn mark_trained(&self, ids: &[RecordId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let raw: Vec<i64> = ids.iter().map(|id| id.0).collect();

        retry_on_lock("mark_trained", self.max_lock_wait_ms, || {
            let pool = self.pool.clone();
            let raw = raw.clone();
            async move {
                let mut tx = pool.begin().await?;
                for chunk in raw.chunks(MARK_CHUNK) {
                    let placeholders = vec!["?"; chunk.len()].join(", ");
                    let sql = format!(
                        "UPDATE classified_messages SET trained = 1, checked = 1 WHERE id IN ({placeholders})"
                    );
                    let mut query = sqlx::query(&sql);
                    for id in chunk {
                        query = query.bind(*id);
                    }
                    query.execute(&mut *tx).await?;
                }
                tx.commit().await?;
                Ok(())
            }
        })
        .await?;

        tracing::info!(count = ids.len(), "Marked records as trained");
        Ok(())
    }

    async fn count_untrained(&self) -> Result<u64> {
        let sql = format!(
            r#"
            SELECT COUNT(*) FROM classified_messages
            WHERE text IS NOT NULL
              AND (trained IS NULL OR trained = 0)
              AND LOWER(TRIM(classification)) IN ({})
            "#,
            known_labels_sql()
        );

        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }
}
