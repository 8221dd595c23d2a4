use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde_json::Value;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Component, Path, PathBuf},
    str::FromStr,
};

use shared::domain::{record_id, EntityId, EntityKind};

mod objects;

pub use objects::{normalize_object_path, FsObjectStore};

/// SQLite-backed store holding every data API collection as JSON documents
/// keyed by `(collection, id)`.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// One page of a collection scan in ascending id order.
#[derive(Debug, Clone, Default)]
pub struct RecordPage {
    pub records: Vec<Value>,
    /// Id of the last returned record when more records follow it.
    pub last_id: Option<EntityId>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // every connection to sqlite::memory: opens a separate database
        let pool_options = if database_url.starts_with("sqlite::memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn list_records(
        &self,
        kind: EntityKind,
        limit: u32,
        after: Option<EntityId>,
    ) -> Result<RecordPage> {
        let limit = i64::from(limit.max(1));
        let rows = sqlx::query(
            "SELECT id, body FROM records
             WHERE collection = ? AND id > ?
             ORDER BY id ASC
             LIMIT ?",
        )
        .bind(kind.collection_name())
        .bind(after.map(|id| id.0).unwrap_or(i64::MIN))
        .bind(limit + 1)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to list {kind} records"))?;

        let has_more = rows.len() as i64 > limit;
        let mut records = Vec::with_capacity(rows.len());
        let mut last_id = None;
        for row in rows.into_iter().take(limit as usize) {
            let id: i64 = row.try_get("id")?;
            let body: String = row.try_get("body")?;
            records.push(decode_body(kind, id, &body)?);
            last_id = Some(EntityId(id));
        }

        Ok(RecordPage {
            records,
            last_id: if has_more { last_id } else { None },
        })
    }

    pub async fn get_record(&self, kind: EntityKind, id: EntityId) -> Result<Option<Value>> {
        let row = sqlx::query("SELECT body FROM records WHERE collection = ? AND id = ?")
            .bind(kind.collection_name())
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| decode_body(kind, id.0, &r.get::<String, _>(0)))
            .transpose()
    }

    /// Stores a new record. A requested id is honoured when it is free;
    /// otherwise the next id after the collection maximum is assigned. The
    /// stored record is returned with its final id.
    pub async fn insert_record(&self, kind: EntityKind, mut record: Value) -> Result<Value> {
        let Some(fields) = record.as_object_mut() else {
            return Err(anyhow!("{kind} record must be a JSON object"));
        };

        let mut tx = self.pool.begin().await?;
        let requested = fields.get("id").and_then(Value::as_i64);
        let taken = match requested {
            Some(id) => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM records WHERE collection = ? AND id = ?",
                )
                .bind(kind.collection_name())
                .bind(id)
                .fetch_one(&mut *tx)
                .await?
                    > 0
            }
            None => true,
        };
        let id = match requested {
            Some(id) if !taken => id,
            _ => {
                let max_id: Option<i64> =
                    sqlx::query_scalar("SELECT MAX(id) FROM records WHERE collection = ?")
                        .bind(kind.collection_name())
                        .fetch_one(&mut *tx)
                        .await?;
                max_id.unwrap_or(0) + 1
            }
        };
        fields.insert("id".to_string(), Value::from(id));

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO records (collection, id, body, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(kind.collection_name())
        .bind(id)
        .bind(serde_json::to_string(&record)?)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to insert {kind} record {id}"))?;
        tx.commit().await?;

        Ok(record)
    }

    /// Replaces the stored body of an existing record. Returns `None` when the
    /// record does not exist.
    pub async fn update_record(&self, kind: EntityKind, mut record: Value) -> Result<Option<Value>> {
        let id = record_id(&record).ok_or_else(|| anyhow!("{kind} record is missing an id"))?;
        if let Some(fields) = record.as_object_mut() {
            fields.insert("id".to_string(), Value::from(id.0));
        }

        let result = sqlx::query(
            "UPDATE records SET body = ?, updated_at = ? WHERE collection = ? AND id = ?",
        )
        .bind(serde_json::to_string(&record)?)
        .bind(Utc::now().to_rfc3339())
        .bind(kind.collection_name())
        .bind(id.0)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to update {kind} record {id}"))?;

        Ok((result.rows_affected() > 0).then_some(record))
    }

    /// Deletes a record, returning the removed body if it existed.
    pub async fn delete_record(&self, kind: EntityKind, id: EntityId) -> Result<Option<Value>> {
        let row = sqlx::query("DELETE FROM records WHERE collection = ? AND id = ? RETURNING body")
            .bind(kind.collection_name())
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to delete {kind} record {id}"))?;
        row.map(|r| decode_body(kind, id.0, &r.get::<String, _>(0)))
            .transpose()
    }

    pub async fn count_records(&self, kind: EntityKind) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(kind.collection_name())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn decode_body(kind: EntityKind, id: i64, body: &str) -> Result<Value> {
    serde_json::from_str(body)
        .with_context(|| format!("stored {kind} record {id} is not valid JSON"))
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.components().all(|c| matches!(c, Component::CurDir)) {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
