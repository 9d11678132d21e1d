use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// One string-keyed slot of local storage
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LocalStorageEntry {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

impl LocalStorageEntry {
    pub async fn find(pool: &SqlitePool, key: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, LocalStorageEntry>(
            r#"SELECT key, value, updated_at
               FROM local_storage
               WHERE key = $1"#,
        )
        .bind(key)
        .fetch_optional(pool)
        .await
    }

    /// Insert or overwrite the slot stored under `key`.
    pub async fn upsert(pool: &SqlitePool, key: &str, value: &str) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, LocalStorageEntry>(
            r#"INSERT INTO local_storage (key, value, updated_at)
               VALUES ($1, $2, $3)
               ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at
               RETURNING key, value, updated_at"#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DBService;

    #[tokio::test]
    async fn test_find_missing_key_returns_none() {
        let db = DBService::new_in_memory().await.unwrap();
        let entry = LocalStorageEntry::find(&db.pool, "lotfiv1_samples").await.unwrap();
        assert!(entry.is_none());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_existing_value() {
        let db = DBService::new_in_memory().await.unwrap();
        LocalStorageEntry::upsert(&db.pool, "slot", "[]").await.unwrap();
        let updated = LocalStorageEntry::upsert(&db.pool, "slot", r#"[{"id":"1"}]"#)
            .await
            .unwrap();
        assert_eq!(updated.value, r#"[{"id":"1"}]"#);

        let found = LocalStorageEntry::find(&db.pool, "slot").await.unwrap().unwrap();
        assert_eq!(found.value, r#"[{"id":"1"}]"#);
    }
}
