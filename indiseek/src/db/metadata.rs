use super::{SqlDb, StoreResult};

pub const LAST_INDEX_AT: &str = "last_index_at";

pub async fn get(db: &SqlDb, key: &str) -> StoreResult<Option<String>> {
    Ok(
        sqlx::query_scalar("SELECT value FROM metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(db.as_ref())
            .await?,
    )
}

pub async fn set(db: &SqlDb, key: &str, value: &str) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO metadata (key, value) VALUES (?, ?)
         ON CONFLICT (key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(db.as_ref())
    .await?;
    Ok(())
}

/// Every index mutation bumps this; the query cache compares completion
/// times against it to wholesale-invalidate stale answers.
pub async fn touch_last_index(db: &SqlDb) -> StoreResult<()> {
    set(db, LAST_INDEX_AT, &chrono::Utc::now().to_rfc3339()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::test_db;

    #[tokio::test]
    async fn touch_overwrites_previous_value() {
        let db = test_db().await;
        set(&db, LAST_INDEX_AT, "2024-01-01T00:00:00Z").await.unwrap();
        touch_last_index(&db).await.unwrap();
        let value = get(&db, LAST_INDEX_AT).await.unwrap().unwrap();
        assert_ne!(value, "2024-01-01T00:00:00Z");
    }
}
