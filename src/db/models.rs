use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

/// 正解地点（写真と座標）
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub id: String,
    pub photo_ref: String,
    pub x: f64,
    pub y: f64,
    pub approved: bool,
}

impl Location {
    /// 新規地点を作成（承認済み）
    pub fn new(photo_ref: String, x: f64, y: f64) -> Self {
        Self {
            id: photo_ref.clone(),
            photo_ref,
            x,
            y,
            approved: true,
        }
    }

    /// 地点を挿入（同じIDは無視）
    pub async fn insert(&self, pool: &SqlitePool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO locations (id, photo_ref, x, y, approved)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&self.id)
        .bind(&self.photo_ref)
        .bind(self.x)
        .bind(self.y)
        .bind(self.approved)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 承認済み地点をランダムに1件取得
    pub async fn find_random_approved(pool: &SqlitePool) -> Result<Option<Location>, sqlx::Error> {
        sqlx::query_as::<_, Location>(
            "SELECT id, photo_ref, x, y, approved FROM locations WHERE approved = 1 ORDER BY RANDOM() LIMIT 1",
        )
        .fetch_optional(pool)
        .await
    }

    pub async fn count_approved(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM locations WHERE approved = 1")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}
