pub mod models;

use crate::db::models::Location;
use crate::error::PhotoError;
use async_trait::async_trait;
use serde::Deserialize;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

/// ラウンドに使う正解レコード
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GroundTruth {
    pub photo_ref: String,
    pub x: f64,
    pub y: f64,
}

impl GroundTruth {
    pub fn new(photo_ref: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            photo_ref: photo_ref.into(),
            x,
            y,
        }
    }
}

impl From<Location> for GroundTruth {
    fn from(location: Location) -> Self {
        Self {
            photo_ref: location.photo_ref,
            x: location.x,
            y: location.y,
        }
    }
}

/// 正解地点の取得元
#[async_trait]
pub trait PhotoSource: Send + Sync {
    /// ランダムに1件。登録が無ければ `None`
    async fn fetch_random_ground_truth(&self) -> Result<Option<GroundTruth>, PhotoError>;
}

/// SQLiteの `locations` テーブルから取得
#[derive(Debug, Clone)]
pub struct SqlitePhotoSource {
    pool: SqlitePool,
}

impl SqlitePhotoSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PhotoSource for SqlitePhotoSource {
    async fn fetch_random_ground_truth(&self) -> Result<Option<GroundTruth>, PhotoError> {
        let location = Location::find_random_approved(&self.pool).await?;
        Ok(location.map(GroundTruth::from))
    }
}

/// メモリ上の固定リスト（順番に返す）
#[derive(Debug, Default)]
pub struct StaticPhotoSource {
    records: Vec<GroundTruth>,
    cursor: AtomicUsize,
}

impl StaticPhotoSource {
    pub fn new(records: Vec<GroundTruth>) -> Self {
        Self {
            records,
            cursor: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PhotoSource for StaticPhotoSource {
    async fn fetch_random_ground_truth(&self) -> Result<Option<GroundTruth>, PhotoError> {
        if self.records.is_empty() {
            return Ok(None);
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.records.len();
        Ok(Some(self.records[index].clone()))
    }
}

/// データベース接続プールを初期化
pub async fn init_db(database_url: &str) -> Result<SqlitePool, PhotoError> {
    info!("🗄️  Initializing database: {}", database_url);

    // データベースファイルのディレクトリを作成
    let file_path = database_url.trim_start_matches("sqlite://").trim_start_matches("sqlite:");
    let in_memory = file_path.starts_with(":memory:");
    if !in_memory {
        if let Some(parent) = Path::new(file_path).parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PhotoError::Database(sqlx::Error::Io(e)))?;
        }
    }

    // インメモリDBは接続ごとに別物になるので1本に絞る
    let (url, max_connections) = if in_memory {
        (database_url.to_string(), 1)
    } else if database_url.contains('?') {
        (database_url.to_string(), 5)
    } else {
        (format!("{}?mode=rwc", database_url), 5)
    };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&url)
        .await?;

    // マイグレーション実行
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✅ Database initialized successfully");
    Ok(pool)
}

/// JSONファイルから地点を投入（既存IDはスキップ）
pub async fn load_seed_locations(pool: &SqlitePool, path: &Path) -> Result<usize, PhotoError> {
    info!("🌱 Loading seed locations from {}", path.display());

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| PhotoError::SeedRead {
            path: path.to_path_buf(),
            source,
        })?;
    let seeds: Vec<GroundTruth> = serde_json::from_str(&content).map_err(|source| PhotoError::SeedParse {
        path: path.to_path_buf(),
        source,
    })?;

    let mut inserted = 0;
    for seed in seeds {
        if !(0.0..=1.0).contains(&seed.x) || !(0.0..=1.0).contains(&seed.y) {
            warn!("  ⚠️  {} has out-of-range coordinates, skipping", seed.photo_ref);
            continue;
        }
        if Location::new(seed.photo_ref, seed.x, seed.y).insert(pool).await? {
            inserted += 1;
        }
    }

    info!("✅ Seed locations loaded: {} new", inserted);
    Ok(inserted)
}
