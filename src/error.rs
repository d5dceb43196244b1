use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// ゲーム進行中の失敗（呼び出し元に返す。プロセスは落とさない）
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameError {
    #[error("Partner not found")]
    PartnerNotFound,

    #[error("No active round")]
    NoActiveRound,

    #[error("Guess already submitted for this round")]
    AlreadySubmitted,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Match is still in progress")]
    MatchInProgress,

    #[error("Game session not found")]
    MatchNotFound,

    #[error("Game has not started yet")]
    MatchNotStarted,
}

/// 正解地点ストアのエラー
#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("failed to read seed file {path}: {source}")]
    SeedRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse seed file {path}: {source}")]
    SeedParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// 設定読み込みエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
