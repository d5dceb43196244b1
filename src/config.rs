//! サーバー設定
//!
//! YAMLファイルから読み込み、未指定の項目はすべてデフォルト値を使う。

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// カレントディレクトリで自動検出する設定ファイル名
pub const LOCAL_CONFIG_FILE: &str = "geoguess-versus.yml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// 起動時に投入する地点データ（JSON配列）
    #[serde(default)]
    pub seed_file: Option<PathBuf>,

    #[serde(default)]
    pub game: GameConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// ゲーム進行パラメータ
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameConfig {
    /// 1マッチのラウンド数
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// ラウンド終了から次ラウンド開始までの待ち時間（結果表示用）
    #[serde(default = "default_next_round_delay_ms")]
    pub next_round_delay_ms: u64,

    /// ラウンドロックの保持時間
    #[serde(default = "default_round_lock_ttl_secs")]
    pub round_lock_ttl_secs: u64,

    /// 有効判定の半径（正規化マップ単位）
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,

    #[serde(default = "default_max_points")]
    pub max_points: u32,

    /// timedモードで先に回答したプレイヤーへのボーナス上限
    #[serde(default = "default_timed_bonus_max")]
    pub timed_bonus_max: u32,

    /// timedモードのボーナス減衰時間
    #[serde(default = "default_timed_window_ms")]
    pub timed_window_ms: u64,

    /// 両者切断後、マッチを破棄するまでの猶予
    #[serde(default = "default_abandon_after_secs")]
    pub abandon_after_secs: u64,

    /// 最終ラウンド後、再戦の受付を続ける時間
    #[serde(default = "default_rematch_window_secs")]
    pub rematch_window_secs: u64,

    #[serde(default = "default_modifier")]
    pub default_modifier: String,
}

fn default_database_url() -> String {
    "sqlite://data/locations.db".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_rounds() -> u32 {
    5
}

fn default_next_round_delay_ms() -> u64 {
    3000
}

fn default_round_lock_ttl_secs() -> u64 {
    300
}

fn default_score_threshold() -> f64 {
    0.1
}

fn default_max_points() -> u32 {
    1000
}

fn default_timed_bonus_max() -> u32 {
    500
}

fn default_timed_window_ms() -> u64 {
    15_000
}

fn default_abandon_after_secs() -> u64 {
    60
}

fn default_rematch_window_secs() -> u64 {
    60
}

fn default_modifier() -> String {
    "default".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database_url: default_database_url(),
            seed_file: None,
            game: GameConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            next_round_delay_ms: default_next_round_delay_ms(),
            round_lock_ttl_secs: default_round_lock_ttl_secs(),
            score_threshold: default_score_threshold(),
            max_points: default_max_points(),
            timed_bonus_max: default_timed_bonus_max(),
            timed_window_ms: default_timed_window_ms(),
            abandon_after_secs: default_abandon_after_secs(),
            rematch_window_secs: default_rematch_window_secs(),
            default_modifier: default_modifier(),
        }
    }
}

impl GameConfig {
    pub fn next_round_delay(&self) -> Duration {
        Duration::from_millis(self.next_round_delay_ms)
    }

    pub fn round_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.round_lock_ttl_secs)
    }

    pub fn rematch_window(&self) -> Duration {
        Duration::from_secs(self.rematch_window_secs)
    }

    pub fn abandon_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.abandon_after_secs as i64)
    }

    pub fn timed_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.timed_window_ms as i64)
    }
}

impl AppConfig {
    /// 設定を読み込む
    /// - パス指定あり: そのファイル（失敗はエラー）
    /// - なし: カレントの `geoguess-versus.yml` → デフォルト
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => warn!("⚠️  {}", e),
            }
        }

        info!("📄 No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("📄 Loaded config from: {}", path.display());
        Ok(config)
    }

    pub fn bind_addr(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_game_rules() {
        let config = AppConfig::default();
        assert_eq!(config.game.max_rounds, 5);
        assert_eq!(config.game.next_round_delay(), Duration::from_secs(3));
        assert_eq!(config.game.round_lock_ttl(), Duration::from_secs(300));
        assert_eq!(config.game.score_threshold, 0.1);
        assert_eq!(config.game.rematch_window(), Duration::from_secs(60));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server:\n  port: 9000\ngame:\n  max_rounds: 3").unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.game.max_rounds, 3);
        assert_eq!(config.game.max_points, 1000);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/geoguess.yml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "game: [not, a, map").unwrap();
        let result = AppConfig::load(Some(file.path()));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
