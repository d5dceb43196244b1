use crate::config::AppConfig;
use clap::Parser;
use std::path::PathBuf;

/// 対戦型ジオゲッサーサーバー
#[derive(Debug, Parser)]
#[command(name = "geoguess-versus", version, about = "Head-to-head geography guessing game server")]
pub struct Cli {
    /// 設定ファイル（YAML）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// デバッグログを有効化
    #[arg(short, long)]
    pub verbose: bool,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long)]
    pub database_url: Option<String>,

    /// 起動時に投入する地点データ（JSON）
    #[arg(long)]
    pub seed_file: Option<PathBuf>,
}

impl Cli {
    /// コマンドライン指定で設定を上書き
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(url) = &self.database_url {
            config.database_url = url.clone();
        }
        if let Some(seed) = &self.seed_file {
            config.seed_file = Some(seed.clone());
        }
    }
}
