use actix::Actor;
use actix_web::{App, HttpServer, middleware, web};
use clap::Parser;
use geoguess_versus::cli::Cli;
use geoguess_versus::config::AppConfig;
use geoguess_versus::db::{SqlitePhotoSource, init_db, load_seed_locations, models::Location};
use geoguess_versus::game::GameManager;
use geoguess_versus::handlers::configure_routes;
use std::io;
use std::sync::Arc;
use tracing::{info, warn};

fn setup_logging(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    info!("🎮 Starting geoguess versus server...");

    // 設定読み込み（CLI指定が優先）
    let mut config = AppConfig::load(cli.config.as_deref()).map_err(io::Error::other)?;
    cli.apply(&mut config);

    // データベース初期化
    let db_pool = init_db(&config.database_url).await.map_err(io::Error::other)?;
    if let Some(seed_file) = &config.seed_file {
        load_seed_locations(&db_pool, seed_file)
            .await
            .map_err(io::Error::other)?;
    }
    match Location::count_approved(&db_pool).await {
        Ok(0) => warn!("⚠️ No approved locations yet, rounds will fail until some are added"),
        Ok(count) => info!("🗺️ {} approved locations available", count),
        Err(e) => warn!("⚠️ Failed to count locations: {}", e),
    }

    // ゲームマネージャーアクター起動
    let photos = Arc::new(SqlitePhotoSource::new(db_pool));
    let game_manager = GameManager::new(photos, config.game.clone()).start();

    let (host, port) = config.bind_addr();
    info!("✅ Server initialized");
    info!("🌐 Listening on http://{}:{}", host, port);

    // HTTPサーバー起動
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(web::Data::new(game_manager.clone()))
            .configure(configure_routes)
    })
    .bind((host, port))?
    .run()
    .await
}
