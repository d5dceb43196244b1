pub mod stats;
pub mod websocket;

pub use stats::{health, session_snapshot, stats};
pub use websocket::ws_handler;

use actix_web::web;

/// ルーティング（main とテストで共有）
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/health", web::get().to(health))
        .route("/api/stats", web::get().to(stats))
        .route("/api/sessions/{session_id}", web::get().to(session_snapshot))
        .route("/ws", web::get().to(ws_handler));
}
