use crate::game::manager::{GameManager, GetStats, InspectSession};
use actix::Addr;
use actix_web::{HttpResponse, Responder, web};
use serde_json::json;
use tracing::{debug, error};

/// GET /api/health
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// GET /api/stats - キュー・マッチ・接続数
pub async fn stats(game_manager: web::Data<Addr<GameManager>>) -> impl Responder {
    match game_manager.send(GetStats).await {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(e) => {
            error!("❌ Failed to collect stats: {}", e);
            HttpResponse::ServiceUnavailable().json(json!({ "error": "Game server unavailable" }))
        }
    }
}

/// GET /api/sessions/{session_id} - セッションから見たマッチ状態
pub async fn session_snapshot(
    game_manager: web::Data<Addr<GameManager>>,
    path: web::Path<String>,
) -> impl Responder {
    let session_id = path.into_inner();
    debug!("📥 GET /api/sessions/{}", session_id);

    match game_manager.send(InspectSession { session_id }).await {
        Ok(Some(snapshot)) => HttpResponse::Ok().json(snapshot),
        Ok(None) => HttpResponse::NotFound().json(json!({ "error": "Session not found" })),
        Err(e) => {
            error!("❌ Failed to inspect session: {}", e);
            HttpResponse::ServiceUnavailable().json(json!({ "error": "Game server unavailable" }))
        }
    }
}
