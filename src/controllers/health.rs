use actix_web::{web, HttpResponse, Responder};

use crate::AppState;

/// Version from Cargo.toml, available at compile time
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health_check)));
    cfg.service(web::resource("/version").route(web::get().to(get_version)));
}

/// Ping both stores; 503 with the failing store's error on any miss
async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    if let Err(e) = state.db.ping().await {
        return unhealthy(format!("metadata store: {}", e));
    }
    if let Err(e) = state.vector.ping().await {
        return unhealthy(format!("vector index: {}", e));
    }
    HttpResponse::Ok().json(serde_json::json!({ "ok": true }))
}

fn unhealthy(error: String) -> HttpResponse {
    log::error!("Health check failed: {}", error);
    HttpResponse::ServiceUnavailable().json(serde_json::json!({
        "ok": false,
        "error": error
    }))
}

async fn get_version() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "version": VERSION
    }))
}
