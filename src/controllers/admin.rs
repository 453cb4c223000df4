use actix_web::{web, HttpResponse};

use crate::error::ApiError;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/admin/reindex").route(web::post().to(reindex)));
}

/// Rebuild every capability's vector point from the relational store.
/// Protected by the write key; safe to re-run after a partial failure.
async fn reindex(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let reindexed = state.registry.reindex().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "ok": true,
        "reindexed": reindexed
    })))
}
