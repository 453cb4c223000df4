use actix_web::{web, HttpResponse};
use chrono::Utc;

use crate::error::ApiError;
use crate::models::{AvailabilityRequest, RegisterRequest, ReputationRequest};
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/v1/agent")
            .route("/register", web::post().to(register))
            .route("/reputation", web::post().to(update_reputation))
            .route("/availability", web::post().to(update_availability)),
    );
}

/// Register an agent and replace its capability set
async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let registered = state.registry.register(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "ok": true,
        "registered": registered
    })))
}

async fn update_reputation(
    state: web::Data<AppState>,
    body: web::Json<ReputationRequest>,
) -> Result<HttpResponse, ApiError> {
    if !(0.0..=1.0).contains(&body.reputation) {
        return Err(ApiError::Validation(vec![
            "reputation: must be between 0 and 1".to_string(),
        ]));
    }

    let updated = state.db.update_reputation(&body.did, body.reputation).await?;
    if updated == 0 {
        return Err(ApiError::NotFound(format!("agent '{}' not found", body.did)));
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}

/// Heartbeat: record an availability score and the agent's last-seen time
async fn update_availability(
    state: web::Data<AppState>,
    body: web::Json<AvailabilityRequest>,
) -> Result<HttpResponse, ApiError> {
    if !(0.0..=1.0).contains(&body.availability) {
        return Err(ApiError::Validation(vec![
            "availability: must be between 0 and 1".to_string(),
        ]));
    }

    let last_seen = body.last_seen.unwrap_or_else(Utc::now);
    let updated = state
        .db
        .update_availability(&body.did, body.availability, last_seen)
        .await?;
    if updated == 0 {
        return Err(ApiError::NotFound(format!("agent '{}' not found", body.did)));
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}
