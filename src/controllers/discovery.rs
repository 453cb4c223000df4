use actix_web::{web, HttpResponse};

use crate::error::ApiError;
use crate::models::DiscoveryRequest;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/v1/agent/discovery").route(web::post().to(discover)));
}

/// Hybrid discovery over the registered capabilities
async fn discover(
    state: web::Data<AppState>,
    body: web::Json<DiscoveryRequest>,
) -> Result<HttpResponse, ApiError> {
    let results = state.registry.discover(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(results))
}
