use actix_web::{web, HttpResponse};
use serde_json::Value;

use crate::error::ApiError;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/v1/capability/{id}/schema").route(web::get().to(get_output_schema)),
    );
}

/// Look up the declared output schema of a capability
async fn get_output_schema(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let capability_id = path.into_inner();

    match state.db.get_capability_output_schema(&capability_id).await? {
        Some(schema) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "capabilityId": capability_id,
            "outputSchema": schema.unwrap_or(Value::Null),
        }))),
        None => Err(ApiError::NotFound(format!(
            "capability '{}' not found",
            capability_id
        ))),
    }
}
