use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;

mod card;
mod config;
mod controllers;
mod db;
mod embedder;
mod error;
mod middleware;
mod models;
mod registry;
mod vector;

use config::Config;
use db::Database;
use embedder::Embedder;
use middleware::{Admission, RateLimiter};
use registry::Registry;
use vector::VectorIndex;

/// Request bodies above this size are rejected before validation
const MAX_BODY_BYTES: usize = 512 * 1024;

pub struct AppState {
    pub db: Arc<Database>,
    pub vector: Arc<VectorIndex>,
    pub registry: Arc<Registry>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(
        env_logger::Env::new().filter_or(config::env_vars::LOG_LEVEL, config::defaults::LOG_LEVEL),
    )
    .init();

    let config = Config::from_env();
    let port = config.port;

    log::info!("Connecting to metadata store");
    let db = Arc::new(
        Database::connect(&config.postgres_url)
            .await
            .expect("Failed to initialize database"),
    );

    let vector = Arc::new(VectorIndex::new(config.qdrant_url.clone()));
    if let Err(e) = vector.ensure_collection().await {
        // The service still starts; /health reports the outage and
        // /admin/reindex is the repair path once the index returns
        log::warn!("Could not ensure vector collection at startup: {}", e);
    }

    let embedder = Arc::new(Embedder::new(config.embed_model.clone()));
    let registry = Arc::new(Registry::new(
        Arc::clone(&db),
        Arc::clone(&vector),
        embedder,
        config.clone(),
    ));
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit_max,
        config.rate_limit_window_ms,
    ));

    log::info!("Starting agent registry on port {}", port);
    if config.api_key.is_none() {
        log::warn!("REGISTRY_API_KEY is not set - writes are unauthenticated");
    }

    HttpServer::new(move || {
        let cors = if config.cors_origin == "*" {
            Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600)
        } else {
            Cors::default()
                .allowed_origin(&config.cors_origin)
                .allow_any_method()
                .allow_any_header()
                .max_age(3600)
        };

        App::new()
            .app_data(web::Data::new(AppState {
                db: Arc::clone(&db),
                vector: Arc::clone(&vector),
                registry: Arc::clone(&registry),
            }))
            .app_data(
                web::JsonConfig::default()
                    .limit(MAX_BODY_BYTES)
                    .error_handler(|err, _req| {
                        actix_web::Error::from(error::ApiError::BadRequest(err.to_string()))
                    }),
            )
            .app_data(web::PayloadConfig::new(MAX_BODY_BYTES))
            .wrap(cors)
            .wrap(Admission::new(&config, Arc::clone(&limiter)))
            .configure(controllers::health::config)
            .configure(controllers::agents::config)
            .configure(controllers::discovery::config)
            .configure(controllers::capabilities::config)
            .configure(controllers::admin::config)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
