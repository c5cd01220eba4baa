mod config;
mod openapi;

use actix_web::{web, App, HttpResponse, HttpServer};
use actix_web_grants::GrantsMiddleware;
use openapi::ApiDoc;
use rauthy_common::utils::get_rand_bytes;
use rauthy_models::app_state::{AppState, Caches, DbPool};
use rauthy_models::entity::users::SqlUserBackend;
use rauthy_models::migration::db_migrate;
use std::collections::HashMap;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());
    let db = build_pool(&database_url)
        .await
        .expect("failed to connect to the database");

    db_migrate::migrate(&db).await.expect("database migration failed");

    let ha_cache_config = redhac::CacheConfig::default();
    let rules = config::load_rules();

    let enc_key_active = "enc-0".to_string();
    let mut enc_keys = HashMap::new();
    enc_keys.insert(enc_key_active.clone(), get_rand_bytes(32));

    let session_hmac_key = get_rand_bytes(32);
    let issuer = std::env::var("ISSUER").unwrap_or_else(|_| "http://localhost:8080".to_string());

    let user_backend = Arc::new(SqlUserBackend { db: db.clone() });

    let app_state = web::Data::new(AppState {
        db,
        caches: Caches { ha_cache_config },
        enc_keys,
        enc_key_active,
        session_hmac_key,
        rules: Arc::new(rules),
        user_backend,
        issuer,
    });

    let bind_host = std::env::var("BIND_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let bind_port: u16 = std::env::var("BIND_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    tracing::info!("starting on {}:{}", bind_host, bind_port);

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(GrantsMiddleware::with_extractor(
                rauthy_handlers::middleware::extract_session_roles,
            ))
            .route("/health", web::get().to(HttpResponse::Ok))
            .configure(rauthy_handlers::configure)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/api-doc/openapi.json", ApiDoc::openapi()))
    })
    .bind((bind_host, bind_port))?
    .run()
    .await
}

async fn build_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    #[cfg(feature = "sqlite")]
    {
        sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
    }
    #[cfg(not(feature = "sqlite"))]
    {
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
    }
}
