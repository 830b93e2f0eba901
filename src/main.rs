mod db;
mod domain;
mod error;
mod state;
mod web;

use crate::state::SharedState;
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Packaged runs carry their env file next to the bundled resources;
/// development runs read it from the working directory.
fn load_env() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("RESOURCES_PATH") {
        let path = PathBuf::from(dir).join(".env");
        if path.exists() && dotenvy::from_path(&path).is_ok() {
            return Some(path);
        }
    }
    dotenvy::dotenv().ok()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_path = load_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(path) = env_path {
        tracing::info!("Loaded environment from {}", path.display());
    }

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL missing");
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        tracing::error!("Failed to run database migrations: {}", e);
        e
    })?;
    tracing::info!("Database migrations completed");

    let session_key = std::env::var("SESSION_SECRET")
        .expect("SESSION_SECRET missing")
        .into_bytes();

    db::seed::seed_admin(&pool).await?;

    let shared: SharedState = Arc::new(state::AppState { pool, session_key });

    let app = web::routes(shared)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| {
        let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
        format!("0.0.0.0:{}", port)
    });
    tracing::info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
