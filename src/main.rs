mod auth;
mod config;
mod crud;
mod db;
mod entities;
mod error;
mod geo;
mod guard;
mod mapping;
mod models;
mod pagination;
mod routes;
mod storage;
mod upload;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{
    auth::TokenService,
    config::Config,
    storage::{FileStorage, LocalFileStorage},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: DatabaseConnection,
    pub tokens: TokenService,
    pub storage: Arc<dyn FileStorage>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,cinecat=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Arc::new(Config::from_env()?);

    let db = db::connect_and_migrate(&config.database_url).await?;
    tokio::fs::create_dir_all(&config.upload_dir).await?;
    let storage = LocalFileStorage::new(&config.upload_dir, config.public_base_url.clone());

    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        tokens: TokenService::new(&config.jwt_key),
        storage: Arc::new(storage),
    });

    let app = routes::router(state)
        .nest_service("/uploads", ServeDir::new(&config.upload_dir))
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any).allow_methods(Any).expose_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
