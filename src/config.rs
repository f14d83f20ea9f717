use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Context, ensure};

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub jwt_key: String,
    pub upload_dir: PathBuf,
    pub public_base_url: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 =
            std::env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse().context("PORT")?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://cinecat.db?mode=rwc".to_string());

        let jwt_key = std::env::var("JWT_KEY").context("JWT_KEY must be set")?;
        ensure!(!jwt_key.trim().is_empty(), "JWT_KEY must not be empty");

        let upload_dir: PathBuf =
            std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()).into();

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}/uploads"));

        Ok(Self {
            addr: format!("{host}:{port}").parse().context("HOST/PORT")?,
            database_url,
            jwt_key,
            upload_dir,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }
}
