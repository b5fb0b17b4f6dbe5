use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub validator: ValidatorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub rust_log: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValidatorConfig {
    /// Base URL of the external classifier service; when unset the
    /// simulated validator is used instead.
    pub ml_service_url: Option<String>,
    /// Delay in milliseconds before the simulated validator returns its verdict.
    pub simulated_delay_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()?;
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let ml_service_url = env::var("ML_SERVICE_URL").ok();
        let simulated_delay_ms: u64 = env::var("ML_SIMULATED_DELAY_MS")
            .unwrap_or_else(|_| "6000".to_string())
            .parse()?;

        Ok(Config {
            server: ServerConfig {
                port,
                host,
                rust_log,
            },
            validator: ValidatorConfig {
                ml_service_url,
                simulated_delay_ms,
            },
        })
    }
}
