use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub server_host: String,
    pub server_port: u16,
    pub environment: String,
    pub log_level: String,

    // Database configuration
    pub database_url: String,
    pub database_namespace: String,
    pub database_name: String,
    pub database_username: String,
    pub database_password: String,

    // CORS configuration
    pub cors_allowed_origins: String,

    // Real-time delivery
    pub ws_outbound_buffer: usize,
    pub ws_stale_timeout: u64,
    pub ws_sweep_interval: u64,
    pub ws_ping_interval: u64,

    // Fan-out
    pub fanout_concurrency: usize,
    pub default_page_limit: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_level: env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "social_notify=debug,tower_http=debug".to_string()),

            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "mem://".to_string()),
            database_namespace: env::var("DATABASE_NAMESPACE")
                .unwrap_or_else(|_| "rainbow".to_string()),
            database_name: env::var("DATABASE_NAME")
                .unwrap_or_else(|_| "social".to_string()),
            database_username: env::var("DATABASE_USERNAME")
                .unwrap_or_else(|_| "root".to_string()),
            database_password: env::var("DATABASE_PASSWORD")
                .unwrap_or_else(|_| "root".to_string()),

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),

            ws_outbound_buffer: env::var("WS_OUTBOUND_BUFFER")
                .unwrap_or_else(|_| "256".to_string())
                .parse()?,
            ws_stale_timeout: env::var("WS_STALE_TIMEOUT")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
            ws_sweep_interval: env::var("WS_SWEEP_INTERVAL")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            ws_ping_interval: env::var("WS_PING_INTERVAL")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,

            fanout_concurrency: env::var("FANOUT_CONCURRENCY")
                .unwrap_or_else(|_| "16".to_string())
                .parse()?,
            default_page_limit: env::var("DEFAULT_PAGE_LIMIT")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 内嵌数据库（mem:// 等）不需要登录
    pub fn is_embedded_database(&self) -> bool {
        !(self.database_url.starts_with("http")
            || self.database_url.starts_with("ws"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 3001,
            environment: "development".to_string(),
            log_level: "social_notify=debug".to_string(),
            database_url: "mem://".to_string(),
            database_namespace: "rainbow".to_string(),
            database_name: "social".to_string(),
            database_username: "root".to_string(),
            database_password: "root".to_string(),
            cors_allowed_origins: "http://localhost:3000".to_string(),
            ws_outbound_buffer: 256,
            ws_stale_timeout: 300,
            ws_sweep_interval: 60,
            ws_ping_interval: 30,
            fanout_concurrency: 16,
            default_page_limit: 50,
        }
    }
}
