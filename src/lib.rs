use std::{sync::Arc, time::Duration};

use axum::{
    http::{HeaderValue, Method},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use crate::state::AppState;

/// 构建应用路由
pub fn app(state: Arc<AppState>) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_allowed_origins
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .allow_origin(origins);

    Router::new()
        .merge(routes::health::router())
        .nest("/api/users", routes::users::router().merge(routes::follows::router()))
        .nest("/api/posts", routes::posts::router())
        .nest("/api/notifications", routes::notifications::router())
        .nest("/api/ws", routes::websocket::router())
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 启动后台任务：定期清理过期的实时连接
pub fn start_background_tasks(state: Arc<AppState>) {
    let max_idle = Duration::from_secs(state.config.ws_stale_timeout);
    let period = Duration::from_secs(state.config.ws_sweep_interval.max(1));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            state.websocket_service.cleanup_stale_connections(max_idle);
        }
    });

    info!("Background tasks started successfully");
}
