use std::{net::SocketAddr, sync::Arc};

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use social_notify::{app, config::Config, start_background_tasks, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置
    dotenv::dotenv().ok();
    let config = Config::from_env()?;

    // 初始化日志，生产环境输出 JSON
    let registry = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level));
    if config.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    info!("Starting social-notify service...");

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;

    let app_state = Arc::new(AppState::new(config).await?);
    info!("Database connection established successfully");

    // 启动后台任务
    start_background_tasks(app_state.clone());

    let app = app(app_state);

    info!("Starting server on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
