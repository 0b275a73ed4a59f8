//! keyscan 主入口

use std::sync::Arc;

use anyhow::Result;
use keyscan::{api, app_state::AppState, config::{Config, DEFAULT_JWT_SECRET}, infrastructure::logging};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载环境变量
    dotenvy::dotenv().ok();

    // 2. 配置：环境变量默认值，CONFIG_PATH 指向的 TOML 文件优先
    let config_path = std::env::var("CONFIG_PATH").ok();
    let config = Config::from_env_and_file(config_path.as_deref())?;

    // 3. 日志
    logging::init_logging(&config.logging)?;
    config.validate()?;

    if config.jwt.secret == DEFAULT_JWT_SECRET {
        tracing::warn!("JWT_SECRET not set; using the built-in development secret");
    }
    tracing::info!(
        cache = if config.cache.redis_url.is_some() { "redis" } else { "memory" },
        "Starting keyscan"
    );

    // 4. 应用状态（共享 HTTP 客户端、缓存、熔断器、任务存储）
    let config = Arc::new(config);
    let state = Arc::new(AppState::new(config.clone())?);
    let app = api::routes(state);

    // 5. 启动服务
    let bind_addr = config.server.bind_addr.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on http://{}", bind_addr);
    tracing::info!("Swagger UI: http://{}/docs", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
