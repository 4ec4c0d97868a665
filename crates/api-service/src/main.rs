//! API 服务入口

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{error, info};

use cashback_api::{routes, state::AppState};
use cashback_ledger::LedgerService;
use cashback_ledger::collaborators::{
    HttpAnalyticsSink, HttpEngagementPlatform, HttpOrderDirectory,
};
use cashback_shared::config::AppConfig;
use cashback_shared::database::Database;
use cashback_shared::observability::init_tracing;
use cashback_shared::queue::EventQueue;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load("api")?;
    init_tracing(&config.service_name, &config.observability);

    info!(environment = %config.environment, "API 服务启动中");

    let database = Database::connect(&config.database).await?;
    let queue = EventQueue::connect(&config.queue).await;

    let analytics = Arc::new(HttpAnalyticsSink::new(config.analytics.clone()));
    let engagement = Arc::new(HttpEngagementPlatform::new(config.engagement.clone()));
    let directory = Arc::new(HttpOrderDirectory::new(config.directory.clone()));

    let ledger = Arc::new(LedgerService::new(
        database.pool().clone(),
        analytics,
        engagement,
    ));

    let state = AppState::new(
        database.pool().clone(),
        ledger,
        directory,
        queue,
        config.admin.clone(),
    );
    let app = routes::app_router(state);

    let addr = config.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "开始监听");

    // 优雅关闭：收到 Ctrl+C 后停止接收新连接，等已有请求处理完
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    database.close().await;
    info!("API 服务已退出");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "监听停机信号失败");
    }
    info!("收到停机信号");
}
