//! 日志初始化
//!
//! 各服务进程启动时调用一次。格式由配置决定：生产环境输出
//! 结构化 JSON，本地开发用人类可读格式。`RUST_LOG` 优先于配置
//! 中的日志级别。

use tracing_subscriber::EnvFilter;

use crate::config::ObservabilityConfig;

/// 初始化全局 tracing 订阅器
pub fn init_tracing(service_name: &str, config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    if config.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(service = service_name, "日志已初始化");
}
