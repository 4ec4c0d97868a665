//! 账本数据库连接池
//!
//! 所有服务共用同一个 Postgres 账本库：API 与事件分发器是写入方，
//! 清扫任务按自己的节奏跑批。每个进程各持一个池；余额一致性由
//! 事务与条件更新保证，池只负责连接生命周期。

use crate::config::DatabaseConfig;
use crate::error::{LedgerError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

/// 账本库连接池包装
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 按配置建池并验证连通性
    ///
    /// 失败直接返回错误：账本库不可达时任何服务都无法工作，
    /// 启动阶段尽早失败。
    #[instrument(skip(config))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await?;

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "账本库连接池就绪"
        );

        Ok(Self { pool })
    }

    /// 获取连接池引用
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 健康检查：能拿到连接并执行查询即视为可用
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(LedgerError::from)
    }

    /// 优雅停机时排空连接
    pub async fn close(&self) {
        self.pool.close().await;
        info!("账本库连接池已关闭");
    }
}

impl std::ops::Deref for Database {
    type Target = PgPool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}
