//! 应用状态定义

use std::sync::Arc;

use sqlx::PgPool;

use cashback_ledger::LedgerService;
use cashback_ledger::collaborators::OrderDirectory;
use cashback_shared::config::AdminConfig;
use cashback_shared::queue::EventQueue;

/// Axum 应用共享状态
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL 连接池
    pub pool: PgPool,
    /// 账本服务（手工发放走这里）
    pub ledger: Arc<LedgerService>,
    /// 订单/客户目录（客服查询走这里）
    pub directory: Arc<dyn OrderDirectory>,
    /// 事件队列（批量任务触发走这里）
    pub queue: EventQueue,
    /// 管理端认证配置
    pub admin: AdminConfig,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        ledger: Arc<LedgerService>,
        directory: Arc<dyn OrderDirectory>,
        queue: EventQueue,
        admin: AdminConfig,
    ) -> Self {
        Self {
            pool,
            ledger,
            directory,
            queue,
            admin,
        }
    }
}
