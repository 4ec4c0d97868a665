//! 外部协作方抽象
//!
//! 账本依赖的外部系统全部收敛为 trait：订单/客户目录（只读）、
//! 分析事件仓库、用户触达平台、邮件通知。HTTP 实现见各子模块，
//! 测试中以 mockall 生成的 mock 替换。分析/触达/邮件从账本视角都是
//! fire-and-forget，失败从不回滚账本操作。

mod directory;
mod sinks;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cashback_shared::error::Result;

use crate::models::CustomerIdentity;

pub use directory::HttpOrderDirectory;
pub use sinks::{HttpAnalyticsSink, HttpEmailNotifier, HttpEngagementPlatform};

/// 目录返回的订单视图
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryOrder {
    pub order_id: String,
    pub subtotal: f64,
    pub discount_codes: Vec<String>,
    pub customer: CustomerIdentity,
    pub fulfillment_status: Option<String>,
}

/// 客服场景的订单摘要
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_id: String,
    pub status: String,
    pub total: f64,
    pub placed_at: DateTime<Utc>,
}

/// 订单/客户目录（电商平台的只读查询面）
///
/// 实现方负责有界重试与限流额度退让，调用方拿到的错误
/// 已经是重试耗尽后的最终结果。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderDirectory: Send + Sync {
    /// 订单详情（含客户身份与折扣码）
    async fn get_order(&self, order_id: &str) -> Result<DirectoryOrder>;

    /// 订单支付明细中归属返现网关的实付金额
    async fn cashback_paid_amount(&self, order_id: &str) -> Result<i64>;

    /// 订单退款明细中归属返现网关的退款金额
    async fn cashback_refund_amount(&self, order_id: &str) -> Result<i64>;

    /// 客户最近一单的状态描述（客服机器人用）
    async fn order_status_text(&self, phone: &str) -> Result<String>;

    /// 客户最近订单列表
    async fn recent_orders(&self, phone: &str, limit: usize) -> Result<Vec<OrderSummary>>;
}

/// 分析事件（扁平的名称 + 参数记录）
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsEvent {
    pub name: String,
    pub params: serde_json::Value,
}

impl AnalyticsEvent {
    pub fn new(name: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// 分析事件仓库
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(&self, event: &AnalyticsEvent) -> Result<()>;
}

/// 用户触达平台（按手机号标识用户）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EngagementPlatform: Send + Sync {
    /// 覆盖式更新用户属性（如钱包余额）
    async fn upsert_attributes(&self, phone: &str, attributes: serde_json::Value) -> Result<()>;

    /// 上报行为事件
    async fn track_event(
        &self,
        phone: &str,
        name: &str,
        properties: serde_json::Value,
    ) -> Result<()>;
}

/// 邮件通知（仅批量任务摘要使用）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailNotifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}
