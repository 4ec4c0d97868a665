//! 主题处理器
//!
//! 每个主题一个处理器，负责解析该主题的事件载荷并调用对应的
//! 账本操作。需要订单上下文的主题（抵扣、退款）先查目录拿到
//! 归属返现的金额，再落账本。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use cashback_bulk_pipeline::{BulkJobPayload, BulkRunner};
use cashback_ledger::LedgerService;
use cashback_ledger::collaborators::OrderDirectory;
use cashback_ledger::service::OrderPayload;
use cashback_shared::error::{LedgerError, Result};
use cashback_shared::events::{EventEnvelope, Topic};

/// 主题处理器
#[async_trait]
pub trait TopicHandler: Send + Sync {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<()>;
}

/// 主题 -> 处理器的路由表
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Topic, Arc<dyn TopicHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, topic: Topic, handler: Arc<dyn TopicHandler>) -> Self {
        self.handlers.insert(topic, handler);
        self
    }

    pub fn get(&self, topic: Topic) -> Option<Arc<dyn TopicHandler>> {
        self.handlers.get(&topic).cloned()
    }
}

fn parse_data<T: serde::de::DeserializeOwned>(envelope: &EventEnvelope) -> Result<T> {
    serde_json::from_value(envelope.data.clone()).map_err(|e| {
        LedgerError::Validation(format!(
            "事件 {} 载荷解析失败: {e}",
            envelope.event_id
        ))
    })
}

/// 仅携带订单 ID 的载荷
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderRef {
    order_id: String,
}

/// 抵扣 / 退款事件的载荷
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettlementRef {
    order_id: String,
    phone: String,
}

/// ORDER_CREATE -> credit
pub struct CreditHandler {
    ledger: Arc<LedgerService>,
}

impl CreditHandler {
    pub fn new(ledger: Arc<LedgerService>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl TopicHandler for CreditHandler {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let payload: OrderPayload = parse_data(envelope)?;
        self.ledger.credit(&payload).await?;
        Ok(())
    }
}

/// ORDER_DELIVERED -> promote
pub struct PromoteHandler {
    ledger: Arc<LedgerService>,
}

impl PromoteHandler {
    pub fn new(ledger: Arc<LedgerService>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl TopicHandler for PromoteHandler {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let payload: OrderRef = parse_data(envelope)?;
        self.ledger.promote(&payload.order_id).await?;
        Ok(())
    }
}

/// CASHBACK_UTILISED -> debit
///
/// 抵扣金额不信任事件载荷，以目录的支付明细为准。
pub struct DebitHandler {
    ledger: Arc<LedgerService>,
    directory: Arc<dyn OrderDirectory>,
}

impl DebitHandler {
    pub fn new(ledger: Arc<LedgerService>, directory: Arc<dyn OrderDirectory>) -> Self {
        Self { ledger, directory }
    }
}

#[async_trait]
impl TopicHandler for DebitHandler {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let payload: SettlementRef = parse_data(envelope)?;

        let amount = self.directory.cashback_paid_amount(&payload.order_id).await?;
        if amount <= 0 {
            info!(order_id = %payload.order_id, "订单未使用返现抵扣，跳过");
            return Ok(());
        }

        self.ledger
            .debit(&payload.order_id, &payload.phone, amount)
            .await?;
        Ok(())
    }
}

/// ORDER_CANCEL -> cancel
pub struct CancelHandler {
    ledger: Arc<LedgerService>,
}

impl CancelHandler {
    pub fn new(ledger: Arc<LedgerService>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl TopicHandler for CancelHandler {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let payload: OrderRef = parse_data(envelope)?;
        self.ledger.cancel(&payload.order_id).await?;
        Ok(())
    }
}

/// CASHBACK_REFUND -> refund
///
/// 退回金额以目录的退款明细为准。
pub struct RefundHandler {
    ledger: Arc<LedgerService>,
    directory: Arc<dyn OrderDirectory>,
}

impl RefundHandler {
    pub fn new(ledger: Arc<LedgerService>, directory: Arc<dyn OrderDirectory>) -> Self {
        Self { ledger, directory }
    }
}

#[async_trait]
impl TopicHandler for RefundHandler {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let payload: SettlementRef = parse_data(envelope)?;

        let amount = self
            .directory
            .cashback_refund_amount(&payload.order_id)
            .await?;
        self.ledger
            .refund(&payload.order_id, &payload.phone, amount)
            .await?;
        Ok(())
    }
}

/// BULK_DISTRIBUTION -> 批量发放管道
pub struct BulkHandler {
    runner: Arc<BulkRunner>,
}

impl BulkHandler {
    pub fn new(runner: Arc<BulkRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl TopicHandler for BulkHandler {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let payload: BulkJobPayload = parse_data(envelope)?;
        self.runner.run(&payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl TopicHandler for Noop {
        async fn handle(&self, _envelope: &EventEnvelope) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_routes_by_topic() {
        let registry = HandlerRegistry::new()
            .register(Topic::OrderCreate, Arc::new(Noop))
            .register(Topic::OrderCancel, Arc::new(Noop));

        assert!(registry.get(Topic::OrderCreate).is_some());
        assert!(registry.get(Topic::OrderCancel).is_some());
        assert!(registry.get(Topic::BulkDistribution).is_none());
    }

    #[test]
    fn test_parse_data_reports_event_id() {
        let envelope = EventEnvelope::new(
            Topic::OrderDelivered,
            serde_json::json!({"wrong": true}),
            "test",
        );

        let err = parse_data::<OrderRef>(&envelope).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(err.to_string().contains(&envelope.event_id));
    }
}
