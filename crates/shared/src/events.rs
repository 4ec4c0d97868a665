//! 事件模型定义
//!
//! 定义进入返现系统的订单生命周期事件的统一信封格式与主题分类。
//! 所有入站消息都包装在 `EventEnvelope` 中，业务数据以 JSON 承载，
//! 避免为每种主题定义独立消息结构。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Topic — 入站事件主题
// ---------------------------------------------------------------------------

/// 入站事件主题
///
/// 每个主题对应账本的一个操作。批量发放主题单独占用容量为 1 的
/// 并发池，保证同一时刻只有一个批量任务在执行。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Topic {
    /// 订单创建 -> 预授予返现（credit）
    OrderCreate,
    /// 订单妥投 -> 预授予转正（promote）
    OrderDelivered,
    /// 结算使用返现 -> 扣减（debit）
    CashbackUtilised,
    /// 订单取消 -> 冲正（cancel）
    OrderCancel,
    /// 部分退款 -> 返现退回（refund）
    CashbackRefund,
    /// 管理员批量发放任务
    BulkDistribution,
}

impl Topic {
    /// 是否为批量发放主题（走专用容量 1 的并发池）
    pub fn is_bulk(&self) -> bool {
        matches!(self, Self::BulkDistribution)
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 与 serde 的 SCREAMING_SNAKE_CASE 保持一致，
        // 便于在日志与消息属性中统一引用
        let s = match self {
            Self::OrderCreate => "ORDER_CREATE",
            Self::OrderDelivered => "ORDER_DELIVERED",
            Self::CashbackUtilised => "CASHBACK_UTILISED",
            Self::OrderCancel => "ORDER_CANCEL",
            Self::CashbackRefund => "CASHBACK_REFUND",
            Self::BulkDistribution => "BULK_DISTRIBUTION",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// EventEnvelope — 通用事件信封
// ---------------------------------------------------------------------------

/// 通用事件信封
///
/// - `event_id`（UUID v7）时间有序，便于日志关联与排查
/// - `data` 以 JSON 承载各主题的业务数据
/// - 队列保证 at-least-once 投递，幂等性由账本层的审计流水保证，
///   信封本身不做去重
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// 事件唯一标识（UUID v7）
    pub event_id: String,
    /// 事件主题
    pub topic: Topic,
    /// 事件发生时间
    pub timestamp: DateTime<Utc>,
    /// 业务数据（不同主题携带不同字段）
    pub data: serde_json::Value,
    /// 事件来源系统
    pub source: String,
    /// 追踪 ID（用于分布式追踪串联）
    pub trace_id: Option<String>,
}

impl EventEnvelope {
    /// 构建新事件，自动生成 UUID v7 作为 event_id 并记录当前时间
    pub fn new(topic: Topic, data: serde_json::Value, source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::now_v7().to_string(),
            topic,
            timestamp: Utc::now(),
            data,
            source: source.into(),
            trace_id: None,
        }
    }

    /// 从信封 data 中提取订单 ID（失败记录以 (order_id, topic) 为键）
    pub fn order_id(&self) -> Option<&str> {
        self.data.get("orderId").and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_serialization() {
        let envelope = EventEnvelope {
            event_id: "01912345-6789-7abc-8def-0123456789ab".to_string(),
            topic: Topic::OrderCreate,
            timestamp: DateTime::parse_from_rfc3339("2025-06-15T10:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
            data: serde_json::json!({"orderId": "order-1001", "subtotal": 2499.0}),
            source: "storefront".to_string(),
            trace_id: Some("trace-abc-123".to_string()),
        };

        let json = serde_json::to_string(&envelope).unwrap();

        // 验证 camelCase 序列化格式
        assert!(json.contains("eventId"));
        assert!(json.contains("traceId"));
        assert!(json.contains("ORDER_CREATE"));

        let deserialized: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.event_id, envelope.event_id);
        assert_eq!(deserialized.topic, Topic::OrderCreate);
        assert_eq!(deserialized.order_id(), Some("order-1001"));
    }

    #[test]
    fn test_topic_display() {
        assert_eq!(Topic::OrderCreate.to_string(), "ORDER_CREATE");
        assert_eq!(Topic::OrderDelivered.to_string(), "ORDER_DELIVERED");
        assert_eq!(Topic::CashbackUtilised.to_string(), "CASHBACK_UTILISED");
        assert_eq!(Topic::OrderCancel.to_string(), "ORDER_CANCEL");
        assert_eq!(Topic::CashbackRefund.to_string(), "CASHBACK_REFUND");
        assert_eq!(Topic::BulkDistribution.to_string(), "BULK_DISTRIBUTION");
    }

    #[test]
    fn test_bulk_topic_classification() {
        assert!(Topic::BulkDistribution.is_bulk());
        assert!(!Topic::OrderCreate.is_bulk());
        assert!(!Topic::CashbackUtilised.is_bulk());
    }

    #[test]
    fn test_new_envelope_has_v7_event_id() {
        let envelope = EventEnvelope::new(
            Topic::OrderCancel,
            serde_json::json!({"orderId": "order-2"}),
            "storefront",
        );
        let parsed = Uuid::parse_str(&envelope.event_id).unwrap();
        assert_eq!(parsed.get_version_num(), 7);
        assert_eq!(envelope.order_id(), Some("order-2"));
    }
}
