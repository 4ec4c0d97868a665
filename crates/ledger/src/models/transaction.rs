//! 审计流水实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{TxStatus, TxType};

/// 审计流水
///
/// 每个影响账本的事件按 (order_id, tx_type) 恰好产生一条流水，
/// 该组合的存在性是防止重复处理的首要幂等屏障。流水只做状态
/// 流转，从不删除。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    /// 关联订单 ID（手工发放流水没有订单）
    #[sqlx(default)]
    pub order_id: Option<String>,
    pub tx_type: TxType,
    pub status: TxStatus,
    pub amount: i64,
    /// 落账时的余额快照
    pub closing_balance: i64,
    #[sqlx(default)]
    pub note: Option<String>,
    /// 关联的批次（credit 类流水）
    #[sqlx(default)]
    pub point_id: Option<Uuid>,
    /// 批量发放的行级幂等引用（"{job_id}:{row_index}"）
    #[sqlx(default)]
    pub source_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 取消冲正流水的标记备注，兼做取消操作的幂等屏障
pub const NOTE_CANCELLATION_REFUND: &str = "refund on cancellation";

/// 部分退款流水的标记备注，兼做退回操作的幂等屏障
pub const NOTE_REFUND_CREDITED: &str = "cashback refund credited";

/// 冲正时因批次过期被拦截金额的审计备注
pub const NOTE_BLOCKED_BY_EXPIRY: &str = "cashback blocked by expiry on cancellation";

/// 触及余额上限时的审计备注
pub const NOTE_CAP_REACHED: &str = "cashback cap reached";

/// 过期清扫产生的流水备注
pub const NOTE_EXPIRED: &str = "cashback expired";

/// 手工/批量发放流水备注
pub const NOTE_MANUAL_DISTRIBUTION: &str = "manual distribution";
