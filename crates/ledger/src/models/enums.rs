//! 账本枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use serde::{Deserialize, Serialize};

/// 积分批次状态
///
/// 批次从不物理删除，状态流转即生命周期：
/// pending -> ready（妥投转正）/ cancelled（订单取消）
/// ready -> expired（过期清扫）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum PointStatus {
    /// 预授予 - 订单已创建但未确认妥投，不计入余额
    #[default]
    Pending,
    /// 可用 - 计入余额，可被扣减
    Ready,
    /// 已过期 - 清扫任务回收
    Expired,
    /// 已取消 - 订单在转正前被取消
    Cancelled,
}

/// 批次订单日志的条目类型
///
/// 批次的订单日志是"该订单是否碰过该批次"的幂等性事实来源，
/// 也是取消冲正时按批次还原扣减的依据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum OrderEntryType {
    Credit,
    Debit,
}

/// 审计流水类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum TxType {
    Credit,
    Debit,
}

/// 审计流水状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum TxStatus {
    /// 预授予阶段，不影响余额
    Pending,
    /// 已生效
    Completed,
    /// 被取消或仅作审计留痕（未触达余额）
    Cancelled,
    /// 因过期产生的留痕
    Expired,
}

/// 发放/抵扣规则的计算方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// 固定金额
    Fixed,
    /// 订单小计的百分比
    Percentage,
}
