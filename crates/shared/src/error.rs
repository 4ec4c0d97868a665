//! 统一错误处理模块
//!
//! 定义账本系统的错误分类，使用 thiserror 提供良好的错误信息。
//! 分类的核心目的是区分"可重试"与"不可重试"：乐观并发冲突与外部
//! 服务故障是重试信号，业务规则拒绝（余额不足、重复操作）不是。

use thiserror::Error;

/// 账本系统错误类型
#[derive(Debug, Error)]
pub enum LedgerError {
    // ==================== 数据库错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: String, id: String },

    // ==================== 幂等与并发 ====================
    /// 幂等性保护触发：同一订单的同类操作已经执行过。
    /// 上游应将其视为成功（no-op），不应重试。
    #[error("重复操作: order_id={order_id} operation={operation}")]
    DuplicateOperation {
        order_id: String,
        operation: String,
    },

    /// 条件更新未命中：写入时前置条件已不成立，说明同一钱包上
    /// 存在并发修改。整个操作已回滚，调用方可整体重试。
    #[error("并发修改冲突: {entity} id={id}")]
    ConcurrentModification { entity: String, id: String },

    // ==================== 业务逻辑错误 ====================
    #[error("钱包余额不足: 需要 {required}, 实际 {actual}")]
    InsufficientBalance { required: i64, actual: i64 },

    /// 聚合余额看似充足，但逐批次扣减后仍有剩余未满足
    /// （例如批次在扣减过程中刚好过期）。
    #[error("可用积分批次不足: 未满足金额 {remaining}")]
    InsufficientEligiblePoints { remaining: i64 },

    // ==================== 验证错误 ====================
    #[error("参数验证失败: {0}")]
    Validation(String),

    // ==================== 外部服务错误 ====================
    #[error("外部服务错误: {service} - {message}")]
    ExternalService { service: String, message: String },

    // ==================== 配置与通用错误 ====================
    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    /// 获取稳定错误码，用于 API 响应和日志检索
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::DuplicateOperation { .. } => "DUPLICATE_OPERATION",
            Self::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::InsufficientEligiblePoints { .. } => "INSUFFICIENT_ELIGIBLE_POINTS",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 并发冲突、数据库瞬时故障和外部服务故障可重试；
    /// 业务规则拒绝与验证失败重试也不会改变结果。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentModification { .. }
                | Self::Database(_)
                | Self::ExternalService { .. }
        )
    }

    /// 构造外部服务错误的便捷方法
    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = LedgerError::DuplicateOperation {
            order_id: "order-1".to_string(),
            operation: "credit".to_string(),
        };
        assert_eq!(err.code(), "DUPLICATE_OPERATION");

        let err = LedgerError::InsufficientEligiblePoints { remaining: 10 };
        assert_eq!(err.code(), "INSUFFICIENT_ELIGIBLE_POINTS");
    }

    #[test]
    fn test_is_retryable() {
        let conflict = LedgerError::ConcurrentModification {
            entity: "wallet".to_string(),
            id: "w-1".to_string(),
        };
        assert!(conflict.is_retryable());

        let db_err = LedgerError::Database(sqlx::Error::PoolTimedOut);
        assert!(db_err.is_retryable());

        let external = LedgerError::external("directory", "503");
        assert!(external.is_retryable());

        // 业务规则拒绝不可重试
        let dup = LedgerError::DuplicateOperation {
            order_id: "order-1".to_string(),
            operation: "debit".to_string(),
        };
        assert!(!dup.is_retryable());

        let insufficient = LedgerError::InsufficientBalance {
            required: 100,
            actual: 40,
        };
        assert!(!insufficient.is_retryable());

        let validation = LedgerError::Validation("手机号格式无效".to_string());
        assert!(!validation.is_retryable());
    }
}
