//! API 错误类型定义
//!
//! 账本层错误到 HTTP 响应的映射集中在这里。系统级错误只返回
//! 通用提示，详细信息仅记录日志，防止信息泄露。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use cashback_shared::error::LedgerError;

/// API 错误类型
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("未授权: {0}")]
    Unauthorized(String),
    #[error("禁止访问: {0}")]
    Forbidden(String),

    #[error("参数验证失败: {0}")]
    Validation(String),
    #[error("资源不存在: {0}")]
    NotFound(String),
    #[error("重复操作: {0}")]
    Duplicate(String),
    #[error("状态冲突: {0}")]
    Conflict(String),

    #[error("上游服务错误: {0}")]
    Upstream(String),
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("内部错误: {0}")]
    Internal(String),
}

impl ApiError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Duplicate(_) | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Duplicate(_) => "DUPLICATE_OPERATION",
            Self::Conflict(_) => "CONFLICT",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "内部错误");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Upstream(e) => {
                tracing::error!(error = %e, "上游服务调用失败");
                "上游服务暂不可用，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound { entity, id } => Self::NotFound(format!("{entity}: {id}")),
            LedgerError::Validation(msg) => Self::Validation(msg),
            LedgerError::DuplicateOperation { order_id, operation } => {
                Self::Duplicate(format!("{operation}: {order_id}"))
            }
            LedgerError::InsufficientBalance { required, actual } => {
                Self::Conflict(format!("余额不足: 需要 {required}，当前 {actual}"))
            }
            LedgerError::InsufficientEligiblePoints { remaining } => {
                Self::Conflict(format!("可用批次不足: 缺口 {remaining}"))
            }
            LedgerError::ConcurrentModification { entity, id } => {
                Self::Conflict(format!("并发冲突: {entity} {id}"))
            }
            LedgerError::ExternalService { service, message } => {
                Self::Upstream(format!("{service}: {message}"))
            }
            LedgerError::Database(e) => Self::Database(e),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

/// API 层 Result 类型别名
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    /// 所有错误变体与期望的 (StatusCode, error_code) 映射
    fn all_error_variants() -> Vec<(ApiError, StatusCode, &'static str)> {
        vec![
            (ApiError::Unauthorized("missing key".into()), StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (ApiError::Forbidden("prefix not allowed".into()), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (ApiError::Validation("phone invalid".into()), StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            (ApiError::NotFound("wallet: w-1".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (ApiError::Duplicate("credit: order-1".into()), StatusCode::CONFLICT, "DUPLICATE_OPERATION"),
            (ApiError::Conflict("concurrent".into()), StatusCode::CONFLICT, "CONFLICT"),
            (ApiError::Upstream("directory: 503".into()), StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            (ApiError::Internal("bug".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        ]
    }

    #[test]
    fn test_status_and_code_mapping() {
        for (error, status, code) in all_error_variants() {
            assert_eq!(error.status_code(), status, "variant: {error:?}");
            assert_eq!(error.error_code(), code, "variant: {error:?}");
        }
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let response = ApiError::Internal("secret detail".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // 响应体里不应泄露内部细节，这里只验证状态码与构造不 panic
    }

    #[test]
    fn test_ledger_error_conversion() {
        let api: ApiError = LedgerError::DuplicateOperation {
            order_id: "order-1".to_string(),
            operation: "credit".to_string(),
        }
        .into();
        assert_eq!(api.status_code(), StatusCode::CONFLICT);

        let api: ApiError = LedgerError::InsufficientBalance {
            required: 100,
            actual: 40,
        }
        .into();
        assert_eq!(api.status_code(), StatusCode::CONFLICT);

        let api: ApiError = LedgerError::NotFound {
            entity: "customer".to_string(),
            id: "+911234567890".to_string(),
        }
        .into();
        assert_eq!(api.status_code(), StatusCode::NOT_FOUND);

        let api: ApiError = LedgerError::Validation("bad".to_string()).into();
        assert_eq!(api.status_code(), StatusCode::BAD_REQUEST);
    }
}
