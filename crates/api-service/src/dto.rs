//! 请求 / 响应 DTO 定义

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// API 统一响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }

    pub fn success_empty() -> ApiResponse<()> {
        ApiResponse {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: None,
        }
    }
}

// ---------------------------------------------------------------------------
// 公开 API（结算页 / 客服机器人）
// ---------------------------------------------------------------------------

/// 可抵扣额度查询请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RedeemableRequest {
    #[validate(length(min = 10, max = 15, message = "手机号长度无效"))]
    pub phone: String,
    #[validate(range(min = 0.0, message = "订单小计不能为负"))]
    pub subtotal: f64,
}

/// 可抵扣额度响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemableResponse {
    /// 当前余额
    pub balance: i64,
    /// 本单允许抵扣的上限
    pub redeemable: i64,
}

/// 最近一单状态响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusResponse {
    pub status: String,
}

// ---------------------------------------------------------------------------
// 管理端 API
// ---------------------------------------------------------------------------

/// 创建 API Key 请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiKeyRequest {
    /// 调用方标识（结算页前端、客服机器人等）
    #[validate(length(min = 1, max = 100, message = "调用方标识长度应在 1-100 个字符"))]
    pub client_id: String,
    /// 展示名，可选
    #[validate(length(max = 100, message = "名称最长 100 个字符"))]
    pub name: Option<String>,
    /// 允许访问的路径前缀（必须落在 /public 下）
    #[validate(length(min = 1, message = "至少需要一个路径前缀"))]
    pub allowed_prefixes: Vec<String>,
}

/// 创建 API Key 响应（完整 key 仅此一次展示）
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiKeyResponse {
    pub id: Uuid,
    pub client_id: String,
    pub name: Option<String>,
    /// 完整的 API Key
    pub api_key: String,
    pub allowed_prefixes: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// 反复处理失败的事件（运维排查视图）
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DispatchFailureDto {
    pub order_id: String,
    pub topic: String,
    pub attempts: i32,
    pub last_error: String,
    pub updated_at: DateTime<Utc>,
}

/// 手工发放请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DistributionRequestDto {
    #[validate(length(min = 10, max = 15, message = "手机号长度无效"))]
    pub phone: String,
    #[validate(range(min = 1, message = "金额必须为正"))]
    pub amount: i64,
    /// 失效日期（YYYY-MM-DD，按 IST 当日最后一刻解释）
    pub expiry_date: NaiveDate,
    /// 幂等引用，重复提交同一引用会被拒绝
    #[validate(length(min = 1, max = 128, message = "幂等引用长度无效"))]
    pub source_ref: String,
}

/// 手工发放响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionResponse {
    pub point_id: Uuid,
    /// 实际发放金额（可能因余额上限被截断）
    pub amount: i64,
}

/// 批量任务创建请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBulkJobRequest {
    #[validate(length(min = 1, message = "bucket 不能为空"))]
    pub bucket: String,
    #[validate(length(min = 1, message = "objectKey 不能为空"))]
    pub object_key: String,
    pub requested_by: Option<String>,
}

/// 批量任务创建响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBulkJobResponse {
    pub job_id: Uuid,
}
