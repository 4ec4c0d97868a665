//! 客户与钱包实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 客户身份记录
///
/// 在首个影响账本的事件到达时惰性创建，手机号按 `+91XXXXXXXXXX`
/// 规范形式存储且全局唯一。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: Uuid,
    /// 规范化手机号（客户的主要业务标识）
    pub phone: String,
    #[sqlx(default)]
    pub email: Option<String>,
    #[sqlx(default)]
    pub first_name: Option<String>,
    #[sqlx(default)]
    pub last_name: Option<String>,
    /// 电商平台侧的客户 ID
    #[sqlx(default)]
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 事件载荷中携带的客户身份信息（尚未入库）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerIdentity {
    pub phone: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub external_ref: Option<String>,
}

/// 钱包
///
/// 每个客户一个。静止状态下的不变量：
/// `balance == Σ amount`（该钱包所有 status=ready 批次），余额永不为负。
/// 钱包的批次列表是对 points 表的查询，不作为存储状态维护。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: Uuid,
    pub customer_id: Uuid,
    /// 余额（整数货币单位）
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_serialization_camel_case() {
        let wallet = Wallet {
            id: Uuid::nil(),
            customer_id: Uuid::nil(),
            balance: 150,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_string(&wallet).unwrap();
        assert!(json.contains("customerId"));
        assert!(json.contains("\"balance\":150"));
    }
}
