//! 积分批次实体
//!
//! 一个批次是一笔独立追踪的返现额度，携带自己的过期时间。
//! `amount` 只会因扣减或过期减少，因冲正回补增加。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::PointStatus;

/// 积分批次
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Point {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub customer_id: Uuid,
    /// 批次剩余金额
    pub amount: i64,
    /// 批次创建时的初始金额
    pub initial_amount: i64,
    pub status: PointStatus,
    pub expires_on: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Point {
    /// 批次是否已过（过期时刻）
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.expires_on <= now
    }

    /// 批次是否可用于扣减：ready、有余额、未过期
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == PointStatus::Ready && self.amount > 0 && !self.is_past_expiry(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn point(status: PointStatus, amount: i64, expires_in_hours: i64) -> Point {
        let now = Utc::now();
        Point {
            id: Uuid::new_v4(),
            wallet_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            amount,
            initial_amount: amount,
            status,
            expires_on: now + Duration::hours(expires_in_hours),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_is_eligible() {
        let now = Utc::now();

        // ready 且未过期且有余额
        assert!(point(PointStatus::Ready, 50, 24).is_eligible(now));

        // 余额为 0 不可用
        assert!(!point(PointStatus::Ready, 0, 24).is_eligible(now));

        // 已过过期时刻不可用（即使状态还没被清扫更新）
        assert!(!point(PointStatus::Ready, 50, -1).is_eligible(now));

        // pending / expired / cancelled 都不可用
        assert!(!point(PointStatus::Pending, 50, 24).is_eligible(now));
        assert!(!point(PointStatus::Expired, 50, 24).is_eligible(now));
        assert!(!point(PointStatus::Cancelled, 50, 24).is_eligible(now));
    }
}
