//! promote：发货转正
//!
//! 订单发货后把该订单的预授予批次从 pending 流转到 ready，
//! 金额此刻才进入钱包余额，过期时间以转正时刻为基准重算。

use chrono::{Duration, Utc};
use tracing::{info, instrument};

use cashback_shared::error::{LedgerError, Result};

use crate::repository::{
    CustomerRepository, PointRepository, SettingsRepository, TransactionRepository,
    WalletRepository,
};

use super::{LedgerService, PromoteOutcome};

impl LedgerService {
    /// 订单发货 -> 预授予批次转正
    ///
    /// 找不到待转正批次时静默 no-op（返回 None）：订单可能因触顶
    /// 没有批次、已转正过、或批次已被取消，重复投递都落在这里。
    #[instrument(skip(self))]
    pub async fn promote(&self, order_id: &str) -> Result<Option<PromoteOutcome>> {
        let settings = SettingsRepository::get(&self.pool).await?;

        let mut tx = self.pool.begin().await?;

        let Some(point) =
            PointRepository::find_pending_by_credit_order_in_tx(&mut tx, order_id).await?
        else {
            info!(order_id, "无待转正批次，跳过");
            return Ok(None);
        };

        let now = Utc::now();
        let new_expiry = now + Duration::days(i64::from(settings.expiry_period_days));

        if !PointRepository::try_promote(&mut tx, point.id, new_expiry).await? {
            return Err(LedgerError::ConcurrentModification {
                entity: "point".to_string(),
                id: point.id.to_string(),
            });
        }

        let closing_balance =
            WalletRepository::increment_balance(&mut tx, point.wallet_id, point.amount).await?;
        TransactionRepository::complete_pending_credit_in_tx(&mut tx, order_id, closing_balance)
            .await?;

        let customer = CustomerRepository::find_by_id_in_tx(&mut tx, point.customer_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound {
                entity: "customer".to_string(),
                id: point.customer_id.to_string(),
            })?;

        tx.commit().await?;

        info!(order_id, amount = point.amount, closing_balance, "批次转正完成");

        self.emit_analytics(
            "cashback_assigned",
            serde_json::json!({
                "orderId": order_id,
                "amount": point.amount,
                "closingBalance": closing_balance,
            }),
        )
        .await;
        self.sync_engagement_balance(&customer.phone, closing_balance)
            .await;

        Ok(Some(PromoteOutcome {
            point_id: point.id,
            amount: point.amount,
            closing_balance,
            phone: customer.phone,
        }))
    }
}
