//! refund：部分退款返还
//!
//! 订单部分退款中归属返现的金额直接以 ready 批次退回钱包，
//! 不经过 pending 阶段。退回金额同样受余额上限截断。
//!
//! 幂等屏障是带 `cashback refund credited` 备注的流水。

use chrono::{Duration, Utc};
use tracing::{info, instrument, warn};

use cashback_shared::error::{LedgerError, Result};
use cashback_shared::phone::normalize_phone;

use crate::models::{
    CustomerIdentity, NOTE_REFUND_CREDITED, OrderEntryType, PointStatus, TxStatus, TxType,
};
use crate::repository::{
    CustomerRepository, NewPoint, NewTransaction, PointRepository, SettingsRepository,
    TransactionRepository, WalletRepository,
};

use super::{LedgerService, RefundOutcome, credit::clamp_to_cap};

impl LedgerService {
    /// 部分退款 -> 返现金额退回钱包
    ///
    /// `amount` 是退款明细中归属返现网关的金额，为 0 时无事可做。
    #[instrument(skip(self, phone_raw))]
    pub async fn refund(
        &self,
        order_id: &str,
        phone_raw: &str,
        amount: i64,
    ) -> Result<RefundOutcome> {
        if amount <= 0 {
            info!(order_id, amount, "退款无返现份额，跳过");
            return Ok(RefundOutcome {
                amount: 0,
                point_id: None,
                already_processed: false,
            });
        }

        let settings = SettingsRepository::get(&self.pool).await?;
        let phone = normalize_phone(phone_raw)
            .ok_or_else(|| LedgerError::Validation(format!("无效手机号: {phone_raw}")))?;

        let mut tx = self.pool.begin().await?;

        if TransactionRepository::exists_note_in_tx(&mut tx, order_id, NOTE_REFUND_CREDITED).await?
        {
            info!(order_id, "退款返还已处理过，跳过");
            return Ok(RefundOutcome {
                amount: 0,
                point_id: None,
                already_processed: true,
            });
        }

        let identity = CustomerIdentity {
            phone: phone.clone(),
            email: None,
            first_name: None,
            last_name: None,
            external_ref: None,
        };
        let customer = CustomerRepository::get_or_create_in_tx(&mut tx, &identity).await?;
        let wallet = WalletRepository::get_or_create_in_tx(&mut tx, customer.id).await?;

        let credited = clamp_to_cap(amount, wallet.balance, settings.max_cashback);

        // 触顶时只留标记流水，后续重复投递仍然 no-op
        if credited <= 0 {
            TransactionRepository::create_in_tx(
                &mut tx,
                &NewTransaction {
                    wallet_id: wallet.id,
                    order_id: Some(order_id),
                    tx_type: TxType::Credit,
                    status: TxStatus::Cancelled,
                    amount: 0,
                    closing_balance: wallet.balance,
                    note: Some(NOTE_REFUND_CREDITED),
                    point_id: None,
                    source_ref: None,
                },
            )
            .await?;
            tx.commit().await?;

            warn!(order_id, balance = wallet.balance, "余额触顶，退款返还被截断为 0");
            return Ok(RefundOutcome {
                amount: 0,
                point_id: None,
                already_processed: false,
            });
        }

        let now = Utc::now();
        let point = PointRepository::create_in_tx(
            &mut tx,
            &NewPoint {
                wallet_id: wallet.id,
                customer_id: customer.id,
                amount: credited,
                status: PointStatus::Ready,
                expires_on: now + Duration::days(i64::from(settings.expiry_period_days)),
            },
        )
        .await?;
        PointRepository::append_order_entry_in_tx(
            &mut tx,
            point.id,
            order_id,
            OrderEntryType::Credit,
            credited,
        )
        .await?;

        let closing_balance =
            WalletRepository::increment_balance(&mut tx, wallet.id, credited).await?;

        TransactionRepository::create_in_tx(
            &mut tx,
            &NewTransaction {
                wallet_id: wallet.id,
                order_id: Some(order_id),
                tx_type: TxType::Credit,
                status: TxStatus::Completed,
                amount: credited,
                closing_balance,
                note: Some(NOTE_REFUND_CREDITED),
                point_id: Some(point.id),
                source_ref: None,
            },
        )
        .await?;

        tx.commit().await?;

        info!(order_id, credited, closing_balance, "退款返还完成");

        self.emit_analytics(
            "cashback_refund_credited",
            serde_json::json!({
                "orderId": order_id,
                "amount": credited,
                "closingBalance": closing_balance,
            }),
        )
        .await;
        self.sync_engagement_balance(&phone, closing_balance).await;

        Ok(RefundOutcome {
            amount: credited,
            point_id: Some(point.id),
            already_processed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use crate::models::CustomerIdentity;
    use crate::service::{OrderPayload, test_support::service_with_quiet_sinks};

    /// 退款返还的 credit 流水要能落在同订单的建单 credit 旁
    #[sqlx::test(migrations = "../../migrations")]
    #[ignore] // 需要数据库连接
    async fn test_refund_credits_alongside_creation_credit(pool: PgPool) {
        let service = service_with_quiet_sinks(pool.clone());

        // 建单预授予：5% of 1000 = 50（pending，不进余额）
        service
            .credit(&OrderPayload {
                order_id: "order-1".to_string(),
                subtotal: 1000.0,
                discount_codes: vec![],
                customer: CustomerIdentity {
                    phone: "9876543210".to_string(),
                    email: None,
                    first_name: None,
                    last_name: None,
                    external_ref: None,
                },
            })
            .await
            .unwrap();

        let outcome = service.refund("order-1", "9876543210", 20).await.unwrap();
        assert!(!outcome.already_processed);
        assert_eq!(outcome.amount, 20);

        // 退回批次直接 ready，余额立即可用
        let balance: i64 = sqlx::query_scalar("SELECT balance FROM wallets")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(balance, 20);

        let credit_rows: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transactions WHERE order_id = 'order-1' AND tx_type = 'credit'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(credit_rows, 2);

        // 重复投递落在幂等标记上
        let again = service.refund("order-1", "9876543210", 20).await.unwrap();
        assert!(again.already_processed);
        assert_eq!(again.amount, 0);
    }
}
