//! cancel：订单取消冲正
//!
//! 取消订单时把该订单扣走的金额逐批次回补。仍为 ready 的批次
//! 可退回；已过期的批次不退（金额记入审计流水，不回钱包）。
//! 未转正的预授予批次与 pending credit 流水一并作废。
//!
//! 幂等屏障是带 `refund on cancellation` 备注的流水：存在即说明
//! 冲正已经做过，整个操作 no-op。

use tracing::{info, instrument, warn};

use cashback_shared::error::Result;

use crate::models::{
    NOTE_BLOCKED_BY_EXPIRY, NOTE_CANCELLATION_REFUND, OrderEntryType, PointStatus, TxStatus,
    TxType,
};
use crate::repository::{
    CustomerRepository, DebitedLot, NewTransaction, PointRepository, TransactionRepository,
    WalletRepository,
};

use super::{CancelOutcome, LedgerService};

/// 按批次当前状态划分可退回与不可退回的金额
///
/// ready 批次进入回补候选；其余状态（过期、已取消）的扣减金额
/// 直接计入不可退回。返回 (候选批次, 不可退回金额)。
fn classify_debited_lots(lots: &[DebitedLot]) -> (Vec<&DebitedLot>, i64) {
    let mut candidates = Vec::new();
    let mut non_refundable = 0_i64;

    for lot in lots {
        if lot.point_status == PointStatus::Ready {
            candidates.push(lot);
        } else {
            non_refundable += lot.amount;
        }
    }

    (candidates, non_refundable)
}

impl LedgerService {
    /// 订单取消 -> 冲正该订单对账本的全部影响
    #[instrument(skip(self))]
    pub async fn cancel(&self, order_id: &str) -> Result<CancelOutcome> {
        let mut tx = self.pool.begin().await?;

        if TransactionRepository::exists_note_in_tx(&mut tx, order_id, NOTE_CANCELLATION_REFUND)
            .await?
        {
            info!(order_id, "取消冲正已处理过，跳过");
            return Ok(CancelOutcome {
                already_processed: true,
                ..CancelOutcome::default()
            });
        }

        let Some(wallet_id) =
            TransactionRepository::find_wallet_for_order_in_tx(&mut tx, order_id).await?
        else {
            // 订单从未触达账本（如触顶订单之前就没有流水），无可冲正
            info!(order_id, "订单无账本痕迹，跳过取消冲正");
            return Ok(CancelOutcome::default());
        };

        // 未转正的预授予批次与流水直接作废
        let cancelled_points = PointRepository::cancel_pending_by_order_in_tx(&mut tx, order_id).await?;
        let cancelled_txs =
            TransactionRepository::cancel_pending_credit_in_tx(&mut tx, order_id).await?;
        if cancelled_points > 0 || cancelled_txs > 0 {
            info!(order_id, cancelled_points, cancelled_txs, "作废未转正的预授予");
        }

        // 逐批次回补该订单扣走的金额
        let lots = PointRepository::debited_lots_for_order_in_tx(&mut tx, order_id).await?;
        let (candidates, mut non_refundable) = classify_debited_lots(&lots);

        let mut refundable = 0_i64;
        for lot in candidates {
            if PointRepository::try_restore(&mut tx, lot.point_id, lot.amount).await? {
                PointRepository::append_order_entry_in_tx(
                    &mut tx,
                    lot.point_id,
                    order_id,
                    OrderEntryType::Credit,
                    lot.amount,
                )
                .await?;
                refundable += lot.amount;
            } else {
                // 读取与回补之间批次被清扫过期，这部分同样不退
                non_refundable += lot.amount;
            }
        }

        let closing_balance = if refundable > 0 {
            WalletRepository::increment_balance(&mut tx, wallet_id, refundable).await?
        } else {
            WalletRepository::balance_in_tx(&mut tx, wallet_id).await?
        };

        if let Some(debit) = TransactionRepository::find_active_debit_in_tx(&mut tx, order_id).await?
        {
            TransactionRepository::mark_cancelled_in_tx(&mut tx, debit.id).await?;
        }

        // 冲正流水兼做幂等标记；全部不可退回时留一条零额 expired 审计
        TransactionRepository::create_in_tx(
            &mut tx,
            &NewTransaction {
                wallet_id,
                order_id: Some(order_id),
                tx_type: TxType::Credit,
                status: if refundable > 0 {
                    TxStatus::Completed
                } else {
                    TxStatus::Expired
                },
                amount: refundable,
                closing_balance,
                note: Some(NOTE_CANCELLATION_REFUND),
                point_id: None,
                source_ref: None,
            },
        )
        .await?;

        if non_refundable > 0 {
            TransactionRepository::create_in_tx(
                &mut tx,
                &NewTransaction {
                    wallet_id,
                    order_id: Some(order_id),
                    tx_type: TxType::Credit,
                    status: TxStatus::Expired,
                    amount: non_refundable,
                    closing_balance,
                    note: Some(NOTE_BLOCKED_BY_EXPIRY),
                    point_id: None,
                    source_ref: None,
                },
            )
            .await?;
            warn!(order_id, non_refundable, "部分金额因批次过期未退回");
        }

        let customer = CustomerRepository::find_by_wallet_in_tx(&mut tx, wallet_id).await?;

        tx.commit().await?;

        info!(order_id, refundable, non_refundable, "取消冲正完成");

        self.emit_analytics(
            "cashback_cancellation_refunded",
            serde_json::json!({
                "orderId": order_id,
                "refundable": refundable,
                "nonRefundable": non_refundable,
            }),
        )
        .await;
        if let Some(customer) = customer
            && refundable > 0
        {
            self.sync_engagement_balance(&customer.phone, closing_balance)
                .await;
        }

        Ok(CancelOutcome {
            refundable,
            non_refundable,
            already_processed: false,
        })
    }
}
