//! debit：结算扣减
//!
//! 顾客用返现抵扣订单时，按最近过期优先的顺序消耗 ready 批次。
//! 每一步批次扣减与最终的余额扣减都是条件更新，任何一步未命中
//! 说明读到的快照已失效，整个事务回滚交给重试。

use chrono::Utc;
use tracing::{info, instrument};

use cashback_shared::error::{LedgerError, Result};
use cashback_shared::phone::normalize_phone;

use crate::models::{OrderEntryType, Point, TxStatus, TxType};
use crate::repository::{
    CustomerRepository, NewTransaction, PointRepository, TransactionRepository, WalletRepository,
};

use super::{DebitOutcome, DeductionItem, LedgerService};

/// 对已按 (expires_on, id) 升序排列的批次规划扣减
///
/// 每个批次最多取其剩余金额，返回扣减计划与未能覆盖的缺口。
/// 缺口大于 0 表示可用批次总额不足（余额与批次出现了偏差）。
pub fn plan_deductions(points: &[Point], amount: i64) -> (Vec<DeductionItem>, i64) {
    let mut remaining = amount;
    let mut plan = Vec::new();

    for point in points {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(point.amount);
        if take > 0 {
            plan.push(DeductionItem {
                point_id: point.id,
                expires_on: point.expires_on,
                amount: take,
            });
            remaining -= take;
        }
    }

    (plan, remaining)
}

impl LedgerService {
    /// 返现抵扣 -> 扣减钱包与批次
    ///
    /// 幂等：同一订单已有 debit 流水时返回 DuplicateOperation。
    #[instrument(skip(self, phone_raw))]
    pub async fn debit(&self, order_id: &str, phone_raw: &str, amount: i64) -> Result<DebitOutcome> {
        if amount <= 0 {
            return Err(LedgerError::Validation(format!(
                "抵扣金额必须为正: {amount}"
            )));
        }
        let phone = normalize_phone(phone_raw)
            .ok_or_else(|| LedgerError::Validation(format!("无效手机号: {phone_raw}")))?;

        let mut tx = self.pool.begin().await?;

        if TransactionRepository::exists_for_order_in_tx(&mut tx, order_id, TxType::Debit).await? {
            return Err(LedgerError::DuplicateOperation {
                order_id: order_id.to_string(),
                operation: "debit".to_string(),
            });
        }

        // 抵扣的前提是客户已经有钱包，缺失即数据异常
        let customer = CustomerRepository::find_by_phone_in_tx(&mut tx, &phone)
            .await?
            .ok_or_else(|| LedgerError::NotFound {
                entity: "customer".to_string(),
                id: phone.clone(),
            })?;
        let wallet = WalletRepository::find_by_customer_in_tx(&mut tx, customer.id)
            .await?
            .ok_or_else(|| LedgerError::NotFound {
                entity: "wallet".to_string(),
                id: customer.id.to_string(),
            })?;

        if wallet.balance < amount {
            return Err(LedgerError::InsufficientBalance {
                required: amount,
                actual: wallet.balance,
            });
        }

        let now = Utc::now();
        let eligible = PointRepository::list_eligible_in_tx(&mut tx, wallet.id, now).await?;
        let (plan, leftover) = plan_deductions(&eligible, amount);
        if leftover > 0 {
            // 余额够但批次不够：余额与批次出现偏差，拒绝落账
            return Err(LedgerError::InsufficientEligiblePoints { remaining: leftover });
        }

        for item in &plan {
            if !PointRepository::try_deduct(&mut tx, item.point_id, item.amount).await? {
                return Err(LedgerError::ConcurrentModification {
                    entity: "point".to_string(),
                    id: item.point_id.to_string(),
                });
            }
            PointRepository::append_order_entry_in_tx(
                &mut tx,
                item.point_id,
                order_id,
                OrderEntryType::Debit,
                item.amount,
            )
            .await?;
        }

        let closing_balance = WalletRepository::try_decrement_balance(&mut tx, wallet.id, amount)
            .await?
            .ok_or_else(|| LedgerError::ConcurrentModification {
                entity: "wallet".to_string(),
                id: wallet.id.to_string(),
            })?;

        TransactionRepository::create_in_tx(
            &mut tx,
            &NewTransaction {
                wallet_id: wallet.id,
                order_id: Some(order_id),
                tx_type: TxType::Debit,
                status: TxStatus::Completed,
                amount,
                closing_balance,
                note: None,
                point_id: None,
                source_ref: None,
            },
        )
        .await?;

        tx.commit().await?;

        info!(
            order_id,
            amount,
            closing_balance,
            lots = plan.len(),
            "抵扣落账完成"
        );

        self.emit_analytics(
            "cashback_utilised",
            serde_json::json!({
                "orderId": order_id,
                "amount": amount,
                "closingBalance": closing_balance,
            }),
        )
        .await;
        self.sync_engagement_balance(&phone, closing_balance).await;

        Ok(DebitOutcome {
            amount,
            closing_balance,
            breakdown: plan,
        })
    }
}
