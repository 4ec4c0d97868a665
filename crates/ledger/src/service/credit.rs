//! credit：下单预授予
//!
//! 订单创建时按全局规则计算返现金额，截断到余额上限后创建一个
//! pending 批次与一条 pending credit 流水。金额在转正（promote）
//! 之前不进入钱包余额。

use chrono::{Duration, Utc};
use tracing::{info, instrument, warn};

use cashback_shared::error::{LedgerError, Result};
use cashback_shared::phone::normalize_phone;

use crate::models::{
    CustomerIdentity, NOTE_CAP_REACHED, OrderEntryType, PointStatus, Settings, TxStatus, TxType,
};
use crate::repository::{
    CustomerRepository, NewPoint, NewTransaction, PointRepository, SettingsRepository,
    TransactionRepository, WalletRepository,
};

use super::{CreditOutcome, LedgerService, OrderPayload};

/// 按全局规则计算订单的返现金额（未截断，已取整）
///
/// 优先级：命中返现折扣码走码规则，`stack_with_allocation` 为 true
/// 时在码规则之上叠加默认发放规则；未命中折扣码走默认发放规则。
/// 先按浮点累加，最后一次性取整。
pub fn compute_credit_amount(settings: &Settings, subtotal: f64, discount_codes: &[String]) -> i64 {
    let raw = match settings.matching_code(discount_codes) {
        Some(code) => {
            let base = code.apply(subtotal);
            if code.stack_with_allocation {
                base + settings.order_allocation.apply(subtotal)
            } else {
                base
            }
        }
        None => settings.order_allocation.apply(subtotal),
    };

    raw.round() as i64
}

/// 截断到余额上限：可授予额度为 max_cashback - balance，下限 0
pub(crate) fn clamp_to_cap(computed: i64, balance: i64, max_cashback: i64) -> i64 {
    let headroom = (max_cashback - balance).max(0);
    computed.min(headroom).max(0)
}

impl LedgerService {
    /// 订单创建 -> 预授予返现
    ///
    /// 幂等：同一订单已有 credit 流水时返回 DuplicateOperation。
    #[instrument(skip(self, payload), fields(order_id = %payload.order_id))]
    pub async fn credit(&self, payload: &OrderPayload) -> Result<CreditOutcome> {
        let settings = SettingsRepository::get(&self.pool).await?;

        let normalized = normalize_phone(&payload.customer.phone).ok_or_else(|| {
            LedgerError::Validation(format!("无效手机号: {}", payload.customer.phone))
        })?;
        let identity = CustomerIdentity {
            phone: normalized,
            ..payload.customer.clone()
        };

        let mut tx = self.pool.begin().await?;

        if TransactionRepository::exists_for_order_in_tx(&mut tx, &payload.order_id, TxType::Credit)
            .await?
        {
            return Err(LedgerError::DuplicateOperation {
                order_id: payload.order_id.clone(),
                operation: "credit".to_string(),
            });
        }

        let customer = CustomerRepository::get_or_create_in_tx(&mut tx, &identity).await?;
        let wallet = WalletRepository::get_or_create_in_tx(&mut tx, customer.id).await?;

        let computed = compute_credit_amount(&settings, payload.subtotal, &payload.discount_codes);
        let amount = clamp_to_cap(computed, wallet.balance, settings.max_cashback);

        // 余额已触顶或截断后无可授予金额：只留一条 cancelled 审计流水
        if amount <= 0 {
            TransactionRepository::create_in_tx(
                &mut tx,
                &NewTransaction {
                    wallet_id: wallet.id,
                    order_id: Some(&payload.order_id),
                    tx_type: TxType::Credit,
                    status: TxStatus::Cancelled,
                    amount: 0,
                    closing_balance: wallet.balance,
                    note: Some(NOTE_CAP_REACHED),
                    point_id: None,
                    source_ref: None,
                },
            )
            .await?;
            tx.commit().await?;

            warn!(
                order_id = %payload.order_id,
                balance = wallet.balance,
                max_cashback = settings.max_cashback,
                "余额触顶，跳过预授予"
            );
            return Ok(CreditOutcome {
                amount: 0,
                point_id: None,
                capped: true,
            });
        }

        let now = Utc::now();
        let expires_on = now + Duration::days(i64::from(settings.expiry_period_days));

        let point = PointRepository::create_in_tx(
            &mut tx,
            &NewPoint {
                wallet_id: wallet.id,
                customer_id: customer.id,
                amount,
                status: PointStatus::Pending,
                expires_on,
            },
        )
        .await?;
        PointRepository::append_order_entry_in_tx(
            &mut tx,
            point.id,
            &payload.order_id,
            OrderEntryType::Credit,
            amount,
        )
        .await?;

        TransactionRepository::create_in_tx(
            &mut tx,
            &NewTransaction {
                wallet_id: wallet.id,
                order_id: Some(&payload.order_id),
                tx_type: TxType::Credit,
                status: TxStatus::Pending,
                amount,
                closing_balance: wallet.balance,
                note: None,
                point_id: Some(point.id),
                source_ref: None,
            },
        )
        .await?;

        tx.commit().await?;

        info!(
            order_id = %payload.order_id,
            amount,
            capped = computed > amount,
            "预授予完成"
        );

        self.emit_analytics(
            "cashback_pending_assigned",
            serde_json::json!({
                "orderId": payload.order_id,
                "amount": amount,
            }),
        )
        .await;
        if let Err(e) = self
            .engagement
            .track_event(
                &identity.phone,
                "cashback_pending",
                serde_json::json!({ "orderId": payload.order_id, "amount": amount }),
            )
            .await
        {
            warn!(order_id = %payload.order_id, error = %e, "触达事件上报失败（忽略）");
        }

        Ok(CreditOutcome {
            amount,
            point_id: Some(point.id),
            capped: computed > amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AllocationRule, CashbackCode, RuleKind};
    use chrono::Utc;

    fn settings(codes: Vec<CashbackCode>) -> Settings {
        Settings {
            id: 1,
            max_cashback: 500,
            expiry_period_days: 90,
            order_allocation: AllocationRule {
                kind: RuleKind::Percentage,
                value: 5.0,
            },
            usage_rule: AllocationRule {
                kind: RuleKind::Percentage,
                value: 20.0,
            },
            cashback_codes: codes,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_default_allocation() {
        let s = settings(vec![]);
        // 5% of 1000
        assert_eq!(compute_credit_amount(&s, 1000.0, &[]), 50);
    }

    #[test]
    fn test_code_overrides_allocation() {
        let s = settings(vec![CashbackCode {
            code: "CB10".to_string(),
            kind: RuleKind::Percentage,
            value: 10.0,
            stack_with_allocation: false,
        }]);

        // 命中折扣码时默认规则不参与
        assert_eq!(
            compute_credit_amount(&s, 1000.0, &["cb10-summer".to_string()]),
            100
        );
    }

    #[test]
    fn test_code_stacks_with_allocation() {
        let s = settings(vec![CashbackCode {
            code: "FLAT50".to_string(),
            kind: RuleKind::Fixed,
            value: 50.0,
            stack_with_allocation: true,
        }]);

        // 固定 50 + 默认 5% = 50 + 50
        assert_eq!(
            compute_credit_amount(&s, 1000.0, &["FLAT50".to_string()]),
            100
        );
    }

    #[test]
    fn test_rounding_at_computation() {
        let s = settings(vec![]);
        // 5% of 1010 = 50.5 -> 51（四舍五入一次，不逐项取整）
        assert_eq!(compute_credit_amount(&s, 1010.0, &[]), 51);
    }

    #[test]
    fn test_clamp_to_cap() {
        // 余额 450，上限 500 -> 最多 50
        assert_eq!(clamp_to_cap(80, 450, 500), 50);
        // 余额触顶
        assert_eq!(clamp_to_cap(80, 500, 500), 0);
        // 余额超顶（历史数据）也不为负
        assert_eq!(clamp_to_cap(80, 600, 500), 0);
        // 未触顶不截断
        assert_eq!(clamp_to_cap(30, 100, 500), 30);
    }
}
