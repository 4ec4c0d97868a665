//! distribution：手工/批量发放
//!
//! 运营侧直接给指定客户发放 ready 批次，过期时间由调用方给定。
//! 与事件驱动的 credit 不同：客户与钱包必须已经存在，余额触顶
//! 是硬错误而不是静默审计。
//!
//! 幂等以 source_ref 为准，批量任务的引用形如 "{job_id}:{row_index}"。

use tracing::{info, instrument};

use cashback_shared::error::{LedgerError, Result};
use cashback_shared::phone::normalize_phone;

use crate::models::{NOTE_MANUAL_DISTRIBUTION, PointStatus, TxStatus, TxType};
use crate::repository::{
    CustomerRepository, NewPoint, NewTransaction, PointRepository, SettingsRepository,
    TransactionRepository, WalletRepository,
};

use super::{DistributionOutcome, DistributionRequest, LedgerService, credit::clamp_to_cap};

impl LedgerService {
    /// 给指定客户发放一个 ready 批次
    #[instrument(skip(self, request), fields(source_ref = %request.source_ref))]
    pub async fn distribute(&self, request: &DistributionRequest) -> Result<DistributionOutcome> {
        if request.amount <= 0 {
            return Err(LedgerError::Validation(format!(
                "发放金额必须为正: {}",
                request.amount
            )));
        }
        let phone = normalize_phone(&request.phone)
            .ok_or_else(|| LedgerError::Validation(format!("无效手机号: {}", request.phone)))?;

        let settings = SettingsRepository::get(&self.pool).await?;

        let mut tx = self.pool.begin().await?;

        if TransactionRepository::exists_source_ref_in_tx(&mut tx, &request.source_ref).await? {
            return Err(LedgerError::DuplicateOperation {
                order_id: request.source_ref.clone(),
                operation: "distribution".to_string(),
            });
        }

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

        // 运营发放时余额触顶是调用方需要知道的硬错误
        if wallet.balance >= settings.max_cashback {
            return Err(LedgerError::Validation(format!(
                "钱包余额已达上限 {}，无法发放",
                settings.max_cashback
            )));
        }
        let amount = clamp_to_cap(request.amount, wallet.balance, settings.max_cashback);

        let point = PointRepository::create_in_tx(
            &mut tx,
            &NewPoint {
                wallet_id: wallet.id,
                customer_id: customer.id,
                amount,
                status: PointStatus::Ready,
                expires_on: request.expires_on,
            },
        )
        .await?;

        let closing_balance =
            WalletRepository::increment_balance(&mut tx, wallet.id, amount).await?;

        TransactionRepository::create_in_tx(
            &mut tx,
            &NewTransaction {
                wallet_id: wallet.id,
                order_id: None,
                tx_type: TxType::Credit,
                status: TxStatus::Completed,
                amount,
                closing_balance,
                note: Some(NOTE_MANUAL_DISTRIBUTION),
                point_id: Some(point.id),
                source_ref: Some(&request.source_ref),
            },
        )
        .await?;

        tx.commit().await?;

        info!(
            source_ref = %request.source_ref,
            amount,
            closing_balance,
            "发放完成"
        );

        self.emit_analytics(
            "cashback_distributed",
            serde_json::json!({
                "sourceRef": request.source_ref,
                "amount": amount,
                "closingBalance": closing_balance,
            }),
        )
        .await;
        self.sync_engagement_balance(&phone, closing_balance).await;

        Ok(DistributionOutcome {
            point_id: point.id,
            amount,
        })
    }
}
