//! 过期清扫
//!
//! 定期把过期的 ready 批次核销掉：批次流转到 expired，钱包余额
//! 同步扣减（向下取齐到 0），并留一条 expired debit 审计流水。
//!
//! 截止点取 IST 当日零点，即"昨天及更早过期"的批次才会被核销。
//! 每个批次单独一个事务，认领（ready -> expired）是条件更新，
//! 两个清扫实例并发运行时同一批次只会被核销一次，重跑天然幂等。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{info, instrument, warn};

use cashback_shared::error::Result;
use cashback_shared::time::start_of_day_ist;

use crate::collaborators::{AnalyticsEvent, AnalyticsSink, EngagementPlatform};
use crate::models::{NOTE_EXPIRED, Point, TxStatus, TxType};
use crate::repository::{CustomerRepository, NewTransaction, PointRepository, TransactionRepository, WalletRepository};

/// 单轮清扫的统计结果
#[derive(Debug, Default, Clone)]
pub struct SweepSummary {
    /// 扫描到的候选批次数
    pub scanned: usize,
    /// 成功核销的批次数
    pub expired: usize,
    /// 认领未命中而跳过的批次数（被并发方处理）
    pub skipped: usize,
    /// 核销总金额
    pub amount_expired: i64,
}

/// 核销后待通知的客户余额快照
struct ExpiryNotice {
    phone: String,
    closing_balance: i64,
    amount: i64,
}

/// 过期批次清扫器
pub struct ExpirySweeper {
    pool: PgPool,
    batch_size: i64,
    analytics: Arc<dyn AnalyticsSink>,
    engagement: Arc<dyn EngagementPlatform>,
}

impl ExpirySweeper {
    pub fn new(
        pool: PgPool,
        batch_size: i64,
        analytics: Arc<dyn AnalyticsSink>,
        engagement: Arc<dyn EngagementPlatform>,
    ) -> Self {
        Self {
            pool,
            batch_size,
            analytics,
            engagement,
        }
    }

    /// 执行一轮完整清扫：分批拉取候选直到取不满一批
    #[instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SweepSummary> {
        let cutoff = start_of_day_ist(now);
        info!(%cutoff, batch_size = self.batch_size, "开始过期清扫");

        let mut summary = SweepSummary::default();
        let mut notices: Vec<ExpiryNotice> = Vec::new();

        loop {
            let candidates =
                PointRepository::list_expiry_candidates(&self.pool, cutoff, self.batch_size)
                    .await?;
            let batch_len = candidates.len();
            summary.scanned += batch_len;

            // 仍停留在 ready 的失败批次会被下一批重新扫到，整批
            // 无一离开候选集时必须终止，否则本轮会原地空转
            let mut left_candidate_set = 0_usize;

            for point in candidates {
                match self.expire_lot(&point, cutoff).await {
                    Ok(Some(notice)) => {
                        summary.expired += 1;
                        summary.amount_expired += notice.amount;
                        left_candidate_set += 1;
                        notices.push(notice);
                    }
                    Ok(None) => {
                        summary.skipped += 1;
                        left_candidate_set += 1;
                    }
                    Err(e) => {
                        // 单个批次失败不中断整轮，下一轮清扫还会扫到它
                        warn!(point_id = %point.id, error = %e, "批次核销失败，跳过");
                        summary.skipped += 1;
                    }
                }
            }

            if (batch_len as i64) < self.batch_size {
                break;
            }
            if left_candidate_set == 0 {
                warn!(batch_len, "整批批次核销失败，提前结束本轮");
                break;
            }
        }

        info!(
            scanned = summary.scanned,
            expired = summary.expired,
            skipped = summary.skipped,
            amount = summary.amount_expired,
            "过期清扫完成"
        );

        self.notify(notices).await;

        Ok(summary)
    }

    /// 核销单个批次（独立事务）
    ///
    /// 认领未命中返回 None：批次在扫描与核销之间被并发方流转过。
    /// 核销金额取认领时刻的实时值，扫描快照可能已被冲正回补过。
    async fn expire_lot(&self, point: &Point, cutoff: DateTime<Utc>) -> Result<Option<ExpiryNotice>> {
        let mut tx = self.pool.begin().await?;

        let Some(amount) = PointRepository::try_claim_expired(&mut tx, point.id, cutoff).await?
        else {
            return Ok(None);
        };

        let closing_balance =
            WalletRepository::decrement_balance_floor_zero(&mut tx, point.wallet_id, amount)
                .await?;

        TransactionRepository::create_in_tx(
            &mut tx,
            &NewTransaction {
                wallet_id: point.wallet_id,
                order_id: None,
                tx_type: TxType::Debit,
                status: TxStatus::Expired,
                amount,
                closing_balance,
                note: Some(NOTE_EXPIRED),
                point_id: Some(point.id),
                source_ref: None,
            },
        )
        .await?;

        let customer = CustomerRepository::find_by_wallet_in_tx(&mut tx, point.wallet_id).await?;

        tx.commit().await?;

        Ok(customer.map(|c| ExpiryNotice {
            phone: c.phone,
            closing_balance,
            amount,
        }))
    }

    /// 清扫完成后的 best-effort 通知
    ///
    /// 同一客户可能有多个批次过期，按手机号合并后只同步一次
    /// 最终余额，失败只记日志。
    async fn notify(&self, notices: Vec<ExpiryNotice>) {
        let mut by_phone: HashMap<String, (i64, i64)> = HashMap::new();
        for notice in notices {
            let entry = by_phone.entry(notice.phone).or_insert((0, notice.closing_balance));
            entry.0 += notice.amount;
            // 通知按核销顺序收集，最后一条的余额就是最终余额
            entry.1 = notice.closing_balance;
        }

        for (phone, (amount, closing_balance)) in by_phone {
            if let Err(e) = self
                .engagement
                .upsert_attributes(&phone, serde_json::json!({ "walletBalance": closing_balance }))
                .await
            {
                warn!(phone, error = %e, "过期余额同步失败（忽略）");
            }
            if let Err(e) = self
                .analytics
                .record(&AnalyticsEvent::new(
                    "cashback_expired",
                    serde_json::json!({ "amount": amount, "closingBalance": closing_balance }),
                ))
                .await
            {
                warn!(phone, error = %e, "过期事件上报失败（忽略）");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{MockAnalyticsSink, MockEngagementPlatform};
    use chrono::Duration;
    use uuid::Uuid;

    fn sweeper(pool: PgPool, batch_size: i64) -> ExpirySweeper {
        let mut analytics = MockAnalyticsSink::new();
        analytics.expect_record().returning(|_| Ok(()));
        let mut engagement = MockEngagementPlatform::new();
        engagement
            .expect_upsert_attributes()
            .returning(|_, _| Ok(()));
        ExpirySweeper::new(pool, batch_size, Arc::new(analytics), Arc::new(engagement))
    }

    async fn seed_lot(pool: &PgPool, phone: &str, amount: i64, expires_in_days: i64) -> Uuid {
        let customer_id = Uuid::new_v4();
        let wallet_id = Uuid::new_v4();
        let point_id = Uuid::new_v4();

        sqlx::query("INSERT INTO customers (id, phone) VALUES ($1, $2)")
            .bind(customer_id)
            .bind(phone)
            .execute(pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO wallets (id, customer_id, balance) VALUES ($1, $2, $3)")
            .bind(wallet_id)
            .bind(customer_id)
            .bind(amount)
            .execute(pool)
            .await
            .unwrap();
        sqlx::query(
            r#"
            INSERT INTO points (id, wallet_id, customer_id, amount, initial_amount, status, expires_on)
            VALUES ($1, $2, $3, $4, $4, 'ready', $5)
            "#,
        )
        .bind(point_id)
        .bind(wallet_id)
        .bind(customer_id)
        .bind(amount)
        .bind(Utc::now() + Duration::days(expires_in_days))
        .execute(pool)
        .await
        .unwrap();

        point_id
    }

    /// 过期批次核销后余额扣减，重跑不会重复核销
    #[sqlx::test(migrations = "../../migrations")]
    #[ignore] // 需要数据库连接
    async fn test_run_once_expires_and_reruns_are_noop(pool: PgPool) {
        let point_id = seed_lot(&pool, "+919876543210", 30, -2).await;
        let survivor = seed_lot(&pool, "+919876543211", 50, 30).await;
        let s = sweeper(pool.clone(), 50);

        let first = s.run_once(Utc::now()).await.unwrap();
        assert_eq!(first.expired, 1);
        assert_eq!(first.amount_expired, 30);

        let status: String = sqlx::query_scalar("SELECT status FROM points WHERE id = $1")
            .bind(point_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "expired");

        // 未到期的批次与其钱包不受影响
        let survivor_status: String = sqlx::query_scalar("SELECT status FROM points WHERE id = $1")
            .bind(survivor)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(survivor_status, "ready");

        // 全库不变量：余额总和 == ready 批次金额总和
        let balance_total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(balance), 0) FROM wallets")
            .fetch_one(&pool)
            .await
            .unwrap();
        let ready_total: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(amount), 0) FROM points WHERE status = 'ready'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(balance_total, ready_total);

        let second = s.run_once(Utc::now()).await.unwrap();
        assert_eq!(second.scanned, 0);
        assert_eq!(second.expired, 0);
        assert_eq!(second.amount_expired, 0);
    }

    /// 核销金额取认领时刻的实时值：扫描后被回补的批次按回补后金额核销
    #[sqlx::test(migrations = "../../migrations")]
    #[ignore] // 需要数据库连接
    async fn test_expired_amount_follows_live_lot_value(pool: PgPool) {
        let point_id = seed_lot(&pool, "+919876543210", 30, -2).await;
        // 模拟扫描快照之后的冲正回补
        sqlx::query("UPDATE points SET amount = 40 WHERE id = $1")
            .bind(point_id)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("UPDATE wallets SET balance = 40")
            .execute(&pool)
            .await
            .unwrap();

        let s = sweeper(pool.clone(), 50);
        let summary = s.run_once(Utc::now()).await.unwrap();
        assert_eq!(summary.expired, 1);
        assert_eq!(summary.amount_expired, 40);

        let balance: i64 = sqlx::query_scalar("SELECT balance FROM wallets")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(balance, 0);

        // 审计流水记录的也是实时金额
        let tx_amount: i64 =
            sqlx::query_scalar("SELECT amount FROM transactions WHERE note = $1")
                .bind(NOTE_EXPIRED)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(tx_amount, 40);
    }
}
