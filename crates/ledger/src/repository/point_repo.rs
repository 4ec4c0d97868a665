//! 积分批次仓储
//!
//! 批次金额与状态的每一次变化都是条件更新：扣减要求剩余金额仍然
//! 足够，回补与转正要求状态未被并发流转。未命中即冲突信号。

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use cashback_shared::error::Result;

use crate::models::{OrderEntryType, Point, PointStatus};

/// 新建批次参数
pub struct NewPoint {
    pub wallet_id: Uuid,
    pub customer_id: Uuid,
    pub amount: i64,
    pub status: PointStatus,
    pub expires_on: DateTime<Utc>,
}

/// 订单的某次扣减触及的批次（冲正时还原的依据）
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DebitedLot {
    pub point_id: Uuid,
    /// 该订单从该批次扣走的金额
    pub amount: i64,
    pub point_status: PointStatus,
    pub expires_on: DateTime<Utc>,
}

/// 积分批次仓储
pub struct PointRepository;

impl PointRepository {
    /// 事务内创建批次
    pub async fn create_in_tx(tx: &mut PgConnection, new: &NewPoint) -> Result<Point> {
        let point = sqlx::query_as::<_, Point>(
            r#"
            INSERT INTO points (id, wallet_id, customer_id, amount, initial_amount, status, expires_on, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4, $5, $6, now(), now())
            RETURNING id, wallet_id, customer_id, amount, initial_amount, status, expires_on, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.wallet_id)
        .bind(new.customer_id)
        .bind(new.amount)
        .bind(new.status)
        .bind(new.expires_on)
        .fetch_one(tx)
        .await?;

        Ok(point)
    }

    /// 向批次的订单日志追加一条记录
    pub async fn append_order_entry_in_tx(
        tx: &mut PgConnection,
        point_id: Uuid,
        order_id: &str,
        entry_type: OrderEntryType,
        amount: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO point_orders (point_id, order_id, entry_type, amount, created_at)
            VALUES ($1, $2, $3, $4, now())
            "#,
        )
        .bind(point_id)
        .bind(order_id)
        .bind(entry_type)
        .bind(amount)
        .execute(tx)
        .await?;

        Ok(())
    }

    /// 查找该订单的预授予批次
    ///
    /// 要求批次的订单日志恰好只有这一条原始 credit 记录——
    /// 被其他订单碰过的批次不属于待转正场景。
    pub async fn find_pending_by_credit_order_in_tx(
        tx: &mut PgConnection,
        order_id: &str,
    ) -> Result<Option<Point>> {
        let point = sqlx::query_as::<_, Point>(
            r#"
            SELECT p.id, p.wallet_id, p.customer_id, p.amount, p.initial_amount,
                   p.status, p.expires_on, p.created_at, p.updated_at
            FROM points p
            JOIN point_orders po ON po.point_id = p.id
            WHERE p.status = 'pending'
              AND po.order_id = $1
              AND po.entry_type = 'credit'
              AND (SELECT COUNT(*) FROM point_orders WHERE point_id = p.id) = 1
            "#,
        )
        .bind(order_id)
        .fetch_optional(tx)
        .await?;

        Ok(point)
    }

    /// 条件转正：pending -> ready 并刷新过期时间
    pub async fn try_promote(
        tx: &mut PgConnection,
        point_id: Uuid,
        new_expiry: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE points
            SET status = 'ready', expires_on = $2, updated_at = now()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(point_id)
        .bind(new_expiry)
        .execute(tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 可用于扣减的批次，按最近过期优先排序
    ///
    /// 排序键 (expires_on, id) 是确定性的：先消耗最快过期的批次，
    /// 最小化后续的过期核销。
    pub async fn list_eligible_in_tx(
        tx: &mut PgConnection,
        wallet_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Point>> {
        let points = sqlx::query_as::<_, Point>(
            r#"
            SELECT id, wallet_id, customer_id, amount, initial_amount,
                   status, expires_on, created_at, updated_at
            FROM points
            WHERE wallet_id = $1 AND status = 'ready' AND amount > 0 AND expires_on > $2
            ORDER BY expires_on ASC, id ASC
            "#,
        )
        .bind(wallet_id)
        .bind(now)
        .fetch_all(tx)
        .await?;

        Ok(points)
    }

    /// 条件扣减批次金额：仅当剩余金额仍 >= 扣减额时生效
    pub async fn try_deduct(tx: &mut PgConnection, point_id: Uuid, amount: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE points
            SET amount = amount - $2, updated_at = now()
            WHERE id = $1 AND status = 'ready' AND amount >= $2
            "#,
        )
        .bind(point_id)
        .bind(amount)
        .execute(tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 条件回补批次金额：仅对仍为 ready 的批次生效
    ///
    /// 已过期批次不回补——冲正把这部分金额记为不可退回。
    pub async fn try_restore(tx: &mut PgConnection, point_id: Uuid, amount: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE points
            SET amount = amount + $2, updated_at = now()
            WHERE id = $1 AND status = 'ready'
            "#,
        )
        .bind(point_id)
        .bind(amount)
        .execute(tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 某订单 debit 日志触及的批次（含当前状态，冲正用）
    pub async fn debited_lots_for_order_in_tx(
        tx: &mut PgConnection,
        order_id: &str,
    ) -> Result<Vec<DebitedLot>> {
        let lots = sqlx::query_as::<_, DebitedLot>(
            r#"
            SELECT po.point_id, po.amount, p.status AS point_status, p.expires_on
            FROM point_orders po
            JOIN points p ON p.id = po.point_id
            WHERE po.order_id = $1 AND po.entry_type = 'debit'
            ORDER BY po.id ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(tx)
        .await?;

        Ok(lots)
    }

    /// 取消订单的 pending 批次，返回取消数量
    pub async fn cancel_pending_by_order_in_tx(
        tx: &mut PgConnection,
        order_id: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE points
            SET status = 'cancelled', updated_at = now()
            WHERE status = 'pending'
              AND id IN (
                  SELECT point_id FROM point_orders
                  WHERE order_id = $1 AND entry_type = 'credit'
              )
            "#,
        )
        .bind(order_id)
        .execute(tx)
        .await?;

        Ok(result.rows_affected())
    }

    /// 过期清扫候选批次：ready 且过期时刻早于截止点
    pub async fn list_expiry_candidates(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Point>> {
        let points = sqlx::query_as::<_, Point>(
            r#"
            SELECT id, wallet_id, customer_id, amount, initial_amount,
                   status, expires_on, created_at, updated_at
            FROM points
            WHERE status = 'ready' AND expires_on < $1
            ORDER BY expires_on ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(points)
    }

    /// 条件认领过期批次：ready -> expired，返回认领时刻的批次金额
    ///
    /// 并发清扫运行时同一批次只会被一方认领成功，另一方拿到 None。
    /// 扫描快照与认领之间批次金额可能被冲正回补过，核销金额必须
    /// 以这里返回的实时值为准。
    pub async fn try_claim_expired(
        tx: &mut PgConnection,
        point_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        let amount = sqlx::query_scalar(
            r#"
            UPDATE points
            SET status = 'expired', updated_at = now()
            WHERE id = $1 AND status = 'ready' AND expires_on < $2
            RETURNING amount
            "#,
        )
        .bind(point_id)
        .bind(cutoff)
        .fetch_optional(tx)
        .await?;

        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::PgPool;

    async fn seed_expired_lot(pool: &PgPool, amount: i64) -> Uuid {
        let customer_id = Uuid::new_v4();
        let wallet_id = Uuid::new_v4();
        let point_id = Uuid::new_v4();

        sqlx::query("INSERT INTO customers (id, phone) VALUES ($1, '+919876543210')")
            .bind(customer_id)
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
        .bind(Utc::now() - Duration::days(2))
        .execute(pool)
        .await
        .unwrap();

        point_id
    }

    /// 认领返回的是批次的实时金额，不是调用方的扫描快照
    #[sqlx::test(migrations = "../../migrations")]
    #[ignore] // 需要数据库连接
    async fn test_try_claim_expired_returns_live_amount(pool: PgPool) {
        let point_id = seed_expired_lot(&pool, 30).await;

        // 扫描之后批次被并发冲正回补过
        sqlx::query("UPDATE points SET amount = 40 WHERE id = $1")
            .bind(point_id)
            .execute(&pool)
            .await
            .unwrap();

        let mut tx = pool.begin().await.unwrap();
        let claimed = PointRepository::try_claim_expired(&mut tx, point_id, Utc::now())
            .await
            .unwrap();
        assert_eq!(claimed, Some(40));

        // 已不是 ready，重复认领未命中
        let again = PointRepository::try_claim_expired(&mut tx, point_id, Utc::now())
            .await
            .unwrap();
        assert_eq!(again, None);
        tx.commit().await.unwrap();
    }

    /// 未到截止点的批次不会被认领
    #[sqlx::test(migrations = "../../migrations")]
    #[ignore] // 需要数据库连接
    async fn test_try_claim_expired_respects_cutoff(pool: PgPool) {
        let point_id = seed_expired_lot(&pool, 30).await;

        let mut tx = pool.begin().await.unwrap();
        let claimed =
            PointRepository::try_claim_expired(&mut tx, point_id, Utc::now() - Duration::days(5))
                .await
                .unwrap();
        assert_eq!(claimed, None);
    }
}
