//! 审计流水仓储
//!
//! (order_id, tx_type) 的存在性检查是所有账本操作的首要幂等屏障；
//! 带标记备注的流水充当取消/退回场景的幂等标记。

use sqlx::{PgConnection, Row};
use uuid::Uuid;

use cashback_shared::error::Result;

use crate::models::{LedgerTransaction, TxStatus, TxType};

/// 新建流水参数
pub struct NewTransaction<'a> {
    pub wallet_id: Uuid,
    pub order_id: Option<&'a str>,
    pub tx_type: TxType,
    pub status: TxStatus,
    pub amount: i64,
    pub closing_balance: i64,
    pub note: Option<&'a str>,
    pub point_id: Option<Uuid>,
    pub source_ref: Option<&'a str>,
}

/// 审计流水仓储
pub struct TransactionRepository;

impl TransactionRepository {
    /// 事务内创建流水
    pub async fn create_in_tx(
        tx: &mut PgConnection,
        new: &NewTransaction<'_>,
    ) -> Result<LedgerTransaction> {
        let transaction = sqlx::query_as::<_, LedgerTransaction>(
            r#"
            INSERT INTO transactions
                (id, wallet_id, order_id, tx_type, status, amount, closing_balance,
                 note, point_id, source_ref, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now(), now())
            RETURNING id, wallet_id, order_id, tx_type, status, amount, closing_balance,
                      note, point_id, source_ref, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.wallet_id)
        .bind(new.order_id)
        .bind(new.tx_type)
        .bind(new.status)
        .bind(new.amount)
        .bind(new.closing_balance)
        .bind(new.note)
        .bind(new.point_id)
        .bind(new.source_ref)
        .fetch_one(tx)
        .await?;

        Ok(transaction)
    }

    /// 订单是否已有该类型的流水（幂等屏障）
    pub async fn exists_for_order_in_tx(
        tx: &mut PgConnection,
        order_id: &str,
        tx_type: TxType,
    ) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM transactions WHERE order_id = $1 AND tx_type = $2
            ) AS found
            "#,
        )
        .bind(order_id)
        .bind(tx_type)
        .fetch_one(tx)
        .await?;

        Ok(row.get("found"))
    }

    /// 订单是否已有携带指定标记备注的流水（取消/退回的幂等标记）
    pub async fn exists_note_in_tx(
        tx: &mut PgConnection,
        order_id: &str,
        note: &str,
    ) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM transactions WHERE order_id = $1 AND note = $2
            ) AS found
            "#,
        )
        .bind(order_id)
        .bind(note)
        .fetch_one(tx)
        .await?;

        Ok(row.get("found"))
    }

    /// 行级幂等引用是否已被消费（批量/手工发放）
    pub async fn exists_source_ref_in_tx(tx: &mut PgConnection, source_ref: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM transactions WHERE source_ref = $1
            ) AS found
            "#,
        )
        .bind(source_ref)
        .fetch_one(tx)
        .await?;

        Ok(row.get("found"))
    }

    /// 把订单的 pending credit 流水标记为已生效，刷新余额快照
    pub async fn complete_pending_credit_in_tx(
        tx: &mut PgConnection,
        order_id: &str,
        closing_balance: i64,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'completed', closing_balance = $2, updated_at = now()
            WHERE order_id = $1 AND tx_type = 'credit' AND status = 'pending'
            "#,
        )
        .bind(order_id)
        .bind(closing_balance)
        .execute(tx)
        .await?;

        Ok(result.rows_affected())
    }

    /// 订单触及的钱包（任意一条流水即可定位）
    pub async fn find_wallet_for_order_in_tx(
        tx: &mut PgConnection,
        order_id: &str,
    ) -> Result<Option<Uuid>> {
        let row = sqlx::query(
            r#"
            SELECT wallet_id FROM transactions WHERE order_id = $1 LIMIT 1
            "#,
        )
        .bind(order_id)
        .fetch_optional(tx)
        .await?;

        Ok(row.map(|r| r.get("wallet_id")))
    }

    /// 查找订单的有效 debit 流水（pending 或 completed）
    pub async fn find_active_debit_in_tx(
        tx: &mut PgConnection,
        order_id: &str,
    ) -> Result<Option<LedgerTransaction>> {
        let transaction = sqlx::query_as::<_, LedgerTransaction>(
            r#"
            SELECT id, wallet_id, order_id, tx_type, status, amount, closing_balance,
                   note, point_id, source_ref, created_at, updated_at
            FROM transactions
            WHERE order_id = $1 AND tx_type = 'debit' AND status IN ('pending', 'completed')
            "#,
        )
        .bind(order_id)
        .fetch_optional(tx)
        .await?;

        Ok(transaction)
    }

    /// 将指定流水标记为 cancelled
    pub async fn mark_cancelled_in_tx(tx: &mut PgConnection, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'cancelled', updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(tx)
        .await?;

        Ok(())
    }

    /// 取消订单仍处于 pending 的 credit 流水，返回取消数量
    pub async fn cancel_pending_credit_in_tx(
        tx: &mut PgConnection,
        order_id: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'cancelled', updated_at = now()
            WHERE order_id = $1 AND tx_type = 'credit' AND status = 'pending'
            "#,
        )
        .bind(order_id)
        .execute(tx)
        .await?;

        Ok(result.rows_affected())
    }
}
