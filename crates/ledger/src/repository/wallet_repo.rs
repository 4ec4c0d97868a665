//! 钱包仓储
//!
//! 余额变动全部走条件更新或幂等 upsert，余额的减少路径都带
//! `balance >= x` 前置条件，命中行数为 0 即并发冲突信号。

use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use cashback_shared::error::Result;

use crate::models::Wallet;

/// 钱包仓储
pub struct WalletRepository;

impl WalletRepository {
    /// 按客户 ID 查找钱包
    pub async fn find_by_customer(pool: &PgPool, customer_id: Uuid) -> Result<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT id, customer_id, balance, created_at, updated_at
            FROM wallets
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(pool)
        .await?;

        Ok(wallet)
    }

    /// 事务内按客户 ID 查找钱包
    pub async fn find_by_customer_in_tx(
        tx: &mut PgConnection,
        customer_id: Uuid,
    ) -> Result<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT id, customer_id, balance, created_at, updated_at
            FROM wallets
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(tx)
        .await?;

        Ok(wallet)
    }

    /// 事务内获取或创建钱包（余额从 0 开始）
    pub async fn get_or_create_in_tx(tx: &mut PgConnection, customer_id: Uuid) -> Result<Wallet> {
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            INSERT INTO wallets (id, customer_id, balance, created_at, updated_at)
            VALUES ($1, $2, 0, now(), now())
            ON CONFLICT (customer_id) DO UPDATE SET updated_at = now()
            RETURNING id, customer_id, balance, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(customer_id)
        .fetch_one(tx)
        .await?;

        Ok(wallet)
    }

    /// 事务内读取当前余额
    pub async fn balance_in_tx(tx: &mut PgConnection, wallet_id: Uuid) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT balance FROM wallets WHERE id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_one(tx)
        .await?;

        Ok(row.get("balance"))
    }

    /// 余额增加（增加无前置条件），返回新余额
    pub async fn increment_balance(
        tx: &mut PgConnection,
        wallet_id: Uuid,
        amount: i64,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = balance + $2, updated_at = now()
            WHERE id = $1
            RETURNING balance
            "#,
        )
        .bind(wallet_id)
        .bind(amount)
        .fetch_one(tx)
        .await?;

        Ok(row.get("balance"))
    }

    /// 条件扣减：仅当 `balance >= amount` 时生效
    ///
    /// 返回 Some(新余额) 表示命中；None 表示前置条件在写入时
    /// 已不成立（并发修改），调用方应整体中止。
    pub async fn try_decrement_balance(
        tx: &mut PgConnection,
        wallet_id: Uuid,
        amount: i64,
    ) -> Result<Option<i64>> {
        let row = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = balance - $2, updated_at = now()
            WHERE id = $1 AND balance >= $2
            RETURNING balance
            "#,
        )
        .bind(wallet_id)
        .bind(amount)
        .fetch_optional(tx)
        .await?;

        Ok(row.map(|r| r.get("balance")))
    }

    /// 过期回收扣减：余额向下取齐到 0，不会失败
    ///
    /// 清扫场景下批次金额可能大于当前余额（与扣减竞争后），
    /// 余额永不为负的约束优先。返回新余额。
    pub async fn decrement_balance_floor_zero(
        tx: &mut PgConnection,
        wallet_id: Uuid,
        amount: i64,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = GREATEST(balance - $2, 0), updated_at = now()
            WHERE id = $1
            RETURNING balance
            "#,
        )
        .bind(wallet_id)
        .bind(amount)
        .fetch_one(tx)
        .await?;

        Ok(row.get("balance"))
    }
}
