//! 客户仓储

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use cashback_shared::error::Result;

use crate::models::{Customer, CustomerIdentity};

/// 客户仓储
pub struct CustomerRepository;

impl CustomerRepository {
    /// 按规范化手机号查找客户
    pub async fn find_by_phone(pool: &PgPool, phone: &str) -> Result<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, phone, email, first_name, last_name, external_ref, created_at, updated_at
            FROM customers
            WHERE phone = $1
            "#,
        )
        .bind(phone)
        .fetch_optional(pool)
        .await?;

        Ok(customer)
    }

    /// 事务内按 ID 查找客户
    pub async fn find_by_id_in_tx(tx: &mut PgConnection, id: Uuid) -> Result<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, phone, email, first_name, last_name, external_ref, created_at, updated_at
            FROM customers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(tx)
        .await?;

        Ok(customer)
    }

    /// 事务内按手机号查找客户
    pub async fn find_by_phone_in_tx(
        tx: &mut PgConnection,
        phone: &str,
    ) -> Result<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, phone, email, first_name, last_name, external_ref, created_at, updated_at
            FROM customers
            WHERE phone = $1
            "#,
        )
        .bind(phone)
        .fetch_optional(tx)
        .await?;

        Ok(customer)
    }

    /// 事务内按钱包反查客户
    pub async fn find_by_wallet_in_tx(
        tx: &mut PgConnection,
        wallet_id: Uuid,
    ) -> Result<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT c.id, c.phone, c.email, c.first_name, c.last_name, c.external_ref,
                   c.created_at, c.updated_at
            FROM customers c
            JOIN wallets w ON w.customer_id = c.id
            WHERE w.id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(tx)
        .await?;

        Ok(customer)
    }

    /// 事务内获取或惰性创建客户
    ///
    /// 以手机号为冲突键 upsert，重复事件并发到达时两边都能拿到
    /// 同一条记录。身份字段以最新事件为准刷新。
    pub async fn get_or_create_in_tx(
        tx: &mut PgConnection,
        identity: &CustomerIdentity,
    ) -> Result<Customer> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (id, phone, email, first_name, last_name, external_ref, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, now(), now())
            ON CONFLICT (phone) DO UPDATE SET
                email = COALESCE(EXCLUDED.email, customers.email),
                first_name = COALESCE(EXCLUDED.first_name, customers.first_name),
                last_name = COALESCE(EXCLUDED.last_name, customers.last_name),
                external_ref = COALESCE(EXCLUDED.external_ref, customers.external_ref),
                updated_at = now()
            RETURNING id, phone, email, first_name, last_name, external_ref, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&identity.phone)
        .bind(&identity.email)
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(&identity.external_ref)
        .fetch_one(tx)
        .await?;

        Ok(customer)
    }
}
