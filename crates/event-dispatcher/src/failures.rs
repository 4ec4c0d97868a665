//! 处理失败记录
//!
//! 以 (order_id, topic) 为键记录每个事件的最近失败，重复失败只
//! 累加 attempts。消息本身留在队列里等待重投，这张表供运维排查
//! 反复失败的事件用。

use sqlx::PgPool;

use cashback_shared::error::Result;
use cashback_shared::events::Topic;

/// 失败记录仓储
pub struct FailureRepository;

impl FailureRepository {
    /// 记录一次失败（已有记录则累加 attempts）
    pub async fn record(
        pool: &PgPool,
        order_id: &str,
        topic: Topic,
        error: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dispatch_failures (order_id, topic, attempts, last_error, created_at, updated_at)
            VALUES ($1, $2, 1, $3, now(), now())
            ON CONFLICT (order_id, topic) DO UPDATE SET
                attempts = dispatch_failures.attempts + 1,
                last_error = EXCLUDED.last_error,
                updated_at = now()
            "#,
        )
        .bind(order_id)
        .bind(topic.to_string())
        .bind(error)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// 事件最终处理成功后清掉失败记录
    pub async fn clear(pool: &PgPool, order_id: &str, topic: Topic) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM dispatch_failures WHERE order_id = $1 AND topic = $2
            "#,
        )
        .bind(order_id)
        .bind(topic.to_string())
        .execute(pool)
        .await?;

        Ok(())
    }
}
