//! 全局配置仓储

use sqlx::PgPool;

use cashback_shared::error::{LedgerError, Result};

use crate::models::Settings;

const SETTINGS_SQL: &str = r#"
SELECT id, max_cashback, expiry_period_days, order_allocation, usage_rule, cashback_codes, updated_at
FROM settings
WHERE id = 1
"#;

/// 全局配置仓储（单行记录，账本只读）
pub struct SettingsRepository;

impl SettingsRepository {
    /// 读取配置
    pub async fn get(pool: &PgPool) -> Result<Settings> {
        sqlx::query_as::<_, Settings>(SETTINGS_SQL)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| LedgerError::NotFound {
                entity: "settings".to_string(),
                id: "1".to_string(),
            })
    }
}
