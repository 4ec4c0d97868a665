//! 批量任务记录
//!
//! 任务的生命周期与汇总结果落在 bulk_jobs 表，管理端据此查询
//! 进度与失败样本。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use cashback_shared::error::{LedgerError, Result};

use crate::pipeline::BulkSummary;
use crate::row::RowFailure;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// 批量发放任务
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BulkJob {
    pub id: Uuid,
    pub bucket: String,
    pub object_key: String,
    pub status: JobStatus,
    pub total_rows: i64,
    pub succeeded: i64,
    pub failed: i64,
    /// 前 50 条失败样本
    #[sqlx(json)]
    pub failed_samples: Vec<RowFailure>,
    #[sqlx(default)]
    pub error: Option<String>,
    #[sqlx(default)]
    pub requested_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const JOB_COLUMNS: &str = "id, bucket, object_key, status, total_rows, succeeded, failed, failed_samples, error, requested_by, created_at, updated_at";

/// 批量任务仓储
pub struct JobRepository;

impl JobRepository {
    /// 登记新任务（queued）
    pub async fn create(
        pool: &PgPool,
        id: Uuid,
        bucket: &str,
        object_key: &str,
        requested_by: Option<&str>,
    ) -> Result<BulkJob> {
        let job = sqlx::query_as::<_, BulkJob>(&format!(
            r#"
            INSERT INTO bulk_jobs (id, bucket, object_key, status, total_rows, succeeded, failed, failed_samples, requested_by, created_at, updated_at)
            VALUES ($1, $2, $3, 'queued', 0, 0, 0, '[]'::jsonb, $4, now(), now())
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(bucket)
        .bind(object_key)
        .bind(requested_by)
        .fetch_one(pool)
        .await?;

        Ok(job)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<BulkJob> {
        sqlx::query_as::<_, BulkJob>(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM bulk_jobs WHERE id = $1
            "#
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| LedgerError::NotFound {
            entity: "bulk_job".to_string(),
            id: id.to_string(),
        })
    }

    pub async fn mark_running(pool: &PgPool, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE bulk_jobs SET status = 'running', updated_at = now() WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// 任务完成，落汇总结果
    pub async fn complete(pool: &PgPool, id: Uuid, summary: &BulkSummary) -> Result<()> {
        let samples = serde_json::to_value(&summary.failed_samples)
            .map_err(|e| LedgerError::Internal(format!("失败样本序列化失败: {e}")))?;

        sqlx::query(
            r#"
            UPDATE bulk_jobs
            SET status = 'completed', total_rows = $2, succeeded = $3, failed = $4,
                failed_samples = $5, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(summary.total_rows as i64)
        .bind(summary.succeeded as i64)
        .bind(summary.failed as i64)
        .bind(samples)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// 任务整体失败（文件拉取失败、表头非法等）
    pub async fn fail(pool: &PgPool, id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE bulk_jobs
            SET status = 'failed', error = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;

        Ok(())
    }
}
