//! 管理端处理器：手工发放与批量任务

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use cashback_bulk_pipeline::{BulkJob, BulkJobPayload, JobRepository};
use cashback_ledger::service::DistributionRequest;
use cashback_shared::events::{EventEnvelope, Topic};
use cashback_shared::time::end_of_day_ist;

use crate::{
    dto::{
        ApiResponse, CreateBulkJobRequest, CreateBulkJobResponse, DispatchFailureDto,
        DistributionRequestDto, DistributionResponse,
    },
    error::{ApiError, Result},
    state::AppState,
};

/// 失败事件列表的返回条数上限
const DISPATCH_FAILURE_LIMIT: i64 = 100;

/// 手工发放返现
///
/// POST /admin/distributions
pub async fn distribute(
    State(state): State<AppState>,
    Json(req): Json<DistributionRequestDto>,
) -> Result<Json<ApiResponse<DistributionResponse>>> {
    req.validate()?;

    let outcome = state
        .ledger
        .distribute(&DistributionRequest {
            phone: req.phone,
            amount: req.amount,
            expires_on: end_of_day_ist(req.expiry_date),
            source_ref: req.source_ref,
        })
        .await?;

    Ok(Json(ApiResponse::success(DistributionResponse {
        point_id: outcome.point_id,
        amount: outcome.amount,
    })))
}

/// 创建批量发放任务
///
/// POST /admin/bulk-jobs
///
/// 登记任务记录后把任务事件发到队列，由分发器的批量池逐个执行。
pub async fn create_bulk_job(
    State(state): State<AppState>,
    Json(req): Json<CreateBulkJobRequest>,
) -> Result<Json<ApiResponse<CreateBulkJobResponse>>> {
    req.validate()?;

    let job_id = Uuid::new_v4();
    JobRepository::create(
        &state.pool,
        job_id,
        &req.bucket,
        &req.object_key,
        req.requested_by.as_deref(),
    )
    .await?;

    let payload = BulkJobPayload {
        job_id,
        bucket: req.bucket,
        object_key: req.object_key,
    };
    let data = serde_json::to_value(&payload)
        .map_err(|e| ApiError::Internal(format!("任务载荷序列化失败: {e}")))?;

    state
        .queue
        .send(&EventEnvelope::new(Topic::BulkDistribution, data, "admin-api"))
        .await?;

    info!(%job_id, "批量发放任务已登记并入队");
    Ok(Json(ApiResponse::success(CreateBulkJobResponse { job_id })))
}

/// 查询批量任务进度与汇总
///
/// GET /admin/bulk-jobs/{id}
pub async fn get_bulk_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<BulkJob>>> {
    let job = JobRepository::get(&state.pool, id).await?;
    Ok(Json(ApiResponse::success(job)))
}

/// 反复处理失败的事件列表（运维排查用）
///
/// GET /admin/dispatch-failures
pub async fn list_dispatch_failures(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<DispatchFailureDto>>>> {
    let failures = sqlx::query_as::<_, DispatchFailureDto>(
        r#"
        SELECT order_id, topic, attempts, last_error, updated_at
        FROM dispatch_failures
        ORDER BY updated_at DESC
        LIMIT $1
        "#,
    )
    .bind(DISPATCH_FAILURE_LIMIT)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(ApiResponse::success(failures)))
}
