//! API Key 管理处理器
//!
//! 完整 key 仅在创建时返回一次，库里只存 SHA256 哈希与前缀提示。

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{ApiResponse, CreateApiKeyRequest, CreateApiKeyResponse},
    error::{ApiError, Result},
    middleware::{generate_api_key, hash_api_key},
    state::AppState,
};

/// 公开 API 的路径前缀根，所有 key 的授权范围必须落在这下面
const PUBLIC_ROOT: &str = "/public";

/// 创建 API Key
///
/// POST /admin/api-keys
pub async fn create_api_key(
    State(state): State<AppState>,
    Json(req): Json<CreateApiKeyRequest>,
) -> Result<Json<ApiResponse<CreateApiKeyResponse>>> {
    req.validate()?;

    for prefix in &req.allowed_prefixes {
        if !prefix.starts_with(PUBLIC_ROOT) {
            return Err(ApiError::Validation(format!(
                "路径前缀必须以 {PUBLIC_ROOT} 开头: {prefix}"
            )));
        }
    }

    let (api_key, prefix_hint) = generate_api_key();
    let key_hash = hash_api_key(&api_key);
    let prefixes_json = serde_json::to_value(&req.allowed_prefixes)
        .map_err(|e| ApiError::Internal(format!("序列化路径前缀失败: {e}")))?;

    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO api_keys (id, client_id, name, prefix_hint, key_hash, allowed_prefixes, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(id)
    .bind(&req.client_id)
    .bind(&req.name)
    .bind(&prefix_hint)
    .bind(&key_hash)
    .bind(&prefixes_json)
    .bind(now)
    .execute(&state.pool)
    .await?;

    info!(key_id = %id, client_id = %req.client_id, "API Key 已创建");

    Ok(Json(ApiResponse::success(CreateApiKeyResponse {
        id,
        client_id: req.client_id,
        name: req.name,
        api_key,
        allowed_prefixes: req.allowed_prefixes,
        created_at: now,
    })))
}

/// 吊销 API Key
///
/// DELETE /admin/api-keys/{id}
///
/// 吊销是软删除（记 revoked_at），已吊销的 key 立即不可用。
pub async fn revoke_api_key(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>> {
    let result = sqlx::query(
        r#"
        UPDATE api_keys SET revoked_at = now() WHERE id = $1 AND revoked_at IS NULL
        "#,
    )
    .bind(id)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("API Key {id} 不存在或已吊销")));
    }

    info!(key_id = %id, "API Key 已吊销");
    Ok(Json(ApiResponse::<()>::success_empty()))
}
