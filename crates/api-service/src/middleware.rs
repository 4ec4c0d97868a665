//! 认证中间件
//!
//! 公开 API 用 API Key 认证：`Authorization: Bearer pk_live_...`，
//! key 以 SHA256 哈希存储，每个 key 绑定允许访问的路径前缀。
//! 管理端 API 用静态运维令牌认证。

use axum::{
    body::Body,
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// API Key 前缀
pub const KEY_PREFIX: &str = "pk_live_";

/// 前缀段的十六进制位数
const PREFIX_HEX_LEN: usize = 12;

/// 秘密段长度
const SECRET_LEN: usize = 32;

/// 认证通过的 API Key 上下文
#[derive(Debug, Clone)]
pub struct ApiKeyContext {
    pub key_id: uuid::Uuid,
    pub client_id: String,
}

/// 生成 API Key，返回 (完整 key, 前缀提示)
///
/// 形如 `pk_live_3f2a9c1d0b47.Xy8...`，前缀提示存库用于列表展示，
/// 完整 key 只在创建时返回一次。
pub fn generate_api_key() -> (String, String) {
    let mut rng = rand::rng();

    let hex_chars: Vec<char> = "0123456789abcdef".chars().collect();
    let hex: String = (0..PREFIX_HEX_LEN)
        .map(|_| hex_chars[rng.random_range(0..hex_chars.len())])
        .collect();
    let prefix_hint = format!("{KEY_PREFIX}{hex}");

    let alnum: Vec<char> = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789"
        .chars()
        .collect();
    let secret: String = (0..SECRET_LEN)
        .map(|_| alnum[rng.random_range(0..alnum.len())])
        .collect();

    (format!("{prefix_hint}.{secret}"), prefix_hint)
}

/// 计算 API Key 的 SHA256 哈希
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// 请求路径是否落在 key 的允许前缀内
pub fn prefix_allowed(path: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// 公开 API 的 API Key 认证
pub async fn api_key_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request)
        .ok_or_else(|| ApiError::Unauthorized("缺少 API Key".to_string()))?
        .to_string();

    let key_hash = hash_api_key(&token);

    let row: Option<(uuid::Uuid, String, serde_json::Value)> = sqlx::query_as(
        r#"
        SELECT id, client_id, allowed_prefixes
        FROM api_keys
        WHERE key_hash = $1 AND revoked_at IS NULL
        "#,
    )
    .bind(&key_hash)
    .fetch_optional(&state.pool)
    .await?;

    let Some((key_id, client_id, prefixes_json)) = row else {
        warn!("无效或已吊销的 API Key");
        return Err(ApiError::Unauthorized("API Key 无效".to_string()));
    };

    let allowed: Vec<String> = serde_json::from_value(prefixes_json).unwrap_or_default();
    let path = request.uri().path().to_string();
    if !prefix_allowed(&path, &allowed) {
        warn!(%key_id, path, "API Key 访问了未授权的路径前缀");
        return Err(ApiError::Forbidden(format!("路径不在授权范围: {path}")));
    }

    debug!(%key_id, %client_id, "API Key 认证通过");
    request
        .extensions_mut()
        .insert(ApiKeyContext { key_id, client_id });

    Ok(next.run(request).await)
}

/// 管理端的静态令牌认证
pub async fn admin_auth(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    // 未配置令牌时管理端整体关闭
    if state.admin.token.is_empty() {
        return Err(ApiError::Forbidden("管理端未启用".to_string()));
    }

    let token = bearer_token(&request)
        .ok_or_else(|| ApiError::Unauthorized("缺少管理令牌".to_string()))?;

    if token != state.admin.token {
        warn!("管理令牌不匹配");
        return Err(ApiError::Unauthorized("管理令牌无效".to_string()));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_key_format() {
        let (key, prefix_hint) = generate_api_key();

        assert!(key.starts_with(KEY_PREFIX));
        assert!(key.starts_with(&prefix_hint));

        let rest = key.strip_prefix(KEY_PREFIX).unwrap();
        let (hex, secret) = rest.split_once('.').unwrap();
        assert_eq!(hex.len(), PREFIX_HEX_LEN);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(secret.len(), SECRET_LEN);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generated_keys_are_unique() {
        let (a, _) = generate_api_key();
        let (b, _) = generate_api_key();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_is_deterministic_hex() {
        let h1 = hash_api_key("pk_live_abc.def");
        let h2 = hash_api_key("pk_live_abc.def");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, hash_api_key("pk_live_abc.deg"));
    }

    #[test]
    fn test_prefix_allowed() {
        let allowed = vec!["/public/cashback".to_string(), "/public/support".to_string()];

        assert!(prefix_allowed("/public/cashback/redeemable", &allowed));
        assert!(prefix_allowed("/public/support/orders/x/status", &allowed));
        assert!(!prefix_allowed("/public/other", &allowed));
        assert!(!prefix_allowed("/admin/api-keys", &allowed));
        assert!(!prefix_allowed("/", &[]));
    }
}
