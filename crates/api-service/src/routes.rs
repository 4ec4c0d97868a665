//! 路由配置模块
//!
//! 公开路由走 API Key 认证，管理路由走静态运维令牌认证。

use std::time::Duration;

use axum::{
    Json, Router, middleware,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::{dto::ApiResponse, handlers, middleware as auth, state::AppState};

/// 请求超时时间（秒）
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// 公开 API 路由（结算页 / 客服机器人）
///
/// 每个请求都要携带 `Authorization: Bearer pk_live_...`，
/// 且请求路径必须落在该 key 的授权前缀内。
fn public_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/cashback/redeemable", post(handlers::public::redeemable))
        .route(
            "/support/orders/{phone}/status",
            get(handlers::public::order_status),
        )
        .route(
            "/support/orders/{phone}/recent",
            get(handlers::public::recent_orders),
        )
        .layer(middleware::from_fn_with_state(state, auth::api_key_auth))
}

/// 管理端路由（运营后台）
fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api-keys", post(handlers::api_key::create_api_key))
        .route("/api-keys/{id}", delete(handlers::api_key::revoke_api_key))
        .route("/distributions", post(handlers::admin::distribute))
        .route("/bulk-jobs", post(handlers::admin::create_bulk_job))
        .route("/bulk-jobs/{id}", get(handlers::admin::get_bulk_job))
        .route(
            "/dispatch-failures",
            get(handlers::admin::list_dispatch_failures),
        )
        .layer(middleware::from_fn_with_state(state, auth::admin_auth))
}

async fn health_check() -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::success(
        serde_json::json!({ "status": "healthy" }),
    ))
}

/// 组装完整应用路由
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .nest("/public", public_routes(state.clone()))
        .nest("/admin", admin_routes(state.clone()))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .with_state(state)
}
