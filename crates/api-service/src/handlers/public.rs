//! 公开 API 处理器（结算页 / 客服机器人）

use axum::{
    Json,
    extract::{Path, State},
};
use validator::Validate;

use cashback_ledger::collaborators::OrderSummary;
use cashback_ledger::repository::{CustomerRepository, SettingsRepository, WalletRepository};
use cashback_shared::phone::normalize_phone;

use crate::{
    dto::{ApiResponse, OrderStatusResponse, RedeemableRequest, RedeemableResponse},
    error::{ApiError, Result},
    state::AppState,
};

/// 客服场景的最近订单条数
const RECENT_ORDERS_LIMIT: usize = 5;

fn normalized(raw: &str) -> Result<String> {
    normalize_phone(raw).ok_or_else(|| ApiError::Validation(format!("无效手机号: {raw}")))
}

/// 查询本单可抵扣的返现额度
///
/// POST /public/cashback/redeemable
///
/// 没有钱包的客户按余额 0 处理，不报错——结算页对新客也会调这个接口。
pub async fn redeemable(
    State(state): State<AppState>,
    Json(req): Json<RedeemableRequest>,
) -> Result<Json<ApiResponse<RedeemableResponse>>> {
    req.validate()?;
    let phone = normalized(&req.phone)?;

    let settings = SettingsRepository::get(&state.pool).await?;

    let balance = match CustomerRepository::find_by_phone(&state.pool, &phone).await? {
        Some(customer) => WalletRepository::find_by_customer(&state.pool, customer.id)
            .await?
            .map(|w| w.balance)
            .unwrap_or(0),
        None => 0,
    };

    let response = RedeemableResponse {
        balance,
        redeemable: settings.redeemable(balance, req.subtotal),
    };
    Ok(Json(ApiResponse::success(response)))
}

/// 客户最近一单的状态描述
///
/// GET /public/support/orders/{phone}/status
pub async fn order_status(
    State(state): State<AppState>,
    Path(phone): Path<String>,
) -> Result<Json<ApiResponse<OrderStatusResponse>>> {
    let phone = normalized(&phone)?;

    let status = state.directory.order_status_text(&phone).await?;
    Ok(Json(ApiResponse::success(OrderStatusResponse { status })))
}

/// 客户最近订单列表
///
/// GET /public/support/orders/{phone}/recent
pub async fn recent_orders(
    State(state): State<AppState>,
    Path(phone): Path<String>,
) -> Result<Json<ApiResponse<Vec<OrderSummary>>>> {
    let phone = normalized(&phone)?;

    let orders = state
        .directory
        .recent_orders(&phone, RECENT_ORDERS_LIMIT)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}
