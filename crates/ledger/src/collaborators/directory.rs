//! 订单/客户目录的 HTTP 实现
//!
//! 目录服务可能返回瞬时错误并带有限流额度：每次响应通过
//! `x-ratelimit-available` 报告剩余额度，低于阈值时暂停一拍再
//! 继续，避免把额度打穿。瞬时错误按共享重试策略有界重试。

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use cashback_shared::config::DirectoryConfig;
use cashback_shared::error::{LedgerError, Result};
use cashback_shared::retry::{RetryPolicy, retry_with_policy};

use super::{DirectoryOrder, OrderDirectory, OrderSummary};

/// 限流额度响应头
const RATE_LIMIT_HEADER: &str = "x-ratelimit-available";

/// 目录 HTTP 客户端
pub struct HttpOrderDirectory {
    client: reqwest::Client,
    config: DirectoryConfig,
    policy: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct PaymentBreakdown {
    /// 归属返现网关的金额（整数货币单位）
    cashback_amount: i64,
}

#[derive(Debug, Deserialize)]
struct StatusText {
    status: String,
}

impl HttpOrderDirectory {
    pub fn new(config: DirectoryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            policy: RetryPolicy::default(),
        }
    }

    /// 发起一次 GET 并解析 JSON，附带限流额度退让
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.config.base_url, path);

        let response = self
            .client
            .get(&url)
            .header("x-access-token", &self.config.access_token)
            .send()
            .await
            .map_err(|e| LedgerError::external("directory", format!("请求失败: {e}")))?;

        // 额度不足时暂停一拍，下一次调用前让限流窗口恢复
        if let Some(available) = response
            .headers()
            .get(RATE_LIMIT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            && available < self.config.rate_limit_threshold
        {
            debug!(available, "目录限流额度不足，暂停等待恢复");
            tokio::time::sleep(std::time::Duration::from_millis(
                self.config.throttle_pause_ms,
            ))
            .await;
        }

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LedgerError::NotFound {
                entity: "directory_resource".to_string(),
                id: path.to_string(),
            });
        }
        if !status.is_success() {
            return Err(LedgerError::external(
                "directory",
                format!("状态码 {status}: {path}"),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| LedgerError::external("directory", format!("响应解析失败: {e}")))
    }

    /// 带重试的 GET：仅对瞬时错误重试，NotFound 直接返回
    async fn get_json_with_retry<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        retry_with_policy(
            &self.policy,
            "directory_lookup",
            |e| e.is_retryable(),
            || self.get_json::<T>(path),
        )
        .await
        .inspect_err(|e| {
            warn!(path, error = %e, "目录查询最终失败");
        })
    }
}

#[async_trait]
impl OrderDirectory for HttpOrderDirectory {
    async fn get_order(&self, order_id: &str) -> Result<DirectoryOrder> {
        self.get_json_with_retry(&format!("/orders/{order_id}")).await
    }

    async fn cashback_paid_amount(&self, order_id: &str) -> Result<i64> {
        let breakdown: PaymentBreakdown = self
            .get_json_with_retry(&format!("/orders/{order_id}/payments"))
            .await?;
        Ok(breakdown.cashback_amount)
    }

    async fn cashback_refund_amount(&self, order_id: &str) -> Result<i64> {
        let breakdown: PaymentBreakdown = self
            .get_json_with_retry(&format!("/orders/{order_id}/refunds"))
            .await?;
        Ok(breakdown.cashback_amount)
    }

    async fn order_status_text(&self, phone: &str) -> Result<String> {
        let status: StatusText = self
            .get_json_with_retry(&format!("/customers/{phone}/orders/latest/status"))
            .await?;
        Ok(status.status)
    }

    async fn recent_orders(&self, phone: &str, limit: usize) -> Result<Vec<OrderSummary>> {
        self.get_json_with_retry(&format!("/customers/{phone}/orders?limit={limit}"))
            .await
    }
}
