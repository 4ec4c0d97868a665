//! 分析/触达/邮件协作方的 HTTP 实现
//!
//! 这三类都是 best-effort 外发：调用方在账本事务提交之后调用，
//! 失败只记日志，从不影响账本结果。

use async_trait::async_trait;
use tracing::debug;

use cashback_shared::config::{AnalyticsConfig, EmailConfig, EngagementConfig};
use cashback_shared::error::{LedgerError, Result};

use super::{AnalyticsEvent, AnalyticsSink, EmailNotifier, EngagementPlatform};

/// 分析事件仓库 HTTP 客户端
pub struct HttpAnalyticsSink {
    client: reqwest::Client,
    config: AnalyticsConfig,
}

impl HttpAnalyticsSink {
    pub fn new(config: AnalyticsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl AnalyticsSink for HttpAnalyticsSink {
    async fn record(&self, event: &AnalyticsEvent) -> Result<()> {
        let url = format!("{}/events", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .json(event)
            .send()
            .await
            .map_err(|e| LedgerError::external("analytics", format!("请求失败: {e}")))?;

        if !response.status().is_success() {
            return Err(LedgerError::external(
                "analytics",
                format!("状态码 {}", response.status()),
            ));
        }

        debug!(event = %event.name, "分析事件已上报");
        Ok(())
    }
}

/// 用户触达平台 HTTP 客户端
pub struct HttpEngagementPlatform {
    client: reqwest::Client,
    config: EngagementConfig,
}

impl HttpEngagementPlatform {
    pub fn new(config: EngagementConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<()> {
        let url = format!("{}{}", self.config.base_url, path);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::external("engagement", format!("请求失败: {e}")))?;

        if !response.status().is_success() {
            return Err(LedgerError::external(
                "engagement",
                format!("状态码 {}", response.status()),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl EngagementPlatform for HttpEngagementPlatform {
    async fn upsert_attributes(&self, phone: &str, attributes: serde_json::Value) -> Result<()> {
        self.post(
            "/customers/attributes",
            serde_json::json!({ "phone": phone, "attributes": attributes }),
        )
        .await
    }

    async fn track_event(
        &self,
        phone: &str,
        name: &str,
        properties: serde_json::Value,
    ) -> Result<()> {
        self.post(
            "/customers/events",
            serde_json::json!({ "phone": phone, "name": name, "properties": properties }),
        )
        .await
    }
}

/// 邮件通知 HTTP 客户端
pub struct HttpEmailNotifier {
    client: reqwest::Client,
    config: EmailConfig,
}

impl HttpEmailNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl EmailNotifier for HttpEmailNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let url = format!("{}/send", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "from": self.config.from,
                "to": to,
                "subject": subject,
                "body": body,
            }))
            .send()
            .await
            .map_err(|e| LedgerError::external("email", format!("请求失败: {e}")))?;

        if !response.status().is_success() {
            return Err(LedgerError::external(
                "email",
                format!("状态码 {}", response.status()),
            ));
        }

        Ok(())
    }
}
