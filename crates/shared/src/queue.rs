//! 消息队列封装（AWS SQS）
//!
//! 账本系统依赖队列的租约语义：消息被接收后进入一段可见性超时
//! （处理租约），处理方可以续租（长任务）、显式删除（ack），或
//! 什么都不做让队列按自身策略重投。本模块把这三个动作封装成
//! 与业务无关的小接口，LocalStack 场景通过自定义 endpoint 支持。

use aws_config::BehaviorVersion;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::types::MessageAttributeValue;
use tracing::{debug, info};

use crate::config::QueueConfig;
use crate::error::{LedgerError, Result};
use crate::events::EventEnvelope;

/// 消息属性名：事件主题（便于不解析 body 就能观察队列内容）
const TOPIC_ATTR: &str = "topic";

/// 从队列收到的一条消息
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// 删除 / 续租时使用的回执句柄
    pub receipt_handle: String,
    /// 消息体（JSON 编码的 EventEnvelope）
    pub body: String,
}

/// SQS 队列封装
#[derive(Clone)]
pub struct EventQueue {
    client: Client,
    config: QueueConfig,
}

impl EventQueue {
    /// 创建队列客户端
    ///
    /// 凭证走默认 provider 链（环境变量 / IAM 角色），
    /// `endpoint_url` 用于 LocalStack 或测试环境。
    pub async fn connect(config: &QueueConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(ref region) = config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let Some(ref endpoint) = config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        let aws_config = loader.load().await;
        let client = Client::new(&aws_config);

        info!(queue_url = %config.queue_url, "SQS 队列客户端已创建");

        Self {
            client,
            config: config.clone(),
        }
    }

    /// 长轮询拉取一批消息
    ///
    /// 返回的消息进入时长为 `visibility_timeout_seconds` 的处理租约。
    pub async fn receive(&self) -> Result<Vec<QueueMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.config.queue_url)
            .max_number_of_messages(self.config.max_messages)
            .wait_time_seconds(self.config.wait_time_seconds)
            .visibility_timeout(self.config.visibility_timeout_seconds)
            .message_attribute_names("All")
            .send()
            .await
            .map_err(|e| LedgerError::external("sqs", format!("拉取消息失败: {e}")))?;

        let messages = output
            .messages()
            .iter()
            .filter_map(|m| {
                let receipt_handle = m.receipt_handle()?.to_string();
                let body = m.body()?.to_string();
                Some(QueueMessage {
                    receipt_handle,
                    body,
                })
            })
            .collect();

        Ok(messages)
    }

    /// 确认消息处理完成（从队列删除）
    pub async fn delete(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.config.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| LedgerError::external("sqs", format!("删除消息失败: {e}")))?;

        Ok(())
    }

    /// 续租：把消息的可见性超时重置为 `seconds`
    ///
    /// 长任务（批量发放）处理期间周期调用，防止队列在处理
    /// 仍在进行时把消息重投给其他消费者。
    pub async fn renew_lease(&self, receipt_handle: &str, seconds: i32) -> Result<()> {
        self.client
            .change_message_visibility()
            .queue_url(&self.config.queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(seconds)
            .send()
            .await
            .map_err(|e| LedgerError::external("sqs", format!("续租失败: {e}")))?;

        debug!(seconds, "消息租约已续期");
        Ok(())
    }

    /// 发送事件信封
    pub async fn send(&self, envelope: &EventEnvelope) -> Result<()> {
        let body = serde_json::to_string(envelope)
            .map_err(|e| LedgerError::Internal(format!("事件序列化失败: {e}")))?;

        let topic_attr = MessageAttributeValue::builder()
            .data_type("String")
            .string_value(envelope.topic.to_string())
            .build()
            .map_err(|e| LedgerError::external("sqs", format!("构造消息属性失败: {e}")))?;

        self.client
            .send_message()
            .queue_url(&self.config.queue_url)
            .message_body(body)
            .message_attributes(TOPIC_ATTR, topic_attr)
            .send()
            .await
            .map_err(|e| LedgerError::external("sqs", format!("发送消息失败: {e}")))?;

        debug!(topic = %envelope.topic, event_id = %envelope.event_id, "事件已发送到队列");
        Ok(())
    }

    /// 配置的租约时长（秒）
    pub fn lease_seconds(&self) -> i32 {
        self.config.visibility_timeout_seconds
    }

    /// 配置的续租间隔（秒）
    pub fn lease_renew_interval_seconds(&self) -> u64 {
        self.config.lease_renew_interval_seconds
    }
}
