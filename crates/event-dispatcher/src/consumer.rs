//! 消费循环
//!
//! 长轮询拉取消息后按主题分发到后台任务。两类并发池：普通主题
//! 共享 default_concurrency 个额度；批量发放主题占用容量为 1 的
//! 专用池，同一时刻最多一个批量任务在跑，且处理期间按固定间隔
//! 给消息续租，防止长任务中途被队列重投。
//!
//! 确认语义：处理成功（或幂等重复）删除消息；失败时记一条
//! dispatch_failures 并保留消息，由可见性超时触发重投。

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use cashback_shared::error::{LedgerError, Result};
use cashback_shared::events::EventEnvelope;
use cashback_shared::queue::{EventQueue, QueueMessage};

use crate::failures::FailureRepository;
use crate::handlers::HandlerRegistry;

/// 处理结果的确认方式
#[derive(Debug)]
pub enum Disposition {
    /// 删除消息（成功或无需重试）
    Ack,
    /// 保留消息等待重投
    Retry(LedgerError),
}

/// 把处理结果映射为确认方式
///
/// 幂等冲突说明这条消息（或同一订单的重复事件）已经处理过，
/// 按成功确认，否则重投只会无限撞同一面墙。
pub fn classify(result: Result<()>) -> Disposition {
    match result {
        Ok(()) => Disposition::Ack,
        Err(LedgerError::DuplicateOperation { order_id, operation }) => {
            info!(order_id, operation, "重复事件，按成功确认");
            Disposition::Ack
        }
        Err(e) => Disposition::Retry(e),
    }
}

/// 事件分发器
pub struct Dispatcher {
    queue: EventQueue,
    registry: Arc<HandlerRegistry>,
    pool: PgPool,
    default_pool: Arc<Semaphore>,
    bulk_pool: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        queue: EventQueue,
        registry: HandlerRegistry,
        pool: PgPool,
        default_concurrency: usize,
    ) -> Self {
        Self {
            queue,
            registry: Arc::new(registry),
            pool,
            default_pool: Arc::new(Semaphore::new(default_concurrency)),
            bulk_pool: Arc::new(Semaphore::new(1)),
        }
    }

    /// 消费循环，`shutdown` 翻转为 true 后停止拉取并退出
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("事件分发器启动");

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("收到停机信号，停止拉取消息");
                        break;
                    }
                }
                received = self.queue.receive() => {
                    match received {
                        Ok(messages) => {
                            for message in messages {
                                self.dispatch(message);
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "拉取消息失败，退避后重试");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// 把一条消息交给后台任务处理
    fn dispatch(&self, message: QueueMessage) {
        let envelope: EventEnvelope = match serde_json::from_str(&message.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                // 解析不了的消息重投多少次都没用，直接丢弃
                warn!(error = %e, "消息体解析失败，丢弃");
                self.spawn_delete(message.receipt_handle);
                return;
            }
        };

        let Some(handler) = self.registry.get(envelope.topic) else {
            warn!(topic = %envelope.topic, "主题未注册处理器，丢弃");
            self.spawn_delete(message.receipt_handle);
            return;
        };

        let semaphore = if envelope.topic.is_bulk() {
            self.bulk_pool.clone()
        } else {
            self.default_pool.clone()
        };
        let queue = self.queue.clone();
        let pool = self.pool.clone();
        let receipt = message.receipt_handle;

        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };

            // 批量任务处理期间持续续租
            let heartbeat = envelope
                .topic
                .is_bulk()
                .then(|| spawn_heartbeat(queue.clone(), receipt.clone()));

            let result = handler.handle(&envelope).await;

            if let Some(heartbeat) = heartbeat {
                heartbeat.abort();
            }

            let key = envelope
                .order_id()
                .unwrap_or(&envelope.event_id)
                .to_string();

            match classify(result) {
                Disposition::Ack => {
                    if let Err(e) = queue.delete(&receipt).await {
                        warn!(error = %e, "确认消息失败，将被重投");
                        return;
                    }
                    if let Err(e) = FailureRepository::clear(&pool, &key, envelope.topic).await {
                        warn!(error = %e, "清理失败记录失败");
                    }
                }
                Disposition::Retry(e) => {
                    error!(
                        topic = %envelope.topic,
                        order_id = key,
                        error = %e,
                        "事件处理失败，等待重投"
                    );
                    if let Err(e) =
                        FailureRepository::record(&pool, &key, envelope.topic, &e.to_string()).await
                    {
                        warn!(error = %e, "写入失败记录失败");
                    }
                }
            }
        });
    }

    fn spawn_delete(&self, receipt: String) {
        let queue = self.queue.clone();
        tokio::spawn(async move {
            if let Err(e) = queue.delete(&receipt).await {
                warn!(error = %e, "丢弃消息失败");
            }
        });
    }
}

/// 续租心跳：按配置间隔把消息可见性重置为完整租约时长
///
/// 调用方在处理结束后 abort，无论成功失败心跳都随之停止。
fn spawn_heartbeat(queue: EventQueue, receipt: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = Duration::from_secs(queue.lease_renew_interval_seconds());
        let lease = queue.lease_seconds();
        loop {
            tokio::time::sleep(interval).await;
            if let Err(e) = queue.renew_lease(&receipt, lease).await {
                warn!(error = %e, "续租失败");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_ok_is_ack() {
        assert!(matches!(classify(Ok(())), Disposition::Ack));
    }

    #[test]
    fn test_classify_duplicate_is_ack() {
        let result = Err(LedgerError::DuplicateOperation {
            order_id: "order-1".to_string(),
            operation: "credit".to_string(),
        });
        assert!(matches!(classify(result), Disposition::Ack));
    }

    #[test]
    fn test_classify_other_errors_retry() {
        let result = Err(LedgerError::InsufficientBalance {
            required: 100,
            actual: 40,
        });
        assert!(matches!(classify(result), Disposition::Retry(_)));

        let result = Err(LedgerError::ConcurrentModification {
            entity: "wallet".to_string(),
            id: "w-1".to_string(),
        });
        assert!(matches!(classify(result), Disposition::Retry(_)));
    }
}
