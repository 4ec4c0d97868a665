//! 事件分发器
//!
//! 从队列消费订单生命周期事件，按主题路由到账本操作。普通主题
//! 共享一个并发池；批量发放走容量为 1 的专用池，处理期间持续
//! 给消息续租。处理失败不删消息，交给队列按可见性超时重投。

mod consumer;
mod failures;
mod handlers;

pub use consumer::{Disposition, Dispatcher, classify};
pub use failures::FailureRepository;
pub use handlers::{
    BulkHandler, CancelHandler, CreditHandler, DebitHandler, HandlerRegistry, PromoteHandler,
    RefundHandler, TopicHandler,
};
