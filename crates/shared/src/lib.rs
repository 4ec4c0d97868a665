//! 返现平台共享库
//!
//! 包含所有服务共用的配置、错误处理、数据库连接、消息队列、
//! 对象存储、事件信封、重试策略等基础设施代码。

pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod observability;
pub mod phone;
pub mod queue;
pub mod retry;
pub mod storage;
pub mod time;

pub use error::{LedgerError, Result};
