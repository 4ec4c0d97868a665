//! 返现账本引擎
//!
//! 负责客户钱包余额的全部变动：预授予（credit）、转正（promote）、
//! 扣减（debit）、冲正（cancel）、退回（refund）、手工发放与过期清扫。
//! 每个操作在单个数据库事务内完成，作用域限定在一个钱包聚合上；
//! 并发控制采用乐观条件更新，条件未命中即整体回滚。

pub mod collaborators;
pub mod models;
pub mod repository;
pub mod service;
pub mod sweep;

pub use service::LedgerService;
pub use sweep::ExpirySweeper;
