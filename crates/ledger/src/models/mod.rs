//! 账本实体定义

mod enums;
mod point;
mod settings;
mod transaction;
mod wallet;

pub use enums::{OrderEntryType, PointStatus, RuleKind, TxStatus, TxType};
pub use point::Point;
pub use settings::{AllocationRule, CashbackCode, Settings};
pub use transaction::{
    LedgerTransaction, NOTE_BLOCKED_BY_EXPIRY, NOTE_CANCELLATION_REFUND, NOTE_CAP_REACHED,
    NOTE_EXPIRED, NOTE_MANUAL_DISTRIBUTION, NOTE_REFUND_CREDITED,
};
pub use wallet::{Customer, CustomerIdentity, Wallet};
