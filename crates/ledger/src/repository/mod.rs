//! 数据访问层
//!
//! 所有写入都提供事务内版本（接收 `&mut PgConnection`），由服务层
//! 统一控制事务边界。乐观并发的条件更新在这里表达为
//! `UPDATE ... WHERE <前置条件>`，调用方检查命中行数判定是否冲突。

mod customer_repo;
mod point_repo;
mod settings_repo;
mod transaction_repo;
mod wallet_repo;

pub use customer_repo::CustomerRepository;
pub use point_repo::{DebitedLot, NewPoint, PointRepository};
pub use settings_repo::SettingsRepository;
pub use transaction_repo::{NewTransaction, TransactionRepository};
pub use wallet_repo::WalletRepository;
