//! Domain 模块
//!
//! 账户、租户、交易状态机与最小化的账本原语

pub mod account;
pub mod stellar;
pub mod tenant;
pub mod transaction_status;

// 重新导出常用类型
pub use account::{AccountStatus, AccountType, CustodyKind, TransactionAccount};
pub use tenant::{RequestContext, Tenant};
pub use transaction_status::TransactionStatus;
