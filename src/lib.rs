//! disbursement-core - 多租户支付分发的托管与交易提交核心
//!
//! 分发账户解析、私钥托管与签名、提交交易状态机、锚点平台对账，
//! 以及按租户 schema 隔离的数据库连接路由

pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod repository;
pub mod service;
pub mod signing;

#[cfg(test)]
pub(crate) mod test_support;

// 重新导出常用类型
pub use app_state::AppState;
pub use error::{CoreError, CoreResult, ErrorKind};

pub mod prelude {
    pub use crate::{
        app_state::AppState,
        domain::{
            account::{AccountStatus, AccountType, TransactionAccount},
            tenant::{RequestContext, Tenant},
            transaction_status::TransactionStatus,
        },
        error::{CoreError, CoreResult, ErrorKind},
        signing::{SignatureClient, SignerRouter},
    };
}
