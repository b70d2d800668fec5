//! 签名模块
//!
//! - `SignatureClient`：所有托管后端共享的签名/密钥生命周期能力
//! - `SignatureBackend`：按托管方式封闭分派（本地金库 / 第三方托管 / 平台环境密钥）
//! - `SignerRouter`：账户类型 → 后端 的查找表

pub mod backend;
pub mod circle_client;
pub mod env_client;
pub mod resolver;
pub mod router;
pub mod vault_client;

use async_trait::async_trait;

use crate::{
    domain::{
        account::AccountType,
        stellar::{FeeBumpTransaction, Transaction},
    },
    error::{CoreError, CoreResult},
};

pub use backend::SignatureBackend;
pub use circle_client::CircleSignatureClient;
pub use env_client::{AccountEnvOptions, AccountEnvSignatureClient};
pub use resolver::{DistributionAccountResolver, DistributionAccountResolverOptions};
pub use router::{SignerRouter, SignerRouterOptions};
pub use vault_client::{VaultSignatureClient, VaultSignatureClientOptions};

/// 单次 `batch_insert` 允许生成的账户数上限
pub const MAX_BATCH_INSERT_COUNT: i64 = 1_000;

/// 校验 `batch_insert` 的数量参数：必须在 `1..=MAX_BATCH_INSERT_COUNT` 内
pub fn batch_insert_count(count: i64) -> CoreResult<usize> {
    if count <= 0 {
        return Err(CoreError::validation("count must be greater than zero"));
    }
    if count > MAX_BATCH_INSERT_COUNT {
        return Err(CoreError::validation(format!(
            "count must not exceed {}",
            MAX_BATCH_INSERT_COUNT
        )));
    }
    usize::try_from(count).map_err(|_| CoreError::validation("count does not fit in usize"))
}

#[async_trait]
pub trait SignatureClient: Send + Sync {
    fn network_passphrase(&self) -> &str;

    fn account_type(&self) -> AccountType;

    /// 生成并持久化 `count` 个新账户，返回公钥
    async fn batch_insert(&self, count: i64) -> CoreResult<Vec<String>>;

    async fn delete(&self, public_key: &str) -> CoreResult<()>;

    /// 返回签名后的新交易，入参不被修改
    async fn sign_stellar_transaction(
        &self,
        tx: &Transaction,
        accounts: &[String],
    ) -> CoreResult<Transaction>;

    async fn sign_fee_bump_stellar_transaction(
        &self,
        tx: &FeeBumpTransaction,
        accounts: &[String],
    ) -> CoreResult<FeeBumpTransaction>;
}
