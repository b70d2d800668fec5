//! 第三方托管（Circle）账户的签名后端占位
//!
//! 资金由托管方直接转出，本地既不持有密钥也不签名；
//! 所有密钥与签名操作都返回可区分的 Unsupported 错误，开通流程可将其视为跳过

use async_trait::async_trait;

use super::SignatureClient;
use crate::{
    domain::{
        account::AccountType,
        stellar::{FeeBumpTransaction, Transaction},
    },
    error::{CoreError, CoreResult},
};

#[derive(Debug, Clone)]
pub struct CircleSignatureClient {
    network_passphrase: String,
}

impl CircleSignatureClient {
    pub fn new(network_passphrase: impl Into<String>) -> CoreResult<Self> {
        let network_passphrase = network_passphrase.into();
        if network_passphrase.is_empty() {
            return Err(CoreError::validation("network passphrase cannot be empty"));
        }
        Ok(Self { network_passphrase })
    }

    fn unsupported(&self, command: &str) -> CoreError {
        CoreError::unsupported(format!(
            "{} called for signature client type {}",
            command,
            AccountType::DistributionAccountCircleDbVault
        ))
    }
}

#[async_trait]
impl SignatureClient for CircleSignatureClient {
    fn network_passphrase(&self) -> &str {
        &self.network_passphrase
    }

    fn account_type(&self) -> AccountType {
        AccountType::DistributionAccountCircleDbVault
    }

    async fn batch_insert(&self, _count: i64) -> CoreResult<Vec<String>> {
        Err(self.unsupported("batch insert"))
    }

    async fn delete(&self, _public_key: &str) -> CoreResult<()> {
        Err(self.unsupported("delete"))
    }

    async fn sign_stellar_transaction(
        &self,
        _tx: &Transaction,
        _accounts: &[String],
    ) -> CoreResult<Transaction> {
        Err(self.unsupported("sign stellar transaction"))
    }

    async fn sign_fee_bump_stellar_transaction(
        &self,
        _tx: &FeeBumpTransaction,
        _accounts: &[String],
    ) -> CoreResult<FeeBumpTransaction> {
        Err(self.unsupported("sign fee bump stellar transaction"))
    }
}
