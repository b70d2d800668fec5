//! 签名后端的封闭分派
//!
//! 托管方式只有三种，用 enum 表达而不是 trait object，
//! 路由器中的每个条目都能直接取回其 `CustodyKind`

use async_trait::async_trait;

use super::{AccountEnvSignatureClient, CircleSignatureClient, SignatureClient, VaultSignatureClient};
use crate::{
    domain::{
        account::{AccountType, CustodyKind},
        stellar::{FeeBumpTransaction, Transaction},
    },
    error::CoreResult,
};

#[derive(Debug)]
pub enum SignatureBackend {
    LocalVault(VaultSignatureClient),
    ExternalCustodian(CircleSignatureClient),
    HostManaged(AccountEnvSignatureClient),
}

impl SignatureBackend {
    pub fn custody_kind(&self) -> CustodyKind {
        match self {
            Self::LocalVault(_) => CustodyKind::LocalVault,
            Self::ExternalCustodian(_) => CustodyKind::ExternalCustodian,
            Self::HostManaged(_) => CustodyKind::HostManaged,
        }
    }

    fn client(&self) -> &dyn SignatureClient {
        match self {
            Self::LocalVault(c) => c,
            Self::ExternalCustodian(c) => c,
            Self::HostManaged(c) => c,
        }
    }
}

impl From<VaultSignatureClient> for SignatureBackend {
    fn from(c: VaultSignatureClient) -> Self {
        Self::LocalVault(c)
    }
}

impl From<CircleSignatureClient> for SignatureBackend {
    fn from(c: CircleSignatureClient) -> Self {
        Self::ExternalCustodian(c)
    }
}

impl From<AccountEnvSignatureClient> for SignatureBackend {
    fn from(c: AccountEnvSignatureClient) -> Self {
        Self::HostManaged(c)
    }
}

#[async_trait]
impl SignatureClient for SignatureBackend {
    fn network_passphrase(&self) -> &str {
        self.client().network_passphrase()
    }

    fn account_type(&self) -> AccountType {
        self.client().account_type()
    }

    async fn batch_insert(&self, count: i64) -> CoreResult<Vec<String>> {
        self.client().batch_insert(count).await
    }

    async fn delete(&self, public_key: &str) -> CoreResult<()> {
        self.client().delete(public_key).await
    }

    async fn sign_stellar_transaction(
        &self,
        tx: &Transaction,
        accounts: &[String],
    ) -> CoreResult<Transaction> {
        self.client().sign_stellar_transaction(tx, accounts).await
    }

    async fn sign_fee_bump_stellar_transaction(
        &self,
        tx: &FeeBumpTransaction,
        accounts: &[String],
    ) -> CoreResult<FeeBumpTransaction> {
        self.client()
            .sign_fee_bump_stellar_transaction(tx, accounts)
            .await
    }
}
