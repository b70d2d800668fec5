//! 平台环境密钥签名后端（HOST.STELLAR.ENV / DISTRIBUTION_ACCOUNT.STELLAR.ENV）
//!
//! 私钥来自配置，只能为自己的地址签名，不支持密钥生命周期管理

use std::fmt;

use async_trait::async_trait;

use super::{batch_insert_count, SignatureClient};
use crate::{
    domain::{
        account::AccountType,
        stellar::{is_valid_ed25519_secret_seed, FeeBumpTransaction, Keypair, Transaction},
    },
    error::{CoreError, CoreResult},
};

pub struct AccountEnvOptions {
    pub network_passphrase: String,
    pub private_key: String,
    pub account_type: AccountType,
}

impl fmt::Debug for AccountEnvOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountEnvOptions")
            .field("network_passphrase", &self.network_passphrase)
            .field("account_type", &self.account_type)
            .finish_non_exhaustive()
    }
}

impl AccountEnvOptions {
    pub fn validate(&self) -> CoreResult<()> {
        if self.network_passphrase.is_empty() {
            return Err(CoreError::validation("network passphrase cannot be empty"));
        }
        if !is_valid_ed25519_secret_seed(&self.private_key) {
            return Err(CoreError::validation(
                "distribution private key is not a valid Ed25519 secret",
            ));
        }
        if !matches!(
            self.account_type,
            AccountType::HostStellarEnv | AccountType::DistributionAccountStellarEnv
        ) {
            return Err(CoreError::validation(format!(
                "the provided account type {} does not match any of the supported account types: [{}, {}]",
                self.account_type,
                AccountType::HostStellarEnv,
                AccountType::DistributionAccountStellarEnv
            )));
        }
        Ok(())
    }
}

pub struct AccountEnvSignatureClient {
    network_passphrase: String,
    address: String,
    keypair: Keypair,
    account_type: AccountType,
}

impl fmt::Debug for AccountEnvSignatureClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AccountEnvSignatureClient{{address: {}, account_type: {}}}",
            self.address, self.account_type
        )
    }
}

impl AccountEnvSignatureClient {
    pub fn new(opts: AccountEnvOptions) -> CoreResult<Self> {
        opts.validate()
            .map_err(|e| e.context("validating account env options"))?;

        let keypair = Keypair::from_seed(&opts.private_key)?;
        Ok(Self {
            network_passphrase: opts.network_passphrase,
            address: keypair.address(),
            keypair,
            account_type: opts.account_type,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn validate_accounts(&self, accounts: &[String]) -> CoreResult<()> {
        if accounts.is_empty() {
            return Err(CoreError::validation(format!(
                "stellar accounts cannot be empty in {}",
                self.account_type
            )));
        }
        if let Some(other) = accounts.iter().find(|a| **a != self.address) {
            return Err(CoreError::validation(format!(
                "stellar account {} is not allowed to sign in {}",
                other, self.account_type
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SignatureClient for AccountEnvSignatureClient {
    fn network_passphrase(&self) -> &str {
        &self.network_passphrase
    }

    fn account_type(&self) -> AccountType {
        self.account_type
    }

    /// 返回 `count` 个自身地址，同时报告不支持
    async fn batch_insert(&self, count: i64) -> CoreResult<Vec<String>> {
        let count = batch_insert_count(count)?;
        Err(CoreError::UnsupportedBatchInsert {
            client: self.account_type.to_string(),
            public_keys: vec![self.address.clone(); count],
        })
    }

    async fn delete(&self, public_key: &str) -> CoreResult<()> {
        self.validate_accounts(&[public_key.to_string()])
            .map_err(|e| e.context("validating stellar account to delete"))?;
        Err(CoreError::unsupported(format!(
            "delete called for signature client type {}",
            self.account_type
        )))
    }

    async fn sign_stellar_transaction(
        &self,
        tx: &Transaction,
        accounts: &[String],
    ) -> CoreResult<Transaction> {
        self.validate_accounts(accounts)?;
        tx.sign(&self.network_passphrase, std::slice::from_ref(&self.keypair))
    }

    async fn sign_fee_bump_stellar_transaction(
        &self,
        tx: &FeeBumpTransaction,
        accounts: &[String],
    ) -> CoreResult<FeeBumpTransaction> {
        self.validate_accounts(accounts)?;
        tx.sign(&self.network_passphrase, std::slice::from_ref(&self.keypair))
    }
}
