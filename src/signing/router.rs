//! 签名路由器
//!
//! 账户类型 → 签名后端 的查找表。混合类型的账户按类型分组，
//! 按类型名排序后逐组签名。

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use tracing::debug;

use super::{
    batch_insert_count, AccountEnvOptions, AccountEnvSignatureClient, CircleSignatureClient, SignatureBackend,
    SignatureClient, VaultSignatureClient, VaultSignatureClientOptions,
};
use crate::{
    domain::{
        account::{AccountType, TransactionAccount},
        stellar::{FeeBumpTransaction, Transaction},
    },
    error::{CoreError, CoreResult},
    infrastructure::encryption::PrivateKeyEncrypter,
    repository::vault::VaultStore,
};

/// 路由器构建参数，只有被请求的账户类型才会校验对应字段
#[derive(Default)]
pub struct SignerRouterOptions {
    pub network_passphrase: String,
    pub host_private_key: Option<String>,
    pub distribution_private_key: Option<String>,
    pub distribution_account_encryption_passphrase: Option<String>,
    pub vault: Option<Arc<dyn VaultStore>>,
    pub encrypter: Option<Arc<dyn PrivateKeyEncrypter>>,
}

impl fmt::Debug for SignerRouterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerRouterOptions")
            .field("network_passphrase", &self.network_passphrase)
            .field("has_vault", &self.vault.is_some())
            .finish_non_exhaustive()
    }
}

fn require_key(value: &Option<String>, name: &str, account_type: AccountType) -> CoreResult<String> {
    value
        .clone()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            CoreError::validation(format!("{} is required for {}", name, account_type))
        })
}

fn build_backend(opts: &SignerRouterOptions, account_type: AccountType) -> CoreResult<SignatureBackend> {
    let backend: SignatureBackend = match account_type {
        AccountType::HostStellarEnv => AccountEnvSignatureClient::new(AccountEnvOptions {
            network_passphrase: opts.network_passphrase.clone(),
            private_key: require_key(&opts.host_private_key, "host private key", account_type)?,
            account_type,
        })?
        .into(),
        AccountType::DistributionAccountStellarEnv => {
            AccountEnvSignatureClient::new(AccountEnvOptions {
                network_passphrase: opts.network_passphrase.clone(),
                private_key: require_key(
                    &opts.distribution_private_key,
                    "distribution private key",
                    account_type,
                )?,
                account_type,
            })?
            .into()
        }
        AccountType::DistributionAccountStellarDbVault => {
            VaultSignatureClient::new(VaultSignatureClientOptions {
                network_passphrase: opts.network_passphrase.clone(),
                vault: opts.vault.clone(),
                encryption_passphrase: require_key(
                    &opts.distribution_account_encryption_passphrase,
                    "distribution account encryption passphrase",
                    account_type,
                )?,
                encrypter: opts.encrypter.clone(),
            })?
            .into()
        }
        AccountType::DistributionAccountCircleDbVault => {
            CircleSignatureClient::new(opts.network_passphrase.clone())?.into()
        }
    };
    Ok(backend)
}

pub struct SignerRouter {
    network_passphrase: String,
    backends: HashMap<AccountType, SignatureBackend>,
}

impl fmt::Debug for SignerRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerRouter")
            .field("network_passphrase", &self.network_passphrase)
            .field("account_types", &self.supported_account_types())
            .finish()
    }
}

impl SignerRouter {
    /// 为给定账户类型构建后端；空列表表示全部类型
    pub fn new(opts: SignerRouterOptions, account_types: &[AccountType]) -> CoreResult<Self> {
        if opts.network_passphrase.is_empty() {
            return Err(CoreError::validation("network passphrase cannot be empty"));
        }

        let account_types: Vec<AccountType> = if account_types.is_empty() {
            AccountType::all().to_vec()
        } else {
            account_types.to_vec()
        };

        let mut backends = HashMap::with_capacity(account_types.len());
        for account_type in account_types {
            let backend = build_backend(&opts, account_type).map_err(|e| {
                e.context(format!("creating signature client for {}", account_type))
            })?;
            backends.insert(account_type, backend);
        }

        Ok(Self {
            network_passphrase: opts.network_passphrase,
            backends,
        })
    }

    pub fn from_backends(
        network_passphrase: impl Into<String>,
        backends: impl IntoIterator<Item = SignatureBackend>,
    ) -> Self {
        Self {
            network_passphrase: network_passphrase.into(),
            backends: backends
                .into_iter()
                .map(|b| (b.account_type(), b))
                .collect(),
        }
    }

    pub fn network_passphrase(&self) -> &str {
        &self.network_passphrase
    }

    pub fn supported_account_types(&self) -> Vec<AccountType> {
        let mut types: Vec<AccountType> = self.backends.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }

    pub fn route_signer(&self, account_type: AccountType) -> CoreResult<&SignatureBackend> {
        self.backends.get(&account_type).ok_or_else(|| {
            CoreError::validation(format!(
                "type {} is not supported by the signer router",
                account_type
            ))
        })
    }

    fn group_by_type(
        accounts: &[TransactionAccount],
    ) -> CoreResult<BTreeMap<&'static str, (AccountType, Vec<String>)>> {
        if accounts.is_empty() {
            return Err(CoreError::validation(
                "no accounts provided to sign the transaction",
            ));
        }
        let mut grouped: BTreeMap<&'static str, (AccountType, Vec<String>)> = BTreeMap::new();
        for account in accounts {
            grouped
                .entry(account.account_type.as_str())
                .or_insert_with(|| (account.account_type, Vec::new()))
                .1
                .push(account.address.clone());
        }
        Ok(grouped)
    }

    pub async fn sign_stellar_transaction(
        &self,
        tx: &Transaction,
        accounts: &[TransactionAccount],
    ) -> CoreResult<Transaction> {
        let grouped = Self::group_by_type(accounts)?;

        let mut signed = tx.clone();
        for (account_type, addresses) in grouped.into_values() {
            debug!(account_type = %account_type, signers = addresses.len(), "signing transaction");
            signed = self
                .route_signer(account_type)?
                .sign_stellar_transaction(&signed, &addresses)
                .await
                .map_err(|e| {
                    e.context(format!("signing stellar transaction for strategy type {}", account_type))
                })?;
        }
        Ok(signed)
    }

    pub async fn sign_fee_bump_stellar_transaction(
        &self,
        tx: &FeeBumpTransaction,
        accounts: &[TransactionAccount],
    ) -> CoreResult<FeeBumpTransaction> {
        let grouped = Self::group_by_type(accounts)?;

        let mut signed = tx.clone();
        for (account_type, addresses) in grouped.into_values() {
            signed = self
                .route_signer(account_type)?
                .sign_fee_bump_stellar_transaction(&signed, &addresses)
                .await
                .map_err(|e| {
                    e.context(format!(
                        "signing fee bump stellar transaction for strategy type {}",
                        account_type
                    ))
                })?;
        }
        Ok(signed)
    }

    /// 生成 `count` 个账户
    ///
    /// 后端报告不支持但仍返回了地址时（环境密钥后端），接受这些地址
    pub async fn batch_insert(
        &self,
        account_type: AccountType,
        count: i64,
    ) -> CoreResult<Vec<TransactionAccount>> {
        batch_insert_count(count)?;

        let signer = self.route_signer(account_type)?;
        let public_keys = match signer.batch_insert(count).await {
            Ok(keys) => keys,
            Err(e) => match e.unsupported_public_keys() {
                Some(keys) if !keys.is_empty() => keys.to_vec(),
                _ => {
                    return Err(e.context(format!(
                        "batch inserting accounts for strategy type {}",
                        account_type
                    )))
                }
            },
        };

        Ok(public_keys
            .into_iter()
            .map(|address| TransactionAccount::stellar(address, account_type))
            .collect())
    }

    pub async fn delete(&self, account: &TransactionAccount) -> CoreResult<()> {
        self.route_signer(account.account_type)?
            .delete(&account.address)
            .await
            .map_err(|e| {
                e.context(format!(
                    "deleting account {} for strategy type {}",
                    account.address, account.account_type
                ))
            })
    }
}
