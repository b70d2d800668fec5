use std::{sync::Arc, time::Duration};

use anyhow::Context;
use zeroize::Zeroizing;

use crate::{
    config::Config,
    domain::{account::AccountType, stellar::Keypair},
    error::CoreResult,
    infrastructure::{
        db::{AdminPool, PgPool, PoolConfig},
        encryption::{AesGcmEncrypter, PrivateKeyEncrypter},
        jwt::JwtManager,
        tenant_router::TenantPoolRouter,
    },
    repository::{
        custodian_config::{CustodianConfigStore, PgCustodianConfigStore},
        payments::PgReconciliationStore,
        tenants::{PgTenantStore, TenantStore},
        transactions::{PgTransactionStore, TransactionStore},
        vault::{PgVaultStore, VaultStore},
    },
    service::{
        anchor_platform::AnchorPlatformClient,
        reconciliation::{ReconciliationOptions, ReconciliationService},
    },
    signing::{
        DistributionAccountResolver, DistributionAccountResolverOptions, SignerRouter,
        SignerRouterOptions,
    },
};

/// 应用状态
/// 启动时构建一次，以 `Arc` 传给所有 worker，不存在全局单例
#[derive(Clone)]
pub struct AppState {
    pub admin: AdminPool,
    pub tenant_router: Arc<TenantPoolRouter>,
    pub tenants: Arc<dyn TenantStore>,
    pub vault: Arc<dyn VaultStore>,
    pub custodian_configs: Arc<dyn CustodianConfigStore>,
    pub transactions: Arc<dyn TransactionStore>,
    pub signer_router: Arc<SignerRouter>,
    pub distribution_account_resolver: Arc<DistributionAccountResolver>,
    pub reconciliation: Arc<ReconciliationService>,
    pub config: Arc<Config>,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(pool: PgPool, config: Arc<Config>) -> anyhow::Result<Self> {
        let admin = AdminPool::new(pool.clone(), config.database.url.clone());
        let pool_config = PoolConfig::from(&config.database);

        let tenants: Arc<dyn TenantStore> = Arc::new(PgTenantStore::new(pool.clone()));
        let tenant_router = Arc::new(TenantPoolRouter::new(
            &config.database.url,
            pool_config,
            tenants.clone(),
        ));

        let encrypter: Arc<dyn PrivateKeyEncrypter> = Arc::new(AesGcmEncrypter);
        let vault: Arc<dyn VaultStore> = Arc::new(PgVaultStore::new(pool.clone()));
        let custodian_configs: Arc<dyn CustodianConfigStore> = Arc::new(
            PgCustodianConfigStore::new(tenant_router.clone(), encrypter.clone()),
        );
        let transactions: Arc<dyn TransactionStore> = Arc::new(PgTransactionStore::new(pool));

        let signing = &config.signing;
        let signer_router = SignerRouter::new(
            SignerRouterOptions {
                network_passphrase: signing.network_passphrase.clone(),
                host_private_key: Some(signing.host_seed.clone()),
                distribution_private_key: signing.distribution_seed.clone(),
                distribution_account_encryption_passphrase: Some(
                    config.distribution_account_encryption_passphrase().to_string(),
                ),
                vault: Some(vault.clone()),
                encrypter: Some(encrypter),
            },
            &signer_account_types(&config),
        )
        .context("Failed to create signer router")?;

        let host = Keypair::from_seed(&signing.host_seed).context("Invalid host seed")?;
        let distribution_account_resolver =
            DistributionAccountResolver::new(DistributionAccountResolverOptions {
                host_distribution_account_public_key: host.address(),
                tenants: tenants.clone(),
                custodian_configs: custodian_configs.clone(),
            })
            .context("Failed to create distribution account resolver")?;

        let ap = &config.anchor_platform;
        let jwt = JwtManager::new(&ap.outgoing_jwt_secret, ap.jwt_expiration_ms)
            .context("Failed to create anchor platform JWT manager")?;
        let anchor_platform = AnchorPlatformClient::new(
            &ap.base_url,
            jwt,
            Duration::from_secs(ap.request_timeout_secs),
        )
        .context("Failed to create anchor platform client")?;

        let reconciliation = ReconciliationService::new(
            Arc::new(PgReconciliationStore::new(tenant_router.clone())),
            Arc::new(anchor_platform),
            ReconciliationOptions {
                batch_size: config.reconciliation.batch_size,
                max_error_message_length: config.reconciliation.max_error_message_length,
            },
        )
        .context("Failed to create reconciliation service")?;

        Ok(Self {
            admin,
            tenant_router,
            tenants,
            vault,
            custodian_configs,
            transactions,
            signer_router: Arc::new(signer_router),
            distribution_account_resolver: Arc::new(distribution_account_resolver),
            reconciliation: Arc::new(reconciliation),
            config,
        })
    }

    /// 解密租户的托管方 API key
    pub async fn custodian_api_key(&self, tenant_id: &str) -> CoreResult<Zeroizing<String>> {
        self.custodian_configs
            .get_decrypted_api_key(tenant_id, self.config.custodian_encryption_passphrase())
            .await
    }
}

/// host 与租户可选的金库类后端总是启用；平台环境密钥后端仅在配置为该类型时启用
fn signer_account_types(config: &Config) -> Vec<AccountType> {
    let mut types = vec![
        AccountType::HostStellarEnv,
        AccountType::DistributionAccountStellarDbVault,
        AccountType::DistributionAccountCircleDbVault,
    ];
    if !types.contains(&config.signing.distribution_account_type) {
        types.push(config.signing.distribution_account_type);
    }
    types
}
