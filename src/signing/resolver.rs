//! 分发账户解析器
//!
//! 每次调用都重新读取租户行（以及 Circle 租户的托管方配置），不做任何缓存，
//! 账户轮换后不会返回旧地址

use std::{fmt, sync::Arc};

use tracing::debug;

use crate::{
    domain::{
        account::{AccountStatus, AccountType, TransactionAccount},
        stellar::is_valid_ed25519_public_key,
        tenant::{RequestContext, Tenant},
    },
    error::{CoreError, CoreResult},
    repository::{custodian_config::CustodianConfigStore, tenants::TenantStore},
};

pub struct DistributionAccountResolverOptions {
    pub host_distribution_account_public_key: String,
    pub tenants: Arc<dyn TenantStore>,
    pub custodian_configs: Arc<dyn CustodianConfigStore>,
}

impl DistributionAccountResolverOptions {
    pub fn validate(&self) -> CoreResult<()> {
        if self.host_distribution_account_public_key.is_empty() {
            return Err(CoreError::validation(
                "host distribution account public key cannot be empty",
            ));
        }
        if !is_valid_ed25519_public_key(&self.host_distribution_account_public_key) {
            return Err(CoreError::validation(
                "host distribution account public key is not a valid ed25519 public key",
            ));
        }
        Ok(())
    }
}

pub struct DistributionAccountResolver {
    host_distribution_account_public_key: String,
    tenants: Arc<dyn TenantStore>,
    custodian_configs: Arc<dyn CustodianConfigStore>,
}

impl fmt::Debug for DistributionAccountResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributionAccountResolver")
            .field("host", &self.host_distribution_account_public_key)
            .finish_non_exhaustive()
    }
}

impl DistributionAccountResolver {
    pub fn new(opts: DistributionAccountResolverOptions) -> CoreResult<Self> {
        opts.validate()
            .map_err(|e| e.context("validating distribution account resolver options"))?;
        Ok(Self {
            host_distribution_account_public_key: opts.host_distribution_account_public_key,
            tenants: opts.tenants,
            custodian_configs: opts.custodian_configs,
        })
    }

    /// 按租户 ID 解析分发账户
    pub async fn distribution_account(&self, tenant_id: &str) -> CoreResult<TransactionAccount> {
        let tenant = self
            .tenants
            .get_by_id(tenant_id)
            .await
            .map_err(|e| e.context(format!("getting tenant {}", tenant_id)))?;
        self.account_for_tenant(&tenant).await
    }

    /// 从请求上下文取租户，再按 ID 重新读取
    pub async fn distribution_account_from_context(
        &self,
        ctx: &RequestContext,
    ) -> CoreResult<TransactionAccount> {
        let tenant = ctx.require_tenant()?;
        self.distribution_account(&tenant.id).await
    }

    /// 平台级手续费赞助账户，与租户无关
    pub fn host_distribution_account(&self) -> TransactionAccount {
        TransactionAccount::stellar(
            self.host_distribution_account_public_key.clone(),
            AccountType::HostStellarEnv,
        )
    }

    async fn account_for_tenant(&self, tenant: &Tenant) -> CoreResult<TransactionAccount> {
        if tenant.distribution_account_type.is_circle() {
            return self.circle_account(tenant).await;
        }

        let address = tenant
            .distribution_account_address
            .as_deref()
            .filter(|a| !a.is_empty())
            .ok_or(CoreError::DistributionAccountIsEmpty)?;

        Ok(TransactionAccount {
            address: address.to_string(),
            account_type: tenant.distribution_account_type,
            status: tenant.distribution_account_status,
            external_wallet_id: None,
        })
    }

    async fn circle_account(&self, tenant: &Tenant) -> CoreResult<TransactionAccount> {
        let config = self
            .custodian_configs
            .get(&tenant.id)
            .await
            .map_err(|e| e.context("getting custodian client config"))?;

        let wallet_id = config.and_then(|c| c.wallet_id).filter(|w| !w.is_empty());
        let account = match wallet_id {
            Some(wallet_id) => TransactionAccount {
                address: String::new(),
                account_type: tenant.distribution_account_type,
                status: AccountStatus::Active,
                external_wallet_id: Some(wallet_id),
            },
            None => {
                // 尚未完成托管方开通
                debug!(tenant_id = %tenant.id, "custodian client config not found");
                TransactionAccount {
                    address: String::new(),
                    account_type: tenant.distribution_account_type,
                    status: tenant.distribution_account_status,
                    external_wallet_id: Some(String::new()),
                }
            }
        };
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::stellar::Keypair,
        error::ErrorKind,
        repository::custodian_config::CustodianConfigUpdate,
        test_support::{tenant, InMemoryCustodianConfigStore, InMemoryTenantStore},
    };

    struct Fixture {
        resolver: DistributionAccountResolver,
        tenants: Arc<InMemoryTenantStore>,
        configs: Arc<InMemoryCustodianConfigStore>,
        host: String,
    }

    fn fixture() -> Fixture {
        let tenants = Arc::new(InMemoryTenantStore::default());
        let configs = Arc::new(InMemoryCustodianConfigStore::default());
        let host = Keypair::random().address();
        let resolver = DistributionAccountResolver::new(DistributionAccountResolverOptions {
            host_distribution_account_public_key: host.clone(),
            tenants: tenants.clone(),
            custodian_configs: configs.clone(),
        })
        .unwrap();
        Fixture {
            resolver,
            tenants,
            configs,
            host,
        }
    }

    #[test]
    fn test_new_validates_host_key() {
        let err = DistributionAccountResolver::new(DistributionAccountResolverOptions {
            host_distribution_account_public_key: Keypair::random().seed().to_string(),
            tenants: Arc::new(InMemoryTenantStore::default()),
            custodian_configs: Arc::new(InMemoryCustodianConfigStore::default()),
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_host_distribution_account() {
        let f = fixture();
        let host = f.resolver.host_distribution_account();
        assert_eq!(host.address, f.host);
        assert_eq!(host.account_type, AccountType::HostStellarEnv);
        assert!(host.is_active());
    }

    #[tokio::test]
    async fn test_stellar_tenant_resolution() {
        let f = fixture();
        let address = Keypair::random().address();
        let mut t = tenant("t1", "bluecorp");
        t.distribution_account_address = Some(address.clone());
        f.tenants.put(t.clone()).await;

        let account = f.resolver.distribution_account("t1").await.unwrap();
        assert_eq!(account.address, address);
        assert_eq!(account.account_type, AccountType::DistributionAccountStellarDbVault);

        let from_ctx = f
            .resolver
            .distribution_account_from_context(&RequestContext::with_tenant(t))
            .await
            .unwrap();
        assert_eq!(from_ctx, account);
    }

    #[tokio::test]
    async fn test_empty_distribution_account() {
        let f = fixture();
        f.tenants.put(tenant("t1", "bluecorp")).await;

        let err = f.resolver.distribution_account("t1").await.unwrap_err();
        assert_eq!(err.to_string(), "distribution account is empty");
        assert!(matches!(err, CoreError::DistributionAccountIsEmpty));
    }

    #[tokio::test]
    async fn test_tenant_not_found() {
        let f = fixture();
        let err = f.resolver.distribution_account("missing").await.unwrap_err();
        assert!(matches!(err.root(), CoreError::TenantNotFound(_)));

        let err = f
            .resolver
            .distribution_account_from_context(&RequestContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::TenantNotFoundInContext));
    }

    #[tokio::test]
    async fn test_reads_current_state_after_rotation() {
        let f = fixture();
        let mut t = tenant("t1", "bluecorp");
        t.distribution_account_address = Some(Keypair::random().address());
        f.tenants.put(t.clone()).await;
        let stale_ctx = RequestContext::with_tenant(t.clone());
        f.resolver.distribution_account("t1").await.unwrap();

        let rotated = Keypair::random().address();
        t.distribution_account_address = Some(rotated.clone());
        f.tenants.put(t).await;

        let account = f
            .resolver
            .distribution_account_from_context(&stale_ctx)
            .await
            .unwrap();
        assert_eq!(account.address, rotated);
    }

    #[tokio::test]
    async fn test_circle_tenant_before_and_after_onboarding() {
        let f = fixture();
        let mut t = tenant("t1", "bluecorp");
        t.distribution_account_type = AccountType::DistributionAccountCircleDbVault;
        t.distribution_account_status = AccountStatus::PendingUserActivation;
        f.tenants.put(t).await;

        let account = f.resolver.distribution_account("t1").await.unwrap();
        assert!(account.is_pending_user_activation());
        assert_eq!(account.external_wallet_id.as_deref(), Some(""));
        assert_eq!(account.id(), "");

        f.configs
            .upsert(
                "t1",
                CustodianConfigUpdate {
                    wallet_id: Some("1000066041".into()),
                    encrypted_api_key: Some("encrypted".into()),
                    encrypter_public_key: Some("pubkey".into()),
                },
            )
            .await
            .unwrap();

        let account = f.resolver.distribution_account("t1").await.unwrap();
        assert!(account.is_active());
        assert_eq!(account.id(), "1000066041");
    }
}
