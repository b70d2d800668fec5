//! 租户模型与请求上下文

use serde::{Deserialize, Serialize};

use super::account::{AccountStatus, AccountType};
use crate::error::{CoreError, CoreResult};

/// 租户 schema 前缀
pub const TENANT_SCHEMA_PREFIX: &str = "sdp_";

/// 租户配置（只读为主）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub distribution_account_address: Option<String>,
    pub distribution_account_type: AccountType,
    pub distribution_account_status: AccountStatus,
}

impl Tenant {
    /// 租户隔离 schema 名：`sdp_<name>`
    pub fn schema_name(&self) -> String {
        schema_name_for(&self.name)
    }
}

pub fn schema_name_for(tenant_name: &str) -> String {
    format!("{}{}", TENANT_SCHEMA_PREFIX, tenant_name)
}

/// 请求上下文
///
/// 只用来在调用链中携带租户，不存在任何全局状态
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    tenant: Option<Tenant>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(tenant: Tenant) -> Self {
        Self {
            tenant: Some(tenant),
        }
    }

    pub fn tenant(&self) -> Option<&Tenant> {
        self.tenant.as_ref()
    }

    /// 取出上下文中的租户，缺失即报错（绝不回退到默认租户）
    pub fn require_tenant(&self) -> CoreResult<&Tenant> {
        self.tenant.as_ref().ok_or(CoreError::TenantNotFoundInContext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> Tenant {
        Tenant {
            id: "tenant-1".into(),
            name: "bluecorp".into(),
            distribution_account_address: None,
            distribution_account_type: AccountType::DistributionAccountStellarDbVault,
            distribution_account_status: AccountStatus::Active,
        }
    }

    #[test]
    fn test_schema_name() {
        assert_eq!(tenant().schema_name(), "sdp_bluecorp");
    }

    #[test]
    fn test_require_tenant() {
        let err = RequestContext::new().require_tenant().unwrap_err();
        assert!(err.is_not_found());

        let ctx = RequestContext::with_tenant(tenant());
        assert_eq!(ctx.require_tenant().unwrap().id, "tenant-1");
    }
}
