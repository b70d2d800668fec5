// 租户配置数据访问 Repository（管理库）

use async_trait::async_trait;
use sqlx::{postgres::PgRow, Row};

use crate::{
    domain::{
        account::{AccountStatus, AccountType},
        tenant::Tenant,
    },
    error::{CoreError, CoreResult},
    infrastructure::db::PgPool,
};

#[async_trait]
pub trait TenantStore: Send + Sync {
    /// 根据 ID 查询租户（已删除的租户视为不存在）
    async fn get_by_id(&self, tenant_id: &str) -> CoreResult<Tenant>;

    /// 根据名称查询租户
    async fn get_by_name(&self, name: &str) -> CoreResult<Tenant>;

    /// 所有未删除的租户，按名称排序
    async fn get_all(&self) -> CoreResult<Vec<Tenant>>;
}

pub struct PgTenantStore {
    pool: PgPool,
}

impl PgTenantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const TENANT_COLUMNS: &str = r#"
    id::text AS id,
    name,
    distribution_account_address,
    distribution_account_type,
    distribution_account_status
"#;

fn tenant_from_row(row: &PgRow) -> CoreResult<Tenant> {
    let account_type: String = row.try_get("distribution_account_type")?;
    let account_status: String = row.try_get("distribution_account_status")?;

    Ok(Tenant {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        distribution_account_address: row.try_get("distribution_account_address")?,
        distribution_account_type: account_type
            .parse::<AccountType>()
            .map_err(CoreError::validation)?,
        distribution_account_status: account_status
            .parse::<AccountStatus>()
            .map_err(CoreError::validation)?,
    })
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn get_by_id(&self, tenant_id: &str) -> CoreResult<Tenant> {
        let sql = format!(
            "SELECT {} FROM tenants WHERE id::text = $1 AND deleted_at IS NULL",
            TENANT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::TenantNotFound(tenant_id.to_string()))?;
        tenant_from_row(&row)
    }

    async fn get_by_name(&self, name: &str) -> CoreResult<Tenant> {
        let sql = format!(
            "SELECT {} FROM tenants WHERE name = $1 AND deleted_at IS NULL",
            TENANT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::TenantNotFound(name.to_string()))?;
        tenant_from_row(&row)
    }

    async fn get_all(&self) -> CoreResult<Vec<Tenant>> {
        let sql = format!(
            "SELECT {} FROM tenants WHERE deleted_at IS NULL ORDER BY name",
            TENANT_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(tenant_from_row).collect()
    }
}
