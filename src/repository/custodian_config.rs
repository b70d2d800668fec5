// 第三方托管方（Circle）客户端配置 Repository
//
// 每个租户 schema 中最多一行；不存在表示租户尚未完成托管方开通，不是错误

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use zeroize::Zeroizing;

use crate::{
    error::{CoreError, CoreResult},
    infrastructure::{
        db::{run_in_transaction, DbConnectionPool},
        encryption::PrivateKeyEncrypter,
        tenant_router::TenantPoolRouter,
    },
};

#[derive(Clone, FromRow)]
pub struct CustodianClientConfig {
    pub encrypted_api_key: Option<String>,
    pub wallet_id: Option<String>,
    pub encrypter_public_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for CustodianClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodianClientConfig")
            .field("wallet_id", &self.wallet_id)
            .field("encrypter_public_key", &self.encrypter_public_key)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CustodianConfigUpdate {
    pub encrypted_api_key: Option<String>,
    pub wallet_id: Option<String>,
    pub encrypter_public_key: Option<String>,
}

impl CustodianConfigUpdate {
    pub fn validate(&self) -> CoreResult<()> {
        if self.wallet_id.is_none() && self.encrypted_api_key.is_none() {
            return Err(CoreError::validation(
                "wallet_id or encrypted_api_key must be provided",
            ));
        }
        if self.encrypted_api_key.is_some() && self.encrypter_public_key.is_none() {
            return Err(CoreError::validation(
                "encrypter_public_key must be provided if encrypted_api_key is provided",
            ));
        }
        Ok(())
    }

    pub fn validate_for_insert(&self) -> CoreResult<()> {
        if self.wallet_id.is_none()
            || self.encrypted_api_key.is_none()
            || self.encrypter_public_key.is_none()
        {
            return Err(CoreError::validation(
                "wallet_id, encrypted_api_key, and encrypter_public_key must be provided",
            ));
        }
        Ok(())
    }
}

#[async_trait]
pub trait CustodianConfigStore: Send + Sync {
    /// 租户未开通时返回 `Ok(None)`
    async fn get(&self, tenant_id: &str) -> CoreResult<Option<CustodianClientConfig>>;

    /// 不存在则插入，存在则更新给定字段（单个事务）
    async fn upsert(&self, tenant_id: &str, update: CustodianConfigUpdate) -> CoreResult<()>;

    async fn get_decrypted_api_key(
        &self,
        tenant_id: &str,
        passphrase: &str,
    ) -> CoreResult<Zeroizing<String>>;
}

pub struct PgCustodianConfigStore {
    router: Arc<TenantPoolRouter>,
    encrypter: Arc<dyn PrivateKeyEncrypter>,
}

impl PgCustodianConfigStore {
    pub fn new(router: Arc<TenantPoolRouter>, encrypter: Arc<dyn PrivateKeyEncrypter>) -> Self {
        Self { router, encrypter }
    }
}

const SELECT_CONFIG: &str = r#"
    SELECT encrypted_api_key, wallet_id, encrypter_public_key, created_at, updated_at
    FROM circle_client_config
    LIMIT 1
"#;

#[async_trait]
impl CustodianConfigStore for PgCustodianConfigStore {
    async fn get(&self, tenant_id: &str) -> CoreResult<Option<CustodianClientConfig>> {
        let pool = self.router.pool_for_tenant(tenant_id).await?;
        let config = sqlx::query_as::<_, CustodianClientConfig>(SELECT_CONFIG)
            .fetch_optional(pool.pool())
            .await?;
        Ok(config)
    }

    async fn upsert(&self, tenant_id: &str, update: CustodianConfigUpdate) -> CoreResult<()> {
        let pool = self.router.pool_for_tenant(tenant_id).await?;

        run_in_transaction(pool.pool(), move |tx| {
            Box::pin(async move {
                let existing = sqlx::query_as::<_, CustodianClientConfig>(SELECT_CONFIG)
                    .fetch_optional(&mut **tx)
                    .await?;

                if existing.is_none() {
                    update.validate_for_insert()?;
                    sqlx::query(
                        r#"
                        INSERT INTO circle_client_config (encrypted_api_key, wallet_id, encrypter_public_key)
                        VALUES ($1, $2, $3)
                        "#,
                    )
                    .bind(&update.encrypted_api_key)
                    .bind(&update.wallet_id)
                    .bind(&update.encrypter_public_key)
                    .execute(&mut **tx)
                    .await?;
                } else {
                    update.validate()?;
                    sqlx::query(
                        r#"
                        UPDATE circle_client_config
                        SET wallet_id = COALESCE($1, wallet_id),
                            encrypted_api_key = COALESCE($2, encrypted_api_key),
                            encrypter_public_key = COALESCE($3, encrypter_public_key),
                            updated_at = NOW()
                        "#,
                    )
                    .bind(&update.wallet_id)
                    .bind(&update.encrypted_api_key)
                    .bind(&update.encrypter_public_key)
                    .execute(&mut **tx)
                    .await?;
                }
                Ok(())
            })
        })
        .await
        .map_err(|e| e.context("upserting custodian client config"))
    }

    async fn get_decrypted_api_key(
        &self,
        tenant_id: &str,
        passphrase: &str,
    ) -> CoreResult<Zeroizing<String>> {
        let encrypted = self
            .get(tenant_id)
            .await?
            .and_then(|c| c.encrypted_api_key)
            .ok_or(CoreError::RecordNotFound)
            .map_err(|e| e.context("getting custodian client config"))?;

        self.encrypter
            .decrypt(&encrypted, passphrase)
            .map_err(|e| e.context("decrypting custodian api key"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_validation() {
        assert!(CustodianConfigUpdate::default().validate().is_err());

        let only_wallet = CustodianConfigUpdate {
            wallet_id: Some("1000066041".into()),
            ..Default::default()
        };
        assert!(only_wallet.validate().is_ok());
        assert!(only_wallet.validate_for_insert().is_err());

        let key_without_encrypter = CustodianConfigUpdate {
            encrypted_api_key: Some("enc".into()),
            ..Default::default()
        };
        let err = key_without_encrypter.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "encrypter_public_key must be provided if encrypted_api_key is provided"
        );

        let full = CustodianConfigUpdate {
            encrypted_api_key: Some("enc".into()),
            wallet_id: Some("1000066041".into()),
            encrypter_public_key: Some("GABC".into()),
        };
        assert!(full.validate_for_insert().is_ok());
    }
}
