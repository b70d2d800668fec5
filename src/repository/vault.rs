// 加密密钥金库 Repository
//
// 公钥 → 加密私钥 的持久映射，只做存储，没有业务逻辑

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::{
    error::{CoreError, CoreResult},
    infrastructure::db::{run_in_transaction, PgPool},
};

#[derive(Clone, PartialEq, Eq, FromRow)]
pub struct VaultEntry {
    pub public_key: String,
    pub encrypted_private_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for VaultEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultEntry")
            .field("public_key", &self.public_key)
            .field("encrypted_private_key", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// 待插入的金库条目
#[derive(Clone)]
pub struct VaultEntryInsert {
    pub public_key: String,
    pub encrypted_private_key: String,
}

impl fmt::Debug for VaultEntryInsert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultEntryInsert")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// 插入前校验全部条目，任何一条不合法则不写入任何数据
pub fn validate_entries(entries: &[VaultEntryInsert]) -> CoreResult<()> {
    for entry in entries {
        if entry.public_key.is_empty() {
            return Err(CoreError::validation("public key cannot be empty"));
        }
        if entry.encrypted_private_key.is_empty() {
            return Err(CoreError::validation("private key cannot be empty"));
        }
    }
    Ok(())
}

#[async_trait]
pub trait VaultStore: Send + Sync {
    /// 原子批量插入；空输入为成功的空操作
    async fn batch_insert(&self, entries: Vec<VaultEntryInsert>) -> CoreResult<()>;

    /// 不存在时返回 `CoreError::VaultEntryNotFound`
    async fn get(&self, public_key: &str) -> CoreResult<VaultEntry>;

    /// 批量查询，返回顺序不保证
    async fn get_all(&self, public_keys: &[String]) -> CoreResult<Vec<VaultEntry>>;

    /// 不存在时返回 `CoreError::VaultEntryNotFound`
    async fn delete(&self, public_key: &str) -> CoreResult<()>;
}

pub struct PgVaultStore {
    pool: PgPool,
}

impl PgVaultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VaultStore for PgVaultStore {
    async fn batch_insert(&self, entries: Vec<VaultEntryInsert>) -> CoreResult<()> {
        validate_entries(&entries)?;
        if entries.is_empty() {
            return Ok(());
        }

        run_in_transaction(&self.pool, move |tx| {
            Box::pin(async move {
                for entry in &entries {
                    sqlx::query(
                        r#"
                        INSERT INTO vault (public_key, encrypted_private_key)
                        VALUES ($1, $2)
                        "#,
                    )
                    .bind(&entry.public_key)
                    .bind(&entry.encrypted_private_key)
                    .execute(&mut **tx)
                    .await?;
                }
                Ok(())
            })
        })
        .await
        .map_err(|e| e.context("inserting vault entries"))
    }

    async fn get(&self, public_key: &str) -> CoreResult<VaultEntry> {
        sqlx::query_as::<_, VaultEntry>(
            r#"
            SELECT public_key, encrypted_private_key, created_at, updated_at
            FROM vault
            WHERE public_key = $1
            "#,
        )
        .bind(public_key)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CoreError::VaultEntryNotFound(public_key.to_string()))
    }

    async fn get_all(&self, public_keys: &[String]) -> CoreResult<Vec<VaultEntry>> {
        if public_keys.is_empty() {
            return Ok(Vec::new());
        }
        let entries = sqlx::query_as::<_, VaultEntry>(
            r#"
            SELECT public_key, encrypted_private_key, created_at, updated_at
            FROM vault
            WHERE public_key = ANY($1)
            "#,
        )
        .bind(public_keys)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn delete(&self, public_key: &str) -> CoreResult<()> {
        let result = sqlx::query("DELETE FROM vault WHERE public_key = $1")
            .bind(public_key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::VaultEntryNotFound(public_key.to_string()));
        }
        Ok(())
    }
}
