//! SQLx Postgres 连接池初始化、健康检查与原子操作
//!
//! 用法：
//! let pool = init_pool(&config.database.url, &PoolConfig::from(&config.database)).await?;
//! health_check(&pool).await?;

use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::{Postgres, Transaction};
use tracing::{debug, error};

use crate::{
    config::DatabaseConfig,
    error::{CoreError, CoreResult, TransactionError},
};

pub type PgPool = sqlx::Pool<Postgres>;
pub type PgTransaction = Transaction<'static, Postgres>;

/// 连接池参数
///
/// 空闲/过期连接由连接池自行回收，应用代码不做任何清理
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(10),
            max_lifetime: Duration::from_secs(300),
        }
    }
}

impl From<&DatabaseConfig> for PoolConfig {
    fn from(cfg: &DatabaseConfig) -> Self {
        Self {
            max_connections: cfg.max_connections,
            min_connections: cfg.min_connections.min(cfg.max_connections),
            acquire_timeout: Duration::from_secs(cfg.acquire_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.idle_timeout_secs),
            max_lifetime: Duration::from_secs(cfg.max_lifetime_secs),
        }
    }
}

impl PoolConfig {
    pub fn options(&self) -> sqlx::postgres::PgPoolOptions {
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
            .test_before_acquire(true)
    }
}

/// 初始化连接池并验证连接
pub async fn init_pool(database_url: &str, config: &PoolConfig) -> Result<PgPool, sqlx::Error> {
    let pool = config.options().connect(database_url).await.map_err(|e| {
        error!("Failed to connect to database: {}", e);
        e
    })?;

    health_check(&pool).await?;

    Ok(pool)
}

/// 健康检查
pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(pool).await?;
    Ok(())
}

/// 在单个数据库事务中执行闭包
///
/// - 闭包返回错误：回滚，并包装为 `TransactionError::Execution`
/// - begin/commit 失败：包装为 `TransactionError::Handling`
pub async fn run_in_transaction<T, F>(pool: &PgPool, f: F) -> CoreResult<T>
where
    T: Send,
    F: for<'c> FnOnce(&'c mut PgTransaction) -> BoxFuture<'c, CoreResult<T>> + Send,
{
    let mut tx = pool
        .begin()
        .await
        .map_err(|source| TransactionError::Handling {
            stage: "begin",
            source,
        })?;

    match f(&mut tx).await {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|source| TransactionError::Handling {
                    stage: "commit",
                    source,
                })?;
            Ok(value)
        }
        Err(err) => {
            if err.is_retryable() {
                error!(error = %err, "rolling back database transaction");
            } else {
                debug!(error = %err, "rolling back database transaction");
            }
            if let Err(rollback_err) = tx.rollback().await {
                error!(error = %rollback_err, "failed to roll back database transaction");
            }
            Err(TransactionError::Execution(Box::new(err)).into())
        }
    }
}

/// 数据库连接池能力（单库与租户路由共用）
#[async_trait]
pub trait DbConnectionPool: Send + Sync {
    fn pool(&self) -> &PgPool;

    /// 连接串（只用于诊断和派生租户连接串）
    fn dsn(&self) -> &str;

    async fn begin(&self) -> CoreResult<PgTransaction> {
        self.pool()
            .begin()
            .await
            .map_err(|source| CoreError::from(TransactionError::Handling {
                stage: "begin",
                source,
            }))
    }

    async fn ping(&self) -> CoreResult<()> {
        health_check(self.pool()).await.map_err(CoreError::from)
    }

    async fn close(&self) {
        self.pool().close().await;
    }
}

/// 管理库连接池（租户表、金库表所在 schema）
#[derive(Clone)]
pub struct AdminPool {
    pool: PgPool,
    dsn: String,
}

impl AdminPool {
    pub fn new(pool: PgPool, dsn: impl Into<String>) -> Self {
        Self {
            pool,
            dsn: dsn.into(),
        }
    }

    pub async fn connect(dsn: &str, config: &PoolConfig) -> Result<Self, sqlx::Error> {
        let pool = init_pool(dsn, config).await?;
        Ok(Self::new(pool, dsn))
    }
}

impl DbConnectionPool for AdminPool {
    fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn dsn(&self) -> &str {
        &self.dsn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_defaults() {
        let cfg = PoolConfig::default();
        assert_eq!(cfg.max_connections, 20);
        assert_eq!(cfg.min_connections, 2);
        assert_eq!(cfg.idle_timeout, Duration::from_secs(10));
        assert_eq!(cfg.max_lifetime, Duration::from_secs(300));
    }

    #[test]
    fn test_pool_config_clamps_min_connections() {
        let db = DatabaseConfig {
            url: "postgres://localhost/sdp".into(),
            max_connections: 4,
            min_connections: 10,
            acquire_timeout_secs: 3,
            idle_timeout_secs: 30,
            max_lifetime_secs: 600,
        };
        let cfg = PoolConfig::from(&db);
        assert_eq!(cfg.min_connections, 4);
        assert_eq!(cfg.acquire_timeout, Duration::from_secs(3));
    }
}
