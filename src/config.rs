//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::{
    account::AccountType,
    stellar::{is_valid_ed25519_secret_seed, TEST_NETWORK_PASSPHRASE},
};

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub signing: SigningConfig,
    pub anchor_platform: AnchorPlatformConfig,
    #[serde(default)]
    pub custodian: CustodianConfig,
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

/// 签名配置
///
/// 种子与加密口令都是 Ed25519 私钥种子（`S...`）
#[derive(Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    pub network_passphrase: String,
    pub host_seed: String,
    #[serde(default)]
    pub distribution_seed: Option<String>,
    #[serde(default)]
    pub distribution_account_encryption_passphrase: Option<String>,
    pub distribution_account_type: AccountType,
}

impl std::fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningConfig")
            .field("network_passphrase", &self.network_passphrase)
            .field("distribution_account_type", &self.distribution_account_type)
            .finish_non_exhaustive()
    }
}

/// 锚点平台配置
#[derive(Clone, Serialize, Deserialize)]
pub struct AnchorPlatformConfig {
    pub base_url: String,
    pub outgoing_jwt_secret: String,
    pub jwt_expiration_ms: i64,
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for AnchorPlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorPlatformConfig")
            .field("base_url", &self.base_url)
            .field("jwt_expiration_ms", &self.jwt_expiration_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish_non_exhaustive()
    }
}

/// 第三方托管方（Circle）配置
#[derive(Clone, Serialize, Deserialize)]
pub struct CustodianConfig {
    /// 解密租户 API key 的口令，为空时使用分发账户加密口令
    #[serde(default)]
    pub encryption_passphrase: Option<String>,
}

impl std::fmt::Debug for CustodianConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodianConfig")
            .field(
                "encryption_passphrase",
                &self.encryption_passphrase.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// 对账配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    pub interval_secs: u64,
    pub batch_size: i64,
    pub max_error_message_length: usize,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("DATABASE_URL").unwrap_or_else(|_| {
                "postgres://postgres@localhost:5432/sdp?sslmode=disable".into()
            }),
            max_connections: env_or("DB_MAX_OPEN_CONNS", 20),
            min_connections: env_or("DB_MIN_IDLE_CONNS", 2),
            acquire_timeout_secs: env_or("DB_ACQ_TIMEOUT_SECS", 5),
            idle_timeout_secs: env_or("DB_CONN_MAX_IDLE_TIME_SECS", 10),
            max_lifetime_secs: env_or("DB_CONN_MAX_LIFETIME_SECS", 300),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        }
    }
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            network_passphrase: std::env::var("NETWORK_PASSPHRASE")
                .unwrap_or_else(|_| TEST_NETWORK_PASSPHRASE.into()),
            host_seed: std::env::var("HOST_SEED").unwrap_or_default(),
            distribution_seed: std::env::var("DISTRIBUTION_SEED").ok(),
            distribution_account_encryption_passphrase: std::env::var(
                "DISTRIBUTION_ACCOUNT_ENCRYPTION_PASSPHRASE",
            )
            .ok(),
            distribution_account_type: std::env::var("DISTRIBUTION_ACCOUNT_TYPE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(AccountType::DistributionAccountStellarDbVault),
        }
    }
}

impl Default for AnchorPlatformConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("ANCHOR_PLATFORM_BASE_PLATFORM_URL")
                .unwrap_or_else(|_| "http://localhost:8085".into()),
            outgoing_jwt_secret: std::env::var("ANCHOR_PLATFORM_OUTGOING_JWT_SECRET")
                .unwrap_or_default(),
            jwt_expiration_ms: env_or("ANCHOR_PLATFORM_JWT_EXPIRATION_MS", 10_000),
            request_timeout_secs: env_or("ANCHOR_PLATFORM_TIMEOUT_SECS", 30),
        }
    }
}

impl Default for CustodianConfig {
    fn default() -> Self {
        Self {
            encryption_passphrase: std::env::var("CIRCLE_ENCRYPTION_PASSPHRASE").ok(),
        }
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            interval_secs: env_or("RECONCILIATION_INTERVAL_SECS", 600),
            batch_size: env_or("RECONCILIATION_BATCH_SIZE", 100),
            max_error_message_length: env_or("RECONCILIATION_MAX_ERROR_MESSAGE_LENGTH", 255),
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            signing: SigningConfig::default(),
            anchor_platform: AnchorPlatformConfig::default(),
            custodian: CustodianConfig::default(),
            reconciliation: ReconciliationConfig::default(),
        })
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                config = Self::from_file(path)?;
            }
        }

        Ok(config)
    }

    /// 分发账户加密口令；未单独配置时沿用 host 种子
    pub fn distribution_account_encryption_passphrase(&self) -> &str {
        self.signing
            .distribution_account_encryption_passphrase
            .as_deref()
            .unwrap_or(self.signing.host_seed.as_str())
    }

    /// 托管方 API key 的解密口令
    pub fn custodian_encryption_passphrase(&self) -> &str {
        self.custodian
            .encryption_passphrase
            .as_deref()
            .unwrap_or_else(|| self.distribution_account_encryption_passphrase())
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        // 验证数据库URL格式
        if !self.database.url.starts_with("postgres://")
            && !self.database.url.starts_with("postgresql://")
        {
            anyhow::bail!("DATABASE_URL must start with postgres:// or postgresql://");
        }

        // 验证日志级别
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        // 验证日志格式
        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        if self.signing.network_passphrase.is_empty() {
            anyhow::bail!("NETWORK_PASSPHRASE cannot be empty");
        }
        if !is_valid_ed25519_secret_seed(&self.signing.host_seed) {
            anyhow::bail!("HOST_SEED must be a valid Ed25519 secret seed");
        }
        if let Some(seed) = &self.signing.distribution_seed {
            if !is_valid_ed25519_secret_seed(seed) {
                anyhow::bail!("DISTRIBUTION_SEED must be a valid Ed25519 secret seed");
            }
        }
        if !is_valid_ed25519_secret_seed(self.distribution_account_encryption_passphrase()) {
            anyhow::bail!(
                "DISTRIBUTION_ACCOUNT_ENCRYPTION_PASSPHRASE must be a valid Ed25519 secret seed"
            );
        }
        if self.signing.distribution_account_type == AccountType::HostStellarEnv {
            anyhow::bail!("DISTRIBUTION_ACCOUNT_TYPE cannot be {}", AccountType::HostStellarEnv);
        }
        if self.signing.distribution_account_type == AccountType::DistributionAccountStellarEnv
            && self.signing.distribution_seed.is_none()
        {
            anyhow::bail!(
                "DISTRIBUTION_SEED is required for {}",
                AccountType::DistributionAccountStellarEnv
            );
        }

        if self.anchor_platform.outgoing_jwt_secret.len() < 12 {
            anyhow::bail!("ANCHOR_PLATFORM_OUTGOING_JWT_SECRET must be at least 12 characters");
        }

        if self.reconciliation.interval_secs == 0 {
            anyhow::bail!("RECONCILIATION_INTERVAL_SECS must be greater than zero");
        }
        if self.reconciliation.batch_size < 1 {
            anyhow::bail!("RECONCILIATION_BATCH_SIZE must be greater than zero");
        }
        if self.reconciliation.max_error_message_length < 1 {
            anyhow::bail!("RECONCILIATION_MAX_ERROR_MESSAGE_LENGTH must be greater than zero");
        }

        Ok(())
    }
}
