//! 统一错误类型
//!
//! 错误分类（调用方按 `kind()` 决定处理策略）：
//! - NotFound：记录不存在（金库条目、租户），由调用方决定是否创建
//! - Validation：参数错误，调用方 bug，永不重试
//! - Unsupported：后端不支持该操作（如外部托管账户的密钥管理），可视为 no-op
//! - Authentication：解密失败/口令错误，需要人工介入，永不自动重试
//! - Infrastructure：数据库/网络瞬时错误，可在调度层重试

use thiserror::Error;

use crate::domain::transaction_status::StateTransitionError;

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Unsupported,
    Authentication,
    Infrastructure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Unsupported => "unsupported",
            Self::Authentication => "authentication",
            Self::Infrastructure => "infrastructure",
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("vault entry not found for public key {0}")]
    VaultEntryNotFound(String),

    #[error("record not found")]
    RecordNotFound,

    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    #[error("tenant not found in context")]
    TenantNotFoundInContext,

    #[error("distribution account is empty")]
    DistributionAccountIsEmpty,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    StateTransition(#[from] StateTransitionError),

    #[error("unsupported command for signature client: {0}")]
    UnsupportedCommand(String),

    /// 不支持密钥管理的后端在 batch_insert 时仍返回自身地址
    #[error("unsupported command for signature client: batch insert called for {client}")]
    UnsupportedBatchInsert {
        client: String,
        public_keys: Vec<String>,
    },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<CoreError>,
    },
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedCommand(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn external(msg: impl Into<String>) -> Self {
        Self::ExternalService(msg.into())
    }

    /// 追加上下文，保留原始错误分类
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// 取出原子操作中闭包返回的原始错误
    pub fn into_execution_inner(self) -> Self {
        match self {
            Self::Transaction(TransactionError::Execution(inner)) => *inner,
            other => other,
        }
    }

    /// 去掉所有上下文包装后的根错误
    pub fn root(&self) -> &CoreError {
        match self {
            Self::Context { source, .. } => source.root(),
            Self::Transaction(TransactionError::Execution(inner)) => inner.root(),
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Self::RecordNotFound
            | Self::VaultEntryNotFound(_)
            | Self::TenantNotFound(_)
            | Self::TenantNotFoundInContext
            | Self::DistributionAccountIsEmpty => ErrorKind::NotFound,
            Self::Validation(_) | Self::StateTransition(_) | Self::Conflict(_) => {
                ErrorKind::Validation
            }
            Self::UnsupportedCommand(_) | Self::UnsupportedBatchInsert { .. } => {
                ErrorKind::Unsupported
            }
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::Database(_)
            | Self::Transaction(_)
            | Self::ExternalService(_)
            | Self::Context { .. } => ErrorKind::Infrastructure,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_unsupported(&self) -> bool {
        self.kind() == ErrorKind::Unsupported
    }

    /// batch_insert 不受支持时后端仍返回的地址
    pub fn unsupported_public_keys(&self) -> Option<&[String]> {
        match self.root() {
            Self::UnsupportedBatchInsert { public_keys, .. } => Some(public_keys.as_slice()),
            _ => None,
        }
    }

    /// 只有基础设施错误可以在调度层重试
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Infrastructure
    }
}

// 从 SQLx 错误转换
impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::RowNotFound) {
            return Self::RecordNotFound;
        }
        if let sqlx::Error::Database(ref db_err) = err {
            // PostgreSQL unique_violation
            if db_err.code().as_deref() == Some("23505") {
                return Self::Conflict(db_err.message().to_string());
            }
        }
        Self::Database(err)
    }
}

/// 原子操作错误
///
/// Execution：闭包内部返回的业务错误（预期内，低级别日志）
/// Handling：begin/commit 失败（基础设施问题，高级别日志）
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("executing atomic function in database transaction: {0}")]
    Execution(Box<CoreError>),

    #[error("handling database transaction ({stage}): {source}")]
    Handling {
        stage: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

pub type CoreResult<T> = Result<T, CoreError>;
