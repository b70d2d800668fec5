// 提交交易 Repository
//
// 所有状态写入前先经过 TransactionStatus::can_transition_to 校验，
// 非法转换原样返回状态机错误，不写入任何数据

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, Row};

use crate::{
    domain::transaction_status::TransactionStatus,
    error::{CoreError, CoreResult},
    infrastructure::db::{run_in_transaction, PgPool, PgTransaction},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: TransactionStatus,
    pub status_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTransaction {
    pub id: String,
    pub external_id: String,
    pub tenant_id: String,
    pub status: TransactionStatus,
    pub status_message: Option<String>,
    pub status_history: Vec<StatusHistoryEntry>,
    pub stellar_transaction_hash: Option<String>,
    pub attempts_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewSubmittedTransaction {
    pub external_id: String,
    pub tenant_id: String,
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// 新交易总是以 Pending 状态创建
    async fn insert(&self, input: NewSubmittedTransaction) -> CoreResult<SubmittedTransaction>;

    async fn get(&self, id: &str) -> CoreResult<SubmittedTransaction>;

    /// Pending → Processing，累加尝试次数
    async fn mark_processing(&self, id: &str) -> CoreResult<SubmittedTransaction>;

    /// Processing → Success
    async fn update_status_to_success(
        &self,
        id: &str,
        stellar_transaction_hash: &str,
    ) -> CoreResult<SubmittedTransaction>;

    /// Processing → Error
    async fn update_status_to_error(
        &self,
        id: &str,
        status_message: &str,
    ) -> CoreResult<SubmittedTransaction>;
}

pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const TX_COLUMNS: &str = r#"
    id, external_id, tenant_id, status, status_message, status_history,
    stellar_transaction_hash, attempts_count, created_at, updated_at, completed_at
"#;

fn tx_from_row(row: &PgRow) -> CoreResult<SubmittedTransaction> {
    let status: String = row.try_get("status")?;
    let history: serde_json::Value = row.try_get("status_history")?;
    Ok(SubmittedTransaction {
        id: row.try_get("id")?,
        external_id: row.try_get("external_id")?,
        tenant_id: row.try_get("tenant_id")?,
        status: status.parse().map_err(CoreError::validation)?,
        status_message: row.try_get("status_message")?,
        status_history: serde_json::from_value(history)
            .map_err(|e| CoreError::validation(format!("invalid status history: {}", e)))?,
        stellar_transaction_hash: row.try_get("stellar_transaction_hash")?,
        attempts_count: row.try_get("attempts_count")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

/// 状态变更的附带写入
struct Transition<'a> {
    to: TransactionStatus,
    status_message: Option<&'a str>,
    stellar_transaction_hash: Option<&'a str>,
}

async fn get_for_update(tx: &mut PgTransaction, id: &str) -> CoreResult<SubmittedTransaction> {
    let sql = format!("SELECT {} FROM submitter_transactions WHERE id = $1 FOR UPDATE", TX_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(CoreError::RecordNotFound)?;
    tx_from_row(&row)
}

async fn apply_transition(
    tx: &mut PgTransaction,
    id: &str,
    change: Transition<'_>,
) -> CoreResult<SubmittedTransaction> {
    let current = get_for_update(tx, id).await?;
    current.status.can_transition_to(change.to)?;

    let entry = StatusHistoryEntry {
        status: change.to,
        status_message: change.status_message.map(str::to_string),
        timestamp: Utc::now(),
    };
    let entry = serde_json::to_value(&entry)
        .map_err(|e| CoreError::validation(format!("encoding status history: {}", e)))?;

    let sql = format!(
        r#"
        UPDATE submitter_transactions
        SET status = $2,
            status_message = $3,
            status_history = status_history || jsonb_build_array($4::jsonb),
            stellar_transaction_hash = COALESCE($5, stellar_transaction_hash),
            attempts_count = attempts_count + CASE WHEN $2 = 'PROCESSING' THEN 1 ELSE 0 END,
            completed_at = CASE WHEN $2 IN ('SUCCESS', 'ERROR') THEN NOW() ELSE completed_at END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        TX_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .bind(change.to.as_str())
        .bind(change.status_message)
        .bind(entry)
        .bind(change.stellar_transaction_hash)
        .fetch_one(&mut **tx)
        .await?;
    tx_from_row(&row)
}

impl PgTransactionStore {
    async fn transition(&self, id: &str, change: Transition<'_>) -> CoreResult<SubmittedTransaction> {
        let id = id.to_string();
        let to = change.to;
        let status_message = change.status_message.map(str::to_string);
        let hash = change.stellar_transaction_hash.map(str::to_string);

        run_in_transaction(&self.pool, move |tx| {
            Box::pin(async move {
                apply_transition(
                    tx,
                    &id,
                    Transition {
                        to,
                        status_message: status_message.as_deref(),
                        stellar_transaction_hash: hash.as_deref(),
                    },
                )
                .await
            })
        })
        .await
        .map_err(CoreError::into_execution_inner)
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn insert(&self, input: NewSubmittedTransaction) -> CoreResult<SubmittedTransaction> {
        let entry = serde_json::to_value(vec![StatusHistoryEntry {
            status: TransactionStatus::Pending,
            status_message: None,
            timestamp: Utc::now(),
        }])
        .map_err(|e| CoreError::validation(format!("encoding status history: {}", e)))?;

        let sql = format!(
            r#"
            INSERT INTO submitter_transactions (external_id, tenant_id, status, status_history)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            TX_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&input.external_id)
            .bind(&input.tenant_id)
            .bind(TransactionStatus::Pending.as_str())
            .bind(entry)
            .fetch_one(&self.pool)
            .await?;
        tx_from_row(&row)
    }

    async fn get(&self, id: &str) -> CoreResult<SubmittedTransaction> {
        let sql = format!("SELECT {} FROM submitter_transactions WHERE id = $1", TX_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CoreError::RecordNotFound)?;
        tx_from_row(&row)
    }

    async fn mark_processing(&self, id: &str) -> CoreResult<SubmittedTransaction> {
        self.transition(
            id,
            Transition {
                to: TransactionStatus::Processing,
                status_message: None,
                stellar_transaction_hash: None,
            },
        )
        .await
    }

    async fn update_status_to_success(
        &self,
        id: &str,
        stellar_transaction_hash: &str,
    ) -> CoreResult<SubmittedTransaction> {
        self.transition(
            id,
            Transition {
                to: TransactionStatus::Success,
                status_message: None,
                stellar_transaction_hash: Some(stellar_transaction_hash),
            },
        )
        .await
    }

    async fn update_status_to_error(
        &self,
        id: &str,
        status_message: &str,
    ) -> CoreResult<SubmittedTransaction> {
        self.transition(
            id,
            Transition {
                to: TransactionStatus::Error,
                status_message: Some(status_message),
                stellar_transaction_hash: None,
            },
        )
        .await
    }
}
