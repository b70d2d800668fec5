// 支付对账数据访问 Repository（租户 schema）

use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgRow, Row};

use crate::{
    error::{CoreError, CoreResult},
    infrastructure::{db::DbConnectionPool, tenant_router::TenantPoolRouter},
};

/// 支付状态（对账只关心终态）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentStatus {
    Draft,
    Ready,
    Pending,
    Paused,
    Success,
    Failed,
    Canceled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Ready => "READY",
            Self::Pending => "PENDING",
            Self::Paused => "PAUSED",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Ok(Self::Draft),
            "READY" => Ok(Self::Ready),
            "PENDING" => Ok(Self::Pending),
            "PAUSED" => Ok(Self::Paused),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            "CANCELED" => Ok(Self::Canceled),
            other => Err(format!("invalid payment status: {}", other)),
        }
    }
}

/// 待同步到外部系统的支付
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationCandidate {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub asset_code: String,
    pub asset_issuer: Option<String>,
    pub stellar_transaction_id: Option<String>,
    /// 支付最后更新时间，作为完成时间上报
    pub updated_at: DateTime<Utc>,
    pub receiver_wallet_id: String,
    pub anchor_platform_transaction_id: String,
    pub stellar_memo: Option<String>,
    pub stellar_memo_type: Option<String>,
    /// 最近一次 FAILED 状态记录的消息
    pub failed_status_message: Option<String>,
    /// 分发批次的登记方式包含钱包地址：接收方未经锚点平台登记，无需回写
    pub known_wallet_address: bool,
}

/// 事件驱动对账时按 ID 读取的单笔支付
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentForPatch {
    pub candidate: ReconciliationCandidate,
    pub synced_at: Option<DateTime<Utc>>,
}

/// 登记方式是否包含钱包地址（`*_AND_WALLET_ADDRESS`）
pub fn registration_includes_wallet_address(registration_contact_type: Option<&str>) -> bool {
    registration_contact_type.is_some_and(|t| t.ends_with("_AND_WALLET_ADDRESS"))
}

#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// 终态（SUCCESS/FAILED）且接收钱包尚未记录同步时间的支付，最多 `limit` 条
    ///
    /// 从未失败过的排在前面，其余按最近失败时间从早到晚，登记方式包含钱包地址的不返回
    async fn ready_to_patch(
        &self,
        tenant_id: &str,
        limit: i64,
    ) -> CoreResult<Vec<ReconciliationCandidate>>;

    /// 按支付 ID 读取，不存在时返回 `RecordNotFound`
    async fn get_payment(&self, tenant_id: &str, payment_id: &str) -> CoreResult<PaymentForPatch>;

    /// 标记接收钱包已同步，返回实际更新的行数
    async fn mark_synced(&self, tenant_id: &str, receiver_wallet_ids: &[String]) -> CoreResult<u64>;

    /// 记录同步失败时间，使失败项在下一轮排到队尾
    async fn mark_attempted(&self, tenant_id: &str, receiver_wallet_ids: &[String]) -> CoreResult<u64>;
}

pub struct PgReconciliationStore {
    router: Arc<TenantPoolRouter>,
}

impl PgReconciliationStore {
    pub fn new(router: Arc<TenantPoolRouter>) -> Self {
        Self { router }
    }
}

fn candidate_from_row(row: &PgRow) -> CoreResult<ReconciliationCandidate> {
    let status: String = row.try_get("status")?;
    Ok(ReconciliationCandidate {
        payment_id: row.try_get("id")?,
        status: status.parse().map_err(CoreError::validation)?,
        amount: row.try_get("amount")?,
        asset_code: row.try_get("asset_code")?,
        asset_issuer: row.try_get("asset_issuer")?,
        stellar_transaction_id: row.try_get("stellar_transaction_id")?,
        updated_at: row.try_get("updated_at")?,
        receiver_wallet_id: row.try_get("receiver_wallet_id")?,
        anchor_platform_transaction_id: row.try_get("anchor_platform_transaction_id")?,
        stellar_memo: row.try_get("stellar_memo")?,
        stellar_memo_type: row.try_get("stellar_memo_type")?,
        failed_status_message: row.try_get("failed_status_message")?,
        known_wallet_address: registration_includes_wallet_address(
            row.try_get::<Option<String>, _>("registration_contact_type")?
                .as_deref(),
        ),
    })
}

const CANDIDATE_COLUMNS: &str = r#"
    p.id,
    p.status,
    p.amount,
    p.stellar_transaction_id,
    p.updated_at,
    a.code AS asset_code,
    a.issuer AS asset_issuer,
    rw.id AS receiver_wallet_id,
    COALESCE(rw.anchor_platform_transaction_id, '') AS anchor_platform_transaction_id,
    rw.anchor_platform_transaction_synced_at,
    rw.stellar_memo,
    rw.stellar_memo_type,
    d.registration_contact_type,
    (
        SELECT h->>'status_message'
        FROM jsonb_array_elements(p.status_history) AS h
        WHERE h->>'status' = 'FAILED'
        ORDER BY (h->>'timestamp')::timestamptz DESC
        LIMIT 1
    ) AS failed_status_message
FROM payments p
JOIN receiver_wallets rw ON rw.id = p.receiver_wallet_id
JOIN assets a ON a.id = p.asset_id
LEFT JOIN disbursements d ON d.id = p.disbursement_id
"#;

#[async_trait]
impl ReconciliationStore for PgReconciliationStore {
    async fn ready_to_patch(
        &self,
        tenant_id: &str,
        limit: i64,
    ) -> CoreResult<Vec<ReconciliationCandidate>> {
        let pool = self.router.pool_for_tenant(tenant_id).await?;
        let statuses = vec![
            PaymentStatus::Success.as_str().to_string(),
            PaymentStatus::Failed.as_str().to_string(),
        ];

        let query = format!(
            r#"
            SELECT {}
            WHERE p.status = ANY($1)
              AND rw.status = 'REGISTERED'
              AND rw.anchor_platform_transaction_id IS NOT NULL
              AND rw.anchor_platform_transaction_synced_at IS NULL
              AND COALESCE(d.registration_contact_type, '')
                  NOT IN ('PHONE_NUMBER_AND_WALLET_ADDRESS', 'EMAIL_AND_WALLET_ADDRESS')
            ORDER BY rw.anchor_platform_patch_attempted_at ASC NULLS FIRST, p.created_at, p.id
            LIMIT $2
            "#,
            CANDIDATE_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(&statuses)
            .bind(limit)
            .fetch_all(pool.pool())
            .await?;

        rows.iter().map(candidate_from_row).collect()
    }

    async fn get_payment(&self, tenant_id: &str, payment_id: &str) -> CoreResult<PaymentForPatch> {
        let pool = self.router.pool_for_tenant(tenant_id).await?;
        let query = format!("SELECT {} WHERE p.id = $1", CANDIDATE_COLUMNS);

        let row = sqlx::query(&query)
            .bind(payment_id)
            .fetch_one(pool.pool())
            .await?;

        Ok(PaymentForPatch {
            candidate: candidate_from_row(&row)?,
            synced_at: row.try_get("anchor_platform_transaction_synced_at")?,
        })
    }

    async fn mark_attempted(&self, tenant_id: &str, receiver_wallet_ids: &[String]) -> CoreResult<u64> {
        if receiver_wallet_ids.is_empty() {
            return Ok(0);
        }
        let pool = self.router.pool_for_tenant(tenant_id).await?;

        let result = sqlx::query(
            r#"
            UPDATE receiver_wallets
            SET anchor_platform_patch_attempted_at = NOW()
            WHERE id = ANY($1)
              AND anchor_platform_transaction_synced_at IS NULL
            "#,
        )
        .bind(receiver_wallet_ids)
        .execute(pool.pool())
        .await?;

        Ok(result.rows_affected())
    }

    async fn mark_synced(&self, tenant_id: &str, receiver_wallet_ids: &[String]) -> CoreResult<u64> {
        if receiver_wallet_ids.is_empty() {
            return Ok(0);
        }
        let pool = self.router.pool_for_tenant(tenant_id).await?;

        let result = sqlx::query(
            r#"
            UPDATE receiver_wallets
            SET anchor_platform_transaction_synced_at = NOW()
            WHERE id = ANY($1)
              AND anchor_platform_transaction_synced_at IS NULL
            "#,
        )
        .bind(receiver_wallet_ids)
        .execute(pool.pool())
        .await?;

        Ok(result.rows_affected())
    }
}
