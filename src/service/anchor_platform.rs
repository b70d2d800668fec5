//! 锚点平台（外部对手方）API 客户端
//!
//! - GET  {base_url}/transactions/{id}：查询交易状态
//! - PATCH {base_url}/transactions：以 `{"records":[{"transaction":{..}}]}` 形式批量更新
//!
//! 每个请求携带用出站密钥签发的短期 JWT

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    error::{CoreError, CoreResult},
    infrastructure::jwt::JwtManager,
};

/// 上报给锚点平台的 SEP 协议版本
pub const SEP24: &str = "24";

/// 锚点平台交易状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorTransactionStatus {
    Incomplete,
    PendingUsrTransferStart,
    PendingAnchor,
    Completed,
    Error,
    #[serde(other)]
    Unknown,
}

/// Asset Identification Format：`stellar:CODE[:ISSUER]`
pub fn stellar_asset_in_aif(asset_code: &str, asset_issuer: Option<&str>) -> String {
    match asset_issuer.map(str::trim).filter(|i| !i.is_empty()) {
        Some(issuer) => format!("stellar:{}:{}", asset_code.trim(), issuer),
        None => format!("stellar:{}", asset_code.trim()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorAmount {
    pub amount: Decimal,
    pub asset: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnchorStellarTransaction {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo_type: Option<String>,
}

/// 支付成功后的 PATCH 内容
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchPostSuccess {
    pub id: String,
    pub sep: String,
    pub status: AnchorTransactionStatus,
    pub stellar_transactions: Vec<AnchorStellarTransaction>,
    pub completed_at: DateTime<Utc>,
    pub amount_out: AnchorAmount,
}

/// 支付失败后的 PATCH 内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchPostError {
    pub id: String,
    pub sep: String,
    pub message: String,
    pub status: AnchorTransactionStatus,
}

#[derive(Serialize)]
struct Records<T> {
    records: Vec<TransactionWrapper<T>>,
}

#[derive(Serialize)]
struct TransactionWrapper<T> {
    transaction: T,
}

fn records<T>(patch: T) -> Records<T> {
    Records {
        records: vec![TransactionWrapper { transaction: patch }],
    }
}

#[derive(Debug, Deserialize)]
struct TransactionResponse {
    status: AnchorTransactionStatus,
}

#[async_trait]
pub trait AnchorPlatformApi: Send + Sync {
    async fn get_transaction_status(&self, transaction_id: &str)
        -> CoreResult<AnchorTransactionStatus>;

    async fn patch_transaction_post_success(&self, patch: &PatchPostSuccess) -> CoreResult<()>;

    async fn patch_transaction_post_error(&self, patch: &PatchPostError) -> CoreResult<()>;
}

/// 基于 reqwest 的实现
pub struct AnchorPlatformClient {
    base_url: String,
    client: reqwest::Client,
    jwt: JwtManager,
}

impl std::fmt::Debug for AnchorPlatformClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorPlatformClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl AnchorPlatformClient {
    pub fn new(base_url: &str, jwt: JwtManager, timeout: Duration) -> CoreResult<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(CoreError::validation("anchor platform base URL cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::external(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            client,
            jwt,
        })
    }

    async fn patch<T: Serialize + Sync>(&self, transaction_id: &str, patch: T) -> CoreResult<()> {
        let url = format!("{}/transactions", self.base_url);
        let token = self.jwt.generate_default_token(transaction_id)?;

        tracing::debug!("🌐 PATCH anchor platform transaction {}", transaction_id);

        let response = self
            .client
            .patch(&url)
            .bearer_auth(token)
            .json(&records(patch))
            .send()
            .await
            .map_err(|e| {
                CoreError::external(format!("sending request to anchor platform: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::external(format!(
                "anchor platform PATCH returned {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AnchorPlatformApi for AnchorPlatformClient {
    async fn get_transaction_status(
        &self,
        transaction_id: &str,
    ) -> CoreResult<AnchorTransactionStatus> {
        let url = format!("{}/transactions/{}", self.base_url, transaction_id);
        let token = self.jwt.generate_default_token(transaction_id)?;

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                CoreError::external(format!("sending request to anchor platform: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::external(format!(
                "anchor platform GET returned {}: {}",
                status, body
            )));
        }

        let tx: TransactionResponse = response.json().await.map_err(|e| {
            CoreError::external(format!("decoding anchor platform transaction: {}", e))
        })?;
        Ok(tx.status)
    }

    async fn patch_transaction_post_success(&self, patch: &PatchPostSuccess) -> CoreResult<()> {
        self.patch(&patch.id, patch).await
    }

    async fn patch_transaction_post_error(&self, patch: &PatchPostError) -> CoreResult<()> {
        self.patch(&patch.id, patch).await
    }
}
