//! 锚点平台对账服务
//!
//! 把终态支付（SUCCESS/FAILED）的结果同步到锚点平台，并标记接收钱包已同步。
//! 单笔失败只记录日志，不影响同批次的其他支付，下一轮自动重试。
//!
//! 服务本身不做互斥：调用方保证同一时间只有一次运行（见 main 中的单任务调度循环）。

use std::{collections::HashSet, sync::Arc};

use tracing::{debug, error, info, warn};

use super::anchor_platform::{
    stellar_asset_in_aif, AnchorAmount, AnchorPlatformApi, AnchorStellarTransaction,
    AnchorTransactionStatus, PatchPostError, PatchPostSuccess, SEP24,
};
use crate::{
    domain::tenant::RequestContext,
    error::{CoreError, CoreResult},
    repository::{
        payments::{PaymentForPatch, PaymentStatus, ReconciliationCandidate, ReconciliationStore},
        tenants::TenantStore,
    },
};

/// 错误消息最大长度
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 255;

/// 单次运行最多处理的支付数
pub const DEFAULT_BATCH_SIZE: i64 = 100;

#[derive(Debug, Clone)]
pub struct ReconciliationOptions {
    pub batch_size: i64,
    pub max_error_message_length: usize,
}

impl Default for ReconciliationOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_error_message_length: MAX_ERROR_MESSAGE_LENGTH,
        }
    }
}

/// 单次运行结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub candidates: usize,
    pub patched: usize,
    /// 锚点平台已是 completed，或本轮已对同一交易上报过成功
    pub skipped_already_completed: usize,
    pub failed: usize,
    pub marked_synced: u64,
}

impl ReconciliationReport {
    fn merge(&mut self, other: &ReconciliationReport) {
        self.candidates += other.candidates;
        self.patched += other.patched;
        self.skipped_already_completed += other.skipped_already_completed;
        self.failed += other.failed;
        self.marked_synced += other.marked_synced;
    }
}

/// 超过上限的消息截断为 `max - 1` 个字符
pub fn truncate_error_message(message: &str, max: usize) -> String {
    if message.chars().count() > max {
        message.chars().take(max.saturating_sub(1)).collect()
    } else {
        message.to_string()
    }
}

/// 单笔支付的处理结果
enum Outcome {
    Patched,
    AlreadyCompleted,
}

/// 支付进入终态时发出的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCompletedEvent {
    pub payment_id: String,
    pub payment_status: PaymentStatus,
    pub payment_status_message: String,
}

/// 事件驱动对账的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEventOutcome {
    Patched,
    /// 锚点平台上已是 completed，仅标记同步
    AlreadyCompleted,
    /// 接收钱包此前已同步，未做任何操作
    AlreadySynced,
    /// 登记方式包含钱包地址，锚点平台上没有对应交易
    KnownWalletAddress,
}

pub struct ReconciliationService {
    store: Arc<dyn ReconciliationStore>,
    anchor_platform: Arc<dyn AnchorPlatformApi>,
    opts: ReconciliationOptions,
}

impl ReconciliationService {
    pub fn new(
        store: Arc<dyn ReconciliationStore>,
        anchor_platform: Arc<dyn AnchorPlatformApi>,
        opts: ReconciliationOptions,
    ) -> CoreResult<Self> {
        if opts.batch_size < 1 {
            return Err(CoreError::validation("batch size must be greater than zero"));
        }
        if opts.max_error_message_length < 1 {
            return Err(CoreError::validation(
                "max error message length must be greater than zero",
            ));
        }
        Ok(Self {
            store,
            anchor_platform,
            opts,
        })
    }

    /// 对上下文中的租户执行一次对账
    pub async fn patch_transactions_completion(
        &self,
        ctx: &RequestContext,
    ) -> CoreResult<ReconciliationReport> {
        let tenant_id = ctx.require_tenant()?.id.clone();

        let payments = self
            .store
            .ready_to_patch(&tenant_id, self.opts.batch_size)
            .await
            .map_err(|e| e.context("getting payments ready to patch completion"))?;

        debug!(tenant_id = %tenant_id, count = payments.len(), "got payments to process");

        let mut report = ReconciliationReport {
            candidates: payments.len(),
            ..Default::default()
        };

        // 本轮已上报 completed 的锚点交易，避免同一交易先报成功再被错误覆盖
        let mut completed: HashSet<String> = HashSet::with_capacity(payments.len());
        let mut receiver_wallet_ids: Vec<String> = Vec::new();
        let mut failed_wallet_ids: Vec<String> = Vec::new();

        for payment in &payments {
            if completed.contains(&payment.anchor_platform_transaction_id) {
                debug!(
                    tenant_id = %tenant_id,
                    anchor_transaction_id = %payment.anchor_platform_transaction_id,
                    "anchor platform transaction already patched as completed"
                );
                report.skipped_already_completed += 1;
                continue;
            }

            let failed_message = payment.failed_status_message.as_deref().unwrap_or_default();
            match self.reconcile_payment(payment, failed_message).await {
                Ok(outcome) => {
                    match outcome {
                        Outcome::Patched => report.patched += 1,
                        Outcome::AlreadyCompleted => report.skipped_already_completed += 1,
                    }
                    if payment.status == PaymentStatus::Success
                        || matches!(outcome, Outcome::AlreadyCompleted)
                    {
                        completed.insert(payment.anchor_platform_transaction_id.clone());
                    }
                    receiver_wallet_ids.push(payment.receiver_wallet_id.clone());
                }
                Err(e) => {
                    error!(
                        tenant_id = %tenant_id,
                        payment_id = %payment.payment_id,
                        error = %e,
                        "patching anchor platform transaction"
                    );
                    report.failed += 1;
                    failed_wallet_ids.push(payment.receiver_wallet_id.clone());
                }
            }
        }

        // 失败项排到队尾，避免反复失败的支付占满每一轮的批次
        if !failed_wallet_ids.is_empty() {
            if let Err(e) = self
                .store
                .mark_attempted(&tenant_id, &failed_wallet_ids)
                .await
            {
                warn!(tenant_id = %tenant_id, error = %e, "recording failed reconciliation attempts");
            }
        }

        if !receiver_wallet_ids.is_empty() {
            report.marked_synced = self
                .store
                .mark_synced(&tenant_id, &receiver_wallet_ids)
                .await
                .map_err(|e| {
                    e.context("updating receiver wallet anchor platform transaction synced at")
                })?;
        }

        info!(
            tenant_id = %tenant_id,
            candidates = report.candidates,
            patched = report.patched,
            skipped = report.skipped_already_completed,
            failed = report.failed,
            marked_synced = report.marked_synced,
            "✅ anchor platform reconciliation finished"
        );
        Ok(report)
    }

    /// 依次对所有租户执行对账，单个租户失败不影响其他租户
    pub async fn patch_all_tenants(&self, tenants: &dyn TenantStore) -> CoreResult<ReconciliationReport> {
        let mut total = ReconciliationReport::default();
        for tenant in tenants.get_all().await? {
            let tenant_name = tenant.name.clone();
            match self
                .patch_transactions_completion(&RequestContext::with_tenant(tenant))
                .await
            {
                Ok(report) => total.merge(&report),
                Err(e) => warn!(tenant = %tenant_name, error = %e, "reconciliation failed for tenant"),
            }
        }
        Ok(total)
    }

    /// 事件驱动：同步单笔支付
    ///
    /// 已同步或登记方式包含钱包地址时直接返回；事件状态与库中状态不一致时报错
    pub async fn patch_transaction_for_payment_event(
        &self,
        ctx: &RequestContext,
        event: &PaymentCompletedEvent,
    ) -> CoreResult<PaymentEventOutcome> {
        let tenant_id = ctx.require_tenant()?.id.clone();

        let PaymentForPatch {
            candidate: payment,
            synced_at,
        } = self
            .store
            .get_payment(&tenant_id, &event.payment_id)
            .await
            .map_err(|e| e.context(format!("getting payment ID {}", event.payment_id)))?;

        if payment.known_wallet_address {
            debug!(
                payment_id = %payment.payment_id,
                "skipping known-wallet payment, not registered with anchor platform"
            );
            return Ok(PaymentEventOutcome::KnownWalletAddress);
        }

        if synced_at.is_some() {
            info!(
                anchor_transaction_id = %payment.anchor_platform_transaction_id,
                "anchor platform transaction already patched"
            );
            return Ok(PaymentEventOutcome::AlreadySynced);
        }

        if event.payment_status != payment.status {
            return Err(CoreError::validation(format!(
                "payment status {} from payment ID {} does not match the status {} from the event",
                payment.status, payment.payment_id, event.payment_status
            )));
        }
        if payment.anchor_platform_transaction_id.is_empty() {
            return Err(CoreError::validation(format!(
                "receiver wallet {} of payment ID {} has no anchor platform transaction",
                payment.receiver_wallet_id, payment.payment_id
            )));
        }

        let outcome = self
            .reconcile_payment(&payment, &event.payment_status_message)
            .await
            .map_err(|e| e.context("patching anchor platform transaction"))?;

        self.store
            .mark_synced(&tenant_id, &[payment.receiver_wallet_id.clone()])
            .await
            .map_err(|e| {
                e.context("updating receiver wallet anchor platform transaction synced at")
            })?;

        Ok(match outcome {
            Outcome::Patched => PaymentEventOutcome::Patched,
            Outcome::AlreadyCompleted => PaymentEventOutcome::AlreadyCompleted,
        })
    }

    async fn reconcile_payment(
        &self,
        payment: &ReconciliationCandidate,
        failed_message: &str,
    ) -> CoreResult<Outcome> {
        let anchor_id = &payment.anchor_platform_transaction_id;

        let status = self
            .anchor_platform
            .get_transaction_status(anchor_id)
            .await
            .map_err(|e| e.context(format!("getting anchor transaction {}", anchor_id)))?;
        if status == AnchorTransactionStatus::Completed {
            debug!(anchor_transaction_id = %anchor_id, "anchor transaction already completed");
            return Ok(Outcome::AlreadyCompleted);
        }

        match payment.status {
            PaymentStatus::Success => {
                let stellar_transaction_id = payment
                    .stellar_transaction_id
                    .as_deref()
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        CoreError::validation(format!(
                            "successful payment ID {} has no stellar transaction ID",
                            payment.payment_id
                        ))
                    })?;
                let patch = PatchPostSuccess {
                    id: anchor_id.clone(),
                    sep: SEP24.to_string(),
                    status: AnchorTransactionStatus::Completed,
                    stellar_transactions: vec![AnchorStellarTransaction {
                        id: stellar_transaction_id.to_string(),
                        memo: payment.stellar_memo.clone(),
                        memo_type: payment.stellar_memo_type.clone(),
                    }],
                    completed_at: payment.updated_at,
                    amount_out: AnchorAmount {
                        amount: payment.amount,
                        asset: stellar_asset_in_aif(
                            &payment.asset_code,
                            payment.asset_issuer.as_deref(),
                        ),
                    },
                };
                self.anchor_platform
                    .patch_transaction_post_success(&patch)
                    .await
                    .map_err(|e| {
                        e.context(format!(
                            "patching anchor transaction ID {:?} with status completed",
                            anchor_id
                        ))
                    })?;
            }
            PaymentStatus::Failed => {
                let message =
                    truncate_error_message(failed_message, self.opts.max_error_message_length);
                let patch = PatchPostError {
                    id: anchor_id.clone(),
                    sep: SEP24.to_string(),
                    message,
                    status: AnchorTransactionStatus::Error,
                };
                self.anchor_platform
                    .patch_transaction_post_error(&patch)
                    .await
                    .map_err(|e| {
                        e.context(format!(
                            "patching anchor transaction ID {:?} with status error",
                            anchor_id
                        ))
                    })?;
            }
            other => {
                return Err(CoreError::validation(format!(
                    "invalid payment status to patch to anchor platform (paymentID={}, status={})",
                    payment.payment_id, other
                )));
            }
        }
        Ok(Outcome::Patched)
    }
}
