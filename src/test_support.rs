//! 单元测试用的内存实现

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    str::FromStr,
};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};
use zeroize::Zeroizing;

use crate::{
    domain::{
        account::{AccountStatus, AccountType},
        tenant::Tenant,
    },
    error::{CoreError, CoreResult},
    repository::{
        custodian_config::{CustodianClientConfig, CustodianConfigStore, CustodianConfigUpdate},
        payments::{PaymentForPatch, PaymentStatus, ReconciliationCandidate, ReconciliationStore},
        tenants::TenantStore,
        vault::{validate_entries, VaultEntry, VaultEntryInsert, VaultStore},
    },
    service::anchor_platform::{
        AnchorPlatformApi, AnchorTransactionStatus, PatchPostError, PatchPostSuccess,
    },
};

/// 本地金库、已激活、未配置地址的租户
pub fn tenant(id: &str, name: &str) -> Tenant {
    Tenant {
        id: id.to_string(),
        name: name.to_string(),
        distribution_account_address: None,
        distribution_account_type: AccountType::DistributionAccountStellarDbVault,
        distribution_account_status: AccountStatus::Active,
    }
}

#[derive(Default)]
pub struct InMemoryTenantStore {
    tenants: RwLock<HashMap<String, Tenant>>,
}

impl InMemoryTenantStore {
    pub async fn put(&self, tenant: Tenant) {
        self.tenants.write().await.insert(tenant.id.clone(), tenant);
    }

    pub async fn remove(&self, tenant_id: &str) {
        self.tenants.write().await.remove(tenant_id);
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn get_by_id(&self, tenant_id: &str) -> CoreResult<Tenant> {
        self.tenants
            .read()
            .await
            .get(tenant_id)
            .cloned()
            .ok_or_else(|| CoreError::TenantNotFound(tenant_id.to_string()))
    }

    async fn get_by_name(&self, name: &str) -> CoreResult<Tenant> {
        self.tenants
            .read()
            .await
            .values()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| CoreError::TenantNotFound(name.to_string()))
    }

    async fn get_all(&self) -> CoreResult<Vec<Tenant>> {
        let mut all: Vec<Tenant> = self.tenants.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}

#[derive(Default)]
pub struct InMemoryVaultStore {
    entries: RwLock<BTreeMap<String, VaultEntry>>,
}

impl InMemoryVaultStore {
    pub async fn all(&self) -> Vec<VaultEntry> {
        self.entries.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl VaultStore for InMemoryVaultStore {
    async fn batch_insert(&self, entries: Vec<VaultEntryInsert>) -> CoreResult<()> {
        validate_entries(&entries)?;

        let mut guard = self.entries.write().await;
        if let Some(dup) = entries.iter().find(|e| guard.contains_key(&e.public_key)) {
            return Err(CoreError::Conflict(format!(
                "duplicate public key {}",
                dup.public_key
            )));
        }
        let now = Utc::now();
        for entry in entries {
            guard.insert(
                entry.public_key.clone(),
                VaultEntry {
                    public_key: entry.public_key,
                    encrypted_private_key: entry.encrypted_private_key,
                    created_at: now,
                    updated_at: now,
                },
            );
        }
        Ok(())
    }

    async fn get(&self, public_key: &str) -> CoreResult<VaultEntry> {
        self.entries
            .read()
            .await
            .get(public_key)
            .cloned()
            .ok_or_else(|| CoreError::VaultEntryNotFound(public_key.to_string()))
    }

    async fn get_all(&self, public_keys: &[String]) -> CoreResult<Vec<VaultEntry>> {
        let guard = self.entries.read().await;
        Ok(public_keys
            .iter()
            .filter_map(|pk| guard.get(pk).cloned())
            .collect())
    }

    async fn delete(&self, public_key: &str) -> CoreResult<()> {
        self.entries
            .write()
            .await
            .remove(public_key)
            .map(|_| ())
            .ok_or_else(|| CoreError::VaultEntryNotFound(public_key.to_string()))
    }
}

#[derive(Default)]
pub struct InMemoryCustodianConfigStore {
    configs: RwLock<HashMap<String, CustodianClientConfig>>,
}

#[async_trait]
impl CustodianConfigStore for InMemoryCustodianConfigStore {
    async fn get(&self, tenant_id: &str) -> CoreResult<Option<CustodianClientConfig>> {
        Ok(self.configs.read().await.get(tenant_id).cloned())
    }

    async fn upsert(&self, tenant_id: &str, update: CustodianConfigUpdate) -> CoreResult<()> {
        let mut guard = self.configs.write().await;
        let now = Utc::now();
        match guard.get_mut(tenant_id) {
            Some(existing) => {
                update.validate()?;
                if update.wallet_id.is_some() {
                    existing.wallet_id = update.wallet_id;
                }
                if update.encrypted_api_key.is_some() {
                    existing.encrypted_api_key = update.encrypted_api_key;
                }
                if update.encrypter_public_key.is_some() {
                    existing.encrypter_public_key = update.encrypter_public_key;
                }
                existing.updated_at = now;
            }
            None => {
                update.validate_for_insert()?;
                guard.insert(
                    tenant_id.to_string(),
                    CustodianClientConfig {
                        encrypted_api_key: update.encrypted_api_key,
                        wallet_id: update.wallet_id,
                        encrypter_public_key: update.encrypter_public_key,
                        created_at: now,
                        updated_at: now,
                    },
                );
            }
        }
        Ok(())
    }

    async fn get_decrypted_api_key(
        &self,
        tenant_id: &str,
        _passphrase: &str,
    ) -> CoreResult<Zeroizing<String>> {
        self.configs
            .read()
            .await
            .get(tenant_id)
            .and_then(|c| c.encrypted_api_key.clone())
            .map(Zeroizing::new)
            .ok_or(CoreError::RecordNotFound)
    }
}

/// USDC 支付候选
pub fn candidate(
    payment_id: &str,
    status: PaymentStatus,
    receiver_wallet_id: &str,
    anchor_transaction_id: &str,
) -> ReconciliationCandidate {
    ReconciliationCandidate {
        payment_id: payment_id.to_string(),
        status,
        amount: Decimal::from_str("100.00").unwrap_or_default(),
        asset_code: "USDC".into(),
        asset_issuer: Some("GISSUER".into()),
        stellar_transaction_id: Some(format!("stellar-{}", payment_id)),
        updated_at: Utc::now(),
        receiver_wallet_id: receiver_wallet_id.to_string(),
        anchor_platform_transaction_id: anchor_transaction_id.to_string(),
        stellar_memo: None,
        stellar_memo_type: None,
        failed_status_message: None,
        known_wallet_address: false,
    }
}

/// 未失败过的按插入顺序在前，失败过的按失败先后在后；已同步的接收钱包不再返回
#[derive(Default)]
pub struct InMemoryReconciliationStore {
    payments: RwLock<HashMap<String, Vec<ReconciliationCandidate>>>,
    synced: RwLock<HashMap<String, Vec<String>>>,
    attempted: RwLock<HashMap<String, HashMap<String, u64>>>,
    attempt_seq: Mutex<u64>,
}

impl InMemoryReconciliationStore {
    pub async fn put(&self, tenant_id: &str, candidate: ReconciliationCandidate) {
        self.payments
            .write()
            .await
            .entry(tenant_id.to_string())
            .or_default()
            .push(candidate);
    }

    pub async fn synced(&self, tenant_id: &str) -> Vec<String> {
        self.synced
            .read()
            .await
            .get(tenant_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReconciliationStore for InMemoryReconciliationStore {
    async fn ready_to_patch(
        &self,
        tenant_id: &str,
        limit: i64,
    ) -> CoreResult<Vec<ReconciliationCandidate>> {
        let synced: HashSet<String> = self.synced(tenant_id).await.into_iter().collect();
        let attempted = self
            .attempted
            .read()
            .await
            .get(tenant_id)
            .cloned()
            .unwrap_or_default();

        let mut ready: Vec<ReconciliationCandidate> = self
            .payments
            .read()
            .await
            .get(tenant_id)
            .map(|all| {
                all.iter()
                    .filter(|c| matches!(c.status, PaymentStatus::Success | PaymentStatus::Failed))
                    .filter(|c| !c.known_wallet_address)
                    .filter(|c| !synced.contains(&c.receiver_wallet_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        ready.sort_by_key(|c| attempted.get(&c.receiver_wallet_id).copied());
        ready.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(ready)
    }

    async fn get_payment(&self, tenant_id: &str, payment_id: &str) -> CoreResult<PaymentForPatch> {
        let synced: HashSet<String> = self.synced(tenant_id).await.into_iter().collect();
        let candidate = self
            .payments
            .read()
            .await
            .get(tenant_id)
            .and_then(|all| all.iter().find(|c| c.payment_id == payment_id).cloned())
            .ok_or(CoreError::RecordNotFound)?;
        let synced_at = synced
            .contains(&candidate.receiver_wallet_id)
            .then(Utc::now);
        Ok(PaymentForPatch {
            candidate,
            synced_at,
        })
    }

    async fn mark_attempted(&self, tenant_id: &str, receiver_wallet_ids: &[String]) -> CoreResult<u64> {
        let mut seq = self.attempt_seq.lock().await;
        let mut guard = self.attempted.write().await;
        let attempted = guard.entry(tenant_id.to_string()).or_default();
        for id in receiver_wallet_ids {
            *seq += 1;
            attempted.insert(id.clone(), *seq);
        }
        Ok(receiver_wallet_ids.len() as u64)
    }

    async fn mark_synced(&self, tenant_id: &str, receiver_wallet_ids: &[String]) -> CoreResult<u64> {
        let mut guard = self.synced.write().await;
        let synced = guard.entry(tenant_id.to_string()).or_default();
        let mut updated = 0;
        for id in receiver_wallet_ids {
            if !synced.contains(id) {
                synced.push(id.clone());
                updated += 1;
            }
        }
        Ok(updated)
    }
}

/// 记录调用的锚点平台替身
#[derive(Default)]
pub struct FakeAnchorPlatform {
    statuses: Mutex<HashMap<String, AnchorTransactionStatus>>,
    failing: Mutex<HashSet<String>>,
    successes: Mutex<Vec<PatchPostSuccess>>,
    errors: Mutex<Vec<PatchPostError>>,
    status_calls: Mutex<usize>,
}

impl FakeAnchorPlatform {
    pub async fn set_status(&self, id: &str, status: AnchorTransactionStatus) {
        self.statuses.lock().await.insert(id.to_string(), status);
    }

    pub async fn fail_patch_for(&self, id: &str) {
        self.failing.lock().await.insert(id.to_string());
    }

    pub async fn clear_failures(&self) {
        self.failing.lock().await.clear();
    }

    pub async fn successes(&self) -> Vec<PatchPostSuccess> {
        self.successes.lock().await.clone()
    }

    pub async fn errors(&self) -> Vec<PatchPostError> {
        self.errors.lock().await.clone()
    }

    pub async fn status_calls(&self) -> usize {
        *self.status_calls.lock().await
    }

    async fn check_failure(&self, id: &str) -> CoreResult<()> {
        if self.failing.lock().await.contains(id) {
            return Err(CoreError::external(format!("anchor platform rejected {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl AnchorPlatformApi for FakeAnchorPlatform {
    async fn get_transaction_status(
        &self,
        transaction_id: &str,
    ) -> CoreResult<AnchorTransactionStatus> {
        *self.status_calls.lock().await += 1;
        Ok(self
            .statuses
            .lock()
            .await
            .get(transaction_id)
            .cloned()
            .unwrap_or(AnchorTransactionStatus::PendingAnchor))
    }

    async fn patch_transaction_post_success(&self, patch: &PatchPostSuccess) -> CoreResult<()> {
        self.check_failure(&patch.id).await?;
        self.successes.lock().await.push(patch.clone());
        Ok(())
    }

    async fn patch_transaction_post_error(&self, patch: &PatchPostError) -> CoreResult<()> {
        self.check_failure(&patch.id).await?;
        self.errors.lock().await.push(patch.clone());
        Ok(())
    }
}
