//! 本地加密金库签名后端
//!
//! 从金库读取加密私钥，用加密口令解密后签名。
//! 数据库读取一次完成，解密与签名都在内存中进行，不跨越数据库事务或网络调用。

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, info};

use super::{batch_insert_count, SignatureClient};
use crate::{
    domain::{
        account::AccountType,
        stellar::{is_valid_ed25519_secret_seed, FeeBumpTransaction, Keypair, Transaction},
    },
    error::{CoreError, CoreResult},
    infrastructure::encryption::{AesGcmEncrypter, PrivateKeyEncrypter},
    repository::vault::{VaultEntryInsert, VaultStore},
};

pub struct VaultSignatureClientOptions {
    pub network_passphrase: String,
    pub vault: Option<Arc<dyn VaultStore>>,
    /// 必须是合法的 Ed25519 私钥种子（`S...`）
    pub encryption_passphrase: String,
    /// 为空时使用 AES-GCM 默认实现
    pub encrypter: Option<Arc<dyn PrivateKeyEncrypter>>,
}

impl VaultSignatureClientOptions {
    pub fn validate(&self) -> CoreResult<()> {
        if self.network_passphrase.is_empty() {
            return Err(CoreError::validation("network passphrase cannot be empty"));
        }
        if self.vault.is_none() {
            return Err(CoreError::validation("database connection pool cannot be nil"));
        }
        if !is_valid_ed25519_secret_seed(&self.encryption_passphrase) {
            return Err(CoreError::validation(
                "encryption passphrase is not a valid Ed25519 secret",
            ));
        }
        Ok(())
    }
}

pub struct VaultSignatureClient {
    network_passphrase: String,
    vault: Arc<dyn VaultStore>,
    encrypter: Arc<dyn PrivateKeyEncrypter>,
    encryption_passphrase: String,
}

impl std::fmt::Debug for VaultSignatureClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSignatureClient")
            .field("network_passphrase", &self.network_passphrase)
            .finish_non_exhaustive()
    }
}

impl VaultSignatureClient {
    pub fn new(opts: VaultSignatureClientOptions) -> CoreResult<Self> {
        opts.validate()
            .map_err(|e| e.context("validating vault signature client options"))?;

        let VaultSignatureClientOptions {
            network_passphrase,
            vault,
            encryption_passphrase,
            encrypter,
        } = opts;

        Ok(Self {
            network_passphrase,
            vault: vault.ok_or_else(|| CoreError::validation("database connection pool cannot be nil"))?,
            encrypter: encrypter.unwrap_or_else(|| Arc::new(AesGcmEncrypter)),
            encryption_passphrase,
        })
    }

    /// 解析公钥对应的密钥对
    ///
    /// 重复地址只解析一次，结果按首次出现顺序排列
    pub(crate) async fn get_kps_for_public_keys(
        &self,
        public_keys: &[String],
    ) -> CoreResult<Vec<Keypair>> {
        if public_keys.is_empty() {
            return Err(CoreError::validation("no public keys provided"));
        }
        if let Some(i) = public_keys.iter().position(|pk| pk.is_empty()) {
            return Err(CoreError::validation(format!(
                "public key at position {} is empty",
                i
            )));
        }

        let mut unique: Vec<String> = Vec::with_capacity(public_keys.len());
        for pk in public_keys {
            if !unique.contains(pk) {
                unique.push(pk.clone());
            }
        }

        let mut entries: HashMap<String, String> = self
            .vault
            .get_all(&unique)
            .await?
            .into_iter()
            .map(|e| (e.public_key, e.encrypted_private_key))
            .collect();

        let mut kps = Vec::with_capacity(unique.len());
        for pk in &unique {
            let encrypted = entries
                .remove(pk)
                .ok_or_else(|| CoreError::VaultEntryNotFound(pk.clone()))?;

            let seed = self
                .encrypter
                .decrypt(&encrypted, &self.encryption_passphrase)
                .map_err(|e| e.context(format!("cannot decrypt private key for {}", pk)))?;

            let kp = Keypair::from_seed(&seed).map_err(|_| {
                CoreError::authentication(format!("parsing secret for vault entry {}", pk))
            })?;
            if kp.address() != *pk {
                return Err(CoreError::authentication(format!(
                    "vault entry {} does not match its decrypted key",
                    pk
                )));
            }
            kps.push(kp);
        }

        Ok(kps)
    }
}

#[async_trait]
impl SignatureClient for VaultSignatureClient {
    fn network_passphrase(&self) -> &str {
        &self.network_passphrase
    }

    fn account_type(&self) -> AccountType {
        AccountType::DistributionAccountStellarDbVault
    }

    async fn batch_insert(&self, count: i64) -> CoreResult<Vec<String>> {
        let count = batch_insert_count(count)?;

        let mut public_keys = Vec::with_capacity(count);
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let kp = Keypair::random();
            let encrypted_private_key = self
                .encrypter
                .encrypt(&kp.seed(), &self.encryption_passphrase)
                .map_err(|e| e.context("encrypting distribution account private key"))?;

            public_keys.push(kp.address());
            entries.push(VaultEntryInsert {
                public_key: kp.address(),
                encrypted_private_key,
            });
        }

        self.vault
            .batch_insert(entries)
            .await
            .map_err(|e| e.context("batch inserting vault entries"))?;

        info!(count = count, "🔐 inserted distribution accounts into vault");
        Ok(public_keys)
    }

    async fn delete(&self, public_key: &str) -> CoreResult<()> {
        self.vault
            .delete(public_key)
            .await
            .map_err(|e| e.context(format!("deleting vault entry {}", public_key)))?;
        debug!(public_key = %public_key, "deleted vault entry");
        Ok(())
    }

    async fn sign_stellar_transaction(
        &self,
        tx: &Transaction,
        accounts: &[String],
    ) -> CoreResult<Transaction> {
        let kps = self
            .get_kps_for_public_keys(accounts)
            .await
            .map_err(|e| e.context("getting keypairs for vault signature client"))?;

        tx.sign(&self.network_passphrase, &kps)
    }

    async fn sign_fee_bump_stellar_transaction(
        &self,
        tx: &FeeBumpTransaction,
        accounts: &[String],
    ) -> CoreResult<FeeBumpTransaction> {
        let kps = self
            .get_kps_for_public_keys(accounts)
            .await
            .map_err(|e| e.context("getting keypairs for vault signature client"))?;

        tx.sign(&self.network_passphrase, &kps)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::{
        domain::stellar::{Asset, Operation, TEST_NETWORK_PASSPHRASE},
        error::ErrorKind,
        signing::MAX_BATCH_INSERT_COUNT,
        test_support::InMemoryVaultStore,
    };

    fn passphrase() -> String {
        Keypair::random().seed().to_string()
    }

    fn client(vault: Arc<InMemoryVaultStore>, encryption_passphrase: &str) -> VaultSignatureClient {
        VaultSignatureClient::new(VaultSignatureClientOptions {
            network_passphrase: TEST_NETWORK_PASSPHRASE.into(),
            vault: Some(vault),
            encryption_passphrase: encryption_passphrase.into(),
            encrypter: None,
        })
        .unwrap()
    }

    fn tx() -> Transaction {
        Transaction::new(Keypair::random().address(), 100, 1).with_operation(Operation::Payment {
            destination: Keypair::random().address(),
            asset: Asset::Native,
            amount: 5,
        })
    }

    fn signature_set(tx: &Transaction) -> HashSet<Vec<u8>> {
        tx.signatures.iter().map(|s| s.signature.clone()).collect()
    }

    #[test]
    fn test_options_validation() {
        let base = || VaultSignatureClientOptions {
            network_passphrase: TEST_NETWORK_PASSPHRASE.into(),
            vault: Some(Arc::new(InMemoryVaultStore::default())),
            encryption_passphrase: passphrase(),
            encrypter: None,
        };
        assert!(base().validate().is_ok());

        let mut opts = base();
        opts.network_passphrase = String::new();
        assert_eq!(
            opts.validate().unwrap_err().to_string(),
            "network passphrase cannot be empty"
        );

        let mut opts = base();
        opts.vault = None;
        assert_eq!(
            opts.validate().unwrap_err().to_string(),
            "database connection pool cannot be nil"
        );

        let mut opts = base();
        opts.encryption_passphrase = "plain-password".into();
        assert_eq!(
            opts.validate().unwrap_err().to_string(),
            "encryption passphrase is not a valid Ed25519 secret"
        );
    }

    #[tokio::test]
    async fn test_batch_insert_stores_decryptable_keys() {
        let vault = Arc::new(InMemoryVaultStore::default());
        let pass = passphrase();
        let client = client(vault.clone(), &pass);

        let keys = client.batch_insert(2).await.unwrap();
        assert_eq!(keys.len(), 2);
        assert_ne!(keys[0], keys[1]);

        let stored = vault.all().await;
        assert_eq!(stored.len(), 2);
        for entry in stored {
            let seed = AesGcmEncrypter
                .decrypt(&entry.encrypted_private_key, &pass)
                .unwrap();
            assert_eq!(Keypair::from_seed(&seed).unwrap().address(), entry.public_key);
            assert!(keys.contains(&entry.public_key));
        }
    }

    #[tokio::test]
    async fn test_batch_insert_rejects_non_positive_count() {
        let vault = Arc::new(InMemoryVaultStore::default());
        let client = client(vault.clone(), &passphrase());

        for n in [0, -1] {
            let err = client.batch_insert(n).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
            assert_eq!(err.to_string(), "count must be greater than zero");
        }
        for n in [MAX_BATCH_INSERT_COUNT + 1, i64::MAX] {
            let err = client.batch_insert(n).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        assert!(vault.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_get_kps_dedups_in_first_occurrence_order() {
        let vault = Arc::new(InMemoryVaultStore::default());
        let client = client(vault, &passphrase());
        let keys = client.batch_insert(2).await.unwrap();
        let (a, b) = (keys[0].clone(), keys[1].clone());

        let kps = client
            .get_kps_for_public_keys(&[a.clone(), a.clone()])
            .await
            .unwrap();
        assert_eq!(kps.len(), 1);
        assert_eq!(kps[0].address(), a);

        let kps = client
            .get_kps_for_public_keys(&[b.clone(), a.clone(), b.clone()])
            .await
            .unwrap();
        let addresses: Vec<String> = kps.iter().map(Keypair::address).collect();
        assert_eq!(addresses, vec![b, a]);
    }

    #[tokio::test]
    async fn test_get_kps_input_errors() {
        let vault = Arc::new(InMemoryVaultStore::default());
        let client = client(vault, &passphrase());
        let keys = client.batch_insert(1).await.unwrap();

        let err = client.get_kps_for_public_keys(&[]).await.unwrap_err();
        assert_eq!(err.to_string(), "no public keys provided");

        let err = client
            .get_kps_for_public_keys(&[keys[0].clone(), String::new()])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "public key at position 1 is empty");

        let missing = Keypair::random().address();
        let err = client
            .get_kps_for_public_keys(&[keys[0].clone(), missing])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_wrong_passphrase_is_authentication_error() {
        let vault = Arc::new(InMemoryVaultStore::default());
        let keys = client(vault.clone(), &passphrase()).batch_insert(1).await.unwrap();

        let other = client(vault, &passphrase());
        let err = other.get_kps_for_public_keys(&keys).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_sign_with_duplicates_matches_deduplicated() {
        let vault = Arc::new(InMemoryVaultStore::default());
        let client = client(vault, &passphrase());
        let keys = client.batch_insert(2).await.unwrap();
        let (a, b) = (keys[0].clone(), keys[1].clone());
        let tx = tx();

        let once = client
            .sign_stellar_transaction(&tx, &[a.clone(), b.clone()])
            .await
            .unwrap();
        let repeated = client
            .sign_stellar_transaction(&tx, &[a.clone(), b.clone(), b.clone()])
            .await
            .unwrap();

        assert_eq!(signature_set(&once), signature_set(&repeated));
        assert_eq!(once.signatures.len(), 2);
        assert!(once.is_signed_by(TEST_NETWORK_PASSPHRASE, &a).unwrap());
        assert!(once.is_signed_by(TEST_NETWORK_PASSPHRASE, &b).unwrap());
    }

    #[tokio::test]
    async fn test_sign_requires_accounts() {
        let client = client(Arc::new(InMemoryVaultStore::default()), &passphrase());
        let err = client.sign_stellar_transaction(&tx(), &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_sign_fee_bump() {
        let vault = Arc::new(InMemoryVaultStore::default());
        let client = client(vault, &passphrase());
        let keys = client.batch_insert(1).await.unwrap();

        let fee_bump = FeeBumpTransaction::new(keys[0].clone(), 200, tx());
        let signed = client
            .sign_fee_bump_stellar_transaction(&fee_bump, &keys)
            .await
            .unwrap();
        assert!(signed.is_signed_by(TEST_NETWORK_PASSPHRASE, &keys[0]).unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let vault = Arc::new(InMemoryVaultStore::default());
        let client = client(vault, &passphrase());
        let keys = client.batch_insert(1).await.unwrap();

        client.delete(&keys[0]).await.unwrap();
        let err = client.delete(&keys[0]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
