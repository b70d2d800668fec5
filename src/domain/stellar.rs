//! Stellar 账本原语（最小实现，不是通用客户端）
//!
//! - Ed25519 密钥对，strkey 编解码（`G...` 账户地址 / `S...` 私钥种子）
//! - 交易与手续费代付（fee-bump）交易：转换为账本 XDR，按 TransactionSignaturePayload 计算哈希并签名

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use stellar_strkey::ed25519::{PrivateKey as StrkeyPrivateKey, PublicKey as StrkeyPublicKey};
use stellar_xdr::curr::{self as xdr, Limits, WriteXdr};
use zeroize::Zeroizing;

use crate::error::{CoreError, CoreResult};

/// 公网网络口令
pub const PUBLIC_NETWORK_PASSPHRASE: &str = "Public Global Stellar Network ; September 2015";
/// 测试网网络口令
pub const TEST_NETWORK_PASSPHRASE: &str = "Test SDF Network ; September 2015";

pub fn is_valid_ed25519_public_key(address: &str) -> bool {
    StrkeyPublicKey::from_string(address).is_ok()
}

pub fn is_valid_ed25519_secret_seed(seed: &str) -> bool {
    StrkeyPrivateKey::from_string(seed).is_ok()
}

/// Ed25519 密钥对
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// 随机生成
    pub fn random() -> Self {
        let mut seed = Zeroizing::new([0u8; 32]);
        rand::rngs::OsRng.fill_bytes(&mut seed[..]);
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// 从 `S...` 种子恢复
    pub fn from_seed(seed: &str) -> CoreResult<Self> {
        let key = StrkeyPrivateKey::from_string(seed)
            .map_err(|_| CoreError::validation("invalid ed25519 secret seed"))?;
        let bytes = Zeroizing::new(key.0);
        Ok(Self {
            signing_key: SigningKey::from_bytes(&bytes),
        })
    }

    /// `G...` 账户地址
    pub fn address(&self) -> String {
        StrkeyPublicKey(self.signing_key.verifying_key().to_bytes()).to_string()
    }

    /// `S...` 种子
    pub fn seed(&self) -> Zeroizing<String> {
        Zeroizing::new(StrkeyPrivateKey(self.signing_key.to_bytes()).to_string())
    }

    /// 签名提示：公钥末尾 4 字节
    pub fn hint(&self) -> [u8; 4] {
        let pk = self.signing_key.verifying_key().to_bytes();
        [pk[28], pk[29], pk[30], pk[31]]
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    pub fn sign_decorated(&self, message: &[u8]) -> DecoratedSignature {
        DecoratedSignature {
            hint: self.hint(),
            signature: self.sign(message).to_vec(),
        }
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// 校验某地址对消息的签名
pub fn verify_signature(address: &str, message: &[u8], signature: &[u8]) -> bool {
    let Ok(pk) = StrkeyPublicKey::from_string(address) else {
        return false;
    };
    let Ok(vk) = VerifyingKey::from_bytes(&pk.0) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    vk.verify(message, &Signature::from_bytes(&sig_bytes)).is_ok()
}

/// 带提示的签名
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecoratedSignature {
    pub hint: [u8; 4],
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Asset {
    Native,
    Credit { code: String, issuer: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Memo {
    None,
    Text(String),
    Id(u64),
    Hash([u8; 32]),
}

/// 金额单位为 stroop（1 XLM = 10^7 stroop）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Payment {
        destination: String,
        asset: Asset,
        amount: i64,
    },
    CreateAccount {
        destination: String,
        starting_balance: i64,
    },
}

/// 交易信封
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub source_account: String,
    pub fee: u32,
    pub sequence: i64,
    pub memo: Memo,
    pub operations: Vec<Operation>,
    pub signatures: Vec<DecoratedSignature>,
}

fn network_id(passphrase: &str) -> xdr::Hash {
    xdr::Hash(Sha256::digest(passphrase.as_bytes()).into())
}

/// SHA-256(XDR(TransactionSignaturePayload))
fn payload_hash(
    passphrase: &str,
    tagged_transaction: xdr::TransactionSignaturePayloadTaggedTransaction,
) -> CoreResult<[u8; 32]> {
    let payload = xdr::TransactionSignaturePayload {
        network_id: network_id(passphrase),
        tagged_transaction,
    };
    let bytes = to_xdr_bytes(&payload)?;
    Ok(Sha256::digest(&bytes).into())
}

fn to_xdr_bytes<T: WriteXdr>(value: &T) -> CoreResult<Vec<u8>> {
    value
        .to_xdr(Limits::none())
        .map_err(|e| CoreError::validation(format!("encoding transaction xdr: {}", e)))
}

fn ed25519_bytes(address: &str) -> CoreResult<[u8; 32]> {
    StrkeyPublicKey::from_string(address)
        .map(|pk| pk.0)
        .map_err(|_| CoreError::validation(format!("invalid ed25519 public key {}", address)))
}

fn muxed_account(address: &str) -> CoreResult<xdr::MuxedAccount> {
    Ok(xdr::MuxedAccount::Ed25519(xdr::Uint256(ed25519_bytes(address)?)))
}

fn account_id(address: &str) -> CoreResult<xdr::AccountId> {
    Ok(xdr::AccountId(xdr::PublicKey::PublicKeyTypeEd25519(
        xdr::Uint256(ed25519_bytes(address)?),
    )))
}

impl Asset {
    fn to_xdr(&self) -> CoreResult<xdr::Asset> {
        match self {
            Asset::Native => Ok(xdr::Asset::Native),
            Asset::Credit { code, issuer } => {
                let bytes = code.as_bytes();
                let valid_chars = bytes.iter().all(u8::is_ascii_alphanumeric);
                match bytes.len() {
                    1..=4 if valid_chars => {
                        let mut asset_code = [0u8; 4];
                        asset_code[..bytes.len()].copy_from_slice(bytes);
                        Ok(xdr::Asset::CreditAlphanum4(xdr::AlphaNum4 {
                            asset_code: xdr::AssetCode4(asset_code),
                            issuer: account_id(issuer)?,
                        }))
                    }
                    5..=12 if valid_chars => {
                        let mut asset_code = [0u8; 12];
                        asset_code[..bytes.len()].copy_from_slice(bytes);
                        Ok(xdr::Asset::CreditAlphanum12(xdr::AlphaNum12 {
                            asset_code: xdr::AssetCode12(asset_code),
                            issuer: account_id(issuer)?,
                        }))
                    }
                    _ => Err(CoreError::validation(format!("invalid asset code {:?}", code))),
                }
            }
        }
    }
}

impl Memo {
    fn to_xdr(&self) -> CoreResult<xdr::Memo> {
        Ok(match self {
            Memo::None => xdr::Memo::None,
            Memo::Text(text) => xdr::Memo::Text(
                text.as_bytes()
                    .to_vec()
                    .try_into()
                    .map_err(|_| CoreError::validation("memo text exceeds 28 bytes"))?,
            ),
            Memo::Id(id) => xdr::Memo::Id(*id),
            Memo::Hash(hash) => xdr::Memo::Hash(xdr::Hash(*hash)),
        })
    }
}

impl Operation {
    fn to_xdr(&self) -> CoreResult<xdr::Operation> {
        let body = match self {
            Operation::Payment {
                destination,
                asset,
                amount,
            } => xdr::OperationBody::Payment(xdr::PaymentOp {
                destination: muxed_account(destination)?,
                asset: asset.to_xdr()?,
                amount: *amount,
            }),
            Operation::CreateAccount {
                destination,
                starting_balance,
            } => xdr::OperationBody::CreateAccount(xdr::CreateAccountOp {
                destination: account_id(destination)?,
                starting_balance: *starting_balance,
            }),
        };
        Ok(xdr::Operation {
            source_account: None,
            body,
        })
    }
}

impl DecoratedSignature {
    fn to_xdr(&self) -> CoreResult<xdr::DecoratedSignature> {
        Ok(xdr::DecoratedSignature {
            hint: xdr::SignatureHint(self.hint),
            signature: xdr::Signature(
                self.signature
                    .clone()
                    .try_into()
                    .map_err(|_| CoreError::validation("signature exceeds 64 bytes"))?,
            ),
        })
    }
}

fn signatures_to_xdr(
    signatures: &[DecoratedSignature],
) -> CoreResult<xdr::VecM<xdr::DecoratedSignature, 20>> {
    signatures
        .iter()
        .map(DecoratedSignature::to_xdr)
        .collect::<CoreResult<Vec<_>>>()?
        .try_into()
        .map_err(|_| CoreError::validation("a transaction carries at most 20 signatures"))
}

fn append_signatures(
    signatures: &mut Vec<DecoratedSignature>,
    hash: &[u8; 32],
    keypairs: &[Keypair],
) {
    for kp in keypairs {
        let sig = kp.sign_decorated(hash);
        if !signatures.contains(&sig) {
            signatures.push(sig);
        }
    }
}

impl Transaction {
    pub fn new(source_account: impl Into<String>, fee: u32, sequence: i64) -> Self {
        Self {
            source_account: source_account.into(),
            fee,
            sequence,
            memo: Memo::None,
            operations: Vec::new(),
            signatures: Vec::new(),
        }
    }

    pub fn with_memo(mut self, memo: Memo) -> Self {
        self.memo = memo;
        self
    }

    pub fn with_operation(mut self, op: Operation) -> Self {
        self.operations.push(op);
        self
    }

    /// 转换为账本 XDR 结构（v1 交易，无前置条件）
    pub fn to_xdr(&self) -> CoreResult<xdr::Transaction> {
        let operations: xdr::VecM<xdr::Operation, 100> = self
            .operations
            .iter()
            .map(Operation::to_xdr)
            .collect::<CoreResult<Vec<_>>>()?
            .try_into()
            .map_err(|_| CoreError::validation("a transaction carries at most 100 operations"))?;
        Ok(xdr::Transaction {
            source_account: muxed_account(&self.source_account)?,
            fee: self.fee,
            seq_num: xdr::SequenceNumber(self.sequence),
            cond: xdr::Preconditions::None,
            memo: self.memo.to_xdr()?,
            operations,
            ext: xdr::TransactionExt::V0,
        })
    }

    fn to_v1_envelope(&self) -> CoreResult<xdr::TransactionV1Envelope> {
        Ok(xdr::TransactionV1Envelope {
            tx: self.to_xdr()?,
            signatures: signatures_to_xdr(&self.signatures)?,
        })
    }

    /// 交易哈希（不含签名）
    pub fn hash(&self, network_passphrase: &str) -> CoreResult<[u8; 32]> {
        payload_hash(
            network_passphrase,
            xdr::TransactionSignaturePayloadTaggedTransaction::Tx(self.to_xdr()?),
        )
    }

    /// base64 编码的交易信封，可直接提交到 Horizon
    pub fn to_envelope_xdr(&self) -> CoreResult<String> {
        let envelope = xdr::TransactionEnvelope::Tx(self.to_v1_envelope()?);
        Ok(STANDARD.encode(to_xdr_bytes(&envelope)?))
    }

    /// 返回追加了签名的新交易；已存在的签名不会重复添加
    pub fn sign(&self, network_passphrase: &str, keypairs: &[Keypair]) -> CoreResult<Self> {
        let hash = self.hash(network_passphrase)?;
        let mut signed = self.clone();
        append_signatures(&mut signed.signatures, &hash, keypairs);
        Ok(signed)
    }

    pub fn is_signed_by(&self, network_passphrase: &str, address: &str) -> CoreResult<bool> {
        let hash = self.hash(network_passphrase)?;
        Ok(self
            .signatures
            .iter()
            .any(|s| verify_signature(address, &hash, &s.signature)))
    }
}

/// 手续费代付交易：由 fee_source 为内层交易支付手续费
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBumpTransaction {
    pub fee_source: String,
    pub fee: u32,
    pub inner: Transaction,
    pub signatures: Vec<DecoratedSignature>,
}

impl FeeBumpTransaction {
    pub fn new(fee_source: impl Into<String>, fee: u32, inner: Transaction) -> Self {
        Self {
            fee_source: fee_source.into(),
            fee,
            inner,
            signatures: Vec::new(),
        }
    }

    pub fn to_xdr(&self) -> CoreResult<xdr::FeeBumpTransaction> {
        Ok(xdr::FeeBumpTransaction {
            fee_source: muxed_account(&self.fee_source)?,
            fee: i64::from(self.fee),
            inner_tx: xdr::FeeBumpTransactionInnerTx::Tx(self.inner.to_v1_envelope()?),
            ext: xdr::FeeBumpTransactionExt::V0,
        })
    }

    /// 哈希覆盖内层交易（含其签名）
    pub fn hash(&self, network_passphrase: &str) -> CoreResult<[u8; 32]> {
        payload_hash(
            network_passphrase,
            xdr::TransactionSignaturePayloadTaggedTransaction::TxFeeBump(self.to_xdr()?),
        )
    }

    pub fn to_envelope_xdr(&self) -> CoreResult<String> {
        let envelope = xdr::TransactionEnvelope::TxFeeBump(xdr::FeeBumpTransactionEnvelope {
            tx: self.to_xdr()?,
            signatures: signatures_to_xdr(&self.signatures)?,
        });
        Ok(STANDARD.encode(to_xdr_bytes(&envelope)?))
    }

    pub fn sign(&self, network_passphrase: &str, keypairs: &[Keypair]) -> CoreResult<Self> {
        let hash = self.hash(network_passphrase)?;
        let mut signed = self.clone();
        append_signatures(&mut signed.signatures, &hash, keypairs);
        Ok(signed)
    }

    pub fn is_signed_by(&self, network_passphrase: &str, address: &str) -> CoreResult<bool> {
        let hash = self.hash(network_passphrase)?;
        Ok(self
            .signatures
            .iter()
            .any(|s| verify_signature(address, &hash, &s.signature)))
    }
}
