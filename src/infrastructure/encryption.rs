//! AES-256-GCM 加密/解密模块
//! 用于私钥种子和托管方 API Key 的加密存储
//!
//! 密文格式：base64(nonce(12字节) + ciphertext)，密钥为 SHA-256(passphrase)

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{CoreError, CoreResult};

const NONCE_LEN: usize = 12;

/// 由口令派生的加密密钥（使用Zeroize保护）
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    key: [u8; 32],
}

impl EncryptionKey {
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self {
            key: Sha256::digest(passphrase.as_bytes()).into(),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.key
    }
}

/// 加密数据，返回 nonce + ciphertext
pub fn encrypt_data(data: &[u8], key: &EncryptionKey) -> CoreResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_slice())
        .map_err(|e| CoreError::validation(format!("invalid key: {}", e)))?;

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, data)
        .map_err(|e| CoreError::validation(format!("encryption failed: {}", e)))?;

    let mut result = nonce.to_vec();
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// 解密数据（nonce + ciphertext）
///
/// 口令错误与密文损坏都表现为认证失败
pub fn decrypt_data(encrypted: &[u8], key: &EncryptionKey) -> CoreResult<Zeroizing<Vec<u8>>> {
    if encrypted.len() < NONCE_LEN {
        return Err(CoreError::authentication("encrypted data too short"));
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_slice())
        .map_err(|e| CoreError::validation(format!("invalid key: {}", e)))?;

    let nonce = Nonce::from_slice(&encrypted[..NONCE_LEN]);
    let plaintext = cipher
        .decrypt(nonce, &encrypted[NONCE_LEN..])
        .map_err(|_| CoreError::authentication("cipher message authentication failed"))?;

    Ok(Zeroizing::new(plaintext))
}

/// 私钥/凭据加解密
pub trait PrivateKeyEncrypter: Send + Sync {
    fn encrypt(&self, message: &str, passphrase: &str) -> CoreResult<String>;
    fn decrypt(&self, encrypted: &str, passphrase: &str) -> CoreResult<Zeroizing<String>>;
}

/// 默认实现：AES-256-GCM + base64
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmEncrypter;

impl PrivateKeyEncrypter for AesGcmEncrypter {
    fn encrypt(&self, message: &str, passphrase: &str) -> CoreResult<String> {
        let key = EncryptionKey::from_passphrase(passphrase);
        let sealed = encrypt_data(message.as_bytes(), &key)?;
        Ok(STANDARD.encode(sealed))
    }

    fn decrypt(&self, encrypted: &str, passphrase: &str) -> CoreResult<Zeroizing<String>> {
        let raw = STANDARD
            .decode(encrypted)
            .map_err(|e| CoreError::authentication(format!("decoding ciphertext: {}", e)))?;
        let key = EncryptionKey::from_passphrase(passphrase);
        let plaintext = decrypt_data(&raw, &key)?;
        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| CoreError::authentication("decrypted data is not valid utf-8"))?;
        Ok(Zeroizing::new(text.to_string()))
    }
}
