//! 事件载荷对称加解密（AES-256-CBC + PKCS#7）。
//!
//! 密文格式（文本，标准 Base64）：
//! - `random` 策略：`base64(iv[16] || ciphertext || tag[32]?)`
//! - `fixed_zero` 策略：`base64(ciphertext || tag[32]?)`，IV 固定为全零
//! - `tag` 仅在 `authenticate = true` 时存在，为 `HMAC-SHA256(mac_key, iv || ciphertext)`
//!
//! 密钥派生：
//! - 取密钥字符串的 UTF-8 字节，截断或补零到 32 字节（AES-256）
//! - 空密钥视为 `InvalidKeyLength`
//! - MAC 密钥为 `SHA-256("xiaohai-bridge/mac" || aes_key)`，与加密密钥分离
//!
//! 兼容性注意：
//! - 两种 IV 策略在线路上互不兼容，通信双方必须使用同一策略
//! - 与未带认证标签的旧端互通时需关闭 `authenticate`；此时错误密钥只能依赖填充校验发现
//!
//! 作者：小海智能助手项目组（自动生成）
//! 创建时间：2026-10-19
//! 修改时间：2026-10-19

use aes::Aes256;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::trace;

use crate::error::{BridgeError, Result};

/// AES-256 密钥长度。
pub const KEY_LEN: usize = 32;
/// AES 分组长度（同时也是 IV 长度）。
pub const BLOCK_LEN: usize = 16;
/// HMAC-SHA256 标签长度。
pub const TAG_LEN: usize = 32;

const MAC_KEY_CONTEXT: &[u8] = b"xiaohai-bridge/mac";

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// IV 策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IvPolicy {
    /// 每次加密随机生成 IV，并前置到密文中。
    #[default]
    Random,
    /// 固定全零 IV（同明文同密钥产生相同密文，仅用于与旧端互通）。
    FixedZero,
}

/// 加解密配置（对应清单中的 `cipher` 段）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherSettings {
    #[serde(default)]
    /// IV 策略。
    pub iv_policy: IvPolicy,
    #[serde(default = "default_authenticate")]
    /// 是否附加 HMAC-SHA256 认证标签。
    pub authenticate: bool,
}

fn default_authenticate() -> bool {
    true
}

impl Default for CipherSettings {
    fn default() -> Self {
        Self {
            iv_policy: IvPolicy::default(),
            authenticate: default_authenticate(),
        }
    }
}

/// 载荷加解密器（无状态，按配置决定密文布局）。
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadCipher {
    settings: CipherSettings,
}

impl PayloadCipher {
    pub fn new(settings: CipherSettings) -> Self {
        Self { settings }
    }

    /// 加密明文文本。
    ///
    /// 参数：
    /// - `plaintext`：待加密文本（通常为编码后的 JSON）
    /// - `key`：密钥字符串
    ///
    /// 返回值：
    /// - Base64 编码的密文文本
    ///
    /// 异常处理：
    /// - 密钥为空：`InvalidKeyLength`
    pub fn encrypt(&self, plaintext: &str, key: &str) -> Result<String> {
        let aes_key = derive_key(key)?;
        let mut iv = [0u8; BLOCK_LEN];
        if self.settings.iv_policy == IvPolicy::Random {
            rand::thread_rng().fill_bytes(&mut iv);
        }

        let ciphertext = Aes256CbcEnc::new_from_slices(&aes_key, &iv)
            .map_err(|_| BridgeError::InvalidKeyLength { len: aes_key.len() })?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        let mut out = Vec::with_capacity(BLOCK_LEN + ciphertext.len() + TAG_LEN);
        if self.settings.iv_policy == IvPolicy::Random {
            out.extend_from_slice(&iv);
        }
        out.extend_from_slice(&ciphertext);
        if self.settings.authenticate {
            let tag = compute_tag(&aes_key, &iv, &ciphertext)?;
            out.extend_from_slice(&tag);
        }
        Ok(STANDARD.encode(out))
    }

    /// 解密密文文本。
    ///
    /// 异常处理：
    /// - 密钥为空：`InvalidKeyLength`
    /// - 非法 Base64、长度不足一个分组、标签不匹配、填充错误、非 UTF-8 明文：`DecryptionFailed`
    pub fn decrypt(&self, text: &str, key: &str) -> Result<String> {
        let aes_key = derive_key(key)?;
        let raw = STANDARD
            .decode(text.trim().as_bytes())
            .map_err(|e| BridgeError::DecryptionFailed(format!("Base64 解码失败: {e}")))?;

        let iv_len = match self.settings.iv_policy {
            IvPolicy::Random => BLOCK_LEN,
            IvPolicy::FixedZero => 0,
        };
        let tag_len = if self.settings.authenticate { TAG_LEN } else { 0 };
        if raw.len() < iv_len + BLOCK_LEN + tag_len {
            return Err(BridgeError::DecryptionFailed(format!("密文长度不足: {} 字节", raw.len())));
        }

        let (iv_bytes, rest) = raw.split_at(iv_len);
        let (ciphertext, tag) = rest.split_at(rest.len() - tag_len);
        if ciphertext.len() % BLOCK_LEN != 0 {
            return Err(BridgeError::DecryptionFailed("密文长度不是分组长度的整数倍".to_string()));
        }
        let mut iv = [0u8; BLOCK_LEN];
        iv[..iv_bytes.len()].copy_from_slice(iv_bytes);

        // 标签校验通过后才解密
        if self.settings.authenticate {
            let mut mac = HmacSha256::new_from_slice(&mac_key(&aes_key))
                .map_err(|_| BridgeError::InvalidKeyLength { len: aes_key.len() })?;
            mac.update(&iv);
            mac.update(ciphertext);
            mac.verify_slice(tag)
                .map_err(|_| BridgeError::DecryptionFailed("认证标签校验失败".to_string()))?;
        }

        let plaintext = Aes256CbcDec::new_from_slices(&aes_key, &iv)
            .map_err(|_| BridgeError::InvalidKeyLength { len: aes_key.len() })?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| BridgeError::DecryptionFailed("填充校验失败".to_string()))?;
        String::from_utf8(plaintext)
            .map_err(|_| BridgeError::DecryptionFailed("明文不是合法的 UTF-8".to_string()))
    }
}

/// 使用默认配置（随机 IV + 认证标签）加密。
pub fn encrypt(plaintext: &str, key: &str) -> Result<String> {
    PayloadCipher::default().encrypt(plaintext, key)
}

/// 使用默认配置（随机 IV + 认证标签）解密。
pub fn decrypt(text: &str, key: &str) -> Result<String> {
    PayloadCipher::default().decrypt(text, key)
}

/// 将密钥字符串截断/补零为 32 字节。
fn derive_key(key: &str) -> Result<[u8; KEY_LEN]> {
    let bytes = key.as_bytes();
    if bytes.is_empty() {
        return Err(BridgeError::InvalidKeyLength { len: 0 });
    }
    if bytes.len() != KEY_LEN {
        trace!(len = bytes.len(), "密钥长度不是 32 字节，按截断/补零处理");
    }
    let mut out = [0u8; KEY_LEN];
    let n = bytes.len().min(KEY_LEN);
    out[..n].copy_from_slice(&bytes[..n]);
    Ok(out)
}

fn mac_key(aes_key: &[u8; KEY_LEN]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(MAC_KEY_CONTEXT);
    hasher.update(aes_key);
    hasher.finalize().into()
}

fn compute_tag(aes_key: &[u8; KEY_LEN], iv: &[u8; BLOCK_LEN], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(&mac_key(aes_key))
        .map_err(|_| BridgeError::InvalidKeyLength { len: aes_key.len() })?;
    mac.update(iv);
    mac.update(ciphertext);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    fn legacy(iv_policy: IvPolicy) -> PayloadCipher {
        PayloadCipher::new(CipherSettings {
            iv_policy,
            authenticate: false,
        })
    }

    #[test]
    fn random_iv_produces_distinct_ciphertexts() {
        let a = encrypt("{\"a\":1}", KEY).unwrap();
        let b = encrypt("{\"a\":1}", KEY).unwrap();
        assert_ne!(a, b);
        assert_eq!(decrypt(&a, KEY).unwrap(), "{\"a\":1}");
        assert_eq!(decrypt(&b, KEY).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn fixed_zero_iv_is_deterministic() {
        let cipher = legacy(IvPolicy::FixedZero);
        let a = cipher.encrypt("hello", KEY).unwrap();
        let b = cipher.encrypt("hello", KEY).unwrap();
        assert_eq!(a, b);
        // 无 IV 前缀、无标签：16 字节明文分组 -> 24 字符 Base64
        assert_eq!(a.len(), 24);
        assert_eq!(cipher.decrypt(&a, KEY).unwrap(), "hello");
    }

    #[test]
    fn iv_policies_are_wire_incompatible() {
        let random = legacy(IvPolicy::Random);
        let fixed = legacy(IvPolicy::FixedZero);
        let text = random.encrypt("{\"k\":\"v\"}", KEY).unwrap();
        assert_ne!(fixed.decrypt(&text, KEY).ok().as_deref(), Some("{\"k\":\"v\"}"));
    }

    #[test]
    fn short_keys_are_zero_padded_and_long_keys_truncated() {
        let text = encrypt("x", "short").unwrap();
        assert_eq!(decrypt(&text, "short").unwrap(), "x");

        let long = format!("{KEY}-suffix-ignored");
        let text = encrypt("y", &long).unwrap();
        assert_eq!(decrypt(&text, KEY).unwrap(), "y");
    }

    #[test]
    fn empty_key_is_invalid_length() {
        assert_eq!(encrypt("x", ""), Err(BridgeError::InvalidKeyLength { len: 0 }));
        assert_eq!(decrypt("AAAA", ""), Err(BridgeError::InvalidKeyLength { len: 0 }));
    }

    #[test]
    fn malformed_ciphertext_fails_decryption() {
        assert!(matches!(decrypt("not base64!!", KEY), Err(BridgeError::DecryptionFailed(_))));
        assert!(matches!(decrypt("AAAA", KEY), Err(BridgeError::DecryptionFailed(_))));
        assert!(matches!(decrypt("{\"a\":1}", KEY), Err(BridgeError::DecryptionFailed(_))));
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let text = encrypt("{\"a\":1}", KEY).unwrap();
        let mut raw = STANDARD.decode(&text).unwrap();
        raw[BLOCK_LEN] ^= 0x01;
        let tampered = STANDARD.encode(raw);
        assert!(matches!(decrypt(&tampered, KEY), Err(BridgeError::DecryptionFailed(_))));
    }

    proptest! {
        #[test]
        fn decrypt_inverts_encrypt(plaintext in ".{0,64}", key in "[ -~]{1,40}") {
            let text = encrypt(&plaintext, &key).unwrap();
            prop_assert_eq!(decrypt(&text, &key).unwrap(), plaintext.clone());

            let fixed = legacy(IvPolicy::FixedZero);
            let text = fixed.encrypt(&plaintext, &key).unwrap();
            prop_assert_eq!(fixed.decrypt(&text, &key).unwrap(), plaintext);
        }

        #[test]
        fn wrong_key_always_fails(plaintext in ".{0,64}", k1 in "[a-z]{1,32}", k2 in "[a-z]{1,32}") {
            prop_assume!(derive_key(&k1).unwrap() != derive_key(&k2).unwrap());
            let text = encrypt(&plaintext, &k1).unwrap();
            prop_assert!(matches!(decrypt(&text, &k2), Err(BridgeError::DecryptionFailed(_))));
        }
    }
}
