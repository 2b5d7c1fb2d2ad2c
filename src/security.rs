use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use regex::Regex;

use crate::error::SelectionError;

/// AES-GCM 的 nonce 长度（字节）
const NONCE_LEN: usize = 12;

/// 燃料令牌的形状校验：标准 base64 字母表
pub fn is_fuel_shaped(fuel: &str) -> bool {
    let re = Regex::new(r"^[A-Za-z0-9+/]{20,}={0,2}$").unwrap();
    re.is_match(fuel)
}

fn build_cipher(key: &str) -> Result<Aes256Gcm, SelectionError> {
    let key_bytes = base64::engine::general_purpose::STANDARD
        .decode(key)
        .map_err(|_| SelectionError::TokenInvalid)?;
    Aes256Gcm::new_from_slice(&key_bytes).map_err(|_| SelectionError::TokenInvalid)
}

/// 加密燃料：把能量记录 id 加密成一次性令牌
///
/// 令牌 = base64(nonce || ciphertext || tag)，标准字母表。
pub fn encrypt_fuel(record_id: &str, key: &str) -> Result<String, SelectionError> {
    let cipher = build_cipher(key)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, record_id.as_bytes())
        .map_err(|_| SelectionError::TokenInvalid)?;

    let mut raw = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    raw.extend_from_slice(&nonce);
    raw.extend_from_slice(&ciphertext);
    Ok(base64::engine::general_purpose::STANDARD.encode(raw))
}

/// 解密燃料：还原出能量记录 id
///
/// 被篡改或用错密钥的令牌一律视为 `TokenInvalid`。
pub fn decrypt_fuel(fuel: &str, key: &str) -> Result<String, SelectionError> {
    if !is_fuel_shaped(fuel) {
        return Err(SelectionError::TokenInvalid);
    }
    let cipher = build_cipher(key)?;
    let raw = base64::engine::general_purpose::STANDARD
        .decode(fuel)
        .map_err(|_| SelectionError::TokenInvalid)?;
    if raw.len() <= NONCE_LEN {
        return Err(SelectionError::TokenInvalid);
    }
    let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
    let plain = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| SelectionError::TokenInvalid)?;
    String::from_utf8(plain).map_err(|_| SelectionError::TokenInvalid)
}

/// 生成一个随机密钥（base64 编码的 32 字节），供部署时写入 .env
pub fn generate_key() -> String {
    use rand::RngCore;
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    base64::engine::general_purpose::STANDARD.encode(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fuel_roundtrip() {
        let key = generate_key();
        let token = encrypt_fuel("42", &key).expect("加密失败");
        assert!(is_fuel_shaped(&token), "令牌应符合 base64 形状");
        let id = decrypt_fuel(&token, &key).expect("解密失败");
        assert_eq!(id, "42");
    }

    #[test]
    fn test_fuel_tampered() {
        let key = generate_key();
        let token = encrypt_fuel("42", &key).expect("加密失败");
        // 篡改最后一个字符
        let mut chars: Vec<char> = token.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();
        assert!(decrypt_fuel(&tampered, &key).is_err());
    }

    #[test]
    fn test_fuel_wrong_key() {
        let token = encrypt_fuel("42", &generate_key()).expect("加密失败");
        assert!(decrypt_fuel(&token, &generate_key()).is_err());
    }

    #[test]
    fn test_fuel_shape() {
        assert!(!is_fuel_shaped("短"));
        assert!(!is_fuel_shaped("has space not base64 aaaaaaaaaa"));
        assert!(is_fuel_shaped(
            "AbCdEfGhIjKlMnOpQrStUvWxYz0123456789+/AbCdEfGhIjKlMnOpQrStUvWxYz012="
        ));
    }
}
