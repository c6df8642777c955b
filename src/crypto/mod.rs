//! Crypto codec for confidential content (drafts).
//!
//! PBKDF2-HMAC-SHA256 key derivation plus AES-256-GCM. Ciphertext on the
//! wire is the AES-GCM output with the 16-byte auth tag appended; the
//! 12-byte IV travels separately (base64 in the manifest entry). Encrypting
//! the same plaintext twice with a random IV yields different ciphertext,
//! which is why the manifest carries a plaintext `contentHash` for change
//! comparison.

use crate::error::{Result, SyncError};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use ring::pbkdf2;
use std::num::NonZeroU32;

/// PBKDF2 iteration count. Fixed: both sides must derive the same key.
pub const PBKDF2_ITERATIONS: u32 = 100_000;
pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const SALT_LEN: usize = 16;

pub type Key = [u8; KEY_LEN];
pub type Iv = [u8; IV_LEN];

/// Ciphertext plus the IV it was produced with.
#[derive(Debug, Clone)]
pub struct Encrypted {
    pub ciphertext: Vec<u8>,
    pub iv: Iv,
}

/// Derive a 32-byte key from a password and salt. Same salt and password
/// always yield the same key.
pub fn derive_key(password: &str, salt: &[u8]) -> Key {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        NonZeroU32::new(PBKDF2_ITERATIONS).expect("nonzero iteration count"),
        salt,
        password.as_bytes(),
        &mut key,
    );
    key
}

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

pub fn generate_iv() -> Iv {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// AES-256-GCM encrypt. Generates a random 12-byte IV when none is given.
pub fn encrypt(plaintext: &[u8], key: &Key, iv: Option<Iv>) -> Result<Encrypted> {
    let iv = iv.unwrap_or_else(generate_iv);
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| SyncError::Config(format!("invalid AES key: {e}")))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| SyncError::Config("AES-GCM encryption failed".to_string()))?;
    Ok(Encrypted { ciphertext, iv })
}

/// AES-256-GCM decrypt. Verifies the trailing 16-byte tag; any tampering or
/// wrong key fails with `Authentication` rather than returning garbage.
pub fn decrypt(ciphertext: &[u8], iv: &[u8], key: &Key) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_LEN {
        return Err(SyncError::Authentication);
    }
    if iv.len() != IV_LEN {
        return Err(SyncError::Authentication);
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| SyncError::Config(format!("invalid AES key: {e}")))?;
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| SyncError::Authentication)
}

pub fn encode_b64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

pub fn decode_b64(text: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(text)
        .map_err(|e| SyncError::Config(format!("invalid base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let key = derive_key("secret123", b"salt-abc");
        let enc = encrypt(b"draft body", &key, None).unwrap();
        let plain = decrypt(&enc.ciphertext, &enc.iv, &key).unwrap();
        assert_eq!(plain, b"draft body");
    }

    #[test]
    fn test_round_trip_with_explicit_iv() {
        let key = derive_key("pw", b"salt");
        let iv = [7u8; IV_LEN];
        let enc = encrypt(b"x", &key, Some(iv)).unwrap();
        assert_eq!(enc.iv, iv);
        assert_eq!(decrypt(&enc.ciphertext, &iv, &key).unwrap(), b"x");
    }

    #[test]
    fn test_wrong_password_fails_authentication() {
        let key = derive_key("secret123", b"salt");
        let wrong = derive_key("secret124", b"salt");
        let enc = encrypt(b"confidential", &key, None).unwrap();
        let err = decrypt(&enc.ciphertext, &enc.iv, &wrong).unwrap_err();
        assert!(matches!(err, SyncError::Authentication));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = derive_key("pw", b"salt");
        let mut enc = encrypt(b"payload", &key, None).unwrap();
        enc.ciphertext[0] ^= 0xff;
        assert!(matches!(
            decrypt(&enc.ciphertext, &enc.iv, &key),
            Err(SyncError::Authentication)
        ));
    }

    #[test]
    fn test_same_salt_same_key_different_salt_different_key() {
        let a = derive_key("pw", b"salt-1");
        let b = derive_key("pw", b"salt-1");
        let c = derive_key("pw", b"salt-2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_fresh_iv_changes_ciphertext() {
        let key = derive_key("pw", b"salt");
        let e1 = encrypt(b"same plaintext", &key, None).unwrap();
        let e2 = encrypt(b"same plaintext", &key, None).unwrap();
        assert_ne!(e1.ciphertext, e2.ciphertext);
    }

    #[test]
    fn test_ciphertext_carries_trailing_tag() {
        let key = derive_key("pw", b"salt");
        let enc = encrypt(b"1234", &key, None).unwrap();
        assert_eq!(enc.ciphertext.len(), 4 + TAG_LEN);
    }
}
