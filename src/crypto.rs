// Copyright (c) 2025 - Cowboy AI, Inc.
//! Opaque crypto services consumed by commands
//!
//! Tokens handed to clients are `base64url(encrypt(owner_id + ":" + token_id))`.
//! The cipher itself sits behind [`TokenCipher`] so the engine never sees keys.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

const NONCE_LEN: usize = 12;
const TOKEN_SEPARATOR: char = ':';

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length")]
    InvalidKey,

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed")]
    Decrypt,

    #[error("token is not valid base64url: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("token payload is malformed")]
    Malformed,
}

/// Symmetric cipher used for refresh and session tokens
pub trait TokenCipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// AES-256-GCM with a random nonce prefixed to the ciphertext
pub struct AesGcmTokenCipher {
    cipher: Aes256Gcm,
}

impl AesGcmTokenCipher {
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { cipher })
    }
}

impl TokenCipher for AesGcmTokenCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() <= NONCE_LEN {
            return Err(CryptoError::Malformed);
        }
        let (nonce_bytes, body) = ciphertext.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), body)
            .map_err(|_| CryptoError::Decrypt)
    }
}

/// Encode `(owner_id, token_id)` into an opaque client token
pub fn encode_token(
    cipher: &dyn TokenCipher,
    owner_id: &str,
    token_id: &str,
) -> Result<String, CryptoError> {
    let plaintext = format!("{owner_id}{TOKEN_SEPARATOR}{token_id}");
    let encrypted = cipher.encrypt(plaintext.as_bytes())?;
    Ok(URL_SAFE_NO_PAD.encode(encrypted))
}

/// Decode an opaque client token back into `(owner_id, token_id)`
pub fn decode_token(cipher: &dyn TokenCipher, token: &str) -> Result<(String, String), CryptoError> {
    let encrypted = URL_SAFE_NO_PAD.decode(token.as_bytes())?;
    let plaintext = cipher.decrypt(&encrypted)?;
    let plaintext = String::from_utf8(plaintext).map_err(|_| CryptoError::Malformed)?;
    let (owner_id, token_id) = plaintext
        .split_once(TOKEN_SEPARATOR)
        .ok_or(CryptoError::Malformed)?;
    if owner_id.is_empty() || token_id.is_empty() {
        return Err(CryptoError::Malformed);
    }
    Ok((owner_id.to_string(), token_id.to_string()))
}

/// Verifies a password against a stored encoded hash
///
/// Hashing algorithms live outside the engine.
pub trait PasswordVerifier: Send + Sync {
    fn verify(&self, encoded_hash: &str, password: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> AesGcmTokenCipher {
        AesGcmTokenCipher::new(&[7u8; 32]).unwrap()
    }

    #[test]
    fn test_token_round_trip() {
        let cipher = cipher();
        let token = encode_token(&cipher, "oidcSessionID", "tokenID").unwrap();
        assert!(!token.contains('='));
        let (owner, id) = decode_token(&cipher, &token).unwrap();
        assert_eq!(owner, "oidcSessionID");
        assert_eq!(id, "tokenID");
    }

    #[test]
    fn test_wrong_key_fails_to_decrypt() {
        let token = encode_token(&cipher(), "sid", "tid").unwrap();
        let other = AesGcmTokenCipher::new(&[8u8; 32]).unwrap();
        assert!(matches!(decode_token(&other, &token), Err(CryptoError::Decrypt)));
    }

    #[test]
    fn test_garbage_token_fails_to_decode() {
        assert!(decode_token(&cipher(), "not base64 at all!").is_err());
        assert!(matches!(
            decode_token(&cipher(), "AAAA"),
            Err(CryptoError::Malformed)
        ));
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(matches!(
            AesGcmTokenCipher::new(&[1u8; 5]),
            Err(CryptoError::InvalidKey)
        ));
    }
}
