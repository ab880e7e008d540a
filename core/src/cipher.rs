//! Encryption collaborator: a byte-level transform producing opaque
//! ciphertext parts. The file layer only ever sees this trait; the choice
//! of symmetric cipher is deliberately swappable.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed (wrong key or corrupt ciphertext)")]
    Decrypt,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Generate a key, transform bytes with it, invert the transform.
/// Implementations own their own key material format and nonce handling;
/// callers never see either.
pub trait Cipher {
    fn generate_key(&self) -> Vec<u8>;
    fn encrypt(&self, key: &[u8], bytes: &[u8]) -> Result<Vec<u8>, CipherError>;
    fn decrypt(&self, key: &[u8], bytes: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// AES-256-GCM. Ciphertext layout is `nonce (12 bytes) || ciphertext+tag`,
/// so a single opaque blob is all the file layer needs to persist per
/// part.
pub struct AesGcmCipher;

impl Cipher for AesGcmCipher {
    fn generate_key(&self) -> Vec<u8> {
        Aes256Gcm::generate_key(OsRng).to_vec()
    }

    fn encrypt(&self, key: &[u8], bytes: &[u8]) -> Result<Vec<u8>, CipherError> {
        let key = Key::<Aes256Gcm>::from_slice(key);
        let cipher = Aes256Gcm::new(key);
        let nonce = Aes256Gcm::generate_nonce(OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, bytes)
            .map_err(|_| CipherError::Encrypt)?;
        let mut out = Vec::with_capacity(nonce.len() + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, key: &[u8], bytes: &[u8]) -> Result<Vec<u8>, CipherError> {
        if bytes.len() < 12 {
            return Err(CipherError::Decrypt);
        }
        let (nonce_bytes, ciphertext) = bytes.split_at(12);
        let key = Key::<Aes256Gcm>::from_slice(key);
        let cipher = Aes256Gcm::new(key);
        let nonce = Nonce::from_slice(nonce_bytes);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CipherError::Decrypt)
    }
}
