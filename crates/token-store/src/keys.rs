// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AES-256-GCM key material for the Token Store (§4.7).
//!
//! Two independent key concepts, per the spec: the **partner/device key**
//! used to decrypt the payload a client hands in on Create (resolved by
//! `key_id` for web/partner integrations, or derived from a device token
//! for hardware-terminal integrations), and the **service key**, versioned,
//! used to re-encrypt the plaintext for storage. A token's stored
//! `service_key_version` never changes after creation; only the version
//! used for *new* tokens rotates.

use std::collections::HashMap;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, thiserror::Error)]
pub enum KeyError {
    #[error("unknown key id: {0}")]
    UnknownKey(String),
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
    #[error("encryption failed")]
    EncryptionFailed,
}

fn cipher_for(key_bytes: &[u8; 32]) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes))
}

/// Resolves the key used to decrypt what the client sent on Create.
pub struct PartnerKeyRegistry {
    named_keys: HashMap<String, [u8; 32]>,
}

impl PartnerKeyRegistry {
    pub fn new(named_keys: HashMap<String, [u8; 32]>) -> Self {
        Self { named_keys }
    }

    pub fn decrypt_named(&self, key_id: &str, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, KeyError> {
        let key = self.named_keys.get(key_id).ok_or_else(|| KeyError::UnknownKey(key_id.to_owned()))?;
        decrypt_with(key, nonce, ciphertext)
    }

    /// Hardware-terminal flow: the decryption key is derived from the
    /// device's bound token rather than looked up by id. Deterministic so
    /// the same device always derives the same key without a registry
    /// entry per device.
    pub fn decrypt_device(&self, device_token: &str, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, KeyError> {
        let key = derive_device_key(device_token);
        decrypt_with(&key, nonce, ciphertext)
    }
}

fn derive_device_key(device_token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"payauth-device-key\x1f");
    hasher.update(device_token.as_bytes());
    hasher.finalize().into()
}

fn decrypt_with(key: &[u8; 32], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, KeyError> {
    if nonce.len() != 12 {
        return Err(KeyError::InvalidKeyMaterial("nonce must be 12 bytes".into()));
    }
    cipher_for(key).decrypt(Nonce::from_slice(nonce), ciphertext).map_err(|_| KeyError::DecryptionFailed)
}

/// Versioned service keys used to re-encrypt plaintext for storage (§4.7
/// "Key rotation"). A token always decrypts under the version it was
/// written with; only new tokens pick up a rotated `current_version`.
pub struct ServiceKeyRegistry {
    keys: HashMap<i32, [u8; 32]>,
    current_version: i32,
}

impl ServiceKeyRegistry {
    pub fn new(current_version: i32, keys: HashMap<i32, [u8; 32]>) -> Result<Self, KeyError> {
        if !keys.contains_key(&current_version) {
            return Err(KeyError::UnknownKey(format!("current_version {current_version}")));
        }
        Ok(Self { keys, current_version })
    }

    pub fn current_version(&self) -> i32 {
        self.current_version
    }

    /// Encrypt under the current version, returning `(version, nonce, ciphertext)`.
    pub fn encrypt_current(&self, plaintext: &[u8]) -> Result<(i32, Vec<u8>, Vec<u8>), KeyError> {
        let key = self
            .keys
            .get(&self.current_version)
            .ok_or_else(|| KeyError::UnknownKey(format!("current_version {}", self.current_version)))?;
        let mut nonce_bytes = [0u8; 12];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let ciphertext = cipher_for(key)
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| KeyError::EncryptionFailed)?;
        Ok((self.current_version, nonce_bytes.to_vec(), ciphertext))
    }

    pub fn decrypt(&self, version: i32, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, KeyError> {
        let key = self.keys.get(&version).ok_or_else(|| KeyError::UnknownKey(format!("service key v{version}")))?;
        decrypt_with(key, nonce, ciphertext)
    }
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
