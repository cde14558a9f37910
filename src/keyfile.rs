//! Password encryption of keyset seeds at rest.
//!
//! Each seed gets its own random salt and nonce. The encryption key is
//! derived from the password with Argon2id and the seed is sealed with
//! AES-256-GCM, so a wrong password or any edit to the record fails the
//! tag check instead of yielding different plaintext.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::SecretSeed;
use crate::error::{ReporterError, Result};

pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536, // 64 MiB
            iterations: 3,
            parallelism: 1,
        }
    }
}

/// Recorded costs above this multiple of the default are refused.
pub const KDF_CEILING_FACTOR: u32 = 4;

impl KdfParams {
    /// Whether every field is at most `KDF_CEILING_FACTOR` times the default
    /// or the `allowed` cost, whichever is larger.
    pub fn within_ceiling(&self, allowed: &KdfParams) -> bool {
        let base = KdfParams::default();
        let cap = |default: u32, configured: u32| {
            default.saturating_mul(KDF_CEILING_FACTOR).max(configured)
        };
        self.memory_kib <= cap(base.memory_kib, allowed.memory_kib)
            && self.iterations <= cap(base.iterations, allowed.iterations)
            && self.parallelism <= cap(base.parallelism, allowed.parallelism)
    }

    /// Cheap parameters for tests. Never use for real keyfiles.
    #[cfg(test)]
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: 256,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// One encrypted seed as stored in a keyfile (all fields hex).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiphertextRecord {
    pub ciphertext: String,
    pub nonce: String,
    pub salt: String,
}

pub fn derive_key(password: &str, salt: &[u8], params: &KdfParams) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let params = Params::new(params.memory_kib, params.iterations, params.parallelism, Some(KEY_LEN))
        .map_err(|e| ReporterError::Crypto(format!("invalid Argon2 params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|e| ReporterError::Crypto(format!("key derivation failed: {e}")))?;
    Ok(key)
}

/// Encrypt seeds with the default KDF cost.
pub fn encrypt(seeds: &[SecretSeed], password: &str) -> Result<Vec<CiphertextRecord>> {
    encrypt_with(seeds, password, &KdfParams::default())
}

pub fn decrypt(records: &[CiphertextRecord], password: &str) -> Result<Vec<SecretSeed>> {
    decrypt_with(records, password, &KdfParams::default())
}

pub fn encrypt_with(seeds: &[SecretSeed], password: &str, params: &KdfParams) -> Result<Vec<CiphertextRecord>> {
    seeds
        .iter()
        .map(|seed| {
            let mut salt = [0u8; SALT_LEN];
            OsRng.fill_bytes(&mut salt);
            let mut nonce_bytes = [0u8; NONCE_LEN];
            OsRng.fill_bytes(&mut nonce_bytes);

            let key = derive_key(password, &salt, params)?;
            let cipher = Aes256Gcm::new_from_slice(&key[..])
                .map_err(|_| ReporterError::Crypto("invalid cipher key length".to_string()))?;
            let ciphertext = cipher
                .encrypt(Nonce::from_slice(&nonce_bytes), seed.as_bytes().as_slice())
                .map_err(|_| ReporterError::Crypto("encryption failed".to_string()))?;

            Ok(CiphertextRecord {
                ciphertext: hex::encode(ciphertext),
                nonce: hex::encode(nonce_bytes),
                salt: hex::encode(salt),
            })
        })
        .collect()
}

pub fn decrypt_with(records: &[CiphertextRecord], password: &str, params: &KdfParams) -> Result<Vec<SecretSeed>> {
    records
        .iter()
        .map(|record| {
            // malformed records are indistinguishable from tampered ones
            let salt = hex::decode(&record.salt).map_err(|_| ReporterError::Authentication)?;
            let nonce_bytes = hex::decode(&record.nonce).map_err(|_| ReporterError::Authentication)?;
            let ciphertext = hex::decode(&record.ciphertext).map_err(|_| ReporterError::Authentication)?;
            if nonce_bytes.len() != NONCE_LEN || salt.len() != SALT_LEN {
                return Err(ReporterError::Authentication);
            }

            let key = derive_key(password, &salt, params)?;
            let cipher = Aes256Gcm::new_from_slice(&key[..])
                .map_err(|_| ReporterError::Crypto("invalid cipher key length".to_string()))?;
            let plaintext = Zeroizing::new(
                cipher
                    .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
                    .map_err(|_| ReporterError::Authentication)?,
            );
            SecretSeed::from_bytes(&plaintext)
        })
        .collect()
}
