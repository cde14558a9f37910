use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::encoding::b64url_decode_bytes;
use crate::error::{ReporterError, Result};

pub const SEED_LEN: usize = 32;

/// Ed25519 secret seed. Wiped on drop and never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretSeed([u8; SEED_LEN]);

impl SecretSeed {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SEED_LEN {
            return Err(ReporterError::InvalidSeed(format!(
                "seed has bad size: expected {} bytes, got {}",
                SEED_LEN,
                bytes.len()
            )));
        }
        let mut seed = [0u8; SEED_LEN];
        seed.copy_from_slice(bytes);
        Ok(Self(seed))
    }

    /// Parse a 64 character hex seed.
    pub fn from_hex(seed: &str) -> Result<Self> {
        if seed.is_empty() {
            return Err(ReporterError::InvalidSeed("seed for key pair not provided".to_string()));
        }
        if seed.len() != SEED_LEN * 2 {
            return Err(ReporterError::InvalidSeed(format!(
                "seed has bad size: expected {} hex characters, got {}",
                SEED_LEN * 2,
                seed.len()
            )));
        }
        let mut bytes = hex::decode(seed)
            .map_err(|_| ReporterError::InvalidSeed("seed is not valid hex".to_string()))?;
        let parsed = Self::from_bytes(&bytes);
        bytes.zeroize();
        parsed
    }

    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.0
    }

    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.0)
    }

    /// Hex public key, always re-derived from the seed.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key().verifying_key().to_bytes())
    }

    /// Sign raw hash bytes, returning the hex signature.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        let signature = self.signing_key().sign(message);
        hex::encode(signature.to_bytes())
    }
}

impl std::fmt::Debug for SecretSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretSeed(<redacted>)")
    }
}

/// Generate a fresh seed from the OS RNG
pub fn generate_seed() -> SecretSeed {
    let mut bytes = [0u8; SEED_LEN];
    OsRng.fill_bytes(&mut bytes);
    let seed = SecretSeed(bytes);
    bytes.zeroize();
    seed
}

/// Restore the hex public key for a hex seed.
pub fn derive_public_key(seed: &str) -> Result<String> {
    Ok(SecretSeed::from_hex(seed)?.public_key_hex())
}

/// Verify a hex signature over a base64url command hash with a hex public key
pub fn verify_signature(pubkey_hex: &str, hash_b64: &str, signature_hex: &str) -> bool {
    let (Ok(pk_bytes), Ok(sig_bytes), Ok(message)) = (
        hex::decode(pubkey_hex),
        hex::decode(signature_hex),
        b64url_decode_bytes(hash_b64),
    ) else {
        return false;
    };
    let (Ok(pk_arr), Ok(sig_arr)) = (
        <[u8; 32]>::try_from(pk_bytes.as_slice()),
        <[u8; 64]>::try_from(sig_bytes.as_slice()),
    ) else {
        return false;
    };
    match VerifyingKey::from_bytes(&pk_arr) {
        Ok(pubkey) => pubkey.verify(&message, &Signature::from_bytes(&sig_arr)).is_ok(),
        Err(_) => false,
    }
}
