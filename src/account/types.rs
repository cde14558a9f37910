//! Account and keyset type definitions

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::command::{Capability, KeyPair};
use crate::crypto::SecretSeed;
use crate::error::{ReporterError, Result};
use crate::keyfile::{decrypt_with, CiphertextRecord, KdfParams};

/// On-disk keyfile contents
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Keyfile {
    pub chains: Vec<u32>,
    pub pred: String,
    pub keystore_json: Vec<CiphertextRecord>,
    pub address: Vec<String>,
    /// Argon2 cost the seeds were sealed with; absent means the keystore default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kdf: Option<KdfParams>,
}

/// Decrypted keyset held by an unlocked account.
pub struct LocalKeyset {
    pred: String,
    keys: Vec<SecretSeed>,
    public_keys: Vec<String>,
}

impl LocalKeyset {
    pub fn new(keys: Vec<SecretSeed>, pred: impl Into<String>) -> Self {
        let public_keys = keys.iter().map(SecretSeed::public_key_hex).collect();
        Self {
            pred: pred.into(),
            keys,
            public_keys,
        }
    }

    pub fn secret_keys(&self) -> &[SecretSeed] {
        &self.keys
    }

    pub fn public_keys(&self) -> &[String] {
        &self.public_keys
    }

    pub fn predicate(&self) -> &str {
        &self.pred
    }

    /// Signing pairs in keyset order.
    pub fn key_pairs(&self) -> Vec<KeyPair> {
        self.keys.iter().cloned().map(KeyPair::from_seed).collect()
    }

    /// On-chain keyset object: `{"pred": .., "keys": [..]}`
    pub fn guard(&self) -> Value {
        json!({ "pred": self.pred, "keys": self.public_keys })
    }
}

impl std::fmt::Debug for LocalKeyset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeyset")
            .field("pred", &self.pred)
            .field("public_keys", &self.public_keys)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum AccountState {
    Locked,
    Unlocked(LocalKeyset),
}

/// A keyset account loaded from the keystore. Starts locked.
#[derive(Debug)]
pub struct ChainedAccount {
    name: String,
    path: PathBuf,
    data: Keyfile,
    kdf: KdfParams,
    state: AccountState,
}

impl ChainedAccount {
    pub(crate) fn new(name: &str, path: PathBuf, data: Keyfile, kdf: KdfParams) -> Self {
        Self {
            name: name.to_string(),
            path,
            data,
            kdf,
            state: AccountState::Locked,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keyfile(&self) -> &Path {
        &self.path
    }

    /// Persisted (encrypted) keyfile contents
    pub fn data(&self) -> &Keyfile {
        &self.data
    }

    pub fn chains(&self) -> &[u32] {
        &self.data.chains
    }

    /// Public keys recorded at creation time
    pub fn address(&self) -> &[String] {
        &self.data.address
    }

    pub fn predicate(&self) -> &str {
        &self.data.pred
    }

    pub fn is_unlocked(&self) -> bool {
        matches!(self.state, AccountState::Unlocked(_))
    }

    /// Decrypt the keyset into memory. No-op when already unlocked.
    pub fn unlock(&mut self, password: &str) -> Result<()> {
        if self.is_unlocked() {
            return Ok(());
        }
        let kdf = self.data.kdf.unwrap_or(self.kdf);
        if !kdf.within_ceiling(&self.kdf) {
            warn!(account = %self.name, ?kdf, "keyfile records an excessive KDF cost");
            return Err(ReporterError::Authentication);
        }
        let keys = decrypt_with(&self.data.keystore_json, password, &kdf)?;
        let keyset = LocalKeyset::new(keys, self.data.pred.clone());
        if keyset.public_keys() != self.data.address.as_slice() {
            warn!(account = %self.name, "decrypted keys do not match stored addresses");
            return Err(ReporterError::Authentication);
        }
        info!(account = %self.name, keys = keyset.public_keys().len(), "account unlocked");
        self.state = AccountState::Unlocked(keyset);
        Ok(())
    }

    pub fn lock(&mut self) {
        self.state = AccountState::Locked;
    }

    pub fn local_keyset(&self) -> Result<&LocalKeyset> {
        match &self.state {
            AccountState::Unlocked(keyset) => Ok(keyset),
            AccountState::Locked => Err(ReporterError::AccountLocked(self.name.clone())),
        }
    }

    pub fn keys(&self) -> Result<&[SecretSeed]> {
        Ok(self.local_keyset()?.secret_keys())
    }

    pub fn key_pairs(&self) -> Result<Vec<KeyPair>> {
        Ok(self.local_keyset()?.key_pairs())
    }

    /// Key pairs with `clist` attached to the last pair (the gas payer).
    pub fn key_pairs_with_caps(&self, clist: Vec<Capability>) -> Result<Vec<KeyPair>> {
        let mut pairs = self.key_pairs()?;
        if let Some(last) = pairs.last_mut() {
            last.clist = Some(clist);
        }
        Ok(pairs)
    }
}
