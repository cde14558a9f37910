//! Keystore: keyfile persistence, lookup and deletion

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::types::{ChainedAccount, Keyfile};
use crate::crypto::SecretSeed;
use crate::error::{ReporterError, Result};
use crate::keyfile::{encrypt_with, KdfParams};

/// AND-combined search filter. Empty filter matches every account.
#[derive(Debug, Clone, Default)]
pub struct AccountFilter {
    pub name: Option<String>,
    pub chain_id: Option<u32>,
    pub address: Option<Vec<String>>,
}

impl AccountFilter {
    fn matches(&self, account: &ChainedAccount) -> bool {
        if let Some(name) = &self.name {
            if name != account.name() {
                return false;
            }
        }
        if let Some(chain_id) = self.chain_id {
            if !account.chains().contains(&chain_id) {
                return false;
            }
        }
        if let Some(address) = &self.address {
            if address.as_slice() != account.address() {
                return false;
            }
        }
        true
    }
}

/// Directory of keyfiles, one `{name}.json` per account
#[derive(Debug, Clone)]
pub struct Keystore {
    home: PathBuf,
    kdf: KdfParams,
}

impl Keystore {
    /// Open (creating if needed) a keystore rooted at `home`.
    pub fn open(home: impl Into<PathBuf>) -> Result<Self> {
        let home = home.into();
        fs::create_dir_all(&home)?;
        Ok(Self {
            home,
            kdf: KdfParams::default(),
        })
    }

    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn keyfile_path(&self, name: &str) -> PathBuf {
        self.home.join(format!("{}.json", name))
    }

    /// Encrypt `seeds` and persist a new account.
    pub fn create(
        &self,
        name: &str,
        pred: &str,
        chains: &[u32],
        seeds: &[SecretSeed],
        password: &str,
    ) -> Result<ChainedAccount> {
        validate_name(name)?;
        if seeds.is_empty() {
            return Err(ReporterError::Validation("a keyset needs at least one key".to_string()));
        }
        if pred.is_empty() {
            return Err(ReporterError::Validation("keyset predicate is empty".to_string()));
        }
        if self.list_names()?.iter().any(|n| n == name) {
            return Err(ReporterError::DuplicateAccount(name.to_string()));
        }

        let data = Keyfile {
            chains: chains.to_vec(),
            pred: pred.to_string(),
            keystore_json: encrypt_with(seeds, password, &self.kdf)?,
            address: seeds.iter().map(SecretSeed::public_key_hex).collect(),
            kdf: Some(self.kdf),
        };
        let path = self.keyfile_path(name);
        store(&path, &data)?;
        info!(account = %name, chains = ?chains, path = %path.display(), "keyset added");

        Ok(ChainedAccount::new(name, path, data, self.kdf))
    }

    /// Load an existing account (locked).
    pub fn get(&self, name: &str) -> Result<ChainedAccount> {
        validate_name(name)?;
        let path = self.keyfile_path(name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ReporterError::AccountNotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let data: Keyfile = serde_json::from_str(&content)?;
        Ok(ChainedAccount::new(name, path, data, self.kdf))
    }

    /// Names of every stored account, sorted.
    pub fn list_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.home)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn find(&self, filter: &AccountFilter) -> Result<Vec<ChainedAccount>> {
        let mut accounts = Vec::new();
        for name in self.list_names()? {
            let account = self.get(&name)?;
            if filter.matches(&account) {
                accounts.push(account);
            }
        }
        debug!(found = accounts.len(), "account search");
        Ok(accounts)
    }

    /// Remove an account's keyfile. Returns whether a file was removed.
    pub fn delete(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        match fs::remove_file(self.keyfile_path(name)) {
            Ok(()) => {
                info!(account = %name, "keyset deleted");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Account names become file names, so no separators or hidden files.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) || name.contains(char::is_whitespace)
    {
        return Err(ReporterError::Validation(format!("invalid account name {:?}", name)));
    }
    Ok(())
}

fn store(path: &Path, data: &Keyfile) -> Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = match options.open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(ReporterError::AlreadyExists(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    file.write_all(json.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Capability;
    use crate::crypto::generate_seed;
    use tempfile::TempDir;

    const SEED: &str = "f92089d02de9f01df0bf53c9d9d677dee960826640bc39f1c45234cc13d66683";
    const PUBKEY: &str = "563b9f9707c79fc2912e1093abe4c25f3923e9e5d410bf74ee1292e45588a3f2";

    fn keystore() -> (TempDir, Keystore) {
        let dir = TempDir::new().unwrap();
        let ks = Keystore::open(dir.path().join("keystore"))
            .unwrap()
            .with_kdf(KdfParams::insecure_fast());
        (dir, ks)
    }

    fn seed() -> SecretSeed {
        SecretSeed::from_hex(SEED).unwrap()
    }

    #[test]
    fn test_create_persists_keyfile() {
        let (_dir, ks) = keystore();
        let account = ks.create("reporter", "keys-all", &[1], &[seed()], "123").unwrap();
        assert_eq!(account.keyfile(), ks.keyfile_path("reporter"));
        assert!(account.keyfile().exists());
        assert!(!account.is_unlocked());

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(account.keyfile()).unwrap()).unwrap();
        assert_eq!(raw["chains"], serde_json::json!([1]));
        assert_eq!(raw["pred"], "keys-all");
        assert_eq!(raw["address"], serde_json::json!([PUBKEY]));
        let record = &raw["keystore_json"][0];
        for field in ["ciphertext", "nonce", "salt"] {
            assert!(hex::decode(record[field].as_str().unwrap()).is_ok());
        }
        assert!(!raw.to_string().contains(SEED));
    }

    #[test]
    fn test_duplicate_and_existing_keyfile() {
        let (_dir, ks) = keystore();
        ks.create("reporter", "keys-all", &[1], &[seed()], "123").unwrap();
        assert!(matches!(
            ks.create("reporter", "keys-all", &[1], &[seed()], "123"),
            Err(ReporterError::DuplicateAccount(_))
        ));
        assert!(matches!(
            store(&ks.keyfile_path("reporter"), &ks.get("reporter").unwrap().data().clone()),
            Err(ReporterError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_loaded_account_is_locked() {
        let (_dir, ks) = keystore();
        ks.create("reporter", "keys-all", &[0, 1], &[seed()], "123").unwrap();

        let account = ks.get("reporter").unwrap();
        assert!(!account.is_unlocked());
        assert_eq!(account.address(), &[PUBKEY.to_string()]);
        assert_eq!(account.chains(), &[0, 1]);
        assert_eq!(account.predicate(), "keys-all");
        assert!(matches!(account.keys(), Err(ReporterError::AccountLocked(_))));
        assert!(matches!(account.local_keyset(), Err(ReporterError::AccountLocked(_))));
        assert!(matches!(account.key_pairs(), Err(ReporterError::AccountLocked(_))));
    }

    #[test]
    fn test_unlock_lock_cycle() {
        let (_dir, ks) = keystore();
        ks.create("reporter", "keys-all", &[1], &[seed(), generate_seed()], "123").unwrap();
        let mut account = ks.get("reporter").unwrap();

        assert!(matches!(account.unlock("wrong"), Err(ReporterError::Authentication)));
        assert!(!account.is_unlocked());

        account.unlock("123").unwrap();
        assert!(account.is_unlocked());
        assert_eq!(account.keys().unwrap()[0], seed());
        let keyset = account.local_keyset().unwrap();
        assert_eq!(keyset.public_keys(), account.address());
        assert_eq!(keyset.guard()["pred"], "keys-all");
        assert_eq!(keyset.guard()["keys"][0], PUBKEY);

        // already unlocked: password is not checked again
        account.unlock("anything").unwrap();

        account.lock();
        assert!(matches!(account.keys(), Err(ReporterError::AccountLocked(_))));
    }

    #[test]
    fn test_caps_attach_to_last_key() {
        let (_dir, ks) = keystore();
        ks.create("reporter", "keys-any", &[1], &[generate_seed(), seed()], "pw").unwrap();
        let mut account = ks.get("reporter").unwrap();
        account.unlock("pw").unwrap();
        let pairs = account
            .key_pairs_with_caps(vec![Capability::new("coin.GAS", vec![])])
            .unwrap();
        assert!(pairs[0].clist.is_none());
        assert_eq!(pairs[1].clist.as_ref().unwrap()[0].name, "coin.GAS");
        assert_eq!(pairs[1].public_key(), PUBKEY);
    }

    #[test]
    fn test_tampered_address_rejected_on_unlock() {
        let (_dir, ks) = keystore();
        let account = ks.create("reporter", "keys-all", &[1], &[seed()], "123").unwrap();
        let mut data = account.data().clone();
        data.address = vec![generate_seed().public_key_hex()];
        fs::write(account.keyfile(), serde_json::to_string(&data).unwrap()).unwrap();

        let mut reloaded = ks.get("reporter").unwrap();
        assert!(matches!(reloaded.unlock("123"), Err(ReporterError::Authentication)));
    }

    #[test]
    fn test_unlock_uses_recorded_kdf() {
        let (_dir, ks) = keystore();
        ks.create("reporter", "keys-all", &[1], &[seed()], "123").unwrap();
        assert_eq!(ks.get("reporter").unwrap().data().kdf, Some(KdfParams::insecure_fast()));

        // a keystore configured with different cost still opens older keyfiles
        let reconfigured = Keystore::open(ks.home()).unwrap();
        let mut account = reconfigured.get("reporter").unwrap();
        account.unlock("123").unwrap();
        assert_eq!(account.keys().unwrap()[0], seed());
    }

    #[test]
    fn test_excessive_recorded_kdf_rejected() {
        let (_dir, ks) = keystore();
        let account = ks.create("reporter", "keys-all", &[1], &[seed()], "123").unwrap();
        let mut data = account.data().clone();
        data.kdf = Some(KdfParams {
            iterations: 200_000,
            ..KdfParams::insecure_fast()
        });
        fs::write(account.keyfile(), serde_json::to_string(&data).unwrap()).unwrap();

        let started = std::time::Instant::now();
        let mut reloaded = ks.get("reporter").unwrap();
        assert!(matches!(reloaded.unlock("123"), Err(ReporterError::Authentication)));
        assert!(started.elapsed() < std::time::Duration::from_secs(2));

        let default = KdfParams::default();
        assert!(default.within_ceiling(&KdfParams::insecure_fast()));
        let four_times = KdfParams {
            memory_kib: default.memory_kib * 4,
            ..default
        };
        assert!(four_times.within_ceiling(&default));
        let too_much = KdfParams {
            memory_kib: default.memory_kib * 4 + 1,
            ..default
        };
        assert!(!too_much.within_ceiling(&default));
        assert!(too_much.within_ceiling(&too_much));
    }

    #[test]
    fn test_find_and_list() {
        let (_dir, ks) = keystore();
        ks.create("alice", "keys-all", &[0, 1], &[seed()], "pw").unwrap();
        ks.create("bob", "keys-all", &[2], &[generate_seed()], "pw").unwrap();
        fs::write(ks.home().join("notes.txt"), "ignored").unwrap();

        assert_eq!(ks.list_names().unwrap(), vec!["alice", "bob"]);
        assert_eq!(ks.find(&AccountFilter::default()).unwrap().len(), 2);

        let by_chain = ks
            .find(&AccountFilter {
                chain_id: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_chain.len(), 1);
        assert_eq!(by_chain[0].name(), "alice");

        let by_address = ks
            .find(&AccountFilter {
                address: Some(vec![PUBKEY.to_string()]),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_address[0].name(), "alice");

        let none = ks
            .find(&AccountFilter {
                name: Some("alice".to_string()),
                chain_id: Some(2),
                address: None,
            })
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_get_missing_and_delete() {
        let (_dir, ks) = keystore();
        assert!(matches!(ks.get("ghost"), Err(ReporterError::AccountNotFound(_))));

        ks.create("reporter", "keys-all", &[1], &[seed()], "123").unwrap();
        assert!(ks.delete("reporter").unwrap());
        assert!(!ks.keyfile_path("reporter").exists());
        assert!(!ks.delete("reporter").unwrap());
        assert!(ks.list_names().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_inputs() {
        let (_dir, ks) = keystore();
        for bad in ["", "../escape", "a/b", ".hidden", "two words"] {
            assert!(matches!(
                ks.create(bad, "keys-all", &[1], &[seed()], "pw"),
                Err(ReporterError::Validation(_))
            ));
        }
        assert!(matches!(ks.create("empty", "keys-all", &[1], &[], "pw"), Err(ReporterError::Validation(_))));
        assert!(matches!(ks.create("nopred", "", &[1], &[seed()], "pw"), Err(ReporterError::Validation(_))));
        // k: accounts are valid names
        ks.create(&format!("k:{PUBKEY}"), "keys-all", &[1], &[seed()], "pw").unwrap();
    }
}
