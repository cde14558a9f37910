use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::meta::Meta;
use crate::crypto::SecretSeed;
use crate::encoding::{hash, hash_bin, CanonicalJson};
use crate::error::{ReporterError, Result};

/// Scoped permission attached to one signature.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Capability {
    pub args: Vec<Value>,
    pub name: String,
}

impl Capability {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            args,
            name: name.into(),
        }
    }
}

/// Signing material for one signer. A pair without a secret key still
/// declares a signer but contributes no signature.
#[derive(Debug, Clone)]
pub struct KeyPair {
    public_key: String,
    secret_key: Option<SecretSeed>,
    pub clist: Option<Vec<Capability>>,
}

impl KeyPair {
    pub fn from_seed(seed: SecretSeed) -> Self {
        Self {
            public_key: seed.public_key_hex(),
            secret_key: Some(seed),
            clist: None,
        }
    }

    pub fn public_only(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            secret_key: None,
            clist: None,
        }
    }

    pub fn with_clist(mut self, clist: Vec<Capability>) -> Self {
        self.clist = Some(clist);
        self
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn secret_key(&self) -> Option<&SecretSeed> {
        self.secret_key.as_ref()
    }
}

fn clist_is_empty(clist: &Option<Vec<Capability>>) -> bool {
    clist.as_ref().map_or(true, |c| c.is_empty())
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Signer {
    #[serde(rename = "pubKey")]
    pub pub_key: String,
    #[serde(default, skip_serializing_if = "clist_is_empty")]
    pub clist: Option<Vec<Capability>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExecPayload {
    pub data: Option<Value>,
    pub code: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Payload {
    pub exec: ExecPayload,
}

/// The envelope whose canonical JSON is hashed and signed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub network_id: Option<String>,
    pub payload: Payload,
    pub signers: Vec<Signer>,
    pub meta: Meta,
    pub nonce: String,
}

impl CanonicalJson for Command {}

/// Result of signing one command hash with one key pair.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureEntry {
    pub hash: String,
    pub sig: Option<String>,
    pub pub_key: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Sig {
    pub sig: String,
}

/// Wire form of a signed command.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SignedCommand {
    pub hash: String,
    pub sigs: Vec<Sig>,
    pub cmd: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SendRequest {
    pub cmds: Vec<SignedCommand>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub key_pairs: Vec<KeyPair>,
    pub env_data: Option<Value>,
    pub network_id: Option<String>,
    pub nonce: Option<String>,
}

/// Current UTC time, e.g. `2023-05-01T12:00:00.000123 UTC`.
pub fn formatted_time() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f UTC").to_string()
}

pub fn mk_signer(kp: &KeyPair) -> Signer {
    Signer {
        pub_key: kp.public_key().to_string(),
        clist: kp.clist.clone().filter(|c| !c.is_empty()),
    }
}

impl Command {
    pub fn new(code: &str, meta: Meta, opts: &ExecOptions) -> Result<Self> {
        if code.trim().is_empty() {
            return Err(ReporterError::Validation("expected non-empty code".to_string()));
        }
        let data = match &opts.env_data {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) if map.is_empty() => None,
            Some(other) => Some(other.clone()),
        };
        Ok(Self {
            network_id: opts.network_id.clone(),
            payload: Payload {
                exec: ExecPayload {
                    data,
                    code: code.to_string(),
                },
            },
            signers: opts.key_pairs.iter().map(mk_signer).collect(),
            meta,
            nonce: opts.nonce.clone().unwrap_or_else(formatted_time),
        })
    }
}

/// Hash `cmd` once and sign that hash with every key pair.
///
/// Pairs without a secret key yield an unsigned placeholder rather than
/// failing the batch; an empty list yields a single placeholder so the hash
/// is still available.
pub fn attach_sig(cmd: &str, key_pairs: &[KeyPair]) -> Vec<SignatureEntry> {
    let hsh_bin = hash_bin(cmd);
    let hsh = hash(cmd);
    if key_pairs.is_empty() {
        return vec![SignatureEntry {
            hash: hsh,
            sig: None,
            pub_key: None,
        }];
    }
    key_pairs
        .iter()
        .map(|kp| SignatureEntry {
            hash: hsh.clone(),
            sig: kp.secret_key.as_ref().map(|sk| sk.sign_hex(&hsh_bin)),
            pub_key: Some(kp.public_key.clone()),
        })
        .collect()
}

/// Number of entries that carry no signature.
pub fn missing_signatures(sigs: &[SignatureEntry]) -> usize {
    sigs.iter().filter(|s| s.sig.is_none()).count()
}

/// Assemble the wire command, dropping unsigned placeholders.
///
/// Every entry must carry the hash of `cmd`; anything else means signatures
/// from different commands were mixed.
pub fn mk_single_cmd(sigs: &[SignatureEntry], cmd: String) -> Result<SignedCommand> {
    let first = sigs
        .first()
        .ok_or_else(|| ReporterError::Validation("list of signatures is empty".to_string()))?;
    if let Some(other) = sigs.iter().find(|s| s.hash != first.hash) {
        return Err(ReporterError::InconsistentHash {
            expected: first.hash.clone(),
            found: other.hash.clone(),
        });
    }
    let cmd_hash = hash(&cmd);
    if cmd_hash != first.hash {
        return Err(ReporterError::InconsistentHash {
            expected: cmd_hash,
            found: first.hash.clone(),
        });
    }
    Ok(SignedCommand {
        hash: first.hash.clone(),
        sigs: sigs
            .iter()
            .filter_map(|s| s.sig.clone().map(|sig| Sig { sig }))
            .collect(),
        cmd,
    })
}

pub fn prepare_exec_cmd(code: &str, meta: Meta, opts: ExecOptions) -> Result<SignedCommand> {
    let cmd = Command::new(code, meta, &opts)?.canonical_json()?;
    let sigs = attach_sig(&cmd, &opts.key_pairs);
    let missing = missing_signatures(&sigs);
    if missing > 0 && !opts.key_pairs.is_empty() {
        tracing::warn!(missing, "command has signers without a secret key");
    }
    mk_single_cmd(&sigs, cmd)
}

pub fn mk_public_send(cmds: Vec<SignedCommand>) -> SendRequest {
    SendRequest { cmds }
}

/// Prepare a single signed command wrapped for the `send` endpoint.
pub fn simple_exec_cmd(code: &str, meta: Meta, opts: ExecOptions) -> Result<SendRequest> {
    Ok(mk_public_send(vec![prepare_exec_cmd(code, meta, opts)?]))
}
