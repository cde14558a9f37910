use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::client::{GasSettings, RetryPolicy};
use crate::error::{ReporterError, Result};
use crate::keyfile::KdfParams;

/// Where the reporter sends its transactions.
pub trait EndpointSource {
    fn chain_id(&self) -> u32;
    fn network(&self) -> &str;
    fn url(&self) -> Result<&str>;
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChainwebEndpoint {
    pub chain_id: u32,
    pub network: String,
    #[serde(default)]
    pub provider: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(transparent)]
pub struct EndpointList(pub Vec<ChainwebEndpoint>);

impl EndpointList {
    /// Endpoints matching every given criterion.
    pub fn find(&self, chain_id: Option<u32>, network: Option<&str>) -> Vec<&ChainwebEndpoint> {
        self.0
            .iter()
            .filter(|ep| chain_id.map_or(true, |id| ep.chain_id == id))
            .filter(|ep| network.map_or(true, |n| ep.network == n))
            .collect()
    }
}

impl Default for EndpointList {
    fn default() -> Self {
        Self(vec![
            ChainwebEndpoint {
                chain_id: 1,
                network: "mainnet01".to_string(),
                provider: "Kadena".to_string(),
                url: "https://api.chainweb.com/chainweb/0.0/mainnet01/chain/1/pact/api/v1/"
                    .to_string(),
                explorer: Some("https://explorer.chainweb.com/mainnet".to_string()),
            },
            ChainwebEndpoint {
                chain_id: 1,
                network: "testnet04".to_string(),
                provider: "Kadena".to_string(),
                url: "https://api.testnet.chainweb.com/chainweb/0.0/testnet04/chain/1/pact/api/v1/"
                    .to_string(),
                explorer: Some("https://explorer.chainweb.com/testnet".to_string()),
            },
        ])
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct MainConfig {
    pub log_level: String,
    pub chain_id: u32,
    pub network: String,
    /// Namespace the oracle module is deployed under
    pub namespace: String,
    pub module: String,
}

impl Default for MainConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            chain_id: 1,
            network: "testnet04".to_string(),
            namespace: "free".to_string(),
            module: "tellorflex".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct KeystoreConfig {
    pub home: PathBuf,
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        let kdf = KdfParams::default();
        Self {
            home: default_keystore_home(),
            memory_kib: kdf.memory_kib,
            iterations: kdf.iterations,
            parallelism: kdf.parallelism,
        }
    }
}

impl KeystoreConfig {
    pub fn kdf(&self) -> KdfParams {
        KdfParams {
            memory_kib: self.memory_kib,
            iterations: self.iterations,
            parallelism: self.parallelism,
        }
    }
}

fn default_keystore_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chainweb_reporter")
        .join("keystore")
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_secs: f64,
    pub backoff_factor: f64,
    pub receipt_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            initial_backoff_secs: policy.initial_backoff.as_secs_f64(),
            backoff_factor: policy.backoff_factor,
            receipt_retries: policy.receipt_retries,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> Result<RetryPolicy> {
        if !self.initial_backoff_secs.is_finite() || self.initial_backoff_secs < 0.0 {
            return Err(ReporterError::Config(format!(
                "initial_backoff_secs must be a non-negative number, got {}",
                self.initial_backoff_secs
            )));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ReporterError::Config(format!(
                "backoff_factor must be at least 1, got {}",
                self.backoff_factor
            )));
        }
        Ok(RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_secs_f64(self.initial_backoff_secs),
            backoff_factor: self.backoff_factor,
            receipt_retries: self.receipt_retries,
        })
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct ReporterConfig {
    pub main: MainConfig,
    pub endpoints: EndpointList,
    pub keystore: KeystoreConfig,
    pub retry: RetryConfig,
    pub gas: GasSettings,
}

impl ReporterConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ReporterError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ReporterError::Config(e.to_string()))
    }

    /// Load `path`. A missing file is created with defaults; an unreadable
    /// or invalid one falls back to defaults with a warning.
    pub fn load_or_default(path: &Path) -> Self {
        let (config, source) = Self::load(path);
        source.log(path);
        config
    }

    /// Like `load_or_default`, but returns what happened instead of logging
    /// it, so callers can report it once logging is set up.
    pub fn load(path: &Path) -> (Self, ConfigSource) {
        if !path.exists() {
            let config = Self::default();
            let source = match config.write(path) {
                Ok(()) => ConfigSource::Created,
                Err(e) => ConfigSource::WriteFailed(e.to_string()),
            };
            return (config, source);
        }
        match std::fs::read_to_string(path) {
            Ok(s) => match Self::from_toml(&s) {
                Ok(c) => (c, ConfigSource::Loaded),
                Err(e) => (Self::default(), ConfigSource::Invalid(e.to_string())),
            },
            Err(e) => (Self::default(), ConfigSource::Unreadable(e.to_string())),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// The endpoint for the configured network and chain.
    pub fn get_endpoint(&self) -> Result<&ChainwebEndpoint> {
        self.endpoints
            .find(Some(self.main.chain_id), Some(&self.main.network))
            .into_iter()
            .next()
            .ok_or_else(|| {
                ReporterError::Config(format!(
                    "endpoint not found for chain_id={} network={}",
                    self.main.chain_id, self.main.network
                ))
            })
    }
}

/// Outcome of `ReporterConfig::load`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Loaded,
    Created,
    WriteFailed(String),
    Invalid(String),
    Unreadable(String),
}

impl ConfigSource {
    pub fn log(&self, path: &Path) {
        let path = path.display();
        match self {
            ConfigSource::Loaded => info!(path = %path, "config loaded"),
            ConfigSource::Created => info!(path = %path, "config not found, created default"),
            ConfigSource::WriteFailed(e) => {
                warn!(path = %path, error = %e, "config not found, could not write default")
            }
            ConfigSource::Invalid(e) => warn!(path = %path, error = %e, "invalid config, using defaults"),
            ConfigSource::Unreadable(e) => {
                warn!(path = %path, error = %e, "unreadable config, using defaults")
            }
        }
    }

    /// Whether defaults replaced a file that was present.
    pub fn fell_back(&self) -> bool {
        matches!(self, ConfigSource::Invalid(_) | ConfigSource::Unreadable(_))
    }
}

impl EndpointSource for ReporterConfig {
    fn chain_id(&self) -> u32 {
        self.main.chain_id
    }

    fn network(&self) -> &str {
        &self.main.network
    }

    fn url(&self) -> Result<&str> {
        Ok(&self.get_endpoint()?.url)
    }
}
