use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReporterError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid seed: {0}")]
    InvalidSeed(String),
    #[error("Authentication failed (wrong password or tampered keyfile)")]
    Authentication,
    #[error("Account locked: {0} must be unlocked to access key material")]
    AccountLocked(String),
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Account {0} already exists")]
    DuplicateAccount(String),
    #[error("Keyfile already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
    #[error("Network error calling {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Chain error: {0}")]
    Chain(String),
    #[error("Price unavailable: {0}")]
    PriceUnavailable(String),
    #[error("Receipt not found: {0}")]
    ReceiptNotFound(String),
    #[error("Sigs for different hashes found: expected {expected}, got {found}")]
    InconsistentHash { expected: String, found: String },
    #[error("Crypto error: {0}")]
    Crypto(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReporterError>;
