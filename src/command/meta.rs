use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{ReporterError, Result};

pub const DEFAULT_TTL: u64 = 1800;

/// Public chain metadata. Field order is part of the signed bytes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub creation_time: u64,
    pub ttl: u64,
    pub gas_limit: u64,
    pub chain_id: String,
    pub gas_price: f64,
    pub sender: String,
}

/// Build validated metadata. `creation_time` defaults to now (unix seconds),
/// `ttl` to [`DEFAULT_TTL`].
pub fn build_meta(
    sender: &str,
    chain_id: &str,
    gas_price: f64,
    gas_limit: u64,
    creation_time: Option<u64>,
    ttl: Option<u64>,
) -> Result<Meta> {
    if chain_id.is_empty() || !chain_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(ReporterError::Validation(format!(
            "expected chain_id to be a decimal string, got {:?}",
            chain_id
        )));
    }
    if !gas_price.is_finite() || gas_price < 0.0 {
        return Err(ReporterError::Validation(format!(
            "expected gas_price to be a non-negative number, got {}",
            gas_price
        )));
    }
    let ttl = ttl.unwrap_or(DEFAULT_TTL);
    if ttl == 0 {
        return Err(ReporterError::Validation("expected ttl to be positive".to_string()));
    }
    let creation_time = creation_time.unwrap_or_else(|| Utc::now().timestamp().max(0) as u64);

    Ok(Meta {
        creation_time,
        ttl,
        gas_limit,
        chain_id: chain_id.to_string(),
        gas_price,
        sender: sender.to_string(),
    })
}

impl Meta {
    /// Metadata for an unsigned local read: no sender, free gas.
    pub fn for_read(chain_id: &str, gas_limit: u64) -> Result<Self> {
        build_meta("", chain_id, 0.0, gas_limit, None, None)
    }
}
