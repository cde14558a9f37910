//! Oracle reporting cycle: price → encoded value → signed `submit-value`
//! → receipt.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

use crate::account::ChainedAccount;
use crate::client::{Module, Receipt};
use crate::command::CodeArg;
use crate::encoding::{b64url_encode_string, hash};
use crate::error::{ReporterError, Result};

/// Reported values are fixed point with this many decimals.
pub const VALUE_DECIMALS: u32 = 18;

#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub value: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Anything that can quote the current price. `None` means unavailable.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_price(&self) -> Option<PricePoint>;
}

/// A spot price query such as kda/usd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotPrice {
    pub asset: String,
    pub currency: String,
}

impl SpotPrice {
    pub fn new(asset: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            asset: asset.into().to_lowercase(),
            currency: currency.into().to_lowercase(),
        }
    }

    /// Query descriptor as the oracle contract expects it.
    pub fn query_text(&self) -> String {
        format!("{{SpotPrice: {{{},{}}}}}", self.asset, self.currency)
    }

    pub fn query_data(&self) -> String {
        b64url_encode_string(&self.query_text())
    }

    pub fn query_id(&self) -> String {
        query_id(&self.query_text())
    }
}

/// Query id: hash of the URL-safe base64 query text.
pub fn query_id(query_text: &str) -> String {
    hash(&b64url_encode_string(query_text))
}

/// Scale `value` to an 18-decimal integer (fraction truncated) and encode
/// its decimal string.
pub fn encode_value(value: Decimal) -> Result<String> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ReporterError::Validation(format!(
            "cannot report negative value {}",
            value
        )));
    }
    let scale = Decimal::from_i128_with_scale(10i128.pow(VALUE_DECIMALS), 0);
    let scaled = value
        .checked_mul(scale)
        .and_then(|v| v.trunc().to_i128())
        .ok_or_else(|| ReporterError::Validation(format!("value {} is out of range", value)))?;
    Ok(b64url_encode_string(&scaled.to_string()))
}

/// Count of cycles that ended in a confirmed submission vs. an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub submitted: u64,
    pub failed: u64,
}

pub struct Reporter<S: PriceSource> {
    oracle: Module,
    account: ChainedAccount,
    source: S,
}

impl<S: PriceSource> Reporter<S> {
    /// `account` must already be unlocked; it pays for and signs every
    /// submission.
    pub fn new(oracle: Module, account: ChainedAccount, source: S) -> Self {
        info!(account = %account.name(), oracle = %oracle.qualified_name(), "reporter ready");
        Self {
            oracle,
            account,
            source,
        }
    }

    pub fn account(&self) -> &ChainedAccount {
        &self.account
    }

    /// Number of values already reported for `query_id`, used as the nonce
    /// of the next submission. An unknown query id has count 0.
    pub async fn report_count(&self, query_id: &str) -> Result<u64> {
        let response = self
            .oracle
            .read(
                "get-new-value-count-by-query-id",
                &[("queryId", CodeArg::from(query_id))],
            )
            .await;
        match response {
            Ok(value) => parse_integer(&value).ok_or_else(|| {
                ReporterError::Chain(format!("unexpected report count {}", value))
            }),
            // no reports yet for this query id
            Err(ReporterError::Chain(msg)) if msg == format!("read: row not found: {}", query_id) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Fetch a price and submit it, returning the confirmed receipt.
    pub async fn report_once(&self, query: &SpotPrice) -> Result<Receipt> {
        let price = self.source.fetch_price().await.ok_or_else(|| {
            ReporterError::PriceUnavailable(query.query_text())
        })?;
        info!(query = %query.query_text(), value = %price.value, at = %price.timestamp, "price fetched");

        let value = encode_value(price.value)?;
        let query_id = query.query_id();
        let nonce = self.report_count(&query_id).await?;

        let code = format!(
            "({}.submit-value (read-string \"queryId\") (read-string \"value\") \
             (read-integer \"nonce\") (read-string \"queryData\") (read-string \"staker\"))",
            self.oracle.qualified_name()
        );
        let env_data = json!({
            "nonce": nonce,
            "queryData": query.query_data(),
            "queryId": query_id,
            "staker": self.account.name(),
            "value": value,
        });
        info!(%query_id, nonce, "sending submit-value transaction");
        self.oracle
            .send_exec(&self.account, &code, Some(env_data), None)
            .await
    }

    /// Report every `interval` until `max_cycles` is reached (forever when
    /// `None`). A failed cycle is logged and the loop continues.
    pub async fn run(
        &self,
        query: &SpotPrice,
        interval: Duration,
        max_cycles: Option<u64>,
    ) -> ReportSummary {
        let mut summary = ReportSummary::default();
        let mut cycle: u64 = 0;
        loop {
            cycle += 1;
            match self.report_once(query).await {
                Ok(receipt) => {
                    summary.submitted += 1;
                    info!(cycle, request_key = %receipt.request_key, "value reported");
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(cycle, error = %e, "report failed");
                }
            }
            if max_cycles.map_or(false, |max| cycle >= max) {
                break;
            }
            info!(secs = interval.as_secs_f64(), "sleeping until next report");
            tokio::time::sleep(interval).await;
        }
        summary
    }
}

// Integers come back either bare or as `{"int": n}`.
fn parse_integer(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::Object(map) => map.get("int").and_then(parse_integer),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
