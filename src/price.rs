// Exchange price sources for spot price reports
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ReporterError, Result};
use crate::reporter::{PricePoint, PriceSource, SpotPrice};

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| ReporterError::Network {
            url: String::new(),
            source: e,
        })
}

fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

/// CoinGecko `simple/price`.
pub struct CoinGecko {
    client: Client,
    base_url: String,
    coin_id: String,
    currency: String,
}

impl CoinGecko {
    pub const DEFAULT_URL: &'static str = "https://api.coingecko.com/api/v3";

    pub fn new(query: &SpotPrice) -> Result<Self> {
        Self::with_base_url(query, Self::DEFAULT_URL)
    }

    pub fn with_base_url(query: &SpotPrice, base_url: impl Into<String>) -> Result<Self> {
        let coin_id = match query.asset.as_str() {
            "kda" => "kadena",
            "btc" => "bitcoin",
            "eth" => "ethereum",
            "trb" => "tellor",
            other => {
                return Err(ReporterError::Validation(format!(
                    "CoinGecko has no coin id for {}",
                    other
                )))
            }
        };
        Ok(Self {
            client: http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            coin_id: coin_id.to_string(),
            currency: query.currency.clone(),
        })
    }

    async fn fetch(&self) -> Result<Decimal> {
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.base_url, self.coin_id, self.currency
        );
        let data: HashMap<String, HashMap<String, Value>> = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ReporterError::Network {
                url: url.clone(),
                source: e,
            })?
            .json()
            .await
            .map_err(|e| ReporterError::Network {
                url: url.clone(),
                source: e,
            })?;
        data.get(&self.coin_id)
            .and_then(|prices| prices.get(&self.currency))
            .and_then(decimal_from_json)
            .ok_or_else(|| ReporterError::PriceUnavailable(format!("CoinGecko {}", self.coin_id)))
    }
}

#[async_trait]
impl PriceSource for CoinGecko {
    async fn fetch_price(&self) -> Option<PricePoint> {
        match self.fetch().await {
            Ok(value) => Some(PricePoint {
                value,
                timestamp: Utc::now(),
            }),
            Err(e) => {
                warn!(source = "coingecko", error = %e, "price fetch failed");
                None
            }
        }
    }
}

/// Kraken public ticker; last trade price.
pub struct Kraken {
    client: Client,
    base_url: String,
    pair: String,
}

#[derive(Deserialize)]
struct KrakenResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, KrakenTicker>,
}

#[derive(Deserialize)]
struct KrakenTicker {
    c: Vec<String>, // last trade closed: [price, lot volume]
}

impl Kraken {
    pub const DEFAULT_URL: &'static str = "https://api.kraken.com/0/public";

    pub fn new(query: &SpotPrice) -> Result<Self> {
        Self::with_base_url(query, Self::DEFAULT_URL)
    }

    pub fn with_base_url(query: &SpotPrice, base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            pair: format!("{}{}", query.asset, query.currency).to_uppercase(),
        })
    }

    async fn fetch(&self) -> Result<Decimal> {
        let url = format!("{}/Ticker?pair={}", self.base_url, self.pair);
        let data: KrakenResponse = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ReporterError::Network {
                url: url.clone(),
                source: e,
            })?
            .json()
            .await
            .map_err(|e| ReporterError::Network {
                url: url.clone(),
                source: e,
            })?;
        if !data.error.is_empty() {
            return Err(ReporterError::PriceUnavailable(data.error.join(", ")));
        }
        // Kraken keys results by its own pair name (XXBTZUSD for BTCUSD)
        data.result
            .values()
            .next()
            .and_then(|t| t.c.first())
            .and_then(|p| Decimal::from_str(p).ok())
            .ok_or_else(|| ReporterError::PriceUnavailable(format!("Kraken {}", self.pair)))
    }
}

#[async_trait]
impl PriceSource for Kraken {
    async fn fetch_price(&self) -> Option<PricePoint> {
        match self.fetch().await {
            Ok(value) => Some(PricePoint {
                value,
                timestamp: Utc::now(),
            }),
            Err(e) => {
                warn!(source = "kraken", error = %e, "price fetch failed");
                None
            }
        }
    }
}

/// Average of every source that answered. `None` only if all failed.
pub struct AveragePrice {
    sources: Vec<Box<dyn PriceSource>>,
}

impl AveragePrice {
    pub fn new(sources: Vec<Box<dyn PriceSource>>) -> Self {
        Self { sources }
    }

    /// The exchanges that quote `query`.
    pub fn for_query(query: &SpotPrice) -> Result<Self> {
        let mut sources: Vec<Box<dyn PriceSource>> = vec![Box::new(Kraken::new(query)?)];
        match CoinGecko::new(query) {
            Ok(source) => sources.push(Box::new(source)),
            Err(e) => debug!(error = %e, "skipping CoinGecko"),
        }
        Ok(Self::new(sources))
    }
}

#[async_trait]
impl PriceSource for AveragePrice {
    async fn fetch_price(&self) -> Option<PricePoint> {
        let mut quotes = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            if let Some(point) = source.fetch_price().await {
                quotes.push(point);
            }
        }
        if quotes.is_empty() {
            return None;
        }
        let sum: Decimal = quotes.iter().map(|q| q.value).sum();
        let timestamp = quotes.iter().map(|q| q.timestamp).max()?;
        Some(PricePoint {
            value: sum / Decimal::from(quotes.len()),
            timestamp,
        })
    }
}
