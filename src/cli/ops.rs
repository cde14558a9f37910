use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use super::keyset::open_keystore;
use super::ConfigCommands;
use crate::client::{ChainwebClient, Module};
use crate::command::CodeArg;
use crate::config::ReporterConfig;
use crate::error::{ReporterError, Result};
use crate::price::AveragePrice;
use crate::reporter::{Reporter, SpotPrice};

/// Parse `name=value`. Integers, decimals and booleans pass through as
/// literals; anything else (or a value wrapped in double quotes) is a string.
pub fn parse_code_arg(raw: &str) -> std::result::Result<(String, CodeArg), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {:?}", raw))?;
    if name.is_empty() {
        return Err(format!("argument name is empty in {:?}", raw));
    }
    let arg = if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        CodeArg::from(&value[1..value.len() - 1])
    } else if value == "true" || value == "false" || value.parse::<i64>().is_ok() {
        CodeArg::literal(value)
    } else if value.contains('.') && Decimal::from_str(value).is_ok() {
        CodeArg::literal(value)
    } else {
        CodeArg::from(value)
    };
    Ok((name.to_string(), arg))
}

/// The configured oracle module on the configured endpoint.
pub fn oracle_module(config: &ReporterConfig) -> Result<Module> {
    let endpoint = config.get_endpoint()?;
    let client = ChainwebClient::new(endpoint.url.clone(), config.retry.policy()?)?;
    Ok(Module::new(
        client,
        config.main.namespace.clone(),
        config.main.module.clone(),
        endpoint.network.clone(),
        endpoint.chain_id.to_string(),
    )
    .with_explorer(endpoint.explorer.clone())
    .with_gas(config.gas))
}

pub async fn handle_read(
    config: &ReporterConfig,
    module: &str,
    function: &str,
    args: Vec<(String, CodeArg)>,
) -> Result<()> {
    let oracle = oracle_module(config)?;
    let args: Vec<(&str, CodeArg)> = args
        .iter()
        .map(|(name, value)| (name.as_str(), value.clone()))
        .collect();
    let value = oracle.read_any_module(module, function, &args).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

pub async fn handle_report(
    config: &ReporterConfig,
    account: &str,
    password: &str,
    asset: &str,
    currency: &str,
    interval: u64,
    cycles: Option<u64>,
) -> Result<()> {
    let keystore = open_keystore(config)?;
    let mut account = keystore.get(account)?;
    if !account.chains().contains(&config.main.chain_id) {
        return Err(ReporterError::Validation(format!(
            "account {} is not set up for chain {}",
            account.name(),
            config.main.chain_id
        )));
    }
    account.unlock(password)?;

    let query = SpotPrice::new(asset, currency);
    let source = AveragePrice::for_query(&query)?;
    let reporter = Reporter::new(oracle_module(config)?, account, source);
    info!(query = %query.query_text(), interval, "starting reporter");

    let summary = reporter
        .run(&query, Duration::from_secs(interval), cycles)
        .await;
    println!(
        "Reported {} value(s), {} failed cycle(s)",
        summary.submitted, summary.failed
    );
    Ok(())
}

pub fn handle_config(cmd: ConfigCommands, path: &Path, config: &ReporterConfig) -> Result<()> {
    match cmd {
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                return Err(ReporterError::AlreadyExists(path.to_path_buf()));
            }
            ReporterConfig::default().write(path)?;
            println!("Wrote default config to {}", path.display());
        }
        ConfigCommands::Show => {
            print!("{}", config.to_toml()?);
        }
    }
    Ok(())
}
