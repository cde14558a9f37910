//! Typed handle on one deployed contract module.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use super::chainweb::{ChainwebClient, Receipt};
use crate::account::ChainedAccount;
use crate::command::{
    assemble_code, build_meta, prepare_exec_cmd, simple_exec_cmd, Capability, CodeArg,
    ExecOptions, Meta, SendRequest, SignedCommand,
};
use crate::error::{ReporterError, Result};

/// Gas settings applied to every command a module builds.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct GasSettings {
    pub price: f64,
    pub limit: u64,
    /// Limit for `local` reads, which are never charged
    pub read_limit: u64,
}

impl Default for GasSettings {
    fn default() -> Self {
        Self {
            price: 1e-7,
            limit: 150_000,
            read_limit: 600,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Module {
    client: ChainwebClient,
    namespace: String,
    module_name: String,
    network_id: String,
    chain_id: String,
    explorer: Option<String>,
    gas: GasSettings,
}

impl Module {
    pub fn new(
        client: ChainwebClient,
        namespace: impl Into<String>,
        module_name: impl Into<String>,
        network_id: impl Into<String>,
        chain_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            module_name: module_name.into(),
            network_id: network_id.into(),
            chain_id: chain_id.into(),
            explorer: None,
            gas: GasSettings::default(),
        }
    }

    pub fn with_explorer(mut self, explorer: Option<String>) -> Self {
        self.explorer = explorer;
        self
    }

    pub fn with_gas(mut self, gas: GasSettings) -> Self {
        self.gas = gas;
        self
    }

    pub fn client(&self) -> &ChainwebClient {
        &self.client
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn network_id(&self) -> &str {
        &self.network_id
    }

    /// `namespace.module`, or the bare module name outside a namespace.
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.module_name.clone()
        } else {
            format!("{}.{}", self.namespace, self.module_name)
        }
    }

    /// Code text calling `function` of this module.
    pub fn call_code(&self, function: &str, args: &[(&str, CodeArg)]) -> String {
        assemble_code(&format!("{}.{}", self.qualified_name(), function), args)
    }

    /// Unsigned command for a `local` call of `function`.
    pub fn mk_read_cmd(&self, function: &str, args: &[(&str, CodeArg)]) -> Result<SignedCommand> {
        self.read_cmd_for(&self.qualified_name(), function, args)
    }

    pub async fn read(&self, function: &str, args: &[(&str, CodeArg)]) -> Result<Value> {
        let cmd = self.mk_read_cmd(function, args)?;
        self.client.local(&cmd).await
    }

    /// Read from another module on the same chain; `module` is fully
    /// qualified (e.g. `coin`).
    pub async fn read_any_module(
        &self,
        module: &str,
        function: &str,
        args: &[(&str, CodeArg)],
    ) -> Result<Value> {
        let cmd = self.read_cmd_for(module, function, args)?;
        self.client.local(&cmd).await
    }

    fn read_cmd_for(
        &self,
        module: &str,
        function: &str,
        args: &[(&str, CodeArg)],
    ) -> Result<SignedCommand> {
        if module.is_empty() || function.is_empty() {
            return Err(ReporterError::Validation(
                "module and function names are required".to_string(),
            ));
        }
        let code = assemble_code(&format!("{}.{}", module, function), args);
        let meta = Meta::for_read(&self.chain_id, self.gas.read_limit)?;
        prepare_exec_cmd(
            &code,
            meta,
            ExecOptions {
                network_id: Some(self.network_id.clone()),
                ..Default::default()
            },
        )
    }

    /// Signed `send` body for `code`, paid for and signed by `account`.
    pub fn mk_exec_cmd(
        &self,
        account: &ChainedAccount,
        code: &str,
        env_data: Option<Value>,
        clist: Option<Vec<Capability>>,
    ) -> Result<SendRequest> {
        let key_pairs = match clist {
            Some(caps) => account.key_pairs_with_caps(caps)?,
            None => account.key_pairs()?,
        };
        let meta = build_meta(
            account.name(),
            &self.chain_id,
            self.gas.price,
            self.gas.limit,
            None,
            None,
        )?;
        simple_exec_cmd(
            code,
            meta,
            ExecOptions {
                key_pairs,
                env_data,
                network_id: Some(self.network_id.clone()),
                nonce: None,
            },
        )
    }

    /// Submit `code` and wait for its receipt. A failed transaction is
    /// returned as [`ReporterError::Chain`].
    pub async fn send_exec(
        &self,
        account: &ChainedAccount,
        code: &str,
        env_data: Option<Value>,
        clist: Option<Vec<Capability>>,
    ) -> Result<Receipt> {
        let request = self.mk_exec_cmd(account, code, env_data, clist)?;
        let keys = self.client.send(&request).await?;
        let receipt = self
            .client
            .fetch_receipt_with_retry(&keys, self.client.policy().receipt_retries)
            .await?;

        if let Some(explorer) = &self.explorer {
            info!(
                "Link to receipt: {}/tx/{}",
                explorer.trim_end_matches('/'),
                receipt.request_key
            );
        }
        if !receipt.is_success() {
            let message = receipt.error_message().unwrap_or("unknown error").to_string();
            error!(request_key = %receipt.request_key, %message, "transaction failed");
            return Err(ReporterError::Chain(format!(
                "{} failed: {}",
                receipt.request_key, message
            )));
        }
        info!(request_key = %receipt.request_key, "transaction succeeded");
        Ok(receipt)
    }
}
