pub mod keyset;
pub mod ops;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::command::CodeArg;
use crate::config::ReporterConfig;
use crate::error::Result;

#[derive(Parser)]
#[command(name = "chainweb_reporter")]
#[command(about = "Oracle reporter for Chainweb chains", long_about = None)]
pub struct Cli {
    /// TOML config file (created with defaults if missing)
    #[arg(long, global = true, default_value = "reporter.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Keyset account management
    Keyset {
        #[command(subcommand)]
        cmd: keyset::KeysetCommands,
    },
    /// Call a module function locally (no transaction)
    Read {
        /// Fully qualified module, e.g. `coin` or `free.tellorflex`
        module: String,
        function: String,
        /// Positional argument as name=value; repeat in declaration order
        #[arg(long = "arg", value_parser = ops::parse_code_arg)]
        args: Vec<(String, CodeArg)>,
    },
    /// Report spot prices to the oracle on an interval
    Report {
        #[arg(long, short)]
        account: String,
        #[arg(long, env = "REPORTER_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value = "kda")]
        asset: String,
        #[arg(long, default_value = "usd")]
        currency: String,
        /// Seconds between reports
        #[arg(long, default_value_t = 7)]
        interval: u64,
        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<u64>,
    },
    /// Config file management
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Write the default config
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective config
    Show,
}

pub async fn run(cli: Cli, config: ReporterConfig) -> Result<()> {
    match cli.command {
        Commands::Keyset { cmd } => keyset::handle_keyset_command(cmd, &config),
        Commands::Read {
            module,
            function,
            args,
        } => ops::handle_read(&config, &module, &function, args).await,
        Commands::Report {
            account,
            password,
            asset,
            currency,
            interval,
            cycles,
        } => {
            ops::handle_report(&config, &account, &password, &asset, &currency, interval, cycles)
                .await
        }
        Commands::Config { cmd } => ops::handle_config(cmd, &cli.config, &config),
    }
}
