use clap::Subcommand;

use crate::account::{AccountFilter, ChainedAccount, Keystore};
use crate::config::ReporterConfig;
use crate::crypto::{generate_seed, SecretSeed};
use crate::error::Result;

#[derive(Subcommand, Debug, Clone)]
pub enum KeysetCommands {
    /// Encrypt keys into a new keyset account
    Add {
        name: String,
        /// Hex private key; repeat for multi-key keysets. Omit to generate one.
        #[arg(long = "key")]
        keys: Vec<String>,
        #[arg(long, default_value = "keys-all")]
        pred: String,
        /// Chain the account is used on; repeat for several
        #[arg(long = "chain")]
        chains: Vec<u32>,
        #[arg(long, env = "REPORTER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// List account names
    List,
    /// Find accounts by chain and/or public keys
    Find {
        #[arg(long)]
        chain: Option<u32>,
        /// Public key; repeat to match the exact key list
        #[arg(long = "address")]
        addresses: Vec<String>,
    },
    /// Delete an account's keyfile
    Delete { name: String },
    /// Show an account; with a password, also its on-chain guard
    Show {
        name: String,
        #[arg(long, env = "REPORTER_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

pub fn open_keystore(config: &ReporterConfig) -> Result<Keystore> {
    Ok(Keystore::open(&config.keystore.home)?.with_kdf(config.keystore.kdf()))
}

fn print_account(account: &ChainedAccount) {
    println!("{}", account.name());
    println!("  chains:  {:?}", account.chains());
    println!("  pred:    {}", account.predicate());
    for key in account.address() {
        println!("  key:     {}", key);
    }
    println!("  keyfile: {}", account.keyfile().display());
}

pub fn handle_keyset_command(cmd: KeysetCommands, config: &ReporterConfig) -> Result<()> {
    let keystore = open_keystore(config)?;
    match cmd {
        KeysetCommands::Add {
            name,
            keys,
            pred,
            chains,
            password,
        } => {
            let seeds = if keys.is_empty() {
                vec![generate_seed()]
            } else {
                keys.iter()
                    .map(|k| SecretSeed::from_hex(k.trim()))
                    .collect::<Result<Vec<_>>>()?
            };
            let chains = if chains.is_empty() {
                vec![config.main.chain_id]
            } else {
                chains
            };
            let account = keystore.create(&name, &pred, &chains, &seeds, &password)?;
            println!("Created keyset account:");
            print_account(&account);
        }
        KeysetCommands::List => {
            let names = keystore.list_names()?;
            if names.is_empty() {
                println!("No accounts in {}", keystore.home().display());
            }
            for name in names {
                println!("{}", name);
            }
        }
        KeysetCommands::Find { chain, addresses } => {
            let filter = AccountFilter {
                name: None,
                chain_id: chain,
                address: (!addresses.is_empty()).then_some(addresses),
            };
            let found = keystore.find(&filter)?;
            if found.is_empty() {
                println!("No matching accounts");
            }
            for account in &found {
                print_account(account);
            }
        }
        KeysetCommands::Delete { name } => {
            if keystore.delete(&name)? {
                println!("Deleted {}", name);
            } else {
                println!("No account named {}", name);
            }
        }
        KeysetCommands::Show { name, password } => {
            let mut account = keystore.get(&name)?;
            print_account(&account);
            if let Some(password) = password {
                account.unlock(&password)?;
                let guard = account.local_keyset()?.guard();
                println!("  guard:   {}", serde_json::to_string(&guard)?);
                account.lock();
            }
        }
    }
    Ok(())
}
