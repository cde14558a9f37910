pub mod account;
pub mod cli;
pub mod client;
pub mod command;
pub mod config;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod keyfile;
pub mod price;
pub mod reporter;
