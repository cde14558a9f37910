//! Encrypted keyset accounts.
//!
//! - One JSON keyfile per account under an injected keystore root
//! - Seeds encrypted at rest, decrypted only into an unlocked account
//! - Public keys always re-derived from the seeds on unlock

pub mod store;
pub mod types;

pub use store::{AccountFilter, Keystore};
pub use types::{AccountState, ChainedAccount, Keyfile, LocalKeyset};
