// Chainweb pact API client
pub mod chainweb;
pub mod module;
pub mod retry;

#[cfg(test)]
pub(crate) mod mock;

pub use chainweb::{parse_local_result, ChainwebClient, Receipt, RequestKeys, TxStatus};
pub use module::{GasSettings, Module};
pub use retry::{calculate_backoff, EndpointKind, RetryPolicy};
