//! Chat-completion client used for failure analysis.
//!
//! Provides the `ChatProvider` trait, the `DynProvider` wrapper, the request
//! and response types, and `AzureOpenAiAdapter` for Azure-hosted deployments.

mod azure;
mod provider;
mod types;

pub use azure::{AzureOpenAiAdapter, AzureOpenAiConfig};
pub use provider::*;
pub use types::*;
