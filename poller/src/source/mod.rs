pub mod hyperion;
pub mod selector;

use crate::model::{EndpointHandle, RawAction};
use async_trait::async_trait;
use poller_core::Result;

/// Remote history reader over one chosen endpoint.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Fetch one page of raw actions for `account` starting at `position`.
    ///
    /// Returns zero or more records in upstream order. Fails whole on
    /// transport, timeout, or decode problems; never a partial page. No
    /// retry happens here, that policy belongs to the poll cycle.
    async fn fetch_page(
        &self,
        endpoint: &EndpointHandle,
        account: &str,
        position: i64,
    ) -> Result<Vec<RawAction>>;
}

/// Best-effort picker of a usable upstream endpoint.
#[async_trait]
pub trait EndpointSelector: Send + Sync {
    /// Pick an endpoint for `capability`, probing at most `pool_size`
    /// candidates. May return a degraded endpoint; no uptime guarantee.
    async fn select(&self, capability: &str, pool_size: usize) -> Result<EndpointHandle>;
}

pub use hyperion::HyperionSource;
pub use selector::ProbingSelector;
