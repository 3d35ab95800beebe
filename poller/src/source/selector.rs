use super::EndpointSelector;
use crate::model::EndpointHandle;
use async_trait::async_trait;
use poller_core::{Error, Result};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Picks an endpoint by probing configured candidates and taking the
/// fastest responder.
pub struct ProbingSelector {
    client: reqwest::Client,
    candidates: Vec<String>,
}

impl ProbingSelector {
    pub fn new(candidates: Vec<String>, probe_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(probe_timeout).build()?;

        Ok(Self { client, candidates })
    }

    async fn probe(&self, url: &str) -> Option<Duration> {
        let started = Instant::now();
        let result = self
            .client
            .get(format!("{}/v1/chain/get_info", url))
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(_) => Some(started.elapsed()),
            Err(e) => {
                debug!(endpoint = url, error = %e, "Endpoint probe failed");
                None
            }
        }
    }
}

#[async_trait]
impl EndpointSelector for ProbingSelector {
    #[instrument(skip(self))]
    async fn select(&self, capability: &str, pool_size: usize) -> Result<EndpointHandle> {
        let sample: Vec<&str> = self
            .candidates
            .iter()
            .map(String::as_str)
            .take(pool_size)
            .collect();

        if sample.is_empty() {
            return Err(Error::Selection(format!(
                "no candidate endpoints configured for {}",
                capability
            )));
        }

        let probes = sample.iter().map(|url| async move {
            self.probe(url).await.map(|latency| (*url, latency))
        });

        let mut responders: Vec<(&str, Duration)> = futures::future::join_all(probes)
            .await
            .into_iter()
            .flatten()
            .collect();

        responders.sort_by_key(|(_, latency)| *latency);

        match responders.first() {
            Some((url, latency)) => {
                debug!(
                    endpoint = url,
                    latency_ms = latency.as_millis(),
                    responders = responders.len(),
                    "Selected endpoint"
                );
                Ok(EndpointHandle::new(*url))
            }
            None => {
                warn!(
                    capability,
                    probed = sample.len(),
                    "No endpoint responded to probe"
                );
                Err(Error::Selection(format!(
                    "none of {} probed {} endpoints responded",
                    sample.len(),
                    capability
                )))
            }
        }
    }
}
