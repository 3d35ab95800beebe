use super::HistorySource;
use crate::model::{EndpointHandle, RawAction};
use async_trait::async_trait;
use poller_core::{Error, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
struct ActionsResponse {
    actions: Vec<serde_json::Value>,
}

/// History reader speaking the v1 `get_actions` API.
pub struct HyperionSource {
    client: reqwest::Client,
    page_size: u32,
}

impl HyperionSource {
    pub fn new(page_size: u32, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self { client, page_size })
    }

    /// Lift the kind discriminator and bookkeeping fields out of one raw
    /// record. The record itself stays opaque and is carried whole.
    fn parse_action(account: &str, raw: serde_json::Value) -> Result<RawAction> {
        let kind = raw
            .pointer("/action_trace/act/name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Internal("action record is missing act.name".to_string()))?
            .to_string();

        let action_seq = raw
            .get("account_action_seq")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| {
                Error::Internal("action record is missing account_action_seq".to_string())
            })?;

        let trx_id = raw
            .pointer("/action_trace/trx_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let block_time = raw
            .pointer("/action_trace/block_time")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(RawAction {
            account: account.to_string(),
            action_seq,
            kind,
            trx_id,
            block_time,
            data: raw,
        })
    }

    fn parse_page(
        endpoint: &EndpointHandle,
        account: &str,
        raw_actions: Vec<serde_json::Value>,
    ) -> Result<Vec<RawAction>> {
        raw_actions
            .into_iter()
            .map(|raw| {
                Self::parse_action(account, raw).map_err(|e| Error::Fetch {
                    endpoint: endpoint.url().to_string(),
                    details: e.to_string(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl HistorySource for HyperionSource {
    #[instrument(skip(self), fields(endpoint = %endpoint))]
    async fn fetch_page(
        &self,
        endpoint: &EndpointHandle,
        account: &str,
        position: i64,
    ) -> Result<Vec<RawAction>> {
        let url = format!("{}/v1/history/get_actions", endpoint.url());

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "account_name": account,
                "pos": position,
                "offset": self.page_size,
            }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Fetch {
                endpoint: endpoint.url().to_string(),
                details: e.to_string(),
            })?;

        let body: ActionsResponse = response.json().await.map_err(|e| Error::Fetch {
            endpoint: endpoint.url().to_string(),
            details: format!("malformed actions response: {}", e),
        })?;

        let page = Self::parse_page(endpoint, account, body.actions)?;

        debug!(
            account,
            position,
            page_len = page.len(),
            "Fetched history page"
        );

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_record(seq: i64, name: &str) -> serde_json::Value {
        json!({
            "account_action_seq": seq,
            "action_trace": {
                "trx_id": "ab12cd",
                "block_time": "2022-03-01T12:00:00.500",
                "act": {
                    "account": "century.game",
                    "name": name,
                    "data": { "railroader": "greenish.wam" }
                }
            }
        })
    }

    #[test]
    fn parses_kind_and_sequence_from_trace() {
        let action =
            HyperionSource::parse_action("rr.century", sample_record(1_896_200, "logrun")).unwrap();
        assert_eq!(action.kind, "logrun");
        assert_eq!(action.action_seq, 1_896_200);
        assert_eq!(action.account, "rr.century");
        assert_eq!(action.trx_id, "ab12cd");
        assert_eq!(action.block_time, "2022-03-01T12:00:00.500");
    }

    #[test]
    fn record_without_act_name_is_rejected() {
        let raw = json!({ "account_action_seq": 1, "action_trace": { "act": {} } });
        assert!(HyperionSource::parse_action("rr.century", raw).is_err());
    }

    #[test]
    fn page_parse_failure_is_a_fetch_error() {
        let endpoint = EndpointHandle::new("https://wax.greymass.com");
        let result = HyperionSource::parse_page(
            &endpoint,
            "rr.century",
            vec![sample_record(5, "logrun"), json!({ "noise": true })],
        );
        assert!(matches!(result, Err(Error::Fetch { .. })));
    }

    #[test]
    fn full_record_is_carried_as_data() {
        let raw = sample_record(9, "usefuel");
        let action = HyperionSource::parse_action("m.century", raw.clone()).unwrap();
        assert_eq!(action.data, raw);
    }
}
