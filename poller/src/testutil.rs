use crate::model::{EndpointHandle, FilteredBatch, RawAction};
use crate::source::{EndpointSelector, HistorySource};
use crate::store::Sink;
use async_trait::async_trait;
use poller_core::{Error, Result};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

pub fn action(kind: &str, seq: i64) -> RawAction {
    RawAction {
        account: "test".to_string(),
        action_seq: seq,
        kind: kind.to_string(),
        trx_id: format!("trx-{}", seq),
        block_time: "2022-03-01T12:00:00.000".to_string(),
        data: json!({ "seq": seq }),
    }
}

pub fn page_of(kind: &str, len: usize) -> Vec<RawAction> {
    (0..len).map(|i| action(kind, i as i64)).collect()
}

/// History source fed from per-account scripts of page outcomes. Records
/// every fetch so tests can assert on positions; an exhausted script
/// yields empty pages (upstream idle).
pub struct ScriptedSource {
    scripts: Mutex<HashMap<String, VecDeque<std::result::Result<Vec<RawAction>, ()>>>>,
    fetches: Mutex<Vec<(String, i64, String)>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fetches: Mutex::new(Vec::new()),
        }
    }

    pub fn script(&self, account: &str, pages: Vec<std::result::Result<Vec<RawAction>, ()>>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(account.to_string(), pages.into());
    }

    pub fn fetch_positions(&self, account: &str) -> Vec<i64> {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _, _)| a == account)
            .map(|(_, pos, _)| *pos)
            .collect()
    }
}

#[async_trait]
impl HistorySource for ScriptedSource {
    async fn fetch_page(
        &self,
        endpoint: &EndpointHandle,
        account: &str,
        position: i64,
    ) -> Result<Vec<RawAction>> {
        self.fetches.lock().unwrap().push((
            account.to_string(),
            position,
            endpoint.url().to_string(),
        ));

        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(account)
            .and_then(|pages| pages.pop_front());

        match next {
            Some(Ok(page)) => Ok(page),
            Some(Err(())) => Err(Error::Fetch {
                endpoint: endpoint.url().to_string(),
                details: "scripted failure".to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }
}

/// Selector that always returns one fixed endpoint, or always fails.
pub struct StaticSelector {
    endpoint: Option<String>,
    calls: Mutex<Vec<(String, usize)>>,
}

impl StaticSelector {
    pub fn healthy(endpoint: &str) -> Self {
        Self {
            endpoint: Some(endpoint.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            endpoint: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EndpointSelector for StaticSelector {
    async fn select(&self, capability: &str, pool_size: usize) -> Result<EndpointHandle> {
        self.calls
            .lock()
            .unwrap()
            .push((capability.to_string(), pool_size));

        match &self.endpoint {
            Some(url) => Ok(EndpointHandle::new(url)),
            None => Err(Error::Selection("pool exhausted".to_string())),
        }
    }
}

/// In-memory sink capturing persisted batches and cursor checkpoints.
pub struct MemorySink {
    batches: Mutex<Vec<(String, Vec<RawAction>)>>,
    cursors: Mutex<HashMap<String, i64>>,
    fail_persist: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            cursors: Mutex::new(HashMap::new()),
            fail_persist: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_persist: true,
            ..Self::new()
        }
    }

    /// Size of the most recent batch persisted for a stream.
    pub fn batch_len(&self, stream_id: &str) -> Option<usize> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _)| id == stream_id)
            .map(|(_, actions)| actions.len())
    }

    pub fn cursor(&self, stream_id: &str) -> Option<i64> {
        self.cursors.lock().unwrap().get(stream_id).copied()
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn persist(&self, stream_id: &str, batch: &FilteredBatch) -> Result<usize> {
        if self.fail_persist {
            return Err(Error::Sink("scripted sink failure".to_string()));
        }

        self.batches
            .lock()
            .unwrap()
            .push((stream_id.to_string(), batch.actions.clone()));
        Ok(batch.len())
    }

    async fn save_cursor(&self, stream_id: &str, position: i64) -> Result<()> {
        self.cursors
            .lock()
            .unwrap()
            .insert(stream_id.to_string(), position);
        Ok(())
    }

    async fn load_cursor(&self, stream_id: &str) -> Result<Option<i64>> {
        Ok(self.cursor(stream_id))
    }
}
