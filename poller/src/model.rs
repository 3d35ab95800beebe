use serde::{Deserialize, Serialize};

/// One record from the upstream action log.
///
/// Opaque to the poller apart from the fields lifted out of the trace for
/// filtering and bookkeeping; `data` carries the full record as returned
/// by the history service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAction {
    pub account: String,
    pub action_seq: i64,
    pub kind: String,
    pub trx_id: String,
    pub block_time: String,
    pub data: serde_json::Value,
}

/// The actions kept from one stream during one cycle, in fetch order.
#[derive(Debug, Clone)]
pub struct FilteredBatch {
    pub stream_id: String,
    pub actions: Vec<RawAction>,
}

impl FilteredBatch {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            actions: Vec::new(),
        }
    }

    pub fn push(&mut self, action: RawAction) {
        self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Opaque reference to a chosen history endpoint.
///
/// Swapped out wholesale on failover, never mutated in place, so streams
/// share no endpoint state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointHandle(String);

impl EndpointHandle {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn url(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EndpointHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-stream fetch state. Owned by exactly one worker for its lifetime;
/// the position is the sole resumability token.
#[derive(Debug, Clone)]
pub struct StreamCursor {
    stream_id: String,
    position: i64,
    endpoint: EndpointHandle,
}

impl StreamCursor {
    pub fn new(stream_id: impl Into<String>, position: i64, endpoint: EndpointHandle) -> Self {
        Self {
            stream_id: stream_id.into(),
            position,
            endpoint,
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// The resumable offset to persist after a cycle.
    pub fn current_position(&self) -> i64 {
        self.position
    }

    /// Move past a successfully fetched page. A length of 0 is a legal
    /// no-op meaning the upstream had no new data.
    pub fn advance(&mut self, page_length: usize) {
        self.position += page_length as i64;
    }

    pub fn endpoint(&self) -> &EndpointHandle {
        &self.endpoint
    }

    pub fn set_endpoint(&mut self, endpoint: EndpointHandle) {
        self.endpoint = endpoint;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn handle() -> EndpointHandle {
        EndpointHandle::new("https://wax.greymass.com")
    }

    #[test]
    fn advance_accumulates_page_lengths() {
        let mut cursor = StreamCursor::new("runlog", 1000, handle());
        cursor.advance(50);
        cursor.advance(30);
        assert_eq!(cursor.current_position(), 1080);
    }

    #[test]
    fn advance_by_zero_is_a_no_op() {
        let mut cursor = StreamCursor::new("runlog", 1000, handle());
        cursor.advance(0);
        assert_eq!(cursor.current_position(), 1000);
    }

    #[test]
    fn endpoint_swap_replaces_handle() {
        let mut cursor = StreamCursor::new("fuel", 0, handle());
        cursor.set_endpoint(EndpointHandle::new("https://wax.eosphere.io"));
        assert_eq!(cursor.endpoint().url(), "https://wax.eosphere.io");
    }
}
