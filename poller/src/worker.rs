use crate::model::{FilteredBatch, StreamCursor};
use crate::source::HistorySource;
use metrics::counter;
use poller_core::config::StreamConfig;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// What one stream produced during one cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub batch: FilteredBatch,
    pub pages_fetched: u32,
    pub records_seen: usize,
    /// Set when a fetch failed; the coordinator reacts by reassigning the
    /// stream to a different endpoint for subsequent cycles.
    pub failover_needed: bool,
}

/// Drives one stream's cursor through up to `page_budget` pages per cycle.
pub struct IngestionWorker {
    source: Arc<dyn HistorySource>,
    stream: StreamConfig,
    filters: HashSet<String>,
}

impl IngestionWorker {
    pub fn new(source: Arc<dyn HistorySource>, stream: StreamConfig) -> Self {
        let filters = stream.actions.iter().cloned().collect();
        Self {
            source,
            stream,
            filters,
        }
    }

    pub fn stream(&self) -> &StreamConfig {
        &self.stream
    }

    /// Fetch pages sequentially until the budget is spent, the upstream
    /// runs dry, or a fetch fails. The cursor advances by each page's
    /// returned length whether or not the records matched the filter set,
    /// so irrelevant kinds are skipped once and never re-read.
    pub async fn run_cycle(&self, cursor: &mut StreamCursor) -> CycleReport {
        let mut report = CycleReport {
            batch: FilteredBatch::new(cursor.stream_id()),
            pages_fetched: 0,
            records_seen: 0,
            failover_needed: false,
        };

        for _ in 0..self.stream.page_budget {
            let page = match self
                .source
                .fetch_page(
                    cursor.endpoint(),
                    &self.stream.account,
                    cursor.current_position(),
                )
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    // Abort the rest of this stream's cycle; the failed
                    // range is retried next cycle, possibly elsewhere.
                    warn!(
                        stream = cursor.stream_id(),
                        position = cursor.current_position(),
                        endpoint = %cursor.endpoint(),
                        error = %e,
                        "Page fetch failed, aborting stream for this cycle"
                    );
                    counter!("poller_fetch_failures", "stream" => cursor.stream_id().to_string())
                        .increment(1);
                    report.failover_needed = true;
                    break;
                }
            };

            let page_length = page.len();
            report.pages_fetched += 1;
            report.records_seen += page_length;

            for action in page {
                if self.filters.contains(&action.kind) {
                    report.batch.push(action);
                }
            }

            cursor.advance(page_length);

            if page_length == 0 {
                // Upstream has no more new data this cycle; not an error.
                break;
            }
        }

        counter!("poller_pages_fetched", "stream" => cursor.stream_id().to_string())
            .increment(report.pages_fetched as u64);
        counter!("poller_actions_matched", "stream" => cursor.stream_id().to_string())
            .increment(report.batch.len() as u64);

        debug!(
            stream = cursor.stream_id(),
            pages = report.pages_fetched,
            seen = report.records_seen,
            matched = report.batch.len(),
            position = cursor.current_position(),
            failover = report.failover_needed,
            "Stream cycle finished"
        );

        report
    }
}
