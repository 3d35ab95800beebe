use crate::model::StreamCursor;
use crate::source::EndpointSelector;
use crate::store::Sink;
use crate::worker::IngestionWorker;
use futures::StreamExt;
use metrics::{counter, histogram};
use poller_core::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

const HISTORY_CAPABILITY: &str = "history";

struct StreamState {
    worker: IngestionWorker,
    cursor: StreamCursor,
}

/// Runs all stream workers once per cycle, hands their batches to the
/// sink, swaps endpoints for streams that failed, and paces cycles to a
/// minimum wall-clock duration.
pub struct PollCycleCoordinator {
    streams: Vec<StreamState>,
    selector: Arc<dyn EndpointSelector>,
    sink: Arc<dyn Sink>,
    cycle_floor: Duration,
    worker_count: usize,
    endpoint_pool_size: usize,
}

impl PollCycleCoordinator {
    pub fn new(
        workers: Vec<(IngestionWorker, StreamCursor)>,
        selector: Arc<dyn EndpointSelector>,
        sink: Arc<dyn Sink>,
        cycle_floor: Duration,
        worker_count: usize,
        endpoint_pool_size: usize,
    ) -> Self {
        let streams = workers
            .into_iter()
            .map(|(worker, cursor)| StreamState { worker, cursor })
            .collect();

        Self {
            streams,
            selector,
            sink,
            cycle_floor,
            worker_count,
            endpoint_pool_size,
        }
    }

    /// Poll until a shutdown signal arrives. Nothing inside a cycle is
    /// fatal to the loop; every error path returns control to the next
    /// cycle.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            streams = self.streams.len(),
            floor_secs = self.cycle_floor.as_secs_f64(),
            "Starting poll loop"
        );

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown signal received");
                    let _ = shutdown_tx.send(()).await;
                }
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
        });

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutting down poll loop");
                    break;
                }

                _ = self.run_cycle() => {}
            }
        }

        Ok(())
    }

    /// One pass: fan out all stream workers, collect every report, hand
    /// batches to the sink, fail over broken streams, then pace.
    #[instrument(skip(self))]
    async fn run_cycle(&mut self) {
        let started = Instant::now();

        // Fan-out: each stream's state moves into its own future; workers
        // share no mutable state, so no locking between streams.
        let states = std::mem::take(&mut self.streams);
        let mut in_flight = futures::stream::iter(states.into_iter().map(|mut state| async move {
            let report = state.worker.run_cycle(&mut state.cursor).await;
            (state, report)
        }))
        .buffer_unordered(self.worker_count.max(1));

        // Collect: the cycle advances only once every worker has returned.
        let mut outcomes = Vec::new();
        while let Some(outcome) = in_flight.next().await {
            outcomes.push(outcome);
        }
        drop(in_flight);

        for (mut state, report) in outcomes {
            let stream_id = state.cursor.stream_id().to_string();

            // Handoff: empty batches still participate.
            match self.sink.persist(&stream_id, &report.batch).await {
                Ok(stored) => {
                    if let Err(e) = self
                        .sink
                        .save_cursor(&stream_id, state.cursor.current_position())
                        .await
                    {
                        warn!(stream = %stream_id, error = %e, "Failed to checkpoint cursor");
                    }

                    if stored > 0 {
                        info!(
                            stream = %stream_id,
                            stored,
                            position = state.cursor.current_position(),
                            "Stored filtered actions"
                        );
                    }
                }
                Err(e) => {
                    // The sink's internal retries have already run; the
                    // loop carries on to the next cycle regardless.
                    warn!(stream = %stream_id, error = %e, "Sink rejected batch");
                }
            }

            if report.failover_needed {
                self.fail_over(&mut state).await;
            }

            self.streams.push(state);
        }

        let elapsed = started.elapsed();
        histogram!("poller_cycle_duration_ms").record(elapsed.as_millis() as f64);

        // Pacing floor: bounds the request rate against the upstream even
        // when every stream returns instantly or empty.
        if elapsed < self.cycle_floor {
            tokio::time::sleep(self.cycle_floor - elapsed).await;
        }
    }

    /// Swap the stream onto a fresh endpoint. Selection failure keeps the
    /// previous handle; the stream simply tries again next cycle.
    async fn fail_over(&self, state: &mut StreamState) {
        match self
            .selector
            .select(HISTORY_CAPABILITY, self.endpoint_pool_size)
            .await
        {
            Ok(endpoint) => {
                info!(
                    stream = state.cursor.stream_id(),
                    from = %state.cursor.endpoint(),
                    to = %endpoint,
                    "Failing over to a new endpoint"
                );
                counter!("poller_failovers", "stream" => state.cursor.stream_id().to_string())
                    .increment(1);
                state.cursor.set_endpoint(endpoint);
            }
            Err(e) => {
                warn!(
                    stream = state.cursor.stream_id(),
                    endpoint = %state.cursor.endpoint(),
                    error = %e,
                    "Endpoint selection failed, keeping current endpoint"
                );
            }
        }
    }
}
