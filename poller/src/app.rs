use crate::coordinator::PollCycleCoordinator;
use crate::model::{EndpointHandle, StreamCursor};
use crate::source::{EndpointSelector, HistorySource, HyperionSource, ProbingSelector};
use crate::store::{PgSink, Sink};
use crate::worker::IngestionWorker;
use poller_core::{Config, Result};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

pub struct App {
    coordinator: PollCycleCoordinator,
}

impl App {
    #[instrument(skip(config, pool))]
    pub async fn new(config: Config, pool: PgPool) -> Result<Self> {
        info!("Initializing poller");

        let sink = Arc::new(PgSink::new(
            pool,
            config.poller.sink_max_retries,
            config.poller.sink_retry_base_delay_ms,
        ));
        sink.health_check().await?;

        let source: Arc<dyn HistorySource> = Arc::new(HyperionSource::new(
            config.poller.page_size,
            Duration::from_secs(config.poller.request_timeout_secs),
        )?);

        let selector: Arc<dyn EndpointSelector> = Arc::new(ProbingSelector::new(
            config.poller.endpoints.clone(),
            Duration::from_secs(config.poller.probe_timeout_secs),
        )?);

        // Initial endpoint: best probed candidate, falling back to the
        // first configured one when nothing responds yet.
        let initial_endpoint = match selector
            .select("history", config.poller.endpoint_pool_size)
            .await
        {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!(
                    error = %e,
                    "Initial endpoint selection failed, starting on the first configured endpoint"
                );
                EndpointHandle::new(config.poller.endpoints[0].clone())
            }
        };

        let mut workers = Vec::with_capacity(config.poller.streams.len());
        for stream in &config.poller.streams {
            let position = sink
                .load_cursor(&stream.id)
                .await?
                .unwrap_or(stream.start_position);

            info!(
                stream = %stream.id,
                account = %stream.account,
                position,
                filters = ?stream.actions,
                "Stream ready"
            );

            let cursor = StreamCursor::new(stream.id.clone(), position, initial_endpoint.clone());
            workers.push((IngestionWorker::new(source.clone(), stream.clone()), cursor));
        }

        let coordinator = PollCycleCoordinator::new(
            workers,
            selector,
            sink,
            Duration::from_secs(config.poller.cycle_floor_secs),
            config.poller.worker_count,
            config.poller.endpoint_pool_size,
        );

        Ok(Self { coordinator })
    }

    pub async fn run(mut self) -> Result<()> {
        self.coordinator.run().await
    }
}
