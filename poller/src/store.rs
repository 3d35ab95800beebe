use crate::model::FilteredBatch;
use async_trait::async_trait;
use metrics::counter;
use poller_core::backoff::retry_with_backoff;
use poller_core::Result;
use sqlx::PgPool;
use tracing::{debug, instrument};

/// Durable destination for one cycle's filtered actions.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Persist a stream's batch. Empty batches are accepted; the write is
    /// atomic from the caller's point of view. Returns how many records
    /// were newly stored.
    async fn persist(&self, stream_id: &str, batch: &FilteredBatch) -> Result<usize>;

    /// Record the stream's resumable position after a cycle.
    async fn save_cursor(&self, stream_id: &str, position: i64) -> Result<()>;

    /// Last stored position for a stream, if any.
    async fn load_cursor(&self, stream_id: &str) -> Result<Option<i64>>;
}

pub struct PgSink {
    pool: PgPool,
    max_retries: u32,
    retry_base_delay_ms: u64,
}

impl PgSink {
    pub fn new(pool: PgPool, max_retries: u32, retry_base_delay_ms: u64) -> Self {
        Self {
            pool,
            max_retries,
            retry_base_delay_ms,
        }
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_batch(&self, batch: &FilteredBatch) -> Result<usize> {
        let mut builder = sqlx::QueryBuilder::new(
            "INSERT INTO ledger_actions (account, action_seq, kind, trx_id, block_time, data) ",
        );

        builder.push_values(&batch.actions, |mut row, action| {
            row.push_bind(&action.account)
                .push_bind(action.action_seq)
                .push_bind(&action.kind)
                .push_bind(&action.trx_id)
                .push_bind(&action.block_time)
                .push_bind(&action.data);
        });

        // Re-delivery after a restart is expected; the sequence key makes
        // it a no-op.
        builder.push(" ON CONFLICT (account, action_seq) DO NOTHING");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() as usize)
    }
}

#[async_trait]
impl Sink for PgSink {
    #[instrument(skip(self, batch), fields(batch_len = batch.len()))]
    async fn persist(&self, stream_id: &str, batch: &FilteredBatch) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let stored = retry_with_backoff(
            || self.insert_batch(batch),
            self.max_retries,
            self.retry_base_delay_ms,
            "insert_batch",
        )
        .await?;

        counter!("poller_actions_stored", "stream" => stream_id.to_string())
            .increment(stored as u64);

        debug!(
            stream = stream_id,
            total = batch.len(),
            stored,
            duplicates = batch.len() - stored,
            "Persisted batch"
        );

        Ok(stored)
    }

    async fn save_cursor(&self, stream_id: &str, position: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stream_cursors (stream_id, position, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (stream_id) DO UPDATE
            SET position = EXCLUDED.position, updated_at = now()
            "#,
        )
        .bind(stream_id)
        .bind(position)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_cursor(&self, stream_id: &str) -> Result<Option<i64>> {
        let position: Option<i64> =
            sqlx::query_scalar("SELECT position FROM stream_cursors WHERE stream_id = $1")
                .bind(stream_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(position)
    }
}
