//! # Batch Repository
//!
//! The only component that touches the durable store. The orchestrator
//! calls `load`/`save`; nothing else issues storage operations. One row
//! per `batch_id`, the full `BatchState` serialized into a JSONB column —
//! tasks are never queried independent of their batch, so no normalized
//! task table is needed.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::BatchState;
use crate::error::ConveyorResult;

#[async_trait]
pub trait BatchRepository: Send + Sync {
    /// Load the persisted state for `batch_id`, if any batch with that id
    /// has ever been started.
    async fn load(&self, batch_id: &str) -> ConveyorResult<Option<BatchState>>;

    /// Durably persist `state`, replacing any prior snapshot for the same
    /// `batch_id`. Called after every mutation the durability contract of
    /// §4.4 requires to survive a crash.
    async fn save(&self, state: &BatchState) -> ConveyorResult<()>;

    /// Whether a batch with this id has already been started (used by
    /// `start_batch`'s idempotency check without paying for a full load).
    async fn exists(&self, batch_id: &str) -> ConveyorResult<bool>;
}

#[derive(Debug, Clone)]
pub struct PgBatchRepository {
    pool: PgPool,
}

impl PgBatchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BatchRepository for PgBatchRepository {
    async fn load(&self, batch_id: &str) -> ConveyorResult<Option<BatchState>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT state FROM batch_states WHERE batch_id = $1")
                .bind(batch_id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((value,)) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, state: &BatchState) -> ConveyorResult<()> {
        let value = serde_json::to_value(state)?;
        sqlx::query(
            r#"
            INSERT INTO batch_states (batch_id, state, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (batch_id)
            DO UPDATE SET state = EXCLUDED.state, updated_at = now()
            "#,
        )
        .bind(&state.batch_id)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn exists(&self, batch_id: &str) -> ConveyorResult<bool> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM batch_states WHERE batch_id = $1")
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}
