//! Producer-side sequence allocator

use sqlx::PgExecutor;

/// Allocate the next sequence number for a partition.
///
/// Implemented as an atomic upsert: the first allocation for a partition
/// creates the row at 1, every later allocation increments it. The row-level
/// lock taken by `ON CONFLICT DO UPDATE` serializes concurrent allocators on
/// the same partition, so returned values are strictly monotonic per
/// partition in invocation order.
///
/// Accepts any Postgres executor, so allocation can run on the pool or
/// inside the transaction that persists the side effect being described.
/// Callers must not publish if allocation fails.
pub async fn next_sequence<'e, E>(executor: E, partition_key: &str) -> Result<i64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO event_sequence (partition_key, last_sequence, updated_at)
        VALUES ($1, 1, NOW())
        ON CONFLICT (partition_key)
        DO UPDATE SET last_sequence = event_sequence.last_sequence + 1, updated_at = NOW()
        RETURNING last_sequence
        "#,
    )
    .bind(partition_key)
    .fetch_one(executor)
    .await
}
