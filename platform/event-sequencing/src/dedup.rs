//! Consumer-side deduplication checkpoints

use sqlx::{PgPool, Postgres, Transaction};

/// Classification of an incoming sequence against the stored checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// `sequence <= last`: already processed, ack and skip
    Duplicate,
    /// `sequence > last + 1`: process, but a hole exists. Producer outages
    /// can create permanent holes that must not stall a partition.
    Gap { expected: i64 },
    /// Next expected sequence (or first contact with this partition)
    InOrder,
}

impl SequenceCheck {
    /// Classify `incoming` against the last processed sequence, if any.
    pub fn classify(incoming: i64, last: Option<i64>) -> Self {
        match last {
            Some(last) if incoming <= last => SequenceCheck::Duplicate,
            Some(last) if incoming > last + 1 => SequenceCheck::Gap { expected: last + 1 },
            _ => SequenceCheck::InOrder,
        }
    }
}

/// Read the last processed sequence for `(consumer_name, partition_key)`.
/// `None` means this consumer has never processed the partition.
pub async fn get_last(
    pool: &PgPool,
    consumer_name: &str,
    partition_key: &str,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"
        SELECT last_sequence
        FROM event_dedup_checkpoint
        WHERE consumer_name = $1 AND partition_key = $2
        "#,
    )
    .bind(consumer_name)
    .bind(partition_key)
    .fetch_optional(pool)
    .await
}

/// Advance the checkpoint within the transaction that commits the side
/// effect of processing.
///
/// The upsert takes `GREATEST(existing, incoming)`, so the checkpoint never
/// decreases: a late arrival of an already-skipped sequence leaves it
/// untouched.
pub async fn tx_advance(
    tx: &mut Transaction<'_, Postgres>,
    consumer_name: &str,
    partition_key: &str,
    new_seq: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO event_dedup_checkpoint (consumer_name, partition_key, last_sequence, updated_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (consumer_name, partition_key)
        DO UPDATE SET
            last_sequence = GREATEST(event_dedup_checkpoint.last_sequence, EXCLUDED.last_sequence),
            updated_at = NOW()
        "#,
    )
    .bind(consumer_name)
    .bind(partition_key)
    .bind(new_seq)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
