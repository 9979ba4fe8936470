//! Repository for stock rows and the atomic reservation
//!
//! Availability is never negative and is only decremented under the row
//! lock taken inside the reservation transaction.

use chrono::{DateTime, Utc};
use contracts::{DepletedLine, StockLine};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StockItem {
    pub product_id: String,
    pub available: i32,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a reservation attempt: either every line was reserved, or the
/// shortage lines explain why nothing was.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReserveOutcome {
    pub reserved: Vec<StockLine>,
    pub depleted: Vec<DepletedLine>,
}

impl ReserveOutcome {
    pub fn is_depleted(&self) -> bool {
        !self.depleted.is_empty()
    }
}

pub async fn get(pool: &PgPool, product_id: &str) -> Result<Option<StockItem>, sqlx::Error> {
    sqlx::query_as::<_, StockItem>(
        "SELECT product_id, available, updated_at FROM inventory_stock WHERE product_id = $1",
    )
    .bind(product_id)
    .fetch_optional(pool)
    .await
}

/// Upsert the absolute availability of a product (operator adjustment)
pub async fn set_available(
    pool: &PgPool,
    product_id: &str,
    available: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO inventory_stock (product_id, available, updated_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (product_id) DO UPDATE SET available = EXCLUDED.available, updated_at = NOW()
        "#,
    )
    .bind(product_id)
    .bind(available)
    .execute(pool)
    .await?;

    Ok(())
}

/// All-or-nothing reservation across the given lines, inside the caller's
/// transaction.
///
/// Each product row is locked with `SELECT ... FOR UPDATE` in input order
/// (callers should present sorted product ids to avoid cross-order
/// deadlocks); a missing row counts as zero availability. If any line is
/// short, no row is touched and the shortage lines come back with what was
/// requested and what was there. Otherwise every line is decremented under
/// its lock. Concurrent reservations on the same products serialize on the
/// row locks, so the total reserved never exceeds availability.
pub async fn tx_reserve(
    tx: &mut Transaction<'_, Postgres>,
    lines: &[StockLine],
) -> Result<ReserveOutcome, sqlx::Error> {
    let mut outcome = ReserveOutcome::default();

    struct LockedLine {
        product_id: String,
        requested: i32,
    }
    let mut locked = Vec::with_capacity(lines.len());

    for line in lines {
        let available = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT available
            FROM inventory_stock
            WHERE product_id = $1
            FOR UPDATE
            "#,
        )
        .bind(&line.product_id)
        .fetch_optional(&mut **tx)
        .await?
        .unwrap_or(0);

        if available < line.quantity {
            outcome.depleted.push(DepletedLine {
                product_id: line.product_id.clone(),
                requested: line.quantity,
                available,
            });
        }
        locked.push(LockedLine {
            product_id: line.product_id.clone(),
            requested: line.quantity,
        });
    }

    if outcome.is_depleted() {
        // No mutation happened; the caller's commit releases the locks
        return Ok(outcome);
    }

    for line in locked {
        sqlx::query(
            r#"
            UPDATE inventory_stock
            SET available = available - $2, updated_at = NOW()
            WHERE product_id = $1
            "#,
        )
        .bind(&line.product_id)
        .bind(line.requested)
        .execute(&mut **tx)
        .await?;

        outcome.reserved.push(StockLine {
            product_id: line.product_id,
            quantity: line.requested,
        });
    }

    Ok(outcome)
}
