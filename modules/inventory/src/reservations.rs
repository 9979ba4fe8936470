//! Process-local reservation memo
//!
//! Remembers completed reservation outcomes per order id so a redelivered
//! order (legacy frames carry no sequence to dedupe on) does not decrement
//! stock twice within one process lifetime. The durable dedup checkpoint is
//! authoritative across restarts.

use crate::repos::stock_repo::ReserveOutcome;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct ReservationCache {
    completed: Mutex<HashMap<String, ReserveOutcome>>,
}

impl ReservationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcome of a previously completed reservation for this order, if any
    pub fn get(&self, order_id: &str) -> Option<ReserveOutcome> {
        self.completed
            .lock()
            .expect("reservation cache poisoned")
            .get(order_id)
            .cloned()
    }

    pub fn remember(&self, order_id: &str, outcome: ReserveOutcome) {
        self.completed
            .lock()
            .expect("reservation cache poisoned")
            .insert(order_id.to_string(), outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::StockLine;

    #[test]
    fn remembers_outcomes_per_order() {
        let cache = ReservationCache::new();
        assert!(cache.get("o1").is_none());

        let outcome = ReserveOutcome {
            reserved: vec![StockLine {
                product_id: "A".to_string(),
                quantity: 2,
            }],
            depleted: vec![],
        };
        cache.remember("o1", outcome.clone());

        assert_eq!(cache.get("o1"), Some(outcome));
        assert!(cache.get("o2").is_none());
    }
}
