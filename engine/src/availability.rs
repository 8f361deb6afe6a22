//! Sellable quantity per item.
//!
//! `available = max(0, stock - reserved)`. Stock and reserved counter are read
//! together with one multi-get so the pair comes from a single round trip.

use crate::context::{EngineContext, store_failure};
use crate::error::{EngineError, Result};
use crate::types::{ItemId, StockCount};
use serde::Serialize;
use stockhold_core::store::parse_counter;

/// Stock, reserved units and what is left to sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Availability {
    /// On-hand stock.
    pub stock: u64,
    /// Units held by live reservations.
    pub reserved: u64,
    /// `max(0, stock - reserved)`.
    pub available: u64,
}

/// Computes availability from the ledger and reserved counters.
#[derive(Debug, Clone)]
pub struct AvailabilityCalculator {
    ctx: EngineContext,
}

impl AvailabilityCalculator {
    pub(crate) const fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Stock, reserved and available units of `item`. Absent counters read as 0.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StoreUnavailable`] on store failure and
    /// [`EngineError::CorruptRecord`] if a counter is not an integer.
    pub async fn snapshot(&self, item: &ItemId) -> Result<Availability> {
        let keys = vec![self.ctx.keys.stock(item), self.ctx.keys.reserved(item)];
        let values = self
            .ctx
            .store
            .get_many(&keys)
            .await
            .map_err(store_failure("available"))?;

        let read = |index: usize| -> Result<u64> {
            let key = &keys[index];
            let raw = values.get(index).and_then(Option::as_deref);
            parse_counter(key, raw)
                .map(|value| StockCount::from_stored(value).get())
                .map_err(|e| EngineError::CorruptRecord {
                    key: key.clone(),
                    reason: e.to_string(),
                })
        };
        let stock = read(0)?;
        let reserved = read(1)?;

        Ok(Availability {
            stock,
            reserved,
            available: stock.saturating_sub(reserved),
        })
    }

    /// Units of `item` that can still be reserved.
    ///
    /// # Errors
    ///
    /// See [`snapshot`](Self::snapshot).
    pub async fn available(&self, item: &ItemId) -> Result<u64> {
        Ok(self.snapshot(item).await?.available)
    }

    /// Like [`available`](Self::available), but reports 0 when the store fails.
    ///
    /// For display paths where "sold out" is the safe answer.
    pub async fn available_or_zero(&self, item: &ItemId) -> u64 {
        match self.available(item).await {
            Ok(available) => available,
            Err(e) => {
                tracing::error!(item_id = %item, error = %e, "Availability unknown, reporting zero");
                0
            }
        }
    }
}
