//! Stock ledger: the durable on-hand count per item.
//!
//! Stock keys never expire. Counts are never negative: sales are
//! floor-clamped at zero, absolute sets reject negatives, and
//! [`StockLedger::repair_negative`] fixes values written by anything else.

use crate::audit::AuditEvent;
use crate::context::{EngineContext, store_failure};
use crate::error::{EngineError, Result, ValidationError};
use crate::metrics;
use crate::scripts::{CLAMP_NEGATIVE, DECREMENT_CLAMPED, REPLACE};
use crate::types::{ItemId, StockCount};
use serde::Serialize;
use std::collections::BTreeMap;
use stockhold_core::store::parse_counter;

/// Result of a clamped decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockDecrement {
    /// Count before the decrement.
    pub before: u64,
    /// Count after the decrement (never below zero).
    pub after: u64,
}

impl StockDecrement {
    /// Units actually removed.
    #[must_use]
    pub const fn removed(&self) -> u64 {
        self.before.saturating_sub(self.after)
    }
}

/// Owns stock counts.
#[derive(Debug, Clone)]
pub struct StockLedger {
    ctx: EngineContext,
}

impl StockLedger {
    pub(crate) const fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    fn read_stock(&self, key: &str, raw: Option<&str>) -> Result<u64> {
        parse_counter(key, raw)
            .map(|value| StockCount::from_stored(value).get())
            .map_err(|e| EngineError::CorruptRecord {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    /// Current stock of `item` (0 if never set).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StoreUnavailable`] on store failure and
    /// [`EngineError::CorruptRecord`] if the stored count is not an integer.
    pub async fn get_stock(&self, item: &ItemId) -> Result<u64> {
        let key = self.ctx.keys.stock(item);
        let raw = self
            .ctx
            .store
            .get(&key)
            .await
            .map_err(store_failure("get_stock"))?;
        self.read_stock(&key, raw.as_deref())
    }

    /// Set stock of `item` to an absolute value. Returns the previous count.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NegativeStock`] (ledger unchanged) if
    /// `quantity` is negative, or [`EngineError::StoreUnavailable`].
    pub async fn set_stock(&self, item: &ItemId, quantity: i64) -> Result<u64> {
        let current = StockCount::try_from_signed(quantity)?.get();
        let key = self.ctx.keys.stock(item);

        let previous = self
            .ctx
            .store
            .eval(&REPLACE, vec![key.clone()], vec![current.to_string()])
            .await
            .map_err(store_failure("set_stock"))?;
        let previous = parse_counter(&key, previous.as_deref())
            .map(|value| StockCount::from_stored(value).get())
            .unwrap_or(0);

        tracing::info!(item_id = %item, previous, current, "Stock set");
        self.ctx.audit(AuditEvent::StockSet {
            item_id: item.clone(),
            previous,
            current,
        });
        Ok(previous)
    }

    /// Add `amount` units of `item`. Returns the new count.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ZeroAmount`] if `amount` is 0, or
    /// [`EngineError::StoreUnavailable`].
    pub async fn increment_stock(&self, item: &ItemId, amount: u64) -> Result<u64> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        let delta = i64::try_from(amount).map_err(|_| ValidationError::ZeroAmount)?;
        let key = self.ctx.keys.stock(item);

        let current = self
            .ctx
            .store
            .incr_by(&key, delta)
            .await
            .map_err(store_failure("increment_stock"))?;
        let current = StockCount::from_stored(current).get();

        tracing::info!(item_id = %item, amount, current, "Stock incremented");
        self.ctx.audit(AuditEvent::Restocked {
            item_id: item.clone(),
            amount,
            current,
        });
        Ok(current)
    }

    /// Remove up to `amount` units of `item`, stopping at zero.
    ///
    /// Never fails for insufficient stock; compare `before` and `after` to see
    /// how much was removed.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::ZeroAmount`] if `amount` is 0, or
    /// [`EngineError::StoreUnavailable`].
    pub async fn decrement_stock(&self, item: &ItemId, amount: u64) -> Result<StockDecrement> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        let key = self.ctx.keys.stock(item);

        let reply = self
            .ctx
            .store
            .eval(&DECREMENT_CLAMPED, vec![key.clone()], vec![amount.to_string()])
            .await
            .map_err(store_failure("decrement_stock"))?;
        let decrement = parse_decrement(reply.as_deref()).ok_or_else(|| EngineError::CorruptRecord {
            key,
            reason: format!("unexpected decrement reply: {reply:?}"),
        })?;

        if decrement.removed() < amount {
            tracing::warn!(
                item_id = %item,
                requested = amount,
                removed = decrement.removed(),
                "Stock decrement clamped at zero"
            );
        } else {
            tracing::info!(item_id = %item, before = decrement.before, after = decrement.after, "Stock decremented");
        }
        metrics::record_units_sold(decrement.removed());
        self.ctx.audit(AuditEvent::SaleRecorded {
            item_id: item.clone(),
            before: decrement.before,
            after: decrement.after,
        });
        Ok(decrement)
    }

    /// Every tracked item and its stock.
    ///
    /// Keys whose suffix is not a valid item id are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StoreUnavailable`] on store failure.
    pub async fn all_stock(&self) -> Result<BTreeMap<ItemId, u64>> {
        let prefix = self.ctx.keys.stock_prefix();
        let keys = self
            .ctx
            .store
            .keys_with_prefix(&prefix)
            .await
            .map_err(store_failure("all_stock"))?;
        let values = self
            .ctx
            .store
            .get_many(&keys)
            .await
            .map_err(store_failure("all_stock"))?;

        let mut stock = BTreeMap::new();
        for (key, raw) in keys.iter().zip(values) {
            // Deleted between enumeration and read.
            let Some(raw) = raw else { continue };
            let item = match crate::config::KeySpace::suffix(key, &prefix).map(ItemId::new) {
                Some(Ok(item)) => item,
                _ => {
                    tracing::warn!(key = %key, "Skipping stock key with invalid item id");
                    continue;
                }
            };
            match self.read_stock(key, Some(&raw)) {
                Ok(count) => {
                    stock.insert(item, count);
                }
                Err(e) => tracing::warn!(key = %key, error = %e, "Skipping unreadable stock count"),
            }
        }
        Ok(stock)
    }

    /// Create a zero count for `item` if it has none. Returns `true` if created.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StoreUnavailable`] on store failure.
    pub async fn ensure_tracked(&self, item: &ItemId) -> Result<bool> {
        let created = self
            .ctx
            .store
            .set_if_absent(&self.ctx.keys.stock(item), "0".to_string())
            .await
            .map_err(store_failure("ensure_tracked"))?;
        if created {
            tracing::info!(item_id = %item, "Started tracking stock");
        }
        Ok(created)
    }

    /// Reset every negative stock count to zero. Returns the items repaired.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StoreUnavailable`] on store failure.
    pub async fn repair_negative(&self) -> Result<Vec<ItemId>> {
        let prefix = self.ctx.keys.stock_prefix();
        let keys = self
            .ctx
            .store
            .keys_with_prefix(&prefix)
            .await
            .map_err(store_failure("repair_negative"))?;

        let mut repaired = Vec::new();
        for key in keys {
            let found = self
                .ctx
                .store
                .eval(&CLAMP_NEGATIVE, vec![key.clone()], Vec::new())
                .await
                .map_err(store_failure("repair_negative"))?;
            let Some(found) = found else { continue };

            tracing::warn!(key = %key, value = %found, "Reset negative stock to zero");
            if let Some(Ok(item)) = crate::config::KeySpace::suffix(&key, &prefix).map(ItemId::new) {
                repaired.push(item);
            }
        }
        Ok(repaired)
    }
}

fn parse_decrement(reply: Option<&str>) -> Option<StockDecrement> {
    let (before, after) = reply?.split_once(':')?;
    Some(StockDecrement {
        before: StockCount::from_stored(before.parse().ok()?).get(),
        after: StockCount::from_stored(after.parse().ok()?).get(),
    })
}
