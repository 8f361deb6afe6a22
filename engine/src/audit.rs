//! Audit trail.
//!
//! The engine reports every state-changing fact to an [`AuditSink`]. The sink
//! owns formatting and retention; the engine only timestamps and emits.

use crate::error::HoldRejection;
use crate::types::{ItemId, SessionId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};

/// Tracing target used by [`TracingAuditSink`].
pub const AUDIT_TARGET: &str = "stockhold::audit";

/// One audited fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Stock was set to an absolute value.
    StockSet {
        /// Item.
        item_id: ItemId,
        /// Count before the write.
        previous: u64,
        /// Count written.
        current: u64,
    },
    /// Stock was increased.
    Restocked {
        /// Item.
        item_id: ItemId,
        /// Units added.
        amount: u64,
        /// Count after the increase.
        current: u64,
    },
    /// Stock was decreased by a sale (confirmed or legacy).
    SaleRecorded {
        /// Item.
        item_id: ItemId,
        /// Count before.
        before: u64,
        /// Count after (floor-clamped).
        after: u64,
    },
    /// A hold was placed.
    HoldCreated {
        /// Session.
        session_id: SessionId,
        /// Item.
        item_id: ItemId,
        /// Units.
        quantity: u32,
    },
    /// A hold was refused.
    HoldRejected {
        /// Session.
        session_id: SessionId,
        /// Item.
        item_id: ItemId,
        /// Why.
        rejection: HoldRejection,
    },
    /// A hold was consumed by a completed payment.
    HoldConfirmed {
        /// Session.
        session_id: SessionId,
        /// Item.
        item_id: ItemId,
        /// Units sold.
        quantity: u32,
    },
    /// A hold was consumed without a sale.
    HoldReleased {
        /// Session.
        session_id: SessionId,
        /// Item.
        item_id: ItemId,
        /// Units returned.
        quantity: u32,
    },
    /// A payment claimed a reservation that no longer existed; stock was
    /// decremented directly.
    ReservationBypassed {
        /// Session.
        session_id: SessionId,
        /// Item.
        item_id: ItemId,
    },
    /// A sweep ran.
    SweepCompleted {
        /// `true` for a forced (destructive) sweep.
        forced: bool,
        /// Operator-supplied reason (forced sweeps only).
        reason: Option<String>,
        /// Holds deleted.
        holds_removed: usize,
        /// Reserved counters rewritten or deleted.
        counters_repaired: usize,
    },
    /// Catalog items were reconciled with the ledger.
    CatalogSynced {
        /// Items that received a new zero stock entry.
        created: usize,
        /// Items already tracked.
        existing: usize,
        /// Items that could not be checked.
        failed: usize,
    },
}

/// A timestamped audit fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    /// When the engine observed the fact.
    pub at: DateTime<Utc>,
    /// The fact.
    #[serde(flatten)]
    pub event: AuditEvent,
}

/// Destination for audit records.
///
/// Implementations must not block: `record` is called inline on request paths.
pub trait AuditSink: Send + Sync {
    /// Accept one record.
    fn record(&self, record: AuditRecord);
}

/// Emits each record as a JSON `info` event under [`AUDIT_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        match serde_json::to_string(&record) {
            Ok(fact) => tracing::info!(target: AUDIT_TARGET, %fact, "audit"),
            Err(e) => tracing::error!(target: AUDIT_TARGET, error = %e, "Failed to encode audit record"),
        }
    }
}

/// Keeps records in memory. Used in tests.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|record| record.event.clone())
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}
