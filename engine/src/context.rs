//! Dependencies shared by every engine service.

use crate::audit::{AuditEvent, AuditRecord, AuditSink};
use crate::config::{KeySpace, ReservationPolicy};
use crate::error::EngineError;
use crate::metrics;
use std::sync::Arc;
use stockhold_core::environment::Clock;
use stockhold_core::{KeyValueStore, StoreError};

/// Store, layout, limits, audit sink and clock, cloned into each service.
#[derive(Clone)]
pub(crate) struct EngineContext {
    pub(crate) store: Arc<dyn KeyValueStore>,
    pub(crate) keys: KeySpace,
    pub(crate) policy: ReservationPolicy,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl EngineContext {
    pub(crate) fn new(
        store: Arc<dyn KeyValueStore>,
        keys: KeySpace,
        policy: ReservationPolicy,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            keys,
            policy,
            audit,
            clock,
        }
    }

    /// Timestamp and emit an audit fact.
    pub(crate) fn audit(&self, event: AuditEvent) {
        self.audit.record(AuditRecord {
            at: self.clock.now(),
            event,
        });
    }

    /// Reservation TTL in milliseconds, as scripts expect it.
    pub(crate) fn ttl_millis(&self) -> String {
        self.policy.ttl.as_millis().to_string()
    }
}

/// Map a store failure to [`EngineError::StoreUnavailable`], logging and counting it.
pub(crate) fn store_failure(operation: &'static str) -> impl FnOnce(StoreError) -> EngineError {
    move |e| {
        tracing::error!(operation, error = %e, "Store operation failed");
        metrics::record_store_error(operation);
        EngineError::StoreUnavailable(e)
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("keys", &self.keys)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
