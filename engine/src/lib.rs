//! # Stockhold Engine
//!
//! Inventory reservation engine: prevents overselling a limited-quantity item
//! when concurrent checkouts race for the same stock.
//!
//! ## Components
//!
//! - [`ledger::StockLedger`]: durable on-hand count per item
//! - [`reservations::ReservationManager`]: time-limited holds per checkout session
//! - [`availability::AvailabilityCalculator`]: `max(0, stock - reserved)`
//! - [`sweep::Sweeper`] and [`scheduler::SweepScheduler`]: orphan and drift repair
//! - [`events::EventAdapter`]: payment-session notifications to holds
//! - [`catalog::CatalogSync`]: stock entries for catalog items
//!
//! All coordination happens inside the key-value store through atomic scripts;
//! the engine holds no locks and no state of its own, so any number of
//! instances can share one store.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use stockhold_engine::{Engine, EngineConfig, HoldOutcome, ItemId, SessionId};
//! use stockhold_testing::InMemoryStore;
//!
//! # tokio_test::block_on(async {
//! let engine = Engine::new(Arc::new(InMemoryStore::new()), EngineConfig::default());
//! let mug = ItemId::new("mug")?;
//! engine.ledger().set_stock(&mug, 1).await?;
//!
//! let outcome = engine
//!     .reservations()
//!     .create_hold(&mug, &SessionId::new("cs_1")?, 1, None)
//!     .await?;
//! assert!(matches!(outcome, HoldOutcome::Reserved { .. }));
//! assert_eq!(engine.availability().available(&mug).await?, 0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```

#![forbid(unsafe_code)]

pub mod audit;
pub mod availability;
pub mod catalog;
pub mod config;
mod context;
pub mod error;
pub mod events;
pub mod ledger;
pub mod metrics;
pub mod reservations;
pub mod scheduler;
pub mod scripts;
pub mod sweep;
pub mod types;

pub use audit::{AuditEvent, AuditRecord, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use availability::{Availability, AvailabilityCalculator};
pub use catalog::{Catalog, CatalogItem, CatalogSync, SyncReport};
pub use config::{EngineConfig, KeySpace, ReservationPolicy, SweepSettings};
pub use error::{EngineError, HoldOutcome, HoldRejection, Result, ValidationError};
pub use events::{EventAdapter, EventOutcome, PaymentEvent, PaymentEventKind};
pub use ledger::{StockDecrement, StockLedger};
pub use reservations::ReservationManager;
pub use scheduler::SweepScheduler;
pub use sweep::{ReservationReport, SweepMode, SweepReport, Sweeper};
pub use types::{ClientIp, Hold, ItemId, SessionId};

use context::EngineContext;
use std::sync::Arc;
use stockhold_core::KeyValueStore;
use stockhold_core::environment::{Clock, SystemClock};

/// All engine services over one store.
///
/// Cheap to clone; every service shares the same store handle.
#[derive(Debug, Clone)]
pub struct Engine {
    ledger: StockLedger,
    reservations: ReservationManager,
    availability: AvailabilityCalculator,
    sweeper: Sweeper,
    events: EventAdapter,
    catalog: CatalogSync,
    config: EngineConfig,
}

impl Engine {
    /// Production wiring: audit facts go to tracing, time from the system clock.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, config: EngineConfig) -> Self {
        Self::with_environment(store, config, Arc::new(TracingAuditSink), Arc::new(SystemClock))
    }

    /// Wire the engine with an explicit audit sink and clock.
    #[must_use]
    pub fn with_environment(
        store: Arc<dyn KeyValueStore>,
        config: EngineConfig,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ctx = EngineContext::new(
            store,
            config.keys.clone(),
            config.policy.clone(),
            audit,
            clock,
        );
        let ledger = StockLedger::new(ctx.clone());
        let reservations = ReservationManager::new(ctx.clone());

        Self {
            availability: AvailabilityCalculator::new(ctx.clone()),
            sweeper: Sweeper::new(ctx.clone(), ledger.clone()),
            events: EventAdapter::new(ctx.clone(), reservations.clone(), ledger.clone()),
            catalog: CatalogSync::new(ctx, ledger.clone()),
            ledger,
            reservations,
            config,
        }
    }

    /// Stock ledger.
    #[must_use]
    pub const fn ledger(&self) -> &StockLedger {
        &self.ledger
    }

    /// Reservation manager.
    #[must_use]
    pub const fn reservations(&self) -> &ReservationManager {
        &self.reservations
    }

    /// Availability calculator.
    #[must_use]
    pub const fn availability(&self) -> &AvailabilityCalculator {
        &self.availability
    }

    /// Orphan sweep.
    #[must_use]
    pub const fn sweeper(&self) -> &Sweeper {
        &self.sweeper
    }

    /// Payment notification adapter.
    #[must_use]
    pub const fn events(&self) -> &EventAdapter {
        &self.events
    }

    /// Catalog sync.
    #[must_use]
    pub const fn catalog(&self) -> &CatalogSync {
        &self.catalog
    }

    /// Configuration the engine was built with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Background sweep task per [`SweepSettings`].
    #[must_use]
    pub fn sweep_scheduler(&self) -> SweepScheduler {
        SweepScheduler::new(self.sweeper.clone(), self.config.sweep.interval)
    }
}
