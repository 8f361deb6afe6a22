//! Catalog sync: make sure every catalog item has a stock entry.

use crate::audit::AuditEvent;
use crate::context::EngineContext;
use crate::ledger::StockLedger;
use crate::types::ItemId;
use serde::{Deserialize, Serialize};

/// A product record from the catalog provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Item identifier used by the ledger.
    pub item_id: ItemId,
    /// Display name, if the provider has one.
    #[serde(default)]
    pub name: Option<String>,
}

/// Read-only product catalog.
pub trait Catalog: Send + Sync {
    /// Every product the catalog currently lists.
    fn items(&self) -> Vec<CatalogItem>;
}

impl Catalog for Vec<CatalogItem> {
    fn items(&self) -> Vec<CatalogItem> {
        self.clone()
    }
}

/// An item the sync could not check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    /// Item.
    pub item_id: ItemId,
    /// Error message.
    pub error: String,
}

/// Outcome of [`CatalogSync::sync`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Items that got a new zero stock entry.
    pub created: Vec<ItemId>,
    /// Items already tracked.
    pub existing: Vec<ItemId>,
    /// Items that could not be checked.
    pub failed: Vec<SyncFailure>,
}

/// Reconciles the catalog with the ledger.
#[derive(Debug, Clone)]
pub struct CatalogSync {
    ctx: EngineContext,
    ledger: StockLedger,
}

impl CatalogSync {
    pub(crate) const fn new(ctx: EngineContext, ledger: StockLedger) -> Self {
        Self { ctx, ledger }
    }

    /// Create a zero stock entry for every catalog item that has none.
    ///
    /// Existing counts are never changed. A store failure on one item is
    /// recorded and the sync moves on.
    pub async fn sync(&self, catalog: &dyn Catalog) -> SyncReport {
        let mut report = SyncReport::default();
        for entry in catalog.items() {
            match self.ledger.ensure_tracked(&entry.item_id).await {
                Ok(true) => report.created.push(entry.item_id),
                Ok(false) => report.existing.push(entry.item_id),
                Err(e) => report.failed.push(SyncFailure {
                    item_id: entry.item_id,
                    error: e.to_string(),
                }),
            }
        }

        tracing::info!(
            created = report.created.len(),
            existing = report.existing.len(),
            failed = report.failed.len(),
            "Catalog synced"
        );
        self.ctx.audit(AuditEvent::CatalogSynced {
            created: report.created.len(),
            existing: report.existing.len(),
            failed: report.failed.len(),
        });
        report
    }
}
