//! Orphan reclamation.
//!
//! Holds and reserved counters normally expire on their own. Two things break
//! that:
//!
//! - a writer that crashed between commands leaves a key without an expiry
//!   (an orphan that would block stock forever)
//! - a hold that expires passively never gives its units back to the reserved
//!   counter, so the counter drifts above the sum of live holds until it
//!   expires itself
//!
//! [`Sweeper::sweep`] repairs both. Counters are snapshotted before holds are
//! scanned, together with their revision (bumped by every script that moves a
//! reserved counter). Each rewrite is a compare-and-set against both, so a hold
//! created or consumed mid-sweep makes the sweep skip that item rather than
//! undercount it, even when the counter value ends up where it started.
//! Repairs only ever lower a counter: a sweep never reduces availability.

use crate::audit::AuditEvent;
use crate::config::KeySpace;
use crate::context::{EngineContext, store_failure};
use crate::error::{Result, ValidationError};
use crate::ledger::StockLedger;
use crate::metrics;
use crate::scripts::{DELETE_IF_UNCHANGED, RESET_COUNTER, RESET_SKIPPED};
use crate::types::{Hold, ItemId};
use serde::Serialize;
use std::collections::BTreeMap;
use stockhold_core::KeyTtl;
use stockhold_core::store::parse_counter;

/// How aggressive a sweep is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepMode {
    /// Repair orphans and drift; live holds are untouched.
    Normal,
    /// Delete every hold and reserved counter. Live checkouts lose their holds.
    Forced {
        /// Operator-supplied justification, recorded in the audit trail.
        reason: String,
    },
}

/// Why a hold was reported as orphaned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldIssue {
    /// The hold has no expiry.
    NoExpiry,
    /// The hold record cannot be decoded.
    Unreadable,
    /// The hold disappeared between enumeration and read.
    Vanished,
}

/// A live hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveHold {
    /// Session owning the hold.
    pub session_id: String,
    /// Reserved item.
    pub item_id: ItemId,
    /// Reserved units.
    pub quantity: u32,
    /// Seconds until the hold expires.
    pub remaining_secs: u64,
}

/// A hold that needs (or needed) repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanedHold {
    /// Session part of the key.
    pub session_id: String,
    /// What is wrong with it.
    pub issue: HoldIssue,
}

/// A reserved counter without an expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanedCounter {
    /// Item part of the key.
    pub item_id: String,
    /// Recorded value.
    pub count: i64,
}

/// A reserved counter that disagrees with the sum of its item's live holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftDetected {
    /// Item part of the key.
    pub item_id: String,
    /// Counter value.
    pub recorded: i64,
    /// Sum of live hold quantities.
    pub live: u64,
    /// `true` if the sweep lowered the counter to `live`.
    pub repaired: bool,
}

/// A counter rewritten by the sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterRepair {
    /// Item part of the key.
    pub item_id: String,
    /// Value before.
    pub previous: i64,
    /// Value after (0 means deleted).
    pub current: u64,
}

/// Read-only view of reservations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReservationReport {
    /// Holds with an expiry and a readable record.
    pub active_holds: Vec<ActiveHold>,
    /// Holds that a sweep would remove.
    pub orphaned_holds: Vec<OrphanedHold>,
    /// Reserved counters without an expiry.
    pub orphaned_counters: Vec<OrphanedCounter>,
    /// Expiring counters that disagree with live holds.
    pub drifted_counters: Vec<DriftDetected>,
}

/// What a sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// `true` for a forced sweep.
    pub forced: bool,
    /// Reason given for a forced sweep.
    pub reason: Option<String>,
    /// Orphaned holds deleted (normal sweep).
    pub orphaned_holds_removed: Vec<OrphanedHold>,
    /// Counters without expiry that were rewritten or deleted (normal sweep).
    pub counters_reset: Vec<CounterRepair>,
    /// Counters that disagreed with live holds (normal sweep).
    pub drift: Vec<DriftDetected>,
    /// Items whose counter changed during the sweep and were left alone.
    pub skipped: Vec<String>,
    /// Items whose negative stock was reset to zero (normal sweep).
    pub negative_stock_repaired: Vec<ItemId>,
    /// Holds deleted (forced sweep).
    pub holds_deleted: usize,
    /// Reserved counters deleted (forced sweep).
    pub counters_deleted: usize,
}

impl SweepReport {
    /// Total number of entries changed.
    #[must_use]
    pub fn cleaned(&self) -> usize {
        self.orphaned_holds_removed.len()
            + self.counters_reset.len()
            + self.drift.iter().filter(|d| d.repaired).count()
            + self.negative_stock_repaired.len()
            + self.holds_deleted
            + self.counters_deleted
    }
}

/// A reserved counter as seen at the start of a sweep.
struct CounterSnapshot {
    key: String,
    item: String,
    raw: String,
    value: i64,
    ttl: KeyTtl,
    revision_key: String,
    revision: String,
}

/// Orphaned hold plus what the delete must compare against.
struct HoldCandidate {
    key: String,
    raw: String,
    orphan: OrphanedHold,
}

#[derive(Default)]
struct HoldScan {
    active: Vec<ActiveHold>,
    orphaned: Vec<HoldCandidate>,
    vanished: Vec<OrphanedHold>,
    live: BTreeMap<String, u64>,
}

/// Inspects and repairs holds and reserved counters.
#[derive(Debug, Clone)]
pub struct Sweeper {
    ctx: EngineContext,
    ledger: StockLedger,
}

impl Sweeper {
    pub(crate) const fn new(ctx: EngineContext, ledger: StockLedger) -> Self {
        Self { ctx, ledger }
    }

    /// List active and orphaned holds and counters without changing anything.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StoreUnavailable`](crate::EngineError::StoreUnavailable)
    /// on store failure.
    pub async fn inspect(&self) -> Result<ReservationReport> {
        let counters = self.snapshot_counters().await?;
        let scan = self.scan_holds().await?;

        let mut report = ReservationReport {
            active_holds: scan.active,
            orphaned_holds: scan
                .orphaned
                .into_iter()
                .map(|candidate| candidate.orphan)
                .chain(scan.vanished)
                .collect(),
            ..ReservationReport::default()
        };

        for counter in &counters {
            let live = scan.live.get(&counter.item).copied().unwrap_or(0);
            match counter.ttl {
                KeyTtl::Persistent => report.orphaned_counters.push(OrphanedCounter {
                    item_id: counter.item.clone(),
                    count: counter.value,
                }),
                KeyTtl::Expires(_) if !counter_matches(counter.value, live) => {
                    report.drifted_counters.push(DriftDetected {
                        item_id: counter.item.clone(),
                        recorded: counter.value,
                        live,
                        repaired: false,
                    });
                }
                KeyTtl::Expires(_) | KeyTtl::Missing => {}
            }
        }
        report
            .drifted_counters
            .extend(uncounted_items(&counters, &scan.live).map(|(item, live)| DriftDetected {
                item_id: item.clone(),
                recorded: 0,
                live,
                repaired: false,
            }));

        Ok(report)
    }

    /// Run a sweep.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingSweepReason`] for a forced sweep with
    /// a blank reason, and
    /// [`EngineError::StoreUnavailable`](crate::EngineError::StoreUnavailable)
    /// on store failure (repairs already applied stay applied).
    pub async fn sweep(&self, mode: SweepMode) -> Result<SweepReport> {
        match mode {
            SweepMode::Normal => self.sweep_normal().await,
            SweepMode::Forced { reason } => {
                let reason = reason.trim();
                if reason.is_empty() {
                    return Err(ValidationError::MissingSweepReason.into());
                }
                self.sweep_forced(reason.to_string()).await
            }
        }
    }

    async fn sweep_normal(&self) -> Result<SweepReport> {
        let counters = self.snapshot_counters().await?;
        let scan = self.scan_holds().await?;
        let mut report = SweepReport::default();

        for candidate in scan.orphaned {
            let require_persistent = candidate.orphan.issue == HoldIssue::NoExpiry;
            let deleted = self
                .ctx
                .store
                .eval(
                    &DELETE_IF_UNCHANGED,
                    vec![candidate.key.clone()],
                    vec![candidate.raw, if require_persistent { "1" } else { "0" }.to_string()],
                )
                .await
                .map_err(store_failure("sweep"))?;
            if deleted.as_deref() == Some("1") {
                tracing::info!(
                    key = %candidate.key,
                    issue = ?candidate.orphan.issue,
                    "Removed orphaned hold"
                );
                report.orphaned_holds_removed.push(candidate.orphan);
            }
        }

        for counter in &counters {
            let live = scan.live.get(&counter.item).copied().unwrap_or(0);
            match counter.ttl {
                KeyTtl::Persistent => {
                    // Keep undercounts as they are; the counter only gains an expiry.
                    let target = live.min(u64::try_from(counter.value).unwrap_or(0));
                    if self.reset_counter(counter, target).await? {
                        tracing::info!(
                            item_id = %counter.item,
                            previous = counter.value,
                            current = target,
                            "Reset orphaned reserved counter"
                        );
                        report.counters_reset.push(CounterRepair {
                            item_id: counter.item.clone(),
                            previous: counter.value,
                            current: target,
                        });
                    } else {
                        report.skipped.push(counter.item.clone());
                    }
                }
                KeyTtl::Expires(_) if !counter_matches(counter.value, live) => {
                    let lower = counter.value > 0 && u64::try_from(counter.value).unwrap_or(0) > live;
                    let repaired = if lower {
                        let applied = self.reset_counter(counter, live).await?;
                        if !applied {
                            report.skipped.push(counter.item.clone());
                        }
                        applied
                    } else {
                        false
                    };
                    tracing::warn!(
                        item_id = %counter.item,
                        recorded = counter.value,
                        live,
                        repaired,
                        "Reserved counter drifted from live holds"
                    );
                    report.drift.push(DriftDetected {
                        item_id: counter.item.clone(),
                        recorded: counter.value,
                        live,
                        repaired,
                    });
                }
                KeyTtl::Expires(_) | KeyTtl::Missing => {}
            }
        }

        for (item, live) in uncounted_items(&counters, &scan.live) {
            tracing::warn!(item_id = %item, live, "Live holds without a reserved counter");
            report.drift.push(DriftDetected {
                item_id: item.clone(),
                recorded: 0,
                live,
                repaired: false,
            });
        }

        report.negative_stock_repaired = self.ledger.repair_negative().await?;

        metrics::record_sweep_cleaned("orphaned_hold", report.orphaned_holds_removed.len());
        metrics::record_sweep_cleaned("orphaned_counter", report.counters_reset.len());
        metrics::record_sweep_cleaned(
            "drifted_counter",
            report.drift.iter().filter(|d| d.repaired).count(),
        );
        metrics::record_sweep_cleaned("negative_stock", report.negative_stock_repaired.len());

        tracing::info!(
            orphaned_holds = report.orphaned_holds_removed.len(),
            counters_reset = report.counters_reset.len(),
            drift = report.drift.len(),
            skipped = report.skipped.len(),
            negative_stock = report.negative_stock_repaired.len(),
            "Sweep completed"
        );
        self.ctx.audit(AuditEvent::SweepCompleted {
            forced: false,
            reason: None,
            holds_removed: report.orphaned_holds_removed.len(),
            counters_repaired: report.counters_reset.len()
                + report.drift.iter().filter(|d| d.repaired).count(),
        });
        Ok(report)
    }

    async fn sweep_forced(&self, reason: String) -> Result<SweepReport> {
        tracing::warn!(reason = %reason, "Forced sweep: deleting every hold and reserved counter");

        let holds_deleted = self.delete_all(&self.ctx.keys.hold_prefix()).await?;
        let counters_deleted = self.delete_all(&self.ctx.keys.reserved_prefix()).await?;

        metrics::record_sweep_cleaned("forced_hold", holds_deleted);
        metrics::record_sweep_cleaned("forced_counter", counters_deleted);

        tracing::warn!(
            reason = %reason,
            holds_deleted,
            counters_deleted,
            "Forced sweep completed"
        );
        self.ctx.audit(AuditEvent::SweepCompleted {
            forced: true,
            reason: Some(reason.clone()),
            holds_removed: holds_deleted,
            counters_repaired: counters_deleted,
        });

        Ok(SweepReport {
            forced: true,
            reason: Some(reason),
            holds_deleted,
            counters_deleted,
            ..SweepReport::default()
        })
    }

    async fn delete_all(&self, prefix: &str) -> Result<usize> {
        let keys = self
            .ctx
            .store
            .keys_with_prefix(prefix)
            .await
            .map_err(store_failure("sweep"))?;
        let mut deleted = 0;
        for key in keys {
            if self
                .ctx
                .store
                .delete(&key)
                .await
                .map_err(store_failure("sweep"))?
            {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Compare-and-set `counter` to `target`. Returns `false` if it changed since the snapshot.
    async fn reset_counter(&self, counter: &CounterSnapshot, target: u64) -> Result<bool> {
        let reply = self
            .ctx
            .store
            .eval(
                &RESET_COUNTER,
                vec![counter.key.clone(), counter.revision_key.clone()],
                vec![
                    counter.raw.clone(),
                    counter.revision.clone(),
                    target.to_string(),
                    self.ctx.ttl_millis(),
                ],
            )
            .await
            .map_err(store_failure("sweep"))?;

        let applied = reply.as_deref() != Some(RESET_SKIPPED);
        if !applied {
            tracing::debug!(item_id = %counter.item, "Counter changed during sweep, skipping");
        }
        Ok(applied)
    }

    async fn snapshot_counters(&self) -> Result<Vec<CounterSnapshot>> {
        let prefix = self.ctx.keys.reserved_prefix();
        let revision_prefix = self.ctx.keys.revision_prefix();
        let keys = self
            .ctx
            .store
            .keys_with_prefix(&prefix)
            .await
            .map_err(store_failure("sweep"))?;
        let revision_keys: Vec<String> = keys
            .iter()
            .map(|key| {
                let item = KeySpace::suffix(key, &prefix).unwrap_or_default();
                format!("{revision_prefix}{item}")
            })
            .collect();

        // Revisions first: a change landing between the two reads shows up as a
        // newer revision at write time.
        let revisions = self
            .ctx
            .store
            .get_many(&revision_keys)
            .await
            .map_err(store_failure("sweep"))?;
        let values = self
            .ctx
            .store
            .get_many(&keys)
            .await
            .map_err(store_failure("sweep"))?;

        let mut counters = Vec::with_capacity(keys.len());
        for (((key, raw), revision_key), revision) in
            keys.into_iter().zip(values).zip(revision_keys).zip(revisions)
        {
            let Some(raw) = raw else { continue };
            let ttl = self
                .ctx
                .store
                .ttl(&key)
                .await
                .map_err(store_failure("sweep"))?;
            let value = parse_counter(&key, Some(&raw)).unwrap_or_else(|e| {
                tracing::warn!(key = %key, error = %e, "Unreadable reserved counter");
                0
            });
            let item = KeySpace::suffix(&key, &prefix).unwrap_or_default().to_string();
            counters.push(CounterSnapshot {
                key,
                item,
                raw,
                value,
                ttl,
                revision_key,
                revision: revision.unwrap_or_default(),
            });
        }
        Ok(counters)
    }

    async fn scan_holds(&self) -> Result<HoldScan> {
        let prefix = self.ctx.keys.hold_prefix();
        let keys = self
            .ctx
            .store
            .keys_with_prefix(&prefix)
            .await
            .map_err(store_failure("sweep"))?;
        let values = self
            .ctx
            .store
            .get_many(&keys)
            .await
            .map_err(store_failure("sweep"))?;

        let mut scan = HoldScan::default();
        for (key, raw) in keys.into_iter().zip(values) {
            let session_id = KeySpace::suffix(&key, &prefix).unwrap_or_default().to_string();
            let ttl = self
                .ctx
                .store
                .ttl(&key)
                .await
                .map_err(store_failure("sweep"))?;

            let raw = match (raw, ttl) {
                (Some(raw), KeyTtl::Persistent | KeyTtl::Expires(_)) => raw,
                (None, _) | (_, KeyTtl::Missing) => {
                    scan.vanished.push(OrphanedHold {
                        session_id,
                        issue: HoldIssue::Vanished,
                    });
                    continue;
                }
            };

            let hold = match Hold::from_record(&raw) {
                Ok(hold) => hold,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Unreadable hold record");
                    scan.orphaned.push(HoldCandidate {
                        key,
                        raw,
                        orphan: OrphanedHold {
                            session_id,
                            issue: HoldIssue::Unreadable,
                        },
                    });
                    continue;
                }
            };

            match ttl {
                KeyTtl::Expires(remaining) => {
                    *scan.live.entry(hold.item_id.to_string()).or_default() += u64::from(hold.quantity);
                    scan.active.push(ActiveHold {
                        session_id,
                        item_id: hold.item_id,
                        quantity: hold.quantity,
                        remaining_secs: remaining.as_secs(),
                    });
                }
                KeyTtl::Persistent | KeyTtl::Missing => scan.orphaned.push(HoldCandidate {
                    key,
                    raw,
                    orphan: OrphanedHold {
                        session_id,
                        issue: HoldIssue::NoExpiry,
                    },
                }),
            }
        }
        Ok(scan)
    }
}

fn counter_matches(recorded: i64, live: u64) -> bool {
    u64::try_from(recorded).is_ok_and(|recorded| recorded == live)
}

/// Items with live holds but no reserved counter in the snapshot.
fn uncounted_items<'a>(
    counters: &'a [CounterSnapshot],
    live: &'a BTreeMap<String, u64>,
) -> impl Iterator<Item = (&'a String, u64)> + 'a {
    live.iter()
        .filter(|(item, _)| !counters.iter().any(|counter| &counter.item == *item))
        .map(|(item, live)| (item, *live))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Engine;
    use crate::audit::MemoryAuditSink;
    use crate::config::EngineConfig;
    use crate::error::EngineError;
    use crate::types::SessionId;
    use std::sync::Arc;
    use std::time::Duration;
    use stockhold_core::KeyValueStore;
    use stockhold_testing::{InMemoryStore, ManualClock};

    struct Fixture {
        engine: Engine,
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        audit: Arc<MemoryAuditSink>,
    }

    async fn fixture(stock: i64) -> Fixture {
        let clock = Arc::new(ManualClock::starting_at_test_epoch());
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        let audit = Arc::new(MemoryAuditSink::new());
        let engine = Engine::with_environment(
            store.clone(),
            EngineConfig::default(),
            audit.clone(),
            clock.clone(),
        );
        engine.ledger().set_stock(&item(), stock).await.unwrap();
        Fixture {
            engine,
            store,
            clock,
            audit,
        }
    }

    fn item() -> ItemId {
        ItemId::new("mug").unwrap()
    }

    async fn hold(f: &Fixture, session: &str, quantity: u32) {
        f.engine
            .reservations()
            .create_hold(&item(), &SessionId::new(session).unwrap(), quantity, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_leaves_live_holds_alone() {
        let f = fixture(10).await;
        hold(&f, "s1", 2).await;
        hold(&f, "s2", 3).await;

        let before = f.engine.availability().available(&item()).await.unwrap();
        let report = f.engine.sweeper().sweep(SweepMode::Normal).await.unwrap();

        assert_eq!(report.cleaned(), 0);
        assert_eq!(f.engine.availability().available(&item()).await.unwrap(), before);
        assert_eq!(before, 5);
    }

    #[tokio::test]
    async fn test_persistent_hold_and_counter_are_reclaimed() {
        let f = fixture(10).await;
        hold(&f, "s1", 2).await;
        f.store.persist("stockhold:hold:s1");
        f.store.persist("stockhold:reserved:mug");

        let inspected = f.engine.sweeper().inspect().await.unwrap();
        assert_eq!(
            inspected.orphaned_holds,
            vec![OrphanedHold {
                session_id: "s1".to_string(),
                issue: HoldIssue::NoExpiry
            }]
        );
        assert_eq!(
            inspected.orphaned_counters,
            vec![OrphanedCounter {
                item_id: "mug".to_string(),
                count: 2
            }]
        );

        let report = f.engine.sweeper().sweep(SweepMode::Normal).await.unwrap();
        assert_eq!(report.orphaned_holds_removed.len(), 1);
        assert_eq!(
            report.counters_reset,
            vec![CounterRepair {
                item_id: "mug".to_string(),
                previous: 2,
                current: 0
            }]
        );
        assert_eq!(f.store.get("stockhold:reserved:mug").await.unwrap(), None);
        assert_eq!(f.engine.availability().available(&item()).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_orphaned_counter_keeps_live_holds() {
        let f = fixture(10).await;
        hold(&f, "live", 3).await;
        f.store.persist("stockhold:reserved:mug");

        let report = f.engine.sweeper().sweep(SweepMode::Normal).await.unwrap();
        assert_eq!(report.counters_reset[0].current, 3);
        assert!(matches!(
            f.store.ttl("stockhold:reserved:mug").await.unwrap(),
            KeyTtl::Expires(_)
        ));
        assert_eq!(f.engine.availability().available(&item()).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_passive_expiry_drift_is_reconciled() {
        let f = fixture(10).await;
        hold(&f, "early", 4).await;
        f.clock.advance(Duration::from_secs(300));
        hold(&f, "late", 1).await;

        // "early" expires; its 4 units are still counted.
        f.clock.advance(Duration::from_secs(301));
        assert_eq!(f.engine.availability().available(&item()).await.unwrap(), 5);

        let inspected = f.engine.sweeper().inspect().await.unwrap();
        assert_eq!(inspected.active_holds.len(), 1);
        assert_eq!(inspected.drifted_counters.len(), 1);

        let report = f.engine.sweeper().sweep(SweepMode::Normal).await.unwrap();
        assert_eq!(
            report.drift,
            vec![DriftDetected {
                item_id: "mug".to_string(),
                recorded: 5,
                live: 1,
                repaired: true
            }]
        );
        assert_eq!(f.engine.availability().available(&item()).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_undercount_is_reported_not_raised() {
        let f = fixture(10).await;
        hold(&f, "s1", 3).await;
        f.store
            .set_with_ttl("stockhold:reserved:mug", "1".to_string(), Duration::from_secs(600))
            .await
            .unwrap();

        let report = f.engine.sweeper().sweep(SweepMode::Normal).await.unwrap();
        assert_eq!(report.drift.len(), 1);
        assert!(!report.drift[0].repaired);
        assert_eq!(f.engine.availability().available(&item()).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_unreadable_hold_is_removed() {
        let f = fixture(10).await;
        f.store
            .set_with_ttl("stockhold:hold:junk", "not json".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let report = f.engine.sweeper().sweep(SweepMode::Normal).await.unwrap();
        assert_eq!(report.orphaned_holds_removed[0].issue, HoldIssue::Unreadable);
        assert_eq!(f.store.get("stockhold:hold:junk").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_forced_sweep_requires_reason() {
        let f = fixture(10).await;
        hold(&f, "s1", 2).await;

        let result = f
            .engine
            .sweeper()
            .sweep(SweepMode::Forced {
                reason: "  ".to_string(),
            })
            .await;
        assert!(matches!(
            result,
            Err(EngineError::Validation(ValidationError::MissingSweepReason))
        ));
        assert_eq!(f.engine.availability().available(&item()).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_forced_sweep_clears_everything() {
        let f = fixture(10).await;
        hold(&f, "s1", 2).await;
        hold(&f, "s2", 1).await;

        let report = f
            .engine
            .sweeper()
            .sweep(SweepMode::Forced {
                reason: "stuck checkout after deploy".to_string(),
            })
            .await
            .unwrap();

        assert!(report.forced);
        assert_eq!(report.holds_deleted, 2);
        assert_eq!(report.counters_deleted, 1);
        assert_eq!(f.engine.availability().available(&item()).await.unwrap(), 10);
        assert!(matches!(
            f.audit.events().last(),
            Some(AuditEvent::SweepCompleted { forced: true, .. })
        ));
    }
}
