//! Reservation manager: creates, confirms and releases holds.
//!
//! # Lifecycle
//!
//! ```text
//! NONE --create_hold--> HELD --confirm--> CONFIRMED
//!                         |----release--> RELEASED
//!                         `----ttl------> EXPIRED
//! ```
//!
//! Every transition out of `HELD` deletes the hold, so repeating any of them is
//! a no-op. Each read-then-write step runs as one atomic store script; the
//! per-address guard is the only check made outside a script and is advisory.

use crate::audit::AuditEvent;
use crate::context::{EngineContext, store_failure};
use crate::error::{EngineError, HoldOutcome, HoldRejection, Result};
use crate::metrics;
use crate::scripts::{
    CONFIRM, RELEASE, RESERVE, RESERVE_ALREADY_HELD, RESERVE_AT_CAPACITY, RESERVE_OK,
    RESERVE_OUT_OF_STOCK,
};
use crate::types::{ClientIp, Hold, HoldQuantity, ItemId, SessionId};
use stockhold_core::store::parse_counter;

/// Creates and consumes holds.
#[derive(Debug, Clone)]
pub struct ReservationManager {
    ctx: EngineContext,
}

impl ReservationManager {
    pub(crate) const fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Reserve `quantity` units of `item` for `session`.
    ///
    /// Refusals (sold out, item at capacity, client rate limited) come back as
    /// [`HoldOutcome::Rejected`]. A session that already holds a reservation
    /// gets [`HoldOutcome::AlreadyHeld`] and nothing changes.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for a quantity outside
    /// `1..=max_quantity`, and [`EngineError::StoreUnavailable`] if the
    /// reservation script cannot run (no hold is created).
    pub async fn create_hold(
        &self,
        item: &ItemId,
        session: &SessionId,
        quantity: u32,
        client_ip: Option<&ClientIp>,
    ) -> Result<HoldOutcome> {
        let quantity = HoldQuantity::new(quantity, self.ctx.policy.max_quantity)?;

        if let Some(ip) = client_ip {
            // A retry of an existing hold is not a new attempt from this address.
            if self.holds(session).await? {
                return Ok(Self::already_held(session));
            }
            if let Some(rejection) = self.check_client(ip).await {
                return Ok(self.rejected(item, session, rejection));
            }
        }

        let hold = Hold {
            item_id: item.clone(),
            quantity: quantity.get(),
        };
        let reply = self
            .ctx
            .store
            .eval(
                &RESERVE,
                vec![
                    self.ctx.keys.stock(item),
                    self.ctx.keys.reserved(item),
                    self.ctx.keys.hold(session),
                    self.ctx.keys.revision(item),
                ],
                vec![
                    quantity.get().to_string(),
                    self.ctx.ttl_millis(),
                    hold.to_record(),
                    self.ctx.policy.max_per_item.to_string(),
                ],
            )
            .await
            .map_err(store_failure("create_hold"))?;

        match reply.as_deref() {
            Some(RESERVE_OK) => {
                tracing::info!(
                    item_id = %item,
                    session_id = %session,
                    quantity = hold.quantity,
                    "Hold created"
                );
                if let Some(ip) = client_ip {
                    self.attribute_to_client(ip).await;
                }
                metrics::record_hold_outcome("reserved");
                self.ctx.audit(AuditEvent::HoldCreated {
                    session_id: session.clone(),
                    item_id: item.clone(),
                    quantity: hold.quantity,
                });
                Ok(HoldOutcome::Reserved { hold })
            }
            Some(RESERVE_ALREADY_HELD) => Ok(Self::already_held(session)),
            Some(RESERVE_AT_CAPACITY) => Ok(self.rejected(
                item,
                session,
                HoldRejection::ItemCapacity {
                    limit: self.ctx.policy.max_per_item,
                },
            )),
            Some(RESERVE_OUT_OF_STOCK) => Ok(self.rejected(item, session, HoldRejection::OutOfStock)),
            other => Err(EngineError::CorruptRecord {
                key: self.ctx.keys.hold(session),
                reason: format!("unexpected reserve reply: {other:?}"),
            }),
        }
    }

    async fn holds(&self, session: &SessionId) -> Result<bool> {
        let raw = self
            .ctx
            .store
            .get(&self.ctx.keys.hold(session))
            .await
            .map_err(store_failure("create_hold"))?;
        Ok(raw.is_some())
    }

    fn already_held(session: &SessionId) -> HoldOutcome {
        tracing::debug!(session_id = %session, "Session already holds a reservation");
        metrics::record_hold_outcome("already_held");
        HoldOutcome::AlreadyHeld
    }

    /// Advisory per-address guard. Store failures skip the check.
    async fn check_client(&self, ip: &ClientIp) -> Option<HoldRejection> {
        let key = self.ctx.keys.client_ip(ip);
        let attempts = match self.ctx.store.get(&key).await {
            Ok(raw) => parse_counter(&key, raw.as_deref()).unwrap_or(0),
            Err(e) => {
                tracing::warn!(client_ip = %ip, error = %e, "Skipping client rate check");
                return None;
            }
        };

        let limit = self.ctx.policy.max_per_ip;
        (attempts >= i64::from(limit)).then(|| HoldRejection::RateLimited {
            attempts: u64::try_from(attempts).unwrap_or(0),
            limit,
        })
    }

    /// Best effort: count a new hold against the client address.
    async fn attribute_to_client(&self, ip: &ClientIp) {
        let key = self.ctx.keys.client_ip(ip);
        let result = async {
            self.ctx.store.incr_by(&key, 1).await?;
            self.ctx.store.expire(&key, self.ctx.policy.ttl).await
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(client_ip = %ip, error = %e, "Failed to attribute hold to client");
        }
    }

    fn rejected(&self, item: &ItemId, session: &SessionId, rejection: HoldRejection) -> HoldOutcome {
        tracing::info!(
            item_id = %item,
            session_id = %session,
            reason = rejection.label(),
            "Hold rejected"
        );
        metrics::record_hold_outcome(rejection.label());
        self.ctx.audit(AuditEvent::HoldRejected {
            session_id: session.clone(),
            item_id: item.clone(),
            rejection,
        });
        HoldOutcome::Rejected { rejection }
    }

    /// Sell the session's hold: stock and reserved counter both drop by its
    /// quantity (floor-clamped) and the hold is deleted.
    ///
    /// Returns the quantity sold; 0 if the session holds nothing.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StoreUnavailable`] on store failure and
    /// [`EngineError::CorruptRecord`] if the hold was unreadable (it is deleted).
    pub async fn confirm(&self, session: &SessionId) -> Result<u64> {
        Ok(self
            .confirm_hold(session)
            .await?
            .map_or(0, |hold| u64::from(hold.quantity)))
    }

    /// Like [`confirm`](Self::confirm), returning the consumed hold.
    ///
    /// # Errors
    ///
    /// See [`confirm`](Self::confirm).
    pub async fn confirm_hold(&self, session: &SessionId) -> Result<Option<Hold>> {
        let hold = self
            .consume(
                session,
                &CONFIRM,
                vec![
                    self.ctx.keys.reserved_prefix(),
                    self.ctx.keys.revision_prefix(),
                    self.ctx.keys.stock_prefix(),
                ],
                "confirm",
            )
            .await?;

        match &hold {
            Some(hold) => {
                tracing::info!(
                    session_id = %session,
                    item_id = %hold.item_id,
                    quantity = hold.quantity,
                    "Hold confirmed"
                );
                metrics::record_hold_exit("confirmed");
                metrics::record_units_sold(u64::from(hold.quantity));
                self.ctx.audit(AuditEvent::HoldConfirmed {
                    session_id: session.clone(),
                    item_id: hold.item_id.clone(),
                    quantity: hold.quantity,
                });
            }
            None => tracing::debug!(session_id = %session, "Nothing to confirm"),
        }
        Ok(hold)
    }

    /// Give the session's hold back: the reserved counter drops by its
    /// quantity and the hold is deleted. Stock is untouched.
    ///
    /// Returns the quantity released; 0 if the session holds nothing.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StoreUnavailable`] on store failure and
    /// [`EngineError::CorruptRecord`] if the hold was unreadable (it is deleted).
    pub async fn release(&self, session: &SessionId) -> Result<u64> {
        Ok(self
            .release_hold(session)
            .await?
            .map_or(0, |hold| u64::from(hold.quantity)))
    }

    /// Like [`release`](Self::release), returning the consumed hold.
    ///
    /// # Errors
    ///
    /// See [`release`](Self::release).
    pub async fn release_hold(&self, session: &SessionId) -> Result<Option<Hold>> {
        let hold = self
            .consume(
                session,
                &RELEASE,
                vec![self.ctx.keys.reserved_prefix(), self.ctx.keys.revision_prefix()],
                "release",
            )
            .await?;

        match &hold {
            Some(hold) => {
                tracing::info!(
                    session_id = %session,
                    item_id = %hold.item_id,
                    quantity = hold.quantity,
                    "Hold released"
                );
                metrics::record_hold_exit("released");
                self.ctx.audit(AuditEvent::HoldReleased {
                    session_id: session.clone(),
                    item_id: hold.item_id.clone(),
                    quantity: hold.quantity,
                });
            }
            None => tracing::debug!(session_id = %session, "Nothing to release"),
        }
        Ok(hold)
    }

    async fn consume(
        &self,
        session: &SessionId,
        script: &'static stockhold_core::Script,
        args: Vec<String>,
        operation: &'static str,
    ) -> Result<Option<Hold>> {
        let key = self.ctx.keys.hold(session);
        let raw = self
            .ctx
            .store
            .eval(script, vec![key.clone()], args)
            .await
            .map_err(store_failure(operation))?;

        raw.map(|raw| {
            Hold::from_record(&raw).map_err(|e| {
                tracing::error!(key = %key, error = %e, "Discarded unreadable hold");
                EngineError::CorruptRecord {
                    key: key.clone(),
                    reason: e.to_string(),
                }
            })
        })
        .transpose()
    }

    /// The session's current hold, if any.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StoreUnavailable`] on store failure and
    /// [`EngineError::CorruptRecord`] if the hold is unreadable.
    pub async fn get_hold(&self, session: &SessionId) -> Result<Option<Hold>> {
        let key = self.ctx.keys.hold(session);
        let raw = self
            .ctx
            .store
            .get(&key)
            .await
            .map_err(store_failure("get_hold"))?;

        raw.map(|raw| {
            Hold::from_record(&raw).map_err(|e| EngineError::CorruptRecord {
                key: key.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
    }
}
