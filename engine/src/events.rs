//! Payment-session notifications.
//!
//! Translates "session completed" and "session expired" notifications from the
//! payment provider into reservation calls. Signature verification and
//! provider payload parsing happen before this point.

use crate::audit::AuditEvent;
use crate::context::EngineContext;
use crate::error::Result;
use crate::ledger::{StockDecrement, StockLedger};
use crate::reservations::ReservationManager;
use crate::types::{Hold, ItemId, SessionId};
use serde::{Deserialize, Serialize};

/// What happened to the payment session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEventKind {
    /// The shopper finished checkout.
    Completed,
    /// The session expired or was canceled.
    Expired,
}

/// A payment-session notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Notification type.
    pub event: PaymentEventKind,
    /// Session the notification is about.
    pub session_id: SessionId,
    /// Item bought, from session metadata.
    #[serde(default)]
    pub item_id: Option<ItemId>,
    /// Whether a hold was placed when the session was created.
    #[serde(default)]
    pub had_reservation: bool,
    /// Whether the provider reports the payment as settled.
    #[serde(default)]
    pub payment_confirmed: bool,
}

/// Why a notification changed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Completed, but the payment is not settled.
    PaymentNotConfirmed,
    /// Completed without a hold, and the item is unknown.
    MissingItem,
    /// Completed with a hold that no longer exists, and the item is unknown.
    NothingToConfirm,
}

/// Result of handling one notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    /// The session's hold was sold.
    Confirmed {
        /// The consumed hold.
        hold: Hold,
    },
    /// The session claimed a hold that was gone; one unit was taken from stock directly.
    BookkeepingBypassed {
        /// Item decremented.
        item_id: ItemId,
        /// Stock change.
        decrement: StockDecrement,
    },
    /// A sale from a session created without a hold; one unit was taken from stock.
    LegacySale {
        /// Item decremented.
        item_id: ItemId,
        /// Stock change.
        decrement: StockDecrement,
    },
    /// The session expired; its hold (if any) was released.
    Released {
        /// The released hold, or `None` if there was nothing to release.
        hold: Option<Hold>,
    },
    /// Nothing was done.
    Ignored {
        /// Why.
        reason: IgnoreReason,
    },
}

/// Routes payment notifications to the reservation manager and ledger.
#[derive(Debug, Clone)]
pub struct EventAdapter {
    ctx: EngineContext,
    reservations: ReservationManager,
    ledger: StockLedger,
}

impl EventAdapter {
    pub(crate) const fn new(
        ctx: EngineContext,
        reservations: ReservationManager,
        ledger: StockLedger,
    ) -> Self {
        Self {
            ctx,
            reservations,
            ledger,
        }
    }

    /// Handle one notification.
    ///
    /// # Errors
    ///
    /// Propagates store failures and corrupt holds from the underlying
    /// operations. The provider should retry; every path is idempotent except
    /// the direct stock decrement of a legacy sale.
    pub async fn handle(&self, event: &PaymentEvent) -> Result<EventOutcome> {
        match event.event {
            PaymentEventKind::Completed if !event.payment_confirmed => {
                tracing::info!(session_id = %event.session_id, "Ignoring completed session with unconfirmed payment");
                Ok(EventOutcome::Ignored {
                    reason: IgnoreReason::PaymentNotConfirmed,
                })
            }
            PaymentEventKind::Completed if event.had_reservation => self.complete_reserved(event).await,
            PaymentEventKind::Completed => self.complete_unreserved(event).await,
            PaymentEventKind::Expired => {
                let hold = self.reservations.release_hold(&event.session_id).await?;
                match &hold {
                    Some(hold) => tracing::info!(
                        session_id = %event.session_id,
                        item_id = %hold.item_id,
                        quantity = hold.quantity,
                        "Released hold for expired session"
                    ),
                    None => tracing::info!(
                        session_id = %event.session_id,
                        "Expired session had no hold to release"
                    ),
                }
                Ok(EventOutcome::Released { hold })
            }
        }
    }

    async fn complete_reserved(&self, event: &PaymentEvent) -> Result<EventOutcome> {
        if let Some(hold) = self.reservations.confirm_hold(&event.session_id).await? {
            if let Some(item) = event.item_id.as_ref().filter(|item| **item != hold.item_id) {
                tracing::warn!(
                    session_id = %event.session_id,
                    event_item = %item,
                    hold_item = %hold.item_id,
                    "Payment item differs from held item; sold the held item"
                );
            }
            return Ok(EventOutcome::Confirmed { hold });
        }

        let Some(item) = &event.item_id else {
            tracing::warn!(session_id = %event.session_id, "Reservation gone and item unknown; nothing confirmed");
            return Ok(EventOutcome::Ignored {
                reason: IgnoreReason::NothingToConfirm,
            });
        };

        tracing::warn!(
            session_id = %event.session_id,
            item_id = %item,
            "reservation bookkeeping bypassed"
        );
        let decrement = self.ledger.decrement_stock(item, 1).await?;
        self.ctx.audit(AuditEvent::ReservationBypassed {
            session_id: event.session_id.clone(),
            item_id: item.clone(),
        });
        Ok(EventOutcome::BookkeepingBypassed {
            item_id: item.clone(),
            decrement,
        })
    }

    async fn complete_unreserved(&self, event: &PaymentEvent) -> Result<EventOutcome> {
        let Some(item) = &event.item_id else {
            tracing::warn!(session_id = %event.session_id, "Completed session without item; ignoring");
            return Ok(EventOutcome::Ignored {
                reason: IgnoreReason::MissingItem,
            });
        };

        tracing::info!(session_id = %event.session_id, item_id = %item, "Recording sale without reservation");
        let decrement = self.ledger.decrement_stock(item, 1).await?;
        Ok(EventOutcome::LegacySale {
            item_id: item.clone(),
            decrement,
        })
    }
}
