//! Engine error types and hold outcomes.
//!
//! Business refusals (sold out, capacity, rate limit) are values inside
//! [`HoldOutcome`]. Only malformed input, store failures and corrupt records
//! are errors.

use crate::types::Hold;
use serde::Serialize;
use stockhold_core::StoreError;
use thiserror::Error;

/// Message shown to shoppers for any failure that is not sold out or rate limited.
pub const RETRY_LATER_MESSAGE: &str = "Something went wrong. Please try again in a moment.";

/// Shopper-facing text for an abuse guard (per-address or per-item) refusal.
pub const TOO_MANY_ATTEMPTS_MESSAGE: &str =
    "Too many checkout attempts. Please wait a few minutes and try again.";

/// Malformed input. Nothing was changed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// An identifier was empty.
    #[error("{kind} must not be empty")]
    EmptyIdentifier {
        /// Which identifier.
        kind: &'static str,
    },

    /// An identifier was malformed.
    #[error("invalid {kind}: {reason}")]
    InvalidIdentifier {
        /// Which identifier.
        kind: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Hold quantity outside `1..=max`.
    #[error("quantity {quantity} is outside 1..={max}")]
    QuantityOutOfRange {
        /// Requested units.
        quantity: u32,
        /// Configured maximum per hold.
        max: u32,
    },

    /// Negative stock count supplied to an absolute set.
    #[error("stock count cannot be negative (got {0})")]
    NegativeStock(i64),

    /// Restock or decrement by zero units.
    #[error("amount must be at least 1")]
    ZeroAmount,

    /// A forced sweep was requested without a reason.
    #[error("a forced sweep requires a reason")]
    MissingSweepReason,
}

/// Errors returned by engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The store failed or timed out. The operation must be treated as not performed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// A stored record could not be decoded.
    #[error("corrupt record at `{key}`: {reason}")]
    CorruptRecord {
        /// Key holding the record.
        key: String,
        /// Decode failure.
        reason: String,
    },
}

impl EngineError {
    /// Text safe to show a shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::StoreUnavailable(_) | Self::CorruptRecord { .. } => RETRY_LATER_MESSAGE.to_string(),
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Why a hold was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum HoldRejection {
    /// Not enough unreserved stock for the requested quantity.
    OutOfStock,
    /// The item already has the maximum number of reserved units.
    ItemCapacity {
        /// Configured per-item limit.
        limit: u32,
    },
    /// The client address already holds the maximum number of reservations.
    RateLimited {
        /// Holds currently attributed to the address.
        attempts: u64,
        /// Configured per-address limit.
        limit: u32,
    },
}

impl HoldRejection {
    /// Text safe to show a shopper.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::OutOfStock => "Sorry, this item is sold out.",
            Self::RateLimited { .. } | Self::ItemCapacity { .. } => TOO_MANY_ATTEMPTS_MESSAGE,
        }
    }

    /// Label used in metrics and logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::OutOfStock => "out_of_stock",
            Self::ItemCapacity { .. } => "item_capacity",
            Self::RateLimited { .. } => "rate_limited",
        }
    }
}

/// Result of [`create_hold`](crate::reservations::ReservationManager::create_hold).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HoldOutcome {
    /// Units were reserved for the session.
    Reserved {
        /// The stored hold.
        hold: Hold,
    },
    /// The session already had a hold; nothing changed.
    AlreadyHeld,
    /// The hold was refused; nothing changed.
    Rejected {
        /// Why.
        rejection: HoldRejection,
    },
}

impl HoldOutcome {
    /// `true` for `Reserved` and `AlreadyHeld`.
    #[must_use]
    pub const fn is_held(&self) -> bool {
        matches!(self, Self::Reserved { .. } | Self::AlreadyHeld)
    }

    /// Label used in metrics and logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Reserved { .. } => "reserved",
            Self::AlreadyHeld => "already_held",
            Self::Rejected { rejection } => rejection.label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_messages() {
        assert!(HoldRejection::OutOfStock.user_message().contains("sold out"));
        assert_eq!(
            HoldRejection::RateLimited { attempts: 5, limit: 5 }.user_message(),
            TOO_MANY_ATTEMPTS_MESSAGE
        );
        assert_eq!(
            HoldRejection::ItemCapacity { limit: 25 }.user_message(),
            TOO_MANY_ATTEMPTS_MESSAGE
        );

        let err = EngineError::StoreUnavailable(StoreError::Unavailable("down".to_string()));
        assert_eq!(err.user_message(), RETRY_LATER_MESSAGE);
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(HoldOutcome::Rejected {
            rejection: HoldRejection::OutOfStock,
        })
        .unwrap_or_default();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["rejection"]["reason"], "out_of_stock");
    }
}
