//! Domain value types.
//!
//! Identifiers are validated on construction so every key the engine derives
//! from them is well formed. All of them serialize as plain strings and
//! re-validate on deserialization.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest identifier accepted, in bytes.
pub const MAX_IDENTIFIER_LEN: usize = 128;

fn validate_identifier(kind: &'static str, raw: &str) -> Result<(), ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::EmptyIdentifier { kind });
    }
    if raw.len() > MAX_IDENTIFIER_LEN {
        return Err(ValidationError::InvalidIdentifier {
            kind,
            reason: format!("longer than {MAX_IDENTIFIER_LEN} bytes"),
        });
    }
    if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::InvalidIdentifier {
            kind,
            reason: "contains whitespace or control characters".to_string(),
        });
    }
    Ok(())
}

/// Identifier of a sellable item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    /// Validate and wrap an item identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the identifier is empty, longer than
    /// [`MAX_IDENTIFIER_LEN`] or contains whitespace/control characters.
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        validate_identifier("item id", &raw)?;
        Ok(Self(raw))
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier of a checkout (payment) session. One session holds at most one item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Validate and wrap a session identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] under the same rules as [`ItemId::new`].
    pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        validate_identifier("session id", &raw)?;
        Ok(Self(raw))
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! string_conversions {
    ($name:ident) => {
        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(raw: String) -> Result<Self, Self::Error> {
                Self::new(raw)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_conversions!(ItemId);
string_conversions!(SessionId);

/// Units requested by one hold, within `1..=max_quantity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct HoldQuantity(u32);

impl HoldQuantity {
    /// Validate a requested quantity against the configured maximum.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::QuantityOutOfRange`] if `quantity` is 0 or
    /// above `max`.
    pub const fn new(quantity: u32, max: u32) -> Result<Self, ValidationError> {
        if quantity == 0 || quantity > max {
            return Err(ValidationError::QuantityOutOfRange { quantity, max });
        }
        Ok(Self(quantity))
    }

    /// Number of units.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// On-hand stock for one item. Never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct StockCount(u64);

impl StockCount {
    /// Accept a signed administrative input, rejecting negatives.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NegativeStock`] if `quantity < 0`.
    pub fn try_from_signed(quantity: i64) -> Result<Self, ValidationError> {
        u64::try_from(quantity)
            .map(Self)
            .map_err(|_| ValidationError::NegativeStock(quantity))
    }

    /// Interpret a raw counter read from the store. Negative values written
    /// outside the engine read as zero.
    #[must_use]
    pub fn from_stored(raw: i64) -> Self {
        Self(u64::try_from(raw).unwrap_or(0))
    }

    /// Number of units.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// A stored reservation: which item, how many units.
///
/// Persisted as JSON (`{"item_id":"...","quantity":N}`) under the session's
/// hold key, so both the engine and server-side scripts can decode it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    /// Reserved item.
    pub item_id: ItemId,
    /// Reserved units.
    pub quantity: u32,
}

impl Hold {
    /// Encode as the stored JSON record.
    #[must_use]
    pub fn to_record(&self) -> String {
        // Serializing a struct of a string and an integer cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode a stored JSON record.
    ///
    /// # Errors
    ///
    /// Returns the decode error if the record is not a valid hold.
    pub fn from_record(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Client network address used by the per-address abuse guard.
///
/// Usually an IP taken from proxy headers; any opaque non-empty token is
/// accepted since the guard is only a heuristic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ClientIp(String);

impl ClientIp {
    /// Wrap a client address. Returns `None` for blank input.
    #[must_use]
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_IDENTIFIER_LEN {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    /// Borrow the address.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<std::net::IpAddr> for ClientIp {
    fn from(ip: std::net::IpAddr) -> Self {
        Self(ip.to_string())
    }
}

impl fmt::Display for ClientIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
