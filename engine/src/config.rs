//! Engine configuration and key layout.

use crate::types::{ClientIp, ItemId, SessionId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default key namespace.
pub const DEFAULT_NAMESPACE: &str = "stockhold:";

/// Limits applied when creating holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationPolicy {
    /// Lifetime of a hold, its item's reserved counter and the client address counter.
    pub ttl: Duration,
    /// Reserved units above which an item refuses new holds.
    pub max_per_item: u32,
    /// Live holds one client address may accumulate within `ttl`.
    pub max_per_ip: u32,
    /// Largest quantity a single hold may request.
    pub max_quantity: u32,
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            max_per_item: 25,
            max_per_ip: 5,
            max_quantity: 10,
        }
    }
}

/// Background sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSettings {
    /// Time between scheduled normal sweeps. Zero disables the scheduler.
    pub interval: Duration,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
        }
    }
}

/// Store key layout.
///
/// ```text
/// {ns}stock:{item}      integer, no expiry
/// {ns}reserved:{item}   integer, expires with the newest hold
/// {ns}hold:{session}    JSON hold record, expires
/// {ns}revision:{item}   integer, no expiry; bumped whenever a hold moves the reserved counter
/// {ns}ip_holds:{ip}     integer, expires
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpace {
    namespace: String,
}

impl KeySpace {
    /// Key layout under `namespace` (e.g. `"shop:"`).
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Namespace prefix shared by every key.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Prefix of all stock keys.
    #[must_use]
    pub fn stock_prefix(&self) -> String {
        format!("{}stock:", self.namespace)
    }

    /// Prefix of all reserved counters.
    #[must_use]
    pub fn reserved_prefix(&self) -> String {
        format!("{}reserved:", self.namespace)
    }

    /// Prefix of all holds.
    #[must_use]
    pub fn hold_prefix(&self) -> String {
        format!("{}hold:", self.namespace)
    }

    /// Prefix of all reserved-counter revisions.
    #[must_use]
    pub fn revision_prefix(&self) -> String {
        format!("{}revision:", self.namespace)
    }

    /// Prefix of all client address counters.
    #[must_use]
    pub fn ip_prefix(&self) -> String {
        format!("{}ip_holds:", self.namespace)
    }

    /// Stock key of `item`.
    #[must_use]
    pub fn stock(&self, item: &ItemId) -> String {
        format!("{}{item}", self.stock_prefix())
    }

    /// Reserved counter of `item`.
    #[must_use]
    pub fn reserved(&self, item: &ItemId) -> String {
        format!("{}{item}", self.reserved_prefix())
    }

    /// Revision of `item`'s reserved counter.
    #[must_use]
    pub fn revision(&self, item: &ItemId) -> String {
        format!("{}{item}", self.revision_prefix())
    }

    /// Hold key of `session`.
    #[must_use]
    pub fn hold(&self, session: &SessionId) -> String {
        format!("{}{session}", self.hold_prefix())
    }

    /// Counter of holds attributed to `ip`.
    #[must_use]
    pub fn client_ip(&self, ip: &ClientIp) -> String {
        format!("{}{ip}", self.ip_prefix())
    }

    /// Identifier part of a key, given the prefix it was enumerated with.
    #[must_use]
    pub fn suffix<'k>(key: &'k str, prefix: &str) -> Option<&'k str> {
        key.strip_prefix(prefix)
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

/// Everything the engine needs besides its store, audit sink and clock.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Key layout.
    pub keys: KeySpace,
    /// Hold limits.
    pub policy: ReservationPolicy,
    /// Background sweep.
    pub sweep: SweepSettings,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let keys = KeySpace::default();
        let item = ItemId::new("mug").unwrap();
        let session = SessionId::new("cs_1").unwrap();

        assert_eq!(keys.stock(&item), "stockhold:stock:mug");
        assert_eq!(keys.reserved(&item), "stockhold:reserved:mug");
        assert_eq!(keys.hold(&session), "stockhold:hold:cs_1");
        assert_eq!(keys.revision(&item), "stockhold:revision:mug");
        assert_eq!(
            keys.client_ip(&ClientIp::new("10.0.0.1").unwrap()),
            "stockhold:ip_holds:10.0.0.1"
        );
        assert_eq!(
            KeySpace::suffix("stockhold:stock:mug", &keys.stock_prefix()),
            Some("mug")
        );
    }

    #[test]
    fn test_default_policy() {
        let policy = ReservationPolicy::default();
        assert_eq!(policy.ttl, Duration::from_secs(600));
        assert_eq!(policy.max_per_item, 25);
        assert_eq!(policy.max_per_ip, 5);
        assert_eq!(policy.max_quantity, 10);
    }
}
