//! Cooldown filter for bursty lock events.
//!
//! Locks often report the same transition several times in a row (a state
//! change followed by the matching notification, or a retransmitted
//! report). The coordinator asks the throttle before acting on an event and
//! drops anything seen for the same scope and lock within the cooldown.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Per scope, per key cooldown tracker.
///
/// A scope names the kind of event (`"lock_unlocked"`, `"door_opened"`), a
/// key names the lock it happened on.
#[derive(Debug, Default)]
pub struct Throttle {
    last: HashMap<String, HashMap<String, Instant>>,
}

impl Throttle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an event for `scope` and `key` may run now.
    ///
    /// Records the call when it is allowed. A refused call does not extend
    /// the cooldown.
    pub fn is_allowed(&mut self, scope: &str, key: &str, cooldown: Duration) -> bool {
        self.is_allowed_at(scope, key, cooldown, Instant::now())
    }

    /// [`is_allowed`](Self::is_allowed) with an explicit clock reading.
    pub fn is_allowed_at(&mut self, scope: &str, key: &str, cooldown: Duration, now: Instant) -> bool {
        let entries = self.last.entry(scope.to_string()).or_default();
        if let Some(previous) = entries.get(key)
            && now.saturating_duration_since(*previous) < cooldown
        {
            return false;
        }
        entries.insert(key.to_string(), now);
        true
    }

    /// Drop every record for `key`, in all scopes.
    pub fn forget_key(&mut self, key: &str) {
        for entries in self.last.values_mut() {
            entries.remove(key);
        }
        self.last.retain(|_, entries| !entries.is_empty());
    }

    /// Number of keys tracked under `scope`.
    pub fn tracked(&self, scope: &str) -> usize {
        self.last.get(scope).map_or(0, HashMap::len)
    }
}
