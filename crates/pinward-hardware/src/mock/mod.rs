//! Mock lock implementations for testing and development.
//!
//! [`MockLock`] simulates a single lock. [`MockFleet`] plugs mock locks into a
//! [`ProviderRegistry`](crate::ProviderRegistry) and keeps a handle for every
//! lock it creates, so tests and demos can drive locks the coordinator built.

pub mod lock;

pub use lock::{MockLock, MockLockHandle, ProviderCall};

use crate::devices::{AnyLockProvider, ProviderFactory};
use pinward_core::Lock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Platform identifier served by mock locks.
pub const MOCK_PLATFORM: &str = "mock";

/// Registry of mock locks keyed by lock name.
#[derive(Clone, Default)]
pub struct MockFleet {
    handles: Arc<Mutex<HashMap<String, MockLockHandle>>>,
}

impl MockFleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider factory creating one mock lock per configured lock.
    ///
    /// A lock created twice under the same name (for example after an
    /// update) shares the first simulated device.
    pub fn factory(&self) -> ProviderFactory {
        let handles = self.handles.clone();
        Box::new(move |lock: &Lock| {
            let mut handles = handles.lock().unwrap_or_else(PoisonError::into_inner);
            let handle = handles
                .entry(lock.name.clone())
                .or_insert_with(|| MockLock::new(lock.name.as_str()).1)
                .clone();
            handle.ensure_slots(lock.code_slots.keys().copied());
            Ok(AnyLockProvider::Mock(handle.device()))
        })
    }

    /// Handle for `name`, creating the simulated lock if needed.
    ///
    /// Lets tests seed codes before the coordinator registers the lock.
    pub fn provision(&self, name: &str) -> MockLockHandle {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert_with(|| MockLock::new(name).1)
            .clone()
    }

    /// Handle of the mock lock created for `name`.
    pub fn handle(&self, name: &str) -> Option<MockLockHandle> {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

impl std::fmt::Debug for MockFleet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .handles
            .lock()
            .map(|h| h.len())
            .unwrap_or_default();
        f.debug_struct("MockFleet").field("locks", &count).finish()
    }
}
