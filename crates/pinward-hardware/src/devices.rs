//! Enum wrapper and registry for lock provider dispatch.
//!
//! Native `async fn` in traits are not object-safe, so we cannot store
//! `Box<dyn LockProvider>`. [`AnyLockProvider`] gives concrete dispatch over
//! every supported platform instead, and [`ProviderRegistry`] maps a lock's
//! `platform` string to the constructor for its variant.
//!
//! # Examples
//!
//! ```
//! use pinward_core::{Lock, LockId};
//! use pinward_hardware::ProviderRegistry;
//! use pinward_hardware::mock::{MOCK_PLATFORM, MockFleet};
//!
//! let fleet = MockFleet::new();
//! let mut registry = ProviderRegistry::new();
//! registry.register(MOCK_PLATFORM, fleet.factory());
//!
//! let lock = Lock::new(LockId::new("front").unwrap(), "front", "mock").with_slots(1, 4);
//! let provider = registry.create(&lock).unwrap();
//! assert_eq!(provider.platform(), "mock");
//! assert!(fleet.handle("front").is_some());
//! ```

use crate::error::{HardwareError, Result};
use crate::mock::{MOCK_PLATFORM, MockLock};
use crate::traits::LockProvider;
use crate::types::{ConnectionCallback, LockEventCallback, Subscription, Usercode};
use pinward_core::{Lock, Pin};
use std::collections::HashMap;
use tracing::debug;

/// Enum wrapper for lock provider dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyLockProvider {
    /// Simulated lock for development and testing.
    Mock(MockLock),
}

impl AnyLockProvider {
    /// Platform identifier of the wrapped provider.
    pub fn platform(&self) -> &'static str {
        match self {
            Self::Mock(_) => MOCK_PLATFORM,
        }
    }
}

impl LockProvider for AnyLockProvider {
    async fn connect(&mut self) -> Result<()> {
        match self {
            Self::Mock(device) => device.connect().await,
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Self::Mock(device) => device.is_connected(),
        }
    }

    async fn get_usercodes(&self) -> Result<Vec<Usercode>> {
        match self {
            Self::Mock(device) => device.get_usercodes().await,
        }
    }

    async fn get_usercode(&self, slot_num: u16) -> Result<Option<Usercode>> {
        match self {
            Self::Mock(device) => device.get_usercode(slot_num).await,
        }
    }

    async fn refresh_usercode(&mut self, slot_num: u16) -> Result<Option<Usercode>> {
        match self {
            Self::Mock(device) => device.refresh_usercode(slot_num).await,
        }
    }

    async fn set_usercode(&mut self, slot_num: u16, code: &Pin, name: Option<&str>) -> Result<()> {
        match self {
            Self::Mock(device) => device.set_usercode(slot_num, code, name).await,
        }
    }

    async fn clear_usercode(&mut self, slot_num: u16) -> Result<()> {
        match self {
            Self::Mock(device) => device.clear_usercode(slot_num).await,
        }
    }

    async fn lock(&mut self) -> Result<()> {
        match self {
            Self::Mock(device) => device.lock().await,
        }
    }

    fn subscribe_lock_events(&mut self, callback: LockEventCallback) -> Subscription {
        match self {
            Self::Mock(device) => device.subscribe_lock_events(callback),
        }
    }

    fn subscribe_connection_events(&mut self, callback: ConnectionCallback) -> Subscription {
        match self {
            Self::Mock(device) => device.subscribe_connection_events(callback),
        }
    }
}

/// Constructor for a platform's provider.
pub type ProviderFactory = Box<dyn Fn(&Lock) -> Result<AnyLockProvider> + Send + Sync>;

/// Maps platform identifiers to provider constructors.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the constructor for `platform`.
    pub fn register(&mut self, platform: impl Into<String>, factory: ProviderFactory) {
        let platform = platform.into();
        debug!("Registering lock provider for platform {}", platform);
        self.factories.insert(platform, factory);
    }

    pub fn supports(&self, platform: &str) -> bool {
        self.factories.contains_key(platform)
    }

    /// Registered platform identifiers, sorted.
    pub fn platforms(&self) -> Vec<&str> {
        let mut platforms: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        platforms.sort_unstable();
        platforms
    }

    /// Build the provider for `lock`.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::UnknownPlatform`] when no constructor is
    /// registered for the lock's platform.
    pub fn create(&self, lock: &Lock) -> Result<AnyLockProvider> {
        let factory = self
            .factories
            .get(&lock.platform)
            .ok_or_else(|| HardwareError::unknown_platform(lock.platform.as_str()))?;
        factory(lock)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("platforms", &self.platforms())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockFleet;
    use pinward_core::LockId;

    fn lock(name: &str, platform: &str) -> Lock {
        Lock::new(LockId::new(name).unwrap(), name, platform).with_slots(1, 2)
    }

    #[test]
    fn test_unknown_platform() {
        let registry = ProviderRegistry::new();
        let err = registry.create(&lock("front", "zigbee")).unwrap_err();
        assert!(matches!(err, HardwareError::UnknownPlatform { .. }));
    }

    #[test]
    fn test_platforms_sorted() {
        let fleet = MockFleet::new();
        let mut registry = ProviderRegistry::new();
        registry.register("mock", fleet.factory());
        registry.register("a_mock", fleet.factory());
        assert_eq!(registry.platforms(), vec!["a_mock", "mock"]);
        assert!(registry.supports("mock"));
    }

    #[tokio::test]
    async fn test_dispatch_through_enum() {
        let fleet = MockFleet::new();
        let mut registry = ProviderRegistry::new();
        registry.register(MOCK_PLATFORM, fleet.factory());

        let mut provider = registry.create(&lock("front", "mock")).unwrap();
        provider.connect().await.unwrap();
        provider
            .set_usercode(1, &Pin::new("5555").unwrap(), None)
            .await
            .unwrap();

        let handle = fleet.handle("front").unwrap();
        assert_eq!(handle.code(1).as_deref(), Some("5555"));
        assert_eq!(provider.get_usercodes().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_recreated_provider_shares_device() {
        let fleet = MockFleet::new();
        let factory = fleet.factory();
        let first = factory(&lock("front", "mock")).unwrap();
        fleet.handle("front").unwrap().set_code(2, "9999");

        let mut second = factory(&lock("front", "mock")).unwrap();
        second.connect().await.unwrap();
        let code = second.get_usercode(2).await.unwrap().unwrap();
        assert_eq!(code.code, "9999");
        drop(first);
    }
}
