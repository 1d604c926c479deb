//! Lock provider trait definition.
//!
//! A lock provider is the narrow contract between the coordinator and one
//! physical lock. It reads and writes usercodes and pushes lock activity.
//!
//! All methods use native `async fn` (Rust 1.90 + Edition 2024 RPITIT),
//! eliminating the need for the `async_trait` macro.

#![allow(async_fn_in_trait)]

use crate::error::{HardwareError, Result};
use crate::types::{ConnectionCallback, LockEventCallback, Subscription, Usercode};
use pinward_core::Pin;

/// Usercode access to a single lock.
///
/// # Object Safety and Dynamic Dispatch
///
/// **NOTE**: This trait is NOT object-safe because `async fn` methods return
/// `impl Future`. Use generic parameters, or the
/// [`AnyLockProvider`](crate::devices::AnyLockProvider) enum for dispatch
/// over several platforms.
///
/// # Examples
///
/// ```
/// use pinward_core::Pin;
/// use pinward_hardware::LockProvider;
/// use pinward_hardware::mock::MockLock;
///
/// #[tokio::main]
/// async fn main() -> pinward_hardware::Result<()> {
///     let (mut lock, _handle) = MockLock::with_slots("front_door", 1..=4);
///     lock.connect().await?;
///
///     let pin = Pin::new("1234").unwrap();
///     lock.set_usercode(1, &pin, Some("Guest")).await?;
///
///     let code = lock.get_usercode(1).await?.unwrap();
///     assert_eq!(code.code, "1234");
///     Ok(())
/// }
/// ```
pub trait LockProvider: Send + Sync {
    /// Resolve and open the hardware handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be found or reached.
    async fn connect(&mut self) -> Result<()>;

    /// Cheap liveness check.
    fn is_connected(&self) -> bool;

    /// Read every managed slot.
    async fn get_usercodes(&self) -> Result<Vec<Usercode>>;

    /// Read one slot, possibly from a provider-side cache.
    ///
    /// Returns `Ok(None)` when the lock has no such slot.
    async fn get_usercode(&self, slot_num: u16) -> Result<Option<Usercode>>;

    /// Read one slot directly from the lock, bypassing any cache.
    async fn refresh_usercode(&mut self, slot_num: u16) -> Result<Option<Usercode>>;

    /// Program `code` into a slot.
    ///
    /// No partial-state guarantee is made on failure.
    async fn set_usercode(&mut self, slot_num: u16, code: &Pin, name: Option<&str>) -> Result<()>;

    /// Clear a slot and verify it reads back as cleared.
    ///
    /// Both an empty code and an all-zero code count as cleared.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::VerificationFailed`](crate::HardwareError::VerificationFailed)
    /// if the slot still holds a code after clearing.
    async fn clear_usercode(&mut self, slot_num: u16) -> Result<()>;

    /// Command the bolt to lock.
    ///
    /// Used by autolock. Platforms that cannot drive the bolt keep the
    /// default, which reports the operation as unsupported.
    async fn lock(&mut self) -> Result<()> {
        Err(HardwareError::unsupported("lock"))
    }

    /// Push lock activity to `callback` until the subscription is dropped.
    ///
    /// Platforms without push support keep the default no-op.
    fn subscribe_lock_events(&mut self, callback: LockEventCallback) -> Subscription {
        let _ = callback;
        Subscription::noop()
    }

    /// Push connectivity changes to `callback` until the subscription is dropped.
    fn subscribe_connection_events(&mut self, callback: ConnectionCallback) -> Subscription {
        let _ = callback;
        Subscription::noop()
    }
}
