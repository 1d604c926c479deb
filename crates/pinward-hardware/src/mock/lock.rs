//! Mock lock implementation for testing and development.
//!
//! This module provides a simulated lock that stores usercodes in memory.
//! Tests control it through a [`MockLockHandle`]: they can change codes
//! behind the coordinator's back, drop the connection, make writes fail,
//! mask reads the way some firmware does, and push lock activity.

use crate::error::{HardwareError, Result};
use crate::traits::LockProvider;
use crate::types::{ConnectionCallback, LockEvent, LockEventCallback, Subscription, Usercode};
use pinward_core::{LockState, Pin, is_cleared_code};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

const MASKED_CODE: &str = "**********";

/// Access-control event code reported for a remote (RF) lock.
const RF_LOCK_EVENT: u16 = 3;

/// Reported duration of a stalled read.
const READ_TIMEOUT_MS: u64 = 5000;

/// A provider call recorded by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Connect,
    GetUsercodes,
    GetUsercode(u16),
    RefreshUsercode(u16),
    SetUsercode {
        slot: u16,
        code: String,
        name: Option<String>,
    },
    ClearUsercode(u16),
    Lock,
}

impl ProviderCall {
    /// Whether the call changes a code on the lock.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            ProviderCall::SetUsercode { .. } | ProviderCall::ClearUsercode(_)
        )
    }
}

struct MockLockState {
    codes: BTreeMap<u16, String>,
    reachable: bool,
    connected: bool,
    fail_writes: bool,
    stall_reads: bool,
    mask_reads: bool,
    clear_to_zeros: bool,
    ignore_clears: bool,
    bolt: LockState,
    calls: Vec<ProviderCall>,
    next_listener_id: u64,
    lock_listeners: Vec<(u64, LockEventCallback)>,
    connection_listeners: Vec<(u64, ConnectionCallback)>,
}

impl MockLockState {
    fn new() -> Self {
        Self {
            codes: BTreeMap::new(),
            reachable: true,
            connected: false,
            fail_writes: false,
            stall_reads: false,
            mask_reads: false,
            clear_to_zeros: false,
            ignore_clears: false,
            bolt: LockState::Unknown,
            calls: Vec::new(),
            next_listener_id: 0,
            lock_listeners: Vec::new(),
            connection_listeners: Vec::new(),
        }
    }

    fn check_stalled(&self) -> Result<()> {
        if self.stall_reads {
            Err(HardwareError::timeout(READ_TIMEOUT_MS))
        } else {
            Ok(())
        }
    }

    fn read(&self, slot_num: u16) -> Option<Usercode> {
        let code = self.codes.get(&slot_num)?;
        let in_use = !is_cleared_code(code);
        let code = if self.mask_reads && in_use {
            MASKED_CODE.to_string()
        } else {
            code.clone()
        };
        Some(Usercode::new(slot_num, code, in_use))
    }
}

type Shared = Arc<Mutex<MockLockState>>;

fn guard(state: &Shared) -> MutexGuard<'_, MockLockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated lock.
///
/// # Examples
///
/// ```
/// use pinward_hardware::LockProvider;
/// use pinward_hardware::mock::MockLock;
///
/// #[tokio::main]
/// async fn main() -> pinward_hardware::Result<()> {
///     let (mut lock, handle) = MockLock::with_slots("front_door", 1..=2);
///     handle.set_code(1, "4321");
///
///     lock.connect().await?;
///     let codes = lock.get_usercodes().await?;
///     assert_eq!(codes.len(), 2);
///     assert!(codes[0].in_use);
///     Ok(())
/// }
/// ```
pub struct MockLock {
    name: String,
    state: Shared,
}

impl std::fmt::Debug for MockLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLock").field("name", &self.name).finish()
    }
}

impl MockLock {
    /// Create a mock lock with no slots.
    ///
    /// Returns a tuple of (MockLock, MockLockHandle) where the handle
    /// controls the simulated hardware.
    pub fn new(name: impl Into<String>) -> (Self, MockLockHandle) {
        Self::with_slots(name, std::iter::empty())
    }

    /// Create a mock lock with empty slots.
    pub fn with_slots(
        name: impl Into<String>,
        slots: impl IntoIterator<Item = u16>,
    ) -> (Self, MockLockHandle) {
        let name = name.into();
        let mut state = MockLockState::new();
        for slot in slots {
            state.codes.insert(slot, String::new());
        }
        let state = Arc::new(Mutex::new(state));

        let lock = Self {
            name: name.clone(),
            state: state.clone(),
        };
        let handle = MockLockHandle { name, state };
        (lock, handle)
    }

    fn ensure_connected(&self) -> Result<()> {
        if guard(&self.state).connected {
            Ok(())
        } else {
            Err(HardwareError::disconnected(self.name.as_str()))
        }
    }
}

impl LockProvider for MockLock {
    async fn connect(&mut self) -> Result<()> {
        let listeners = {
            let mut state = guard(&self.state);
            state.calls.push(ProviderCall::Connect);
            if !state.reachable {
                return Err(HardwareError::disconnected(self.name.as_str()));
            }
            if state.connected {
                return Ok(());
            }
            state.connected = true;
            state.connection_listeners.clone()
        };
        debug!("Mock lock {} connected", self.name);
        for (_, callback) in listeners {
            callback(true);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        guard(&self.state).connected
    }

    async fn get_usercodes(&self) -> Result<Vec<Usercode>> {
        self.ensure_connected()?;
        let mut state = guard(&self.state);
        state.calls.push(ProviderCall::GetUsercodes);
        state.check_stalled()?;
        let slots: Vec<u16> = state.codes.keys().copied().collect();
        Ok(slots.into_iter().filter_map(|slot| state.read(slot)).collect())
    }

    async fn get_usercode(&self, slot_num: u16) -> Result<Option<Usercode>> {
        self.ensure_connected()?;
        let mut state = guard(&self.state);
        state.calls.push(ProviderCall::GetUsercode(slot_num));
        state.check_stalled()?;
        Ok(state.read(slot_num))
    }

    async fn refresh_usercode(&mut self, slot_num: u16) -> Result<Option<Usercode>> {
        self.ensure_connected()?;
        let mut state = guard(&self.state);
        state.calls.push(ProviderCall::RefreshUsercode(slot_num));
        state.check_stalled()?;
        Ok(state.read(slot_num))
    }

    async fn set_usercode(&mut self, slot_num: u16, code: &Pin, name: Option<&str>) -> Result<()> {
        self.ensure_connected()?;
        let mut state = guard(&self.state);
        state.calls.push(ProviderCall::SetUsercode {
            slot: slot_num,
            code: code.as_str().to_string(),
            name: name.map(str::to_string),
        });
        if state.fail_writes {
            return Err(HardwareError::communication(format!(
                "{}: write to slot {} rejected",
                self.name, slot_num
            )));
        }
        state.codes.insert(slot_num, code.as_str().to_string());
        Ok(())
    }

    async fn clear_usercode(&mut self, slot_num: u16) -> Result<()> {
        self.ensure_connected()?;
        let mut state = guard(&self.state);
        state.calls.push(ProviderCall::ClearUsercode(slot_num));
        if state.fail_writes {
            return Err(HardwareError::communication(format!(
                "{}: clear of slot {} rejected",
                self.name, slot_num
            )));
        }
        if !state.ignore_clears {
            let cleared = if state.clear_to_zeros {
                "0000".to_string()
            } else {
                String::new()
            };
            state.codes.insert(slot_num, cleared);
        }

        // Verify against the raw stored value, masking does not apply.
        let stored = state.codes.get(&slot_num).map(String::as_str).unwrap_or("");
        if is_cleared_code(stored) {
            Ok(())
        } else {
            debug!("Mock lock {} slot {} not yet cleared", self.name, slot_num);
            Err(HardwareError::verification_failed(slot_num))
        }
    }

    async fn lock(&mut self) -> Result<()> {
        self.ensure_connected()?;
        let listeners = {
            let mut state = guard(&self.state);
            state.calls.push(ProviderCall::Lock);
            if state.fail_writes {
                return Err(HardwareError::communication(format!(
                    "{}: lock command rejected",
                    self.name
                )));
            }
            state.bolt = LockState::Locked;
            state.lock_listeners.clone()
        };
        debug!("Mock lock {} locked", self.name);
        let event = LockEvent::Notification {
            event_code: RF_LOCK_EVENT,
            user_id: None,
            event_label: None,
        };
        for (_, callback) in listeners {
            callback(event.clone());
        }
        Ok(())
    }

    fn subscribe_lock_events(&mut self, callback: LockEventCallback) -> Subscription {
        let mut state = guard(&self.state);
        let id = state.next_listener_id;
        state.next_listener_id += 1;
        state.lock_listeners.push((id, callback));

        let shared = self.state.clone();
        Subscription::new(move || {
            guard(&shared).lock_listeners.retain(|(lid, _)| *lid != id);
        })
    }

    fn subscribe_connection_events(&mut self, callback: ConnectionCallback) -> Subscription {
        let mut state = guard(&self.state);
        let id = state.next_listener_id;
        state.next_listener_id += 1;
        state.connection_listeners.push((id, callback));

        let shared = self.state.clone();
        Subscription::new(move || {
            guard(&shared).connection_listeners.retain(|(lid, _)| *lid != id);
        })
    }
}

/// Handle for controlling a mock lock.
///
/// The handle shares state with its [`MockLock`] and can be cloned freely.
#[derive(Clone)]
pub struct MockLockHandle {
    name: String,
    state: Shared,
}

impl std::fmt::Debug for MockLockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLockHandle")
            .field("name", &self.name)
            .finish()
    }
}

impl MockLockHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create another provider bound to the same simulated lock.
    pub fn device(&self) -> MockLock {
        MockLock {
            name: self.name.clone(),
            state: self.state.clone(),
        }
    }

    /// Add empty slots that don't exist yet.
    pub fn ensure_slots(&self, slots: impl IntoIterator<Item = u16>) {
        let mut state = guard(&self.state);
        for slot in slots {
            state.codes.entry(slot).or_default();
        }
    }

    /// Store a raw code in a slot, as if programmed at the keypad.
    pub fn set_code(&self, slot_num: u16, code: impl Into<String>) {
        guard(&self.state).codes.insert(slot_num, code.into());
    }

    /// Raw code currently stored in a slot.
    pub fn code(&self, slot_num: u16) -> Option<String> {
        guard(&self.state).codes.get(&slot_num).cloned()
    }

    /// Control whether `connect` succeeds.
    pub fn set_reachable(&self, reachable: bool) {
        guard(&self.state).reachable = reachable;
    }

    /// Drop the connection and notify connection listeners.
    pub fn disconnect(&self) {
        let listeners = {
            let mut state = guard(&self.state);
            state.reachable = false;
            if !state.connected {
                return;
            }
            state.connected = false;
            state.connection_listeners.clone()
        };
        for (_, callback) in listeners {
            callback(false);
        }
    }

    /// Current bolt position.
    pub fn bolt(&self) -> LockState {
        guard(&self.state).bolt
    }

    /// Move the bolt by hand. No event is emitted; use [`emit`](Self::emit).
    pub fn set_bolt(&self, bolt: LockState) {
        guard(&self.state).bolt = bolt;
    }

    /// Make every set, clear and lock command fail.
    pub fn set_fail_writes(&self, fail: bool) {
        guard(&self.state).fail_writes = fail;
    }

    /// Make every usercode read time out.
    pub fn set_stall_reads(&self, stall: bool) {
        guard(&self.state).stall_reads = stall;
    }

    /// Report programmed codes as `**********`.
    pub fn set_mask_reads(&self, mask: bool) {
        guard(&self.state).mask_reads = mask;
    }

    /// Leave `0000` in cleared slots, like some firmware does.
    pub fn set_clear_to_zeros(&self, zeros: bool) {
        guard(&self.state).clear_to_zeros = zeros;
    }

    /// Ignore clears so the read-back verification fails.
    pub fn set_ignore_clears(&self, ignore: bool) {
        guard(&self.state).ignore_clears = ignore;
    }

    /// Push lock activity to every subscriber.
    pub fn emit(&self, event: LockEvent) {
        let listeners = guard(&self.state).lock_listeners.clone();
        for (_, callback) in listeners {
            callback(event.clone());
        }
    }

    /// All calls recorded so far.
    pub fn calls(&self) -> Vec<ProviderCall> {
        guard(&self.state).calls.clone()
    }

    /// Set and clear calls recorded so far.
    pub fn write_calls(&self) -> Vec<ProviderCall> {
        guard(&self.state)
            .calls
            .iter()
            .filter(|c| c.is_write())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        guard(&self.state).calls.clear();
    }

    /// Number of active lock and connection subscriptions.
    pub fn listener_count(&self) -> usize {
        let state = guard(&self.state);
        state.lock_listeners.len() + state.connection_listeners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinward_core::{DoorState, ObservedPin};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pin(s: &str) -> Pin {
        Pin::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_requires_connection() {
        let (lock, _handle) = MockLock::with_slots("front", 1..=2);
        assert!(!lock.is_connected());
        let err = lock.get_usercodes().await.unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_unreachable_connect_fails() {
        let (mut lock, handle) = MockLock::new("front");
        handle.set_reachable(false);
        assert!(lock.connect().await.is_err());
        assert!(!lock.is_connected());
    }

    #[tokio::test]
    async fn test_set_and_read_back() {
        let (mut lock, handle) = MockLock::with_slots("front", 1..=3);
        lock.connect().await.unwrap();
        lock.set_usercode(2, &pin("2468"), Some("Cleaner")).await.unwrap();

        assert_eq!(handle.code(2).as_deref(), Some("2468"));
        let code = lock.refresh_usercode(2).await.unwrap().unwrap();
        assert_eq!(code.observed(), ObservedPin::Code(pin("2468")));
        assert_eq!(
            handle.write_calls(),
            vec![ProviderCall::SetUsercode {
                slot: 2,
                code: "2468".to_string(),
                name: Some("Cleaner".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn test_masked_reads() {
        let (mut lock, handle) = MockLock::with_slots("front", 1..=2);
        handle.set_code(1, "1234");
        handle.set_mask_reads(true);
        lock.connect().await.unwrap();

        let codes = lock.get_usercodes().await.unwrap();
        assert_eq!(codes[0].observed(), ObservedPin::Hidden);
        assert_eq!(codes[1].observed(), ObservedPin::Cleared);
    }

    #[tokio::test]
    async fn test_clear_accepts_zero_sentinel() {
        let (mut lock, handle) = MockLock::with_slots("front", 1..=1);
        handle.set_code(1, "1234");
        handle.set_clear_to_zeros(true);
        lock.connect().await.unwrap();

        lock.clear_usercode(1).await.unwrap();
        assert_eq!(handle.code(1).as_deref(), Some("0000"));
    }

    #[tokio::test]
    async fn test_clear_verification_failure() {
        let (mut lock, handle) = MockLock::with_slots("front", 1..=1);
        handle.set_code(1, "1234");
        handle.set_ignore_clears(true);
        lock.connect().await.unwrap();

        let err = lock.clear_usercode(1).await.unwrap_err();
        assert!(matches!(err, HardwareError::VerificationFailed { slot: 1 }));
    }

    #[tokio::test]
    async fn test_failed_write_keeps_code() {
        let (mut lock, handle) = MockLock::with_slots("front", 1..=1);
        handle.set_code(1, "1111");
        handle.set_fail_writes(true);
        lock.connect().await.unwrap();

        assert!(lock.set_usercode(1, &pin("2222"), None).await.is_err());
        assert_eq!(handle.code(1).as_deref(), Some("1111"));
    }

    #[tokio::test]
    async fn test_stalled_reads_time_out() {
        let (mut lock, handle) = MockLock::with_slots("front", 1..=2);
        lock.connect().await.unwrap();
        handle.set_stall_reads(true);

        let err = lock.get_usercodes().await.unwrap_err();
        assert!(matches!(err, HardwareError::Timeout { duration_ms: 5000 }));
        assert!(err.is_connectivity());
        assert!(lock.refresh_usercode(1).await.is_err());

        handle.set_stall_reads(false);
        assert_eq!(lock.get_usercodes().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_event_subscription_lifecycle() {
        let (mut lock, handle) = MockLock::new("front");
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let sub = lock.subscribe_lock_events(Arc::new(move |_event| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(handle.listener_count(), 1);

        let event = LockEvent::DoorChanged {
            old: DoorState::Closed,
            new: DoorState::Open,
        };
        handle.emit(event.clone());
        sub.unsubscribe();
        handle.emit(event);

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(handle.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_lock_command_emits_rf_lock() {
        let (mut lock, handle) = MockLock::new("front");
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let _sub = lock.subscribe_lock_events(Arc::new(move |event| {
            sink.lock().unwrap().push(event);
        }));
        handle.set_bolt(LockState::Unlocked);
        lock.connect().await.unwrap();

        lock.lock().await.unwrap();
        assert_eq!(handle.bolt(), LockState::Locked);
        assert_eq!(
            *events.lock().unwrap(),
            vec![LockEvent::Notification {
                event_code: RF_LOCK_EVENT,
                user_id: None,
                event_label: None,
            }]
        );
    }

    #[tokio::test]
    async fn test_connection_events() {
        let (mut lock, handle) = MockLock::new("front");
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = changes.clone();
        let _sub = lock.subscribe_connection_events(Arc::new(move |up| {
            sink.lock().unwrap().push(up);
        }));

        lock.connect().await.unwrap();
        handle.disconnect();
        assert!(!lock.is_connected());
        assert_eq!(*changes.lock().unwrap(), vec![true, false]);
    }
}
