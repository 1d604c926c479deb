//! The coordinator: owns every lock and keeps hardware in line with policy.
//!
//! # Responsibilities
//!
//! - lock lifecycle (add, update, delete) and parent/child links
//! - slot edits (set or clear a PIN, reset, generic property writes)
//! - the refresh cycle: connect, re-evaluate slot policy, reconcile
//!   usercodes read from the lock, mirror parents onto children
//! - lock activity: bolt and door tracking, access counting, autolock
//!
//! # Event Flow
//!
//! ```text
//!   provider callbacks      autolock timers
//!          │                      │
//!          └──► mpsc<CoordinatorEvent> ◄── event_sender()
//!                        │
//!                        ▼
//!               Coordinator::run()  ◄── refresh interval / quick refresh
//!                        │
//!                        ▼
//!         broadcast<LockNotification> ──► subscribe()
//! ```
//!
//! Everything runs on the task that drives [`Coordinator::run`]. Provider
//! callbacks and timers only enqueue events, so no lock state is shared
//! across tasks.

use crate::autolock::{AutolockSettings, AutolockTimer};
use crate::daylight::{Daylight, FixedDaylight};
use crate::error::{EngineError, Result};
use crate::events::{
    CoordinatorEvent, Interpreted, LockNotification, LockTransition, interpret,
};
use crate::graph::LockRegistry;
use crate::state_machine::LockStateMachine;
use crate::sync::{SyncReport, effective_pin, program_slot, sync_child, wipe_slot};
use crate::throttle::Throttle;
use chrono::{Local, Utc};
use pinward_core::config::LockConfig;
use pinward_core::constants::{
    DEFAULT_NOTIFICATION_CAPACITY, QUICK_REFRESH_SECONDS, SYNC_STATUS_THRESHOLD,
};
use pinward_core::property::{LockField, SlotField};
use pinward_core::{
    CodeSlot, CoordinatorConfig, DoorState, Error, Lock, LockId, LockState, ObservedPin, Pin,
    PropertyPath, PropertyValue, SyncStatus, compute_active, explain_inactive,
};
use pinward_hardware::{
    AnyLockProvider, HardwareError, LockProvider, ProviderRegistry, Subscription, Usercode,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const SCOPE_UNLOCKED: &str = "lock_unlocked";
const SCOPE_LOCKED: &str = "lock_locked";
const SCOPE_DOOR_OPENED: &str = "door_opened";
const SCOPE_DOOR_CLOSED: &str = "door_closed";

/// Outcome of one refresh cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Locks that were reachable.
    pub connected: usize,
    /// Locks that could not be reached.
    pub unavailable: usize,
    /// Hardware writes issued while reconciling the locks' own slots.
    pub writes: usize,
    /// Parent to child mirroring.
    pub sync: SyncReport,
}

/// Runtime resources attached to one lock.
struct LockRuntime {
    provider: AnyLockProvider,
    timer: AutolockTimer,
    subscriptions: Vec<Subscription>,
    machine: LockStateMachine,
}

impl LockRuntime {
    fn shutdown(&mut self) {
        self.timer.cancel();
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }
}

enum Step {
    Shutdown,
    Refresh,
    Event(CoordinatorEvent),
    Idle,
}

/// Queue an event from a callback without blocking.
fn enqueue(tx: &mpsc::Sender<CoordinatorEvent>, event: CoordinatorEvent) {
    if let Err(e) = tx.try_send(event) {
        warn!("Dropping coordinator event: {}", e);
    }
}

fn lock_not_found(id: &LockId) -> EngineError {
    Error::LockNotFound(id.to_string()).into()
}

fn slot_not_found(lock: &Lock, slot: u16) -> EngineError {
    Error::SlotNotFound {
        lock: lock.name.clone(),
        slot,
    }
    .into()
}

fn mark_disconnected(lock: &mut Lock, runtime: &mut LockRuntime) -> bool {
    let was_connected = lock.connected;
    lock.connected = false;
    lock.lock_state = LockState::Unknown;
    runtime.machine.mark_unknown();
    for slot in lock.code_slots.values_mut() {
        slot.synced = SyncStatus::Disconnected;
    }
    was_connected
}

async fn read_usercodes(
    provider: &mut AnyLockProvider,
    slots: &[u16],
    direct: bool,
) -> std::result::Result<Vec<Usercode>, HardwareError> {
    if !direct {
        return provider.get_usercodes().await;
    }
    let mut codes = Vec::with_capacity(slots.len());
    for slot in slots {
        if let Some(code) = provider.refresh_usercode(*slot).await? {
            codes.push(code);
        }
    }
    Ok(codes)
}

/// Reconcile one slot with what the lock reports. Returns `true` when a
/// write was issued.
async fn reconcile_slot(
    lock_name: &str,
    slot: &mut CodeSlot,
    observed: ObservedPin,
    provider: &mut AnyLockProvider,
) -> bool {
    let wanted = slot.enabled && slot.active;
    match observed {
        ObservedPin::Cleared => {
            slot.pin_masked = false;
            if wanted && slot.pin.is_some() {
                info!("Slot {} on {} lost its code, reprogramming", slot.number, lock_name);
                return program_slot(lock_name, slot, provider).await.is_ok();
            }
            slot.synced = SyncStatus::Synced;
            false
        }
        ObservedPin::Hidden => {
            if !wanted {
                return wipe_slot(lock_name, slot, provider).await.is_ok();
            }
            slot.pin_masked = slot.pin.is_none();
            slot.synced = SyncStatus::Synced;
            false
        }
        ObservedPin::Code(pin) => {
            if !wanted {
                info!("Slot {} on {} should be empty, clearing", slot.number, lock_name);
                return wipe_slot(lock_name, slot, provider).await.is_ok();
            }
            if slot.pin.as_ref() != Some(&pin) {
                if matches!(slot.synced, SyncStatus::Adding | SyncStatus::OutOfSync) {
                    warn!(
                        "Slot {} on {} did not take the new code, retrying",
                        slot.number, lock_name
                    );
                    return program_slot(lock_name, slot, provider).await.is_ok();
                }
                info!("Slot {} on {} was changed at the lock", slot.number, lock_name);
                slot.pin = Some(pin);
            }
            slot.pin_masked = false;
            slot.synced = SyncStatus::Synced;
            false
        }
    }
}

async fn quick_refresh_due(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Owns the lock registry and drives every lock.
pub struct Coordinator {
    registry: LockRegistry,
    runtimes: HashMap<LockId, LockRuntime>,
    providers: ProviderRegistry,
    daylight: Arc<dyn Daylight>,
    throttle: Throttle,
    throttle_cooldown: Duration,
    refresh_interval: Duration,
    events_tx: mpsc::Sender<CoordinatorEvent>,
    events_rx: mpsc::Receiver<CoordinatorEvent>,
    notifications: broadcast::Sender<LockNotification>,
    refresh_cycles: u32,
    quick_refresh_at: Option<Instant>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("locks", &self.registry.len())
            .field("platforms", &self.providers.platforms())
            .field("refresh_interval", &self.refresh_interval)
            .finish()
    }
}

impl Coordinator {
    pub fn new(config: &CoordinatorConfig, providers: ProviderRegistry) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_capacity.max(1));
        let (notifications, _) = broadcast::channel(DEFAULT_NOTIFICATION_CAPACITY);
        Self {
            registry: LockRegistry::new(),
            runtimes: HashMap::new(),
            providers,
            daylight: Arc::new(FixedDaylight::from(&config.daylight)),
            throttle: Throttle::new(),
            throttle_cooldown: config.throttle_cooldown(),
            refresh_interval: config.refresh_interval(),
            events_tx,
            events_rx,
            notifications,
            refresh_cycles: 0,
            quick_refresh_at: None,
        }
    }

    /// Replace the day/night source used by autolock.
    ///
    /// Applies to locks added afterwards.
    pub fn with_daylight(mut self, daylight: Arc<dyn Daylight>) -> Self {
        self.daylight = daylight;
        self
    }

    /// Receive lock notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<LockNotification> {
        self.notifications.subscribe()
    }

    /// Sender for injecting events into the coordinator.
    pub fn event_sender(&self) -> mpsc::Sender<CoordinatorEvent> {
        self.events_tx.clone()
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn get_lock_by_id(&self, id: &LockId) -> Option<&Lock> {
        self.registry.get(id)
    }

    pub fn get_lock_by_name(&self, name: &str) -> Option<&Lock> {
        self.registry.by_name(name)
    }

    pub fn locks(&self) -> impl Iterator<Item = &Lock> {
        self.registry.iter()
    }

    /// Bolt history of a lock.
    pub fn state_machine(&self, id: &LockId) -> Option<&LockStateMachine> {
        self.runtimes.get(id).map(|runtime| &runtime.machine)
    }

    /// Whether the autolock countdown of a lock is running.
    pub fn autolock_running(&self, id: &LockId) -> bool {
        self.runtimes
            .get(id)
            .is_some_and(|runtime| runtime.timer.is_running())
    }

    /// When the autolock countdown of a lock will fire.
    pub fn autolock_end_time(&self, id: &LockId) -> Option<chrono::DateTime<Utc>> {
        self.runtimes
            .get(id)
            .and_then(|runtime| runtime.timer.end_time())
    }

    /// Time at which an extra refresh is scheduled, if any.
    pub fn quick_refresh_at(&self) -> Option<Instant> {
        self.quick_refresh_at
    }

    // ------------------------------------------------------------------
    // Lock lifecycle
    // ------------------------------------------------------------------

    /// Register a lock, connect it and run a refresh.
    ///
    /// Adding a lock whose id is already registered updates it instead.
    ///
    /// # Errors
    ///
    /// Fails when another lock already uses the name, or no provider serves
    /// the lock's platform.
    pub async fn add_lock(&mut self, lock: Lock) -> Result<LockId> {
        if let Some(existing) = self.registry.by_name(&lock.name)
            && existing.id != lock.id
        {
            return Err(Error::DuplicateLockName(lock.name).into());
        }
        let id = lock.id.clone();
        if self.registry.contains(&id) {
            self.update_lock(lock).await?;
            return Ok(id);
        }

        let runtime = self.build_runtime(&lock, LockStateMachine::new())?;
        info!("Adding lock {} ({}) on {}", lock.name, id, lock.platform);
        self.registry.insert(lock);
        self.runtimes.insert(id.clone(), runtime);
        self.registry.rebuild();
        self.refresh().await;
        Ok(id)
    }

    /// Add every configured lock.
    pub async fn add_configured_locks(&mut self, configs: &[LockConfig]) -> Result<Vec<LockId>> {
        let mut ids = Vec::with_capacity(configs.len());
        for config in configs {
            ids.push(self.add_lock(config.to_lock()?).await?);
        }
        Ok(ids)
    }

    /// Replace a lock's configuration.
    ///
    /// The bolt and door state, autolock and retry settings, child links and
    /// the policy of every surviving slot carry over from the registered
    /// lock. The provider and its subscriptions are recreated.
    pub async fn update_lock(&mut self, mut lock: Lock) -> Result<()> {
        let id = lock.id.clone();
        let Some(old) = self.registry.get(&id) else {
            return Err(lock_not_found(&id));
        };
        if let Some(other) = self.registry.by_name(&lock.name)
            && other.id != id
        {
            return Err(Error::DuplicateLockName(lock.name).into());
        }

        lock.connected = old.connected;
        lock.lock_state = old.lock_state;
        lock.door_state = old.door_state;
        lock.autolock_enabled = old.autolock_enabled;
        lock.autolock_min_day = old.autolock_min_day;
        lock.autolock_min_night = old.autolock_min_night;
        lock.retry_lock = old.retry_lock;
        lock.pending_retry_lock = old.pending_retry_lock;
        lock.lock_notifications = old.lock_notifications;
        lock.door_notifications = old.door_notifications;
        lock.child_ids = old.child_ids.clone();
        for (number, slot) in lock.code_slots.iter_mut() {
            if let Some(previous) = old.code_slots.get(number) {
                slot.copy_policy_from(previous);
                slot.pin = previous.pin.clone();
                slot.pin_masked = previous.pin_masked;
                slot.active = previous.active;
                slot.synced = previous.synced;
            }
        }

        let machine = match self.runtimes.remove(&id) {
            Some(mut runtime) => {
                runtime.shutdown();
                runtime.machine
            }
            None => LockStateMachine::new(),
        };
        let runtime = self.build_runtime(&lock, machine)?;
        info!("Updating lock {} ({})", lock.name, id);
        self.registry.insert(lock);
        self.runtimes.insert(id, runtime);
        self.registry.rebuild();
        self.refresh().await;
        Ok(())
    }

    /// Remove a lock, its timer and its subscriptions.
    ///
    /// Returns `false` when the lock was not registered.
    pub fn delete_lock(&mut self, id: &LockId) -> bool {
        let Some(lock) = self.registry.remove(id) else {
            debug!("Lock {} already removed", id);
            return false;
        };
        if let Some(mut runtime) = self.runtimes.remove(id) {
            runtime.shutdown();
        }
        self.throttle.forget_key(id.as_str());
        self.registry.rebuild();
        info!("Deleted lock {} ({})", lock.name, id);
        true
    }

    fn build_runtime(&self, lock: &Lock, machine: LockStateMachine) -> Result<LockRuntime> {
        let mut provider = self.providers.create(lock)?;

        let tx = self.events_tx.clone();
        let lock_id = lock.id.clone();
        let lock_events = provider.subscribe_lock_events(Arc::new(move |event| {
            enqueue(
                &tx,
                CoordinatorEvent::Lock {
                    lock_id: lock_id.clone(),
                    event,
                },
            );
        }));
        let tx = self.events_tx.clone();
        let lock_id = lock.id.clone();
        let connection_events = provider.subscribe_connection_events(Arc::new(move |connected| {
            enqueue(
                &tx,
                CoordinatorEvent::Connection {
                    lock_id: lock_id.clone(),
                    connected,
                },
            );
        }));

        let mut timer = AutolockTimer::new(lock.name.clone());
        let tx = self.events_tx.clone();
        let lock_id = lock.id.clone();
        timer.setup(
            AutolockSettings::from_lock(lock),
            self.daylight.clone(),
            Arc::new(move || {
                enqueue(
                    &tx,
                    CoordinatorEvent::AutolockFired {
                        lock_id: lock_id.clone(),
                    },
                );
            }),
        );

        Ok(LockRuntime {
            provider,
            timer,
            subscriptions: vec![lock_events, connection_events],
            machine,
        })
    }

    // ------------------------------------------------------------------
    // Slot edits
    // ------------------------------------------------------------------

    /// Store a PIN in a slot and program it when the slot is usable.
    ///
    /// # Errors
    ///
    /// Rejects malformed PINs, unknown locks or slots, and slots that
    /// mirror a parent, without changing anything. A rejected hardware
    /// write leaves the slot out of sync and is returned.
    pub async fn set_pin_on_lock(&mut self, id: &LockId, slot_num: u16, pin: &str) -> Result<()> {
        let pin = Pin::new(pin)?;
        let lock = self.registry.get_mut(id).ok_or_else(|| lock_not_found(id))?;
        let runtime = self.runtimes.get_mut(id).ok_or_else(|| lock_not_found(id))?;
        if lock.slot(slot_num).is_none() {
            return Err(slot_not_found(lock, slot_num));
        }
        if lock.slot_mirrors_parent(slot_num) {
            return Err(Error::SlotMirrorsParent {
                lock: lock.name.clone(),
                slot: slot_num,
            }
            .into());
        }

        let connected = lock.connected;
        let lock_name = lock.name.clone();
        let Some(slot) = lock.slot_mut(slot_num) else {
            return Ok(());
        };
        if slot.pin.as_ref() == Some(&pin) && slot.synced == SyncStatus::Synced {
            debug!("Slot {} on {} already holds this PIN", slot_num, lock_name);
            return Ok(());
        }
        slot.pin = Some(pin);
        slot.pin_masked = false;

        if connected && slot.enabled && slot.active {
            program_slot(&lock_name, slot, &mut runtime.provider).await?;
            self.schedule_quick_refresh();
        } else {
            debug!(
                "Stored PIN for slot {} on {}; not programmed while unusable",
                slot_num, lock_name
            );
        }
        self.sync_links(id).await;
        Ok(())
    }

    /// Forget a slot's PIN and clear it from the lock.
    pub async fn clear_pin_from_lock(&mut self, id: &LockId, slot_num: u16) -> Result<()> {
        let lock = self.registry.get_mut(id).ok_or_else(|| lock_not_found(id))?;
        let runtime = self.runtimes.get_mut(id).ok_or_else(|| lock_not_found(id))?;
        if lock.slot(slot_num).is_none() {
            return Err(slot_not_found(lock, slot_num));
        }
        if lock.slot_mirrors_parent(slot_num) {
            return Err(Error::SlotMirrorsParent {
                lock: lock.name.clone(),
                slot: slot_num,
            }
            .into());
        }

        let connected = lock.connected;
        let lock_name = lock.name.clone();
        let Some(slot) = lock.slot_mut(slot_num) else {
            return Ok(());
        };
        if slot.pin.is_none() && slot.synced == SyncStatus::Synced {
            return Ok(());
        }
        slot.pin = None;
        slot.pin_masked = false;

        if connected {
            wipe_slot(&lock_name, slot, &mut runtime.provider).await?;
            self.schedule_quick_refresh();
        }
        self.sync_links(id).await;
        Ok(())
    }

    /// Return a slot to its empty, disabled state and clear the lock.
    ///
    /// A mirrored child slot is reset too and follows its parent again.
    pub async fn reset_code_slot(&mut self, id: &LockId, slot_num: u16) -> Result<()> {
        self.reset_slot(id, slot_num).await?;
        self.sync_links(id).await;
        Ok(())
    }

    /// Reset every slot and the lock-level settings of a lock.
    pub async fn reset_lock(&mut self, id: &LockId) -> Result<()> {
        let lock = self.registry.get_mut(id).ok_or_else(|| lock_not_found(id))?;
        lock.autolock_enabled = false;
        lock.retry_lock = false;
        lock.pending_retry_lock = false;
        lock.lock_notifications = false;
        lock.door_notifications = false;
        let slots: Vec<u16> = lock.code_slots.keys().copied().collect();
        if let Some(runtime) = self.runtimes.get_mut(id) {
            runtime.timer.cancel();
        }

        for slot_num in slots {
            self.reset_slot(id, slot_num).await?;
        }
        info!("Reset lock {}", id);
        self.sync_links(id).await;
        Ok(())
    }

    async fn reset_slot(&mut self, id: &LockId, slot_num: u16) -> Result<()> {
        let lock = self.registry.get_mut(id).ok_or_else(|| lock_not_found(id))?;
        let runtime = self.runtimes.get_mut(id).ok_or_else(|| lock_not_found(id))?;
        if lock.slot(slot_num).is_none() {
            return Err(slot_not_found(lock, slot_num));
        }
        let connected = lock.connected;
        let lock_name = lock.name.clone();
        let Some(slot) = lock.slot_mut(slot_num) else {
            return Ok(());
        };

        let mut fresh = CodeSlot::new(slot_num);
        fresh.enabled = false;
        fresh.synced = slot.synced;
        *slot = fresh;

        if connected {
            wipe_slot(&lock_name, slot, &mut runtime.provider).await?;
            self.schedule_quick_refresh();
        }
        debug!("Reset slot {} on {}", slot_num, lock_name);
        Ok(())
    }

    /// Write a lock or slot property.
    ///
    /// A slot's `pin` is routed through [`set_pin_on_lock`](Self::set_pin_on_lock)
    /// (text) or [`clear_pin_from_lock`](Self::clear_pin_from_lock) (empty).
    /// Any other slot change is enforced on the lock immediately when it
    /// changes the code the slot should hold.
    pub async fn set_property(
        &mut self,
        id: &LockId,
        path: &PropertyPath,
        value: PropertyValue,
    ) -> Result<()> {
        if let PropertyPath::Slot {
            slot,
            field: SlotField::Pin,
        } = *path
        {
            return match value {
                PropertyValue::Text(text) if !text.trim().is_empty() => {
                    self.set_pin_on_lock(id, slot, &text).await
                }
                PropertyValue::Text(_) | PropertyValue::Empty => {
                    self.clear_pin_from_lock(id, slot).await
                }
                _ => Err(Error::PropertyTypeMismatch {
                    field: path.to_string(),
                    expected: "text".to_string(),
                }
                .into()),
            };
        }

        let lock = self.registry.get_mut(id).ok_or_else(|| lock_not_found(id))?;
        let before = path
            .slot()
            .and_then(|n| lock.slot(n))
            .and_then(effective_pin)
            .cloned();
        path.apply(lock, value)?;
        debug!("Set {} on {}", path, lock.name);

        match *path {
            PropertyPath::Lock(field) => {
                if field == LockField::RetryLock && !lock.retry_lock {
                    lock.pending_retry_lock = false;
                }
                let settings = AutolockSettings::from_lock(lock);
                let enabled = lock.autolock_enabled;
                if let Some(runtime) = self.runtimes.get_mut(id) {
                    runtime.timer.set_settings(settings);
                    if !enabled {
                        runtime.timer.cancel();
                    }
                }
                if field == LockField::AutolockEnabled {
                    info!("Autolock {} for {}", if enabled { "enabled" } else { "disabled" }, id);
                }
            }
            PropertyPath::Slot { slot, .. } | PropertyPath::DayOfWeek { slot, .. } => {
                self.enforce_slot(id, slot, before).await;
            }
        }
        self.sync_links(id).await;
        Ok(())
    }

    /// Parse `path` and write the property.
    pub async fn set_property_str(
        &mut self,
        id: &LockId,
        path: &str,
        value: PropertyValue,
    ) -> Result<()> {
        let path = PropertyPath::parse(path)?;
        self.set_property(id, &path, value).await
    }

    /// Re-evaluate one slot's policy and fix the lock if the code it should
    /// hold differs from `before`.
    async fn enforce_slot(&mut self, id: &LockId, slot_num: u16, before: Option<Pin>) {
        let (Some(lock), Some(runtime)) = (self.registry.get_mut(id), self.runtimes.get_mut(id))
        else {
            return;
        };
        let mirrors = lock.slot_mirrors_parent(slot_num);
        let connected = lock.connected;
        let lock_name = lock.name.clone();
        let Some(slot) = lock.slot_mut(slot_num) else {
            return;
        };
        if !mirrors {
            slot.active = compute_active(slot, Local::now().naive_local());
        }
        let after = effective_pin(slot).cloned();
        if after == before || !connected || mirrors {
            return;
        }

        let written = match after {
            Some(_) => program_slot(&lock_name, slot, &mut runtime.provider).await,
            None => wipe_slot(&lock_name, slot, &mut runtime.provider).await,
        };
        if written.is_ok() {
            self.schedule_quick_refresh();
        }
    }

    // ------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------

    /// Run one refresh cycle over every lock.
    pub async fn refresh(&mut self) -> RefreshReport {
        self.quick_refresh_at = None;
        self.refresh_cycles += 1;
        let direct = self.refresh_cycles >= SYNC_STATUS_THRESHOLD;
        if direct {
            self.refresh_cycles = 0;
        }

        let mut report = RefreshReport::default();
        for id in self.registry.ids() {
            match self.refresh_lock(&id, direct).await {
                Some(writes) => {
                    report.connected += 1;
                    report.writes += writes;
                }
                None => report.unavailable += 1,
            }
        }
        for (parent, child) in self.registry.links() {
            let sync = self.sync_pair(&parent, &child).await;
            report.sync.merge(sync);
        }

        if report.writes > 0 || report.sync.writes() > 0 {
            self.schedule_quick_refresh();
        }
        debug!("Refresh finished: {:?}", report);
        report
    }

    /// Refresh one lock. Returns the number of writes issued, or `None`
    /// when the lock is unreachable.
    async fn refresh_lock(&mut self, id: &LockId, direct: bool) -> Option<usize> {
        let (Some(lock), Some(runtime)) = (self.registry.get_mut(id), self.runtimes.get_mut(id))
        else {
            return None;
        };

        if !runtime.provider.is_connected()
            && let Err(e) = runtime.provider.connect().await
        {
            warn!("Lock {} is unavailable: {}", lock.name, e);
            if mark_disconnected(lock, runtime) {
                let notification = LockNotification::Connection {
                    lock_id: lock.id.clone(),
                    lock_name: lock.name.clone(),
                    connected: false,
                };
                let _ = self.notifications.send(notification);
            }
            return None;
        }
        lock.connected = true;

        let now = Local::now().naive_local();
        let is_child = lock.is_child();
        let lock_name = lock.name.clone();
        let mut writes = 0;

        for slot in lock.code_slots.values_mut() {
            if is_child && !slot.override_parent {
                continue;
            }
            let reason = explain_inactive(slot, now);
            let active = reason.is_none();
            if active == slot.active {
                continue;
            }
            match reason {
                Some(reason) => {
                    info!("Slot {} on {} is now inactive: {}", slot.number, lock_name, reason)
                }
                None => info!("Slot {} on {} is now active", slot.number, lock_name),
            }
            slot.active = active;
            let written = if active && slot.enabled && slot.pin.is_some() {
                program_slot(&lock_name, slot, &mut runtime.provider).await
            } else {
                wipe_slot(&lock_name, slot, &mut runtime.provider).await
            };
            if written.is_ok() {
                writes += 1;
            }
        }

        let slots: Vec<u16> = lock.code_slots.keys().copied().collect();
        let codes = match read_usercodes(&mut runtime.provider, &slots, direct).await {
            Ok(codes) => codes,
            Err(e) if e.is_connectivity() => {
                warn!("Lost {} while reading codes: {}", lock_name, e);
                if mark_disconnected(lock, runtime) {
                    let notification = LockNotification::Connection {
                        lock_id: lock.id.clone(),
                        lock_name,
                        connected: false,
                    };
                    let _ = self.notifications.send(notification);
                }
                return None;
            }
            Err(e) => {
                warn!("Could not read codes from {}: {}", lock_name, e);
                Vec::new()
            }
        };
        for code in codes {
            let Some(slot) = lock.code_slots.get_mut(&code.slot_num) else {
                continue;
            };
            let observed = code.observed();
            if reconcile_slot(&lock_name, slot, observed, &mut runtime.provider).await {
                writes += 1;
            }
        }
        Some(writes)
    }

    async fn sync_pair(&mut self, parent_id: &LockId, child_id: &LockId) -> SyncReport {
        let Some(parent) = self.registry.get(parent_id).filter(|p| p.connected).cloned() else {
            return SyncReport::default();
        };
        let (Some(child), Some(runtime)) = (
            self.registry.get_mut(child_id),
            self.runtimes.get_mut(child_id),
        ) else {
            return SyncReport::default();
        };
        if !child.connected || child.parent_id.as_ref() != Some(parent_id) {
            return SyncReport::default();
        }
        sync_child(&parent, child, &mut runtime.provider).await
    }

    /// Mirror `id` from its parent and onto its children.
    async fn sync_links(&mut self, id: &LockId) {
        let mut report = SyncReport::default();
        if let Some(parent) = self.registry.get(id).and_then(|lock| lock.parent_id.clone()) {
            report.merge(self.sync_pair(&parent, id).await);
        }
        let children = self
            .registry
            .get(id)
            .map(|lock| lock.child_ids.clone())
            .unwrap_or_default();
        for child in children {
            report.merge(self.sync_pair(id, &child).await);
        }
        if report.writes() > 0 {
            self.schedule_quick_refresh();
        }
    }

    fn schedule_quick_refresh(&mut self) {
        if self.quick_refresh_at.is_none() {
            self.quick_refresh_at = Some(Instant::now() + Duration::from_secs(QUICK_REFRESH_SECONDS));
        }
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Handle every queued event without waiting. Returns how many ran.
    pub async fn process_pending_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event).await;
            handled += 1;
        }
        handled
    }

    pub async fn handle_event(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::Lock { lock_id, event } => {
                if !self.registry.contains(&lock_id) {
                    debug!("Ignoring event for removed lock {}", lock_id);
                    return;
                }
                match interpret(&event, Utc::now()) {
                    Some(Interpreted::Lock(transition)) => match transition.target {
                        LockState::Unlocked => self.lock_unlocked(&lock_id, transition).await,
                        LockState::Locked => self.lock_locked(&lock_id, transition),
                        LockState::Unknown => {}
                    },
                    Some(Interpreted::Door(state)) => self.door_changed(&lock_id, state).await,
                    None => {}
                }
            }
            CoordinatorEvent::Connection { lock_id, connected } => {
                self.connection_changed(&lock_id, connected);
            }
            CoordinatorEvent::AutolockFired { lock_id } => self.autolock_fired(&lock_id).await,
            CoordinatorEvent::Refresh => {
                self.refresh().await;
            }
        }
    }

    async fn lock_unlocked(&mut self, id: &LockId, transition: LockTransition) {
        if !self
            .throttle
            .is_allowed(SCOPE_UNLOCKED, id.as_str(), self.throttle_cooldown)
        {
            debug!("Throttled unlock event for {}", id);
            return;
        }
        let (Some(lock), Some(runtime)) = (self.registry.get_mut(id), self.runtimes.get_mut(id))
        else {
            return;
        };

        if runtime.machine.current_state() != LockState::Unlocked
            && let Err(e) = runtime.machine.transition_to(LockState::Unlocked)
        {
            warn!("{}: {}", lock.name, e);
        }
        lock.lock_state = LockState::Unlocked;
        info!("{} unlocked ({})", lock.name, transition.event_label);

        if lock.autolock_enabled {
            runtime.timer.set_settings(AutolockSettings::from_lock(lock));
            runtime.timer.start();
        }

        let slot = lock.slot(transition.code_slot_num);
        let code_slot_name = slot.and_then(|s| s.name.clone());
        let publish = lock.lock_notifications || slot.is_some_and(|s| s.notifications);
        let notification = LockNotification::StateChanged {
            lock_id: id.clone(),
            lock_name: lock.name.clone(),
            state: LockState::Unlocked,
            event_label: transition.event_label,
            action_code: transition.action_code,
            code_slot_num: transition.code_slot_num,
            code_slot_name,
            source: transition.source,
        };

        if transition.code_slot_num > 0 {
            self.consume_access(id, transition.code_slot_num).await;
        }
        if publish {
            let _ = self.notifications.send(notification);
        }
    }

    /// Count one use of a slot. A mirrored child slot counts against the
    /// parent's slot.
    async fn consume_access(&mut self, id: &LockId, slot_num: u16) {
        let Some(lock) = self.registry.get(id) else {
            return;
        };
        let owner = match &lock.parent_id {
            Some(parent) if lock.slot_mirrors_parent(slot_num) => parent.clone(),
            _ => id.clone(),
        };
        let Some(owner_lock) = self.registry.get_mut(&owner) else {
            return;
        };
        let owner_name = owner_lock.name.clone();
        let Some(slot) = owner_lock.slot_mut(slot_num) else {
            return;
        };
        let before = effective_pin(slot).cloned();
        let Some(remaining) = slot.consume_access() else {
            return;
        };
        info!("Slot {} on {} has {} use(s) left", slot_num, owner_name, remaining);
        if remaining == 0 {
            self.enforce_slot(&owner, slot_num, before).await;
            self.sync_links(&owner).await;
        }
    }

    fn lock_locked(&mut self, id: &LockId, transition: LockTransition) {
        if !self
            .throttle
            .is_allowed(SCOPE_LOCKED, id.as_str(), self.throttle_cooldown)
        {
            debug!("Throttled lock event for {}", id);
            return;
        }
        let (Some(lock), Some(runtime)) = (self.registry.get_mut(id), self.runtimes.get_mut(id))
        else {
            return;
        };

        if runtime.machine.current_state() != LockState::Locked
            && let Err(e) = runtime.machine.transition_to(LockState::Locked)
        {
            warn!("{}: {}", lock.name, e);
        }
        lock.lock_state = LockState::Locked;
        lock.pending_retry_lock = false;
        runtime.timer.cancel();
        info!("{} locked ({})", lock.name, transition.event_label);

        let slot = lock.slot(transition.code_slot_num);
        if lock.lock_notifications || slot.is_some_and(|s| s.notifications) {
            let notification = LockNotification::StateChanged {
                lock_id: id.clone(),
                lock_name: lock.name.clone(),
                state: LockState::Locked,
                event_label: transition.event_label,
                action_code: transition.action_code,
                code_slot_num: transition.code_slot_num,
                code_slot_name: slot.and_then(|s| s.name.clone()),
                source: transition.source,
            };
            let _ = self.notifications.send(notification);
        }
    }

    async fn door_changed(&mut self, id: &LockId, state: DoorState) {
        let scope = if state == DoorState::Open {
            SCOPE_DOOR_OPENED
        } else {
            SCOPE_DOOR_CLOSED
        };
        if !self
            .throttle
            .is_allowed(scope, id.as_str(), self.throttle_cooldown)
        {
            debug!("Throttled door event for {}", id);
            return;
        }
        let Some(lock) = self.registry.get_mut(id) else {
            return;
        };
        lock.door_state = state;
        info!("{} door {}", lock.name, state);

        let retry = state == DoorState::Closed && lock.pending_retry_lock;
        lock.pending_retry_lock = false;
        if lock.door_notifications {
            let notification = LockNotification::DoorChanged {
                lock_id: id.clone(),
                lock_name: lock.name.clone(),
                state,
            };
            let _ = self.notifications.send(notification);
        }

        if retry && lock.lock_state == LockState::Unlocked {
            info!("{} closed with a pending autolock, locking", lock.name);
            self.command_lock(id).await;
        }
    }

    async fn autolock_fired(&mut self, id: &LockId) {
        let Some(lock) = self.registry.get_mut(id) else {
            return;
        };
        if !lock.autolock_enabled {
            return;
        }
        if lock.retry_lock && lock.door_state == DoorState::Open {
            info!("{} door is open, locking once it closes", lock.name);
            lock.pending_retry_lock = true;
            return;
        }
        info!("Autolocking {}", lock.name);
        self.command_lock(id).await;
    }

    async fn command_lock(&mut self, id: &LockId) {
        let Some(runtime) = self.runtimes.get_mut(id) else {
            return;
        };
        if let Err(e) = runtime.provider.lock().await {
            error!("Failed to lock {}: {}", id, e);
        }
    }

    fn connection_changed(&mut self, id: &LockId, connected: bool) {
        let (Some(lock), Some(runtime)) = (self.registry.get_mut(id), self.runtimes.get_mut(id))
        else {
            return;
        };
        if lock.connected == connected {
            return;
        }
        if connected {
            info!("{} reconnected", lock.name);
            lock.connected = true;
        } else {
            warn!("{} disconnected", lock.name);
            mark_disconnected(lock, runtime);
        }
        let notification = LockNotification::Connection {
            lock_id: id.clone(),
            lock_name: lock.name.clone(),
            connected,
        };
        let _ = self.notifications.send(notification);
        if connected {
            self.schedule_quick_refresh();
        }
    }

    // ------------------------------------------------------------------
    // Main loop
    // ------------------------------------------------------------------

    /// Refresh periodically and handle events until `shutdown` completes.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        let mut interval = tokio::time::interval(self.refresh_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);
        info!(
            "Coordinator running {} lock(s), refresh every {:?}",
            self.registry.len(),
            self.refresh_interval
        );

        loop {
            let quick = self.quick_refresh_at;
            let step = tokio::select! {
                _ = &mut shutdown => Step::Shutdown,
                _ = interval.tick() => Step::Refresh,
                _ = quick_refresh_due(quick) => Step::Refresh,
                event = self.events_rx.recv() => match event {
                    Some(event) => Step::Event(event),
                    None => Step::Idle,
                },
            };
            match step {
                Step::Shutdown => break,
                Step::Refresh => {
                    self.refresh().await;
                }
                Step::Event(event) => self.handle_event(event).await,
                Step::Idle => {}
            }
        }

        self.shutdown();
        info!("Coordinator stopped");
    }

    /// Cancel every timer and drop every provider subscription.
    pub fn shutdown(&mut self) {
        for runtime in self.runtimes.values_mut() {
            runtime.shutdown();
        }
    }
}
