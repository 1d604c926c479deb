//! Parent to child slot mirroring.
//!
//! A child lock copies every slot of its parent unless the child slot sets
//! `override_parent`. Non-secret attributes are copied on every pass. The
//! PIN is written to the child lock only when the child's effective PIN
//! differs from the parent's, so repeated passes issue no writes.
//!
//! The parent's effective PIN is its stored PIN when the parent slot is
//! enabled and active, and nothing otherwise. A child slot whose lock hides
//! codes (`pin_masked`) cannot be compared and is left alone.

use pinward_core::{CodeSlot, Lock, Pin, SyncStatus};
use pinward_hardware::{LockProvider, Result as HardwareResult};
use tracing::{debug, error, info};

/// Outcome of one [`sync_child`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pins_set: usize,
    pub pins_cleared: usize,
    pub skipped_masked: usize,
    pub skipped_override: usize,
    pub failed: usize,
    pub attributes_copied: usize,
}

impl SyncReport {
    /// Successful hardware writes.
    pub fn writes(&self) -> usize {
        self.pins_set + self.pins_cleared
    }

    pub fn merge(&mut self, other: SyncReport) {
        self.pins_set += other.pins_set;
        self.pins_cleared += other.pins_cleared;
        self.skipped_masked += other.skipped_masked;
        self.skipped_override += other.skipped_override;
        self.failed += other.failed;
        self.attributes_copied += other.attributes_copied;
    }
}

/// PIN a slot should hold on hardware right now.
pub fn effective_pin(slot: &CodeSlot) -> Option<&Pin> {
    if slot.enabled && slot.active {
        slot.pin.as_ref()
    } else {
        None
    }
}

/// Copy the parent slot's non-secret attributes onto a mirrored child slot.
fn mirror_attributes(parent: &CodeSlot, child: &mut CodeSlot) {
    child.name = parent.name.clone();
    child.enabled = parent.enabled;
    child.active = parent.active;
    child.notifications = parent.notifications;
    child.copy_access_limits_from(parent);
}

/// Bring `child`'s mirrored slots in line with `parent`.
///
/// `provider` must drive the child lock. Failed writes are logged, marked
/// out of sync and retried on the next pass.
pub async fn sync_child<P: LockProvider>(parent: &Lock, child: &mut Lock, provider: &mut P) -> SyncReport {
    let mut report = SyncReport::default();
    let child_name = child.name.clone();

    for (number, parent_slot) in &parent.code_slots {
        let Some(child_slot) = child.code_slots.get_mut(number) else {
            continue;
        };
        if child_slot.override_parent {
            report.skipped_override += 1;
            continue;
        }

        mirror_attributes(parent_slot, child_slot);
        report.attributes_copied += 1;

        if child_slot.pin_masked {
            debug!(
                "{} slot {} hides its code, skipping PIN sync",
                child_name, number
            );
            report.skipped_masked += 1;
            continue;
        }

        let desired = effective_pin(parent_slot).cloned();
        if desired == child_slot.pin {
            continue;
        }

        match desired {
            Some(pin) => {
                child_slot.synced = SyncStatus::Adding;
                match provider
                    .set_usercode(*number, &pin, child_slot.name.as_deref())
                    .await
                {
                    Ok(()) => {
                        info!("Synced slot {} from {} to {}", number, parent.name, child_name);
                        child_slot.pin = Some(pin);
                        report.pins_set += 1;
                    }
                    Err(e) => {
                        error!("Failed to sync slot {} to {}: {}", number, child_name, e);
                        child_slot.synced = SyncStatus::OutOfSync;
                        report.failed += 1;
                    }
                }
            }
            None => {
                child_slot.synced = SyncStatus::Deleting;
                match provider.clear_usercode(*number).await {
                    Ok(()) => {
                        info!("Cleared slot {} on {} to match {}", number, child_name, parent.name);
                        child_slot.pin = None;
                        report.pins_cleared += 1;
                    }
                    Err(e) => {
                        error!("Failed to clear slot {} on {}: {}", number, child_name, e);
                        child_slot.synced = SyncStatus::OutOfSync;
                        report.failed += 1;
                    }
                }
            }
        }
    }

    report
}

/// Write a slot's stored PIN to the lock.
///
/// Failures are logged and leave the slot out of sync. A slot without a
/// PIN is left untouched.
pub(crate) async fn program_slot<P: LockProvider>(
    lock_name: &str,
    slot: &mut CodeSlot,
    provider: &mut P,
) -> HardwareResult<()> {
    let Some(pin) = slot.pin.clone() else {
        return Ok(());
    };
    slot.synced = SyncStatus::Adding;
    match provider
        .set_usercode(slot.number, &pin, slot.name.as_deref())
        .await
    {
        Ok(()) => {
            debug!("Programmed slot {} on {}", slot.number, lock_name);
            slot.pin_masked = false;
            Ok(())
        }
        Err(e) => {
            error!("Failed to program slot {} on {}: {}", slot.number, lock_name, e);
            slot.synced = SyncStatus::OutOfSync;
            Err(e)
        }
    }
}

/// Clear a slot on the lock, keeping the stored PIN.
pub(crate) async fn wipe_slot<P: LockProvider>(
    lock_name: &str,
    slot: &mut CodeSlot,
    provider: &mut P,
) -> HardwareResult<()> {
    slot.synced = SyncStatus::Deleting;
    match provider.clear_usercode(slot.number).await {
        Ok(()) => {
            debug!("Cleared slot {} on {}", slot.number, lock_name);
            slot.pin_masked = false;
            Ok(())
        }
        Err(e) => {
            error!("Failed to clear slot {} on {}: {}", slot.number, lock_name, e);
            slot.synced = SyncStatus::OutOfSync;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinward_core::LockId;
    use pinward_hardware::mock::{MockLock, MockLockHandle, ProviderCall};

    fn pin(s: &str) -> Pin {
        Pin::new(s).unwrap()
    }

    fn pair() -> (Lock, Lock) {
        let parent = Lock::new(LockId::new("front").unwrap(), "Front", "mock").with_slots(1, 2);
        let mut child = Lock::new(LockId::new("side").unwrap(), "Side", "mock")
            .with_slots(1, 2)
            .with_parent_name("Front");
        child.parent_id = Some(parent.id.clone());
        (parent, child)
    }

    async fn child_device() -> (MockLock, MockLockHandle) {
        let (mut device, handle) = MockLock::with_slots("Side", 1..=2);
        device.connect().await.unwrap();
        (device, handle)
    }

    #[tokio::test]
    async fn test_disabled_parent_clears_child() {
        let (mut parent, mut child) = pair();
        let slot = parent.slot_mut(1).unwrap();
        slot.pin = Some(pin("1234"));
        slot.enabled = false;
        child.slot_mut(1).unwrap().pin = Some(pin("1234"));
        let (mut device, handle) = child_device().await;
        handle.set_code(1, "1234");

        let report = sync_child(&parent, &mut child, &mut device).await;
        assert_eq!(report.pins_cleared, 1);
        assert_eq!(handle.write_calls(), vec![ProviderCall::ClearUsercode(1)]);
        let slot = child.slot(1).unwrap();
        assert_eq!(slot.pin, None);
        assert!(!slot.enabled);
    }

    #[tokio::test]
    async fn test_propagates_parent_pin() {
        let (mut parent, mut child) = pair();
        let slot = parent.slot_mut(1).unwrap();
        slot.pin = Some(pin("5678"));
        slot.name = Some("Guest".to_string());
        let (mut device, handle) = child_device().await;

        let report = sync_child(&parent, &mut child, &mut device).await;
        assert_eq!(report.pins_set, 1);
        assert_eq!(
            handle.write_calls(),
            vec![ProviderCall::SetUsercode {
                slot: 1,
                code: "5678".to_string(),
                name: Some("Guest".to_string()),
            }]
        );
        assert_eq!(child.slot(1).unwrap().pin, Some(pin("5678")));
        assert_eq!(child.slot(1).unwrap().name.as_deref(), Some("Guest"));
    }

    #[tokio::test]
    async fn test_second_pass_is_silent() {
        let (mut parent, mut child) = pair();
        parent.slot_mut(1).unwrap().pin = Some(pin("5678"));
        let (mut device, handle) = child_device().await;

        sync_child(&parent, &mut child, &mut device).await;
        handle.clear_calls();
        let report = sync_child(&parent, &mut child, &mut device).await;
        assert_eq!(report.writes(), 0);
        assert!(handle.write_calls().is_empty());
    }

    #[tokio::test]
    async fn test_masked_child_is_left_alone() {
        let (mut parent, mut child) = pair();
        parent.slot_mut(1).unwrap().pin = Some(pin("5678"));
        parent.slot_mut(1).unwrap().accesslimit_count_enabled = true;
        child.slot_mut(1).unwrap().pin_masked = true;
        let (mut device, handle) = child_device().await;

        let report = sync_child(&parent, &mut child, &mut device).await;
        assert_eq!(report.skipped_masked, 1);
        assert!(handle.write_calls().is_empty());
        let slot = child.slot(1).unwrap();
        assert_eq!(slot.pin, None);
        assert!(slot.accesslimit_count_enabled);
    }

    #[tokio::test]
    async fn test_override_never_writes() {
        let (mut parent, mut child) = pair();
        parent.slot_mut(1).unwrap().pin = Some(pin("5678"));
        parent.slot_mut(1).unwrap().name = Some("Guest".to_string());
        let slot = child.slot_mut(1).unwrap();
        slot.override_parent = true;
        slot.name = Some("Dog walker".to_string());
        slot.pin = Some(pin("9999"));
        let (mut device, handle) = child_device().await;

        let report = sync_child(&parent, &mut child, &mut device).await;
        assert_eq!(report.skipped_override, 1);
        assert!(handle.write_calls().is_empty());
        let slot = child.slot(1).unwrap();
        assert_eq!(slot.pin, Some(pin("9999")));
        assert_eq!(slot.name.as_deref(), Some("Dog walker"));
    }

    #[tokio::test]
    async fn test_failed_write_is_out_of_sync() {
        let (mut parent, mut child) = pair();
        parent.slot_mut(2).unwrap().pin = Some(pin("2468"));
        let (mut device, handle) = child_device().await;
        handle.set_fail_writes(true);

        let report = sync_child(&parent, &mut child, &mut device).await;
        assert_eq!(report.failed, 1);
        let slot = child.slot(2).unwrap();
        assert_eq!(slot.synced, SyncStatus::OutOfSync);
        assert_eq!(slot.pin, None);
    }

    #[tokio::test]
    async fn test_inactive_parent_slot_is_not_mirrored() {
        let (mut parent, mut child) = pair();
        let slot = parent.slot_mut(1).unwrap();
        slot.pin = Some(pin("1357"));
        slot.active = false;
        let (mut device, handle) = child_device().await;

        let report = sync_child(&parent, &mut child, &mut device).await;
        assert_eq!(report.writes(), 0);
        assert!(handle.write_calls().is_empty());
        assert!(!child.slot(1).unwrap().active);
    }
}
