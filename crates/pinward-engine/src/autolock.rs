//! Autolock countdown.
//!
//! When a lock is unlocked the coordinator starts a single-shot timer. If
//! nothing cancels it (a lock event, a disabled setting, lock deletion) the
//! timer fires its callback once. The delay depends on whether the sun is up.
//!
//! ```text
//!  unlocked ──start()──► running ──deadline──► fire callback
//!                           │
//!                 cancel() / start() again
//!                           ▼
//!                        aborted
//! ```

use crate::daylight::Daylight;
use chrono::{DateTime, Local, Utc};
use pinward_core::Lock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Callback invoked when the countdown elapses.
pub type AutolockCallback = Arc<dyn Fn() + Send + Sync>;

/// Autolock delays in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutolockSettings {
    pub day_minutes: u32,
    pub night_minutes: u32,
}

impl AutolockSettings {
    pub fn from_lock(lock: &Lock) -> Self {
        Self {
            day_minutes: lock.autolock_day_minutes(),
            night_minutes: lock.autolock_night_minutes(),
        }
    }

    /// Delay for the current period.
    pub fn delay(&self, sun_up: bool) -> Duration {
        let minutes = if sun_up {
            self.day_minutes
        } else {
            self.night_minutes
        };
        Duration::from_secs(u64::from(minutes) * 60)
    }
}

/// Single-shot cancellable autolock timer for one lock.
pub struct AutolockTimer {
    lock_name: String,
    settings: Option<AutolockSettings>,
    daylight: Option<Arc<dyn Daylight>>,
    on_fire: Option<AutolockCallback>,
    task: Option<JoinHandle<()>>,
    deadline: Option<Instant>,
    end_time: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for AutolockTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutolockTimer")
            .field("lock_name", &self.lock_name)
            .field("settings", &self.settings)
            .field("running", &self.is_running())
            .field("end_time", &self.end_time)
            .finish()
    }
}

impl AutolockTimer {
    pub fn new(lock_name: impl Into<String>) -> Self {
        Self {
            lock_name: lock_name.into(),
            settings: None,
            daylight: None,
            on_fire: None,
            task: None,
            deadline: None,
            end_time: None,
        }
    }

    /// Provide everything the timer needs to start.
    pub fn setup(
        &mut self,
        settings: AutolockSettings,
        daylight: Arc<dyn Daylight>,
        on_fire: AutolockCallback,
    ) {
        self.settings = Some(settings);
        self.daylight = Some(daylight);
        self.on_fire = Some(on_fire);
    }

    /// Change the delays used by the next [`start`](Self::start).
    pub fn set_settings(&mut self, settings: AutolockSettings) {
        self.settings = Some(settings);
    }

    pub fn is_setup(&self) -> bool {
        self.settings.is_some() && self.daylight.is_some() && self.on_fire.is_some()
    }

    /// Start the countdown, replacing any countdown in progress.
    ///
    /// Returns `false` without starting when the timer was never set up.
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self) -> bool {
        let (Some(settings), Some(daylight), Some(on_fire)) =
            (self.settings, self.daylight.as_ref(), self.on_fire.clone())
        else {
            warn!("Autolock timer for {} is not set up", self.lock_name);
            return false;
        };

        let delay = settings.delay(daylight.is_sun_up(Local::now()));
        self.abort_task();

        let deadline = Instant::now() + delay;
        let lock_name = self.lock_name.clone();
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            debug!("Autolock timer for {} fired", lock_name);
            on_fire();
        }));
        self.deadline = Some(deadline);
        self.end_time = chrono::Duration::from_std(delay)
            .ok()
            .map(|delay| Utc::now() + delay);
        debug!("Autolock timer for {} started ({:?})", self.lock_name, delay);
        true
    }

    /// Stop the countdown. Safe to call when nothing is running.
    pub fn cancel(&mut self) {
        if self.task.is_some() {
            debug!("Autolock timer for {} cancelled", self.lock_name);
        }
        self.abort_task();
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Wall-clock time at which a running countdown fires.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        if self.is_running() { self.end_time } else { None }
    }

    /// Time left on a running countdown.
    pub fn remaining(&self) -> Option<Duration> {
        if !self.is_running() {
            return None;
        }
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    fn abort_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.deadline = None;
        self.end_time = None;
    }
}

impl Drop for AutolockTimer {
    fn drop(&mut self) {
        self.abort_task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daylight::FixedDaylight;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysDay;

    impl Daylight for AlwaysDay {
        fn is_sun_up(&self, _now: DateTime<Local>) -> bool {
            true
        }
    }

    struct AlwaysNight;

    impl Daylight for AlwaysNight {
        fn is_sun_up(&self, _now: DateTime<Local>) -> bool {
            false
        }
    }

    const SETTINGS: AutolockSettings = AutolockSettings {
        day_minutes: 10,
        night_minutes: 2,
    };

    fn counting_timer(daylight: Arc<dyn Daylight>) -> (AutolockTimer, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let mut timer = AutolockTimer::new("front");
        timer.setup(
            SETTINGS,
            daylight,
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (timer, fired)
    }

    #[test]
    fn test_delay_by_period() {
        assert_eq!(SETTINGS.delay(true), Duration::from_secs(600));
        assert_eq!(SETTINGS.delay(false), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_start_without_setup() {
        let mut timer = AutolockTimer::new("front");
        assert!(!timer.is_setup());
        assert!(!timer.start());
        assert!(!timer.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_night_delay() {
        let (mut timer, fired) = counting_timer(Arc::new(AlwaysNight));
        assert!(timer.start());
        assert!(timer.is_running());
        assert!(timer.end_time().is_some());
        assert_eq!(timer.remaining(), Some(Duration::from_secs(120)));

        tokio::time::sleep(Duration::from_secs(119)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timer.is_running());
        assert_eq!(timer.end_time(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_countdown() {
        let (mut timer, fired) = counting_timer(Arc::new(AlwaysDay));
        timer.start();
        tokio::time::sleep(Duration::from_secs(300)).await;
        timer.start();
        tokio::time::sleep(Duration::from_secs(400)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(201)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let (mut timer, fired) = counting_timer(Arc::new(FixedDaylight::default()));
        timer.cancel();
        timer.start();
        timer.cancel();
        timer.cancel();
        assert!(!timer.is_running());
        assert_eq!(timer.remaining(), None);

        tokio::time::sleep(Duration::from_secs(3 * 3600)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_apply_to_next_start() {
        let (mut timer, fired) = counting_timer(Arc::new(AlwaysDay));
        timer.set_settings(AutolockSettings {
            day_minutes: 1,
            night_minutes: 1,
        });
        timer.start();
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
