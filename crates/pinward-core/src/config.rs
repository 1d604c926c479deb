//! # Coordinator Configuration
//!
//! ## Configuration Sources
//! ```text
//! 1. Environment variables (highest priority)
//!    PINWARD_REFRESH_INTERVAL_SECS=30
//!    PINWARD_LOG_LEVEL=debug
//! 2. TOML config file
//! 3. Default values (lowest priority)
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! refresh_interval_secs = 60
//! log_level = "info"
//!
//! [daylight]
//! sunrise_hour = 7
//! sunset_hour = 19
//!
//! [[locks]]
//! name = "front_door"
//! platform = "mock"
//! slots = 5
//! autolock_enabled = true
//!
//! [[locks]]
//! name = "side_door"
//! platform = "mock"
//! parent = "front_door"
//! slots = 5
//! ```

use crate::constants::{
    DEFAULT_EVENT_QUEUE_CAPACITY, DEFAULT_REFRESH_INTERVAL_SECONDS, DEFAULT_SLOT_COUNT,
    DEFAULT_START_SLOT, DEFAULT_SUNRISE_HOUR, DEFAULT_SUNSET_HOUR, THROTTLE_SECONDS,
};
use crate::error::{Error, Result};
use crate::lock::Lock;
use crate::types::LockId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Day/night boundaries used to pick the autolock delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaylightConfig {
    #[serde(default = "default_sunrise_hour")]
    pub sunrise_hour: u32,
    #[serde(default = "default_sunset_hour")]
    pub sunset_hour: u32,
}

fn default_sunrise_hour() -> u32 {
    DEFAULT_SUNRISE_HOUR
}

fn default_sunset_hour() -> u32 {
    DEFAULT_SUNSET_HOUR
}

impl Default for DaylightConfig {
    fn default() -> Self {
        Self {
            sunrise_hour: DEFAULT_SUNRISE_HOUR,
            sunset_hour: DEFAULT_SUNSET_HOUR,
        }
    }
}

/// One configured lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// Stable id; generated when omitted.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub platform: String,
    /// Name of the parent lock whose slots this lock mirrors.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default = "default_slot_count")]
    pub slots: u16,
    #[serde(default = "default_start_slot")]
    pub start_slot: u16,
    #[serde(default)]
    pub autolock_enabled: bool,
    #[serde(default)]
    pub autolock_min_day: Option<u32>,
    #[serde(default)]
    pub autolock_min_night: Option<u32>,
    #[serde(default)]
    pub retry_lock: bool,
}

fn default_slot_count() -> u16 {
    DEFAULT_SLOT_COUNT
}

fn default_start_slot() -> u16 {
    DEFAULT_START_SLOT
}

impl LockConfig {
    pub fn new(name: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            platform: platform.into(),
            parent: None,
            slots: DEFAULT_SLOT_COUNT,
            start_slot: DEFAULT_START_SLOT,
            autolock_enabled: false,
            autolock_min_day: None,
            autolock_min_night: None,
            retry_lock: false,
        }
    }

    /// Build the in-memory lock record described by this entry.
    pub fn to_lock(&self) -> Result<Lock> {
        let id = match &self.id {
            Some(id) => LockId::new(id.as_str())?,
            None => LockId::generate(),
        };
        let mut lock = Lock::new(id, self.name.as_str(), self.platform.as_str())
            .with_slots(self.start_slot, self.slots);
        lock.parent_name = self.parent.clone();
        lock.autolock_enabled = self.autolock_enabled;
        lock.autolock_min_day = self.autolock_min_day;
        lock.autolock_min_night = self.autolock_min_night;
        lock.retry_lock = self.retry_lock;
        Ok(lock)
    }
}

/// Top-level coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_throttle_seconds")]
    pub throttle_seconds: u64,
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub daylight: DaylightConfig,
    #[serde(default)]
    pub locks: Vec<LockConfig>,
}

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECONDS
}

fn default_throttle_seconds() -> u64 {
    THROTTLE_SECONDS
}

fn default_event_queue_capacity() -> usize {
    DEFAULT_EVENT_QUEUE_CAPACITY
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECONDS,
            throttle_seconds: THROTTLE_SECONDS,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            log_level: default_log_level(),
            daylight: DaylightConfig::default(),
            locks: Vec::new(),
        }
    }
}

impl CoordinatorConfig {
    /// Loads configuration from a TOML file, then the environment.
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading coordinator config from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let mut config: CoordinatorConfig = toml::from_str(&contents)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            debug!("No config path given, using defaults");
            let mut config = Self::default();
            config.apply_overrides(|key| std::env::var(key).ok());
            return config;
        };
        Self::load(path).unwrap_or_else(|e| {
            warn!("Failed to load coordinator config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn throttle_cooldown(&self) -> Duration {
        Duration::from_secs(self.throttle_seconds)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval_secs == 0 {
            return Err(Error::Config(
                "refresh_interval_secs must be greater than 0".into(),
            ));
        }
        if self.event_queue_capacity == 0 {
            return Err(Error::Config(
                "event_queue_capacity must be greater than 0".into(),
            ));
        }
        let DaylightConfig {
            sunrise_hour,
            sunset_hour,
        } = self.daylight;
        if sunrise_hour >= sunset_hour || sunset_hour > 24 {
            return Err(Error::Config(format!(
                "sunrise_hour ({}) must be before sunset_hour ({})",
                sunrise_hour, sunset_hour
            )));
        }

        let mut names = HashSet::new();
        for lock in &self.locks {
            if lock.name.trim().is_empty() {
                return Err(Error::Config("lock name must not be empty".into()));
            }
            if lock.platform.trim().is_empty() {
                return Err(Error::Config(format!(
                    "lock {} has no platform",
                    lock.name
                )));
            }
            if lock.slots == 0 {
                return Err(Error::Config(format!(
                    "lock {} must manage at least one slot",
                    lock.name
                )));
            }
            let last_slot = u32::from(lock.start_slot) + u32::from(lock.slots) - 1;
            if last_slot > u32::from(u16::MAX) {
                return Err(Error::Config(format!(
                    "lock {} slots {}..{} run past slot {}",
                    lock.name,
                    lock.start_slot,
                    last_slot,
                    u16::MAX
                )));
            }
            if !names.insert(lock.name.as_str()) {
                return Err(Error::DuplicateLockName(lock.name.clone()));
            }
        }

        // Unknown parents are a soft error: the lock runs standalone until
        // the parent shows up.
        for lock in &self.locks {
            if let Some(parent) = &lock.parent
                && !names.contains(parent.as_str())
            {
                warn!("Lock {} references unknown parent {}", lock.name, parent);
            }
        }

        Ok(())
    }

    /// Applies `PINWARD_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("PINWARD_REFRESH_INTERVAL_SECS")
            && let Ok(secs) = value.parse()
        {
            debug!("Overriding refresh interval from environment: {}s", secs);
            self.refresh_interval_secs = secs;
        }
        if let Some(value) = lookup("PINWARD_THROTTLE_SECONDS")
            && let Ok(secs) = value.parse()
        {
            self.throttle_seconds = secs;
        }
        if let Some(level) = lookup("PINWARD_LOG_LEVEL") {
            self.log_level = level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
refresh_interval_secs = 30

[daylight]
sunrise_hour = 6
sunset_hour = 20

[[locks]]
id = "front"
name = "front_door"
platform = "mock"
slots = 3
autolock_enabled = true
autolock_min_day = 90

[[locks]]
name = "side_door"
platform = "mock"
parent = "front_door"
start_slot = 10
"#;

    #[test]
    fn test_parse_sample() {
        let config: CoordinatorConfig = toml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.refresh_interval(), Duration::from_secs(30));
        assert_eq!(config.throttle_seconds, THROTTLE_SECONDS);
        assert_eq!(config.daylight.sunrise_hour, 6);
        assert_eq!(config.locks.len(), 2);
        assert_eq!(config.locks[1].slots, DEFAULT_SLOT_COUNT);
        assert_eq!(config.locks[1].parent.as_deref(), Some("front_door"));
    }

    #[test]
    fn test_to_lock() {
        let config: CoordinatorConfig = toml::from_str(SAMPLE).unwrap();
        let front = config.locks[0].to_lock().unwrap();
        assert_eq!(front.id.as_str(), "front");
        assert_eq!(front.code_slots.len(), 3);
        assert_eq!(front.autolock_day_minutes(), 90);

        let side = config.locks[1].to_lock().unwrap();
        assert_eq!(side.parent_name.as_deref(), Some("front_door"));
        assert!(side.parent_id.is_none());
        assert_eq!(side.code_slots.keys().next(), Some(&10));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = CoordinatorConfig::load(file.path()).unwrap();
        assert_eq!(config.locks[0].name, "front_door");
    }

    #[test]
    fn test_load_or_default_on_bad_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"refresh_interval_secs = \"soon\"").unwrap();
        let config = CoordinatorConfig::load_or_default(Some(file.path()));
        assert!(config.locks.is_empty());
        assert_eq!(config.refresh_interval_secs, DEFAULT_REFRESH_INTERVAL_SECONDS);
    }

    #[test]
    fn test_overrides() {
        let mut config = CoordinatorConfig::default();
        config.apply_overrides(|key| match key {
            "PINWARD_REFRESH_INTERVAL_SECS" => Some("15".to_string()),
            "PINWARD_THROTTLE_SECONDS" => Some("not a number".to_string()),
            "PINWARD_LOG_LEVEL" => Some("debug".to_string()),
            _ => None,
        });
        assert_eq!(config.refresh_interval_secs, 15);
        assert_eq!(config.throttle_seconds, THROTTLE_SECONDS);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut config = CoordinatorConfig::default();
        config.locks.push(LockConfig::new("front", "mock"));
        config.locks.push(LockConfig::new("front", "mock"));
        assert!(matches!(
            config.validate(),
            Err(Error::DuplicateLockName(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_daylight() {
        let mut config = CoordinatorConfig::default();
        config.daylight.sunrise_hour = 20;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_bounds_slot_range() {
        let mut config = CoordinatorConfig::default();
        let mut lock = LockConfig::new("front", "mock");
        lock.start_slot = u16::MAX - 1;
        lock.slots = 2;
        config.locks.push(lock);
        assert!(config.validate().is_ok());

        config.locks[0].slots = 3;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_parent_is_not_fatal() {
        let mut config = CoordinatorConfig::default();
        let mut side = LockConfig::new("side", "mock");
        side.parent = Some("missing".to_string());
        config.locks.push(side);
        assert!(config.validate().is_ok());
    }
}
