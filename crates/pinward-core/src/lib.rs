//! Domain model for the pinward access-code coordinator.
//!
//! This crate holds the data types shared by every other pinward crate:
//! locks, code slots, validated PINs, the slot policy engine and the
//! configuration file format. Nothing in here performs I/O beyond reading
//! the configuration file.

pub mod config;
pub mod constants;
pub mod error;
pub mod lock;
pub mod policy;
pub mod property;
pub mod slot;
pub mod types;

pub use config::{CoordinatorConfig, LockConfig};
pub use error::{Error, Result};
pub use lock::Lock;
pub use policy::{InactiveReason, compute_active, explain_inactive};
pub use property::{PropertyPath, PropertyValue};
pub use slot::{CodeSlot, DayOfWeekRule, WindowMode};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
