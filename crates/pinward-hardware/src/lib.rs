//! Lock hardware abstraction layer for pinward.
//!
//! This crate defines the contract between the coordinator and the lock
//! platforms it drives. A platform implements [`LockProvider`] to read and
//! write usercodes and to push lock activity back to the coordinator.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │         Coordinator          │
//! └──────────────┬───────────────┘
//!                │ AnyLockProvider (enum dispatch)
//!                ▼
//! ┌──────────────────────────────┐
//! │    LockProvider trait        │
//! │  usercodes / subscriptions   │
//! └──────────────┬───────────────┘
//!                │
//!       ┌────────┴────────┐
//!       ▼                 ▼
//!  ┌─────────┐      ┌───────────┐
//!  │MockLock │      │ (future)  │
//!  └─────────┘      └───────────┘
//! ```
//!
//! Providers are created from a lock's `platform` string through the
//! [`ProviderRegistry`].

pub mod activity;
pub mod devices;
pub mod error;
pub mod mock;
pub mod traits;
pub mod types;

pub use activity::{Activity, LockAction, LockMethod, SensorKind};
pub use devices::{AnyLockProvider, ProviderFactory, ProviderRegistry};
pub use error::{HardwareError, Result};
pub use traits::LockProvider;
pub use types::{ConnectionCallback, LockEvent, LockEventCallback, Subscription, Usercode};
