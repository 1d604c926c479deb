//! Lock coordination engine for pinward.
//!
//! The [`Coordinator`] owns every registered lock and keeps the codes on
//! the hardware consistent with each slot's policy. It mirrors parent locks
//! onto their children, tracks bolt and door state from lock activity, and
//! relocks doors after an idle period.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │                    Coordinator                     │
//! │  LockRegistry ─ Throttle ─ AutolockTimer per lock  │
//! │        │                        │                  │
//! │   sync_child()            LockStateMachine         │
//! └────────┬───────────────────────────────────────────┘
//!          │ AnyLockProvider
//!          ▼
//!    pinward-hardware
//! ```
//!
//! # Example
//!
//! ```
//! use pinward_core::{CoordinatorConfig, Lock, LockId};
//! use pinward_engine::Coordinator;
//! use pinward_hardware::ProviderRegistry;
//! use pinward_hardware::mock::{MOCK_PLATFORM, MockFleet};
//!
//! #[tokio::main]
//! async fn main() -> pinward_engine::Result<()> {
//!     let fleet = MockFleet::new();
//!     let mut providers = ProviderRegistry::new();
//!     providers.register(MOCK_PLATFORM, fleet.factory());
//!
//!     let mut coordinator = Coordinator::new(&CoordinatorConfig::default(), providers);
//!     let front = Lock::new(LockId::new("front").unwrap(), "Front", MOCK_PLATFORM).with_slots(1, 3);
//!     let id = coordinator.add_lock(front).await?;
//!
//!     coordinator.set_pin_on_lock(&id, 1, "4321").await?;
//!     assert_eq!(fleet.handle("Front").unwrap().code(1).as_deref(), Some("4321"));
//!     Ok(())
//! }
//! ```

pub mod autolock;
pub mod coordinator;
pub mod daylight;
pub mod error;
pub mod events;
pub mod graph;
pub mod state_machine;
pub mod sync;
pub mod throttle;

pub use autolock::{AutolockSettings, AutolockTimer};
pub use coordinator::{Coordinator, RefreshReport};
pub use daylight::{Daylight, FixedDaylight};
pub use error::{EngineError, Result};
pub use events::{CoordinatorEvent, EventSource, LockNotification, LockTransition};
pub use graph::{LockRegistry, RebuildReport};
pub use state_machine::{LockStateMachine, StateTransition};
pub use sync::{SyncReport, sync_child};
pub use throttle::Throttle;
