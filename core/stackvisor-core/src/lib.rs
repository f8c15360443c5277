//! # stackvisor-core
//!
//! Activity stack supervisor: owns the display → stack → task → activity
//! hierarchy and drives every activity through its lifecycle (launch, resume,
//! pause, stop, destroy) in response to user-level requests and asynchronous
//! acknowledgements from client processes.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Timeouts run on a virtual
//!   clock advanced by the caller via [`StackSupervisor::advance_time`].
//! - **Not thread-safe**: One logical lock guards the whole hierarchy. Wrap it
//!   in [`SharedSupervisor`] when several threads need access.
//! - **Collaborators behind a trait**: Process transport, window animation and
//!   the keyguard UI are reached through [`SystemServices`] and never called
//!   back into while the supervisor is mid-update.
//! - **Arena ids, no back-pointers**: Parents are looked up through the
//!   [`Hierarchy`] arena, so a stale id is an error rather than a dangling link.
//! - **Stale acks are harmless**: Acknowledgements that arrive late or twice are
//!   ignored instead of failing.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stackvisor_core::{ActivitySpec, SchedulerConfig, StackSupervisor, StartRequest};
//!
//! let mut supervisor = StackSupervisor::new(SchedulerConfig::default(), services);
//! let launched = supervisor.start_activity(StartRequest::new(ActivitySpec::new(
//!     "com.example/.Main",
//!     "com.example",
//! )))?;
//! supervisor.attach_process("com.example", pid)?;
//! ```

pub mod activity;
pub mod config;
pub mod display;
pub mod dump;
pub mod error;
pub mod focus;
pub mod hierarchy;
pub mod invariants;
pub mod keyguard;
pub mod pending;
pub mod services;
pub mod shared;
pub mod stack;
pub mod supervisor;
pub mod task;
pub mod types;
pub mod visibility;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

// Re-export commonly used items at crate root
pub use activity::{ActivityRecord, ActivitySpec};
pub use config::{
    default_config_path, load_config, DisplayConfig, ProcessDeathConfig, SchedulerConfig,
    TimeoutConfig,
};
pub use dump::{
    ActivitySnapshot, DisplaySnapshot, ProcessSnapshot, SchedulerSnapshot, StackSnapshot,
    TaskSnapshot,
};
pub use error::{DeliveryError, Result, StackError};
pub use hierarchy::Hierarchy;
pub use invariants::check_invariants;
pub use services::{AppTransition, LifecycleTransaction, ProcessStartRequest, SystemServices};
pub use shared::SharedSupervisor;
pub use supervisor::{LaunchOutcome, StackSupervisor, StartRequest};
pub use types::*;
