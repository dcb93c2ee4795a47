//! Lifecycle and system state tracking.
//!
//! Every participant runs a lifecycle state machine and broadcasts its status
//! changes. The system monitor aggregates the statuses of the required
//! participant set into one system state; the lifecycle service is the gate
//! that authorises simulation progress.

mod lifecycle;
mod system_controller;
mod system_monitor;
mod system_state_tracker;

pub use lifecycle::LifecycleService;
pub use system_controller::SystemController;
pub use system_monitor::{
    ParticipantConnectedHandler, ParticipantStatusHandler, SystemMonitor, SystemStateHandler,
};
pub use system_state_tracker::{StatusApplyResult, SystemStateTracker};
