//! Lifecycle management: leader-gated periodic tasks and store maintenance.

pub mod leadership;
pub mod maintenance;

pub use leadership::{
    ControllerResources, LeaderGatedTask, LeaderTask, LeadershipState, PeriodicTaskConfig,
    TickOutcome, MAX_INITIAL_DELAY, MIN_INITIAL_DELAY,
};
pub use maintenance::StoreMaintenanceTask;
