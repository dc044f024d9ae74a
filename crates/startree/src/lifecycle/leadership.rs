//! Leader-gated periodic tasks.
//!
//! Controller work such as store maintenance must only run on the current
//! leader. [`LeaderGatedTask`] wraps a [`LeaderTask`] and, on every
//! [`tick`](LeaderGatedTask::tick), polls leadership once: it fires the
//! task's transition hooks exactly once per leadership change and runs
//! [`LeaderTask::process`] over all tables while leader.
//!
//! ```text
//!            leader                  process ok
//! Follower ──────────▶ BecomingLeader ──────────▶ Leader
//!     ▲                     │                       │
//!     └─────────────────────┴───────────────────────┘
//!                       not leader
//! ```
//!
//! There are no timers or threads here; the caller owns scheduling and
//! calls `tick` every `interval` after `initial_delay`.

use crate::error::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Lower bound of the initial delay before a task first runs.
pub const MIN_INITIAL_DELAY: Duration = Duration::from_secs(120);

/// Upper bound of the initial delay before a task first runs.
pub const MAX_INITIAL_DELAY: Duration = Duration::from_secs(300);

/// Cluster facts a leader-gated task depends on.
pub trait ControllerResources: Send + Sync {
    /// Returns true if this controller currently leads the cluster.
    fn is_leader(&self) -> bool;

    /// Names of every table managed by the controller.
    fn all_table_names(&self) -> Vec<String>;
}

/// Work that only runs on the leader.
pub trait LeaderTask: Send {
    /// Task name used in log output.
    fn name(&self) -> &str;

    /// Called once when this controller becomes leader.
    fn on_become_leader(&mut self) {}

    /// Called once when this controller stops being leader.
    fn on_become_not_leader(&mut self) {}

    /// Processes the given tables.
    fn process(&mut self, tables: &[String]) -> Result<()>;
}

/// Scheduling parameters for a periodic task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodicTaskConfig {
    /// Task name.
    pub name: String,

    /// Time between runs. A zero interval disables the task.
    pub interval: Duration,

    /// Delay before the first run, within
    /// [`MIN_INITIAL_DELAY`]..=[`MAX_INITIAL_DELAY`].
    ///
    /// Default: [`MIN_INITIAL_DELAY`].
    pub initial_delay: Duration,
}

impl PeriodicTaskConfig {
    /// Creates a configuration with the minimum initial delay.
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            initial_delay: MIN_INITIAL_DELAY,
        }
    }

    /// Sets the initial delay, clamped to the allowed range.
    ///
    /// Callers that want jitter sample the delay themselves and pass it here.
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay.clamp(MIN_INITIAL_DELAY, MAX_INITIAL_DELAY);
        self
    }

    /// Returns true if the task should be scheduled at all.
    pub fn is_runnable(&self) -> bool {
        !self.interval.is_zero()
    }
}

/// Leadership as last observed by a [`LeaderGatedTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeadershipState {
    /// Not leader.
    #[default]
    Follower,
    /// Leader, but the first run since the transition has not succeeded yet.
    BecomingLeader,
    /// Leader with at least one successful run.
    Leader,
}

/// Result of a single [`LeaderGatedTask::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The task did not run.
    Skipped,
    /// The task processed this many tables.
    Processed {
        /// Number of tables passed to `process`.
        tables: usize,
    },
}

/// Runs a [`LeaderTask`] only while this controller is leader.
pub struct LeaderGatedTask<T: LeaderTask> {
    config: PeriodicTaskConfig,
    resources: Arc<dyn ControllerResources>,
    task: T,
    state: LeadershipState,
}

impl<T: LeaderTask> LeaderGatedTask<T> {
    /// Creates a gated task in the `Follower` state.
    pub fn new(config: PeriodicTaskConfig, resources: Arc<dyn ControllerResources>, task: T) -> Self {
        Self {
            config,
            resources,
            task,
            state: LeadershipState::Follower,
        }
    }

    /// Polls leadership once and runs the task if leader.
    ///
    /// # Errors
    ///
    /// Returns the error from [`LeaderTask::process`]. The leadership hooks
    /// are not fired again on the next tick.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        if !self.config.is_runnable() {
            debug!("Task {} has a zero interval, not running", self.config.name);
            return Ok(TickOutcome::Skipped);
        }

        if !self.resources.is_leader() {
            if self.state != LeadershipState::Follower {
                info!("Task {} lost leadership", self.config.name);
                self.task.on_become_not_leader();
                self.state = LeadershipState::Follower;
            }
            info!("Skipping task {}: not leader", self.config.name);
            return Ok(TickOutcome::Skipped);
        }

        if self.state == LeadershipState::Follower {
            info!("Task {} became leader", self.config.name);
            self.task.on_become_leader();
            self.state = LeadershipState::BecomingLeader;
        }

        let tables = self.resources.all_table_names();
        info!(
            "Starting task {} on {} tables",
            self.config.name,
            tables.len()
        );
        let start = Instant::now();
        match self.task.process(&tables) {
            Ok(()) => {
                self.state = LeadershipState::Leader;
                info!(
                    "Finished task {} in {}ms",
                    self.config.name,
                    start.elapsed().as_millis()
                );
                Ok(TickOutcome::Processed {
                    tables: tables.len(),
                })
            }
            Err(err) => {
                error!(
                    "Task {} failed after {}ms: {:?}",
                    self.config.name,
                    start.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Last observed leadership state.
    pub fn state(&self) -> LeadershipState {
        self.state
    }

    /// Scheduling parameters.
    pub fn config(&self) -> &PeriodicTaskConfig {
        &self.config
    }

    /// The wrapped task.
    pub fn task(&self) -> &T {
        &self.task
    }

    /// The wrapped task, mutably.
    pub fn task_mut(&mut self) -> &mut T {
        &mut self.task
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Resources {
        leader: AtomicBool,
    }

    impl ControllerResources for Resources {
        fn is_leader(&self) -> bool {
            self.leader.load(Ordering::SeqCst)
        }

        fn all_table_names(&self) -> Vec<String> {
            vec!["t1".to_string(), "t2".to_string()]
        }
    }

    #[derive(Default)]
    struct Recorder {
        became_leader: usize,
        lost_leader: usize,
        processed: usize,
        fail: bool,
    }

    impl LeaderTask for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn on_become_leader(&mut self) {
            self.became_leader += 1;
        }

        fn on_become_not_leader(&mut self) {
            self.lost_leader += 1;
        }

        fn process(&mut self, _tables: &[String]) -> Result<()> {
            if self.fail {
                return Err(StoreError::TaskFailed {
                    task: "recorder".to_string(),
                    reason: "injected".to_string(),
                });
            }
            self.processed += 1;
            Ok(())
        }
    }

    fn gated(leader: bool, recorder: Recorder) -> (Arc<Resources>, LeaderGatedTask<Recorder>) {
        let resources = Arc::new(Resources {
            leader: AtomicBool::new(leader),
        });
        let config = PeriodicTaskConfig::new("recorder", Duration::from_secs(60));
        let task = LeaderGatedTask::new(config, resources.clone(), recorder);
        (resources, task)
    }

    #[test]
    fn test_hooks_fire_once_per_transition() {
        let (resources, mut task) = gated(true, Recorder::default());

        assert_eq!(task.tick().unwrap(), TickOutcome::Processed { tables: 2 });
        assert_eq!(task.tick().unwrap(), TickOutcome::Processed { tables: 2 });
        assert_eq!(task.state(), LeadershipState::Leader);
        assert_eq!(task.task().became_leader, 1);

        resources.leader.store(false, Ordering::SeqCst);
        assert_eq!(task.tick().unwrap(), TickOutcome::Skipped);
        assert_eq!(task.tick().unwrap(), TickOutcome::Skipped);
        assert_eq!(task.state(), LeadershipState::Follower);
        assert_eq!(task.task().lost_leader, 1);
        assert_eq!(task.task().processed, 2);
    }

    #[test]
    fn test_follower_never_fires_hooks() {
        let (_resources, mut task) = gated(false, Recorder::default());

        assert_eq!(task.tick().unwrap(), TickOutcome::Skipped);
        assert_eq!(task.task().became_leader, 0);
        assert_eq!(task.task().lost_leader, 0);
    }

    #[test]
    fn test_failed_first_run_stays_becoming_leader() {
        let recorder = Recorder {
            fail: true,
            ..Default::default()
        };
        let (_resources, mut task) = gated(true, recorder);

        assert!(task.tick().is_err());
        assert_eq!(task.state(), LeadershipState::BecomingLeader);

        task.task_mut().fail = false;
        assert_eq!(task.tick().unwrap(), TickOutcome::Processed { tables: 2 });
        assert_eq!(task.state(), LeadershipState::Leader);
        assert_eq!(task.task().became_leader, 1);
    }

    #[test]
    fn test_zero_interval_never_runs() {
        let resources = Arc::new(Resources {
            leader: AtomicBool::new(true),
        });
        let config = PeriodicTaskConfig::new("disabled", Duration::ZERO);
        assert!(!config.is_runnable());

        let mut task = LeaderGatedTask::new(config, resources, Recorder::default());
        assert_eq!(task.tick().unwrap(), TickOutcome::Skipped);
        assert_eq!(task.task().became_leader, 0);
        assert_eq!(task.task().processed, 0);
    }

    #[test]
    fn test_initial_delay_is_clamped() {
        let config = PeriodicTaskConfig::new("t", Duration::from_secs(1))
            .with_initial_delay(Duration::from_secs(10));
        assert_eq!(config.initial_delay, MIN_INITIAL_DELAY);

        let config = config.with_initial_delay(Duration::from_secs(1000));
        assert_eq!(config.initial_delay, MAX_INITIAL_DELAY);
    }
}
