//! The task catalog: an immutable table of [`TaskType`]s, calibrated once
//! at startup and looked up by name thereafter.

pub mod workload;

use serde::Deserialize;
use thiserror::Error;

/// An immutable catalog entry: a task type clients can `ACTIVATE` by name.
///
/// `wcet_ms <= deadline_ms <= period_ms` is a precondition enforced by
/// [`Catalog::new`]/[`Catalog::from_default`]: only implicit- or
/// constrained-deadline tasks are accepted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskType {
    pub name: String,
    pub wcet_ms: u64,
    pub period_ms: u64,
    pub deadline_ms: u64,
}

impl TaskType {
    pub fn new(name: impl Into<String>, wcet_ms: u64, period_ms: u64, deadline_ms: u64) -> Self {
        Self {
            name: name.into(),
            wcet_ms,
            period_ms,
            deadline_ms,
        }
    }

    fn has_sane_deadline(&self) -> bool {
        self.wcet_ms <= self.deadline_ms && self.deadline_ms <= self.period_ms
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("monotonic clock unavailable, cannot calibrate workload")]
    ClockUnavailable,

    #[error("task '{0}' has wcet/deadline/period out of order (must be wcet <= deadline <= period)")]
    InvalidTaskType(String),
}

/// The catalog's default entries:
/// `t1(C=50,T=D=300)`, `t2(C=100,T=D=500)`, `t3(C=200,T=D=1000)`.
pub fn default_task_types() -> Vec<TaskType> {
    vec![
        TaskType::new("t1", 50, 300, 300),
        TaskType::new("t2", 100, 500, 500),
        TaskType::new("t3", 200, 1000, 1000),
    ]
}

/// Catalog of available task types plus the calibrated CPU rate shared by
/// every task's workload invocation.
#[derive(Debug, Clone)]
pub struct Catalog {
    tasks: Vec<TaskType>,
    loops_per_ms: u64,
}

impl Catalog {
    /// Builds a catalog from the given task types and calibrates the
    /// workload. Blocking: the calibration runs for a fixed ~100ms window.
    ///
    /// Fails only if a task type's parameters violate the wcet/deadline/
    /// period ordering requirement — the catalog itself does not touch
    /// the clock until calibration starts, but calibration failure is not
    /// modeled as fallible here since `std::time::Instant` cannot fail to
    /// exist on a supported target; the clock-unavailable error exists for
    /// parity with platforms lacking a monotonic clock.
    pub fn new(tasks: Vec<TaskType>) -> Result<Self, Error> {
        for task in &tasks {
            if !task.has_sane_deadline() {
                return Err(Error::InvalidTaskType(task.name.clone()));
            }
        }

        let loops_per_ms = workload::calibrate();
        tracing::info!(loops_per_ms, "catalog calibration complete");

        Ok(Self { tasks, loops_per_ms })
    }

    /// Builds the catalog from the default task types.
    pub fn from_default() -> Result<Self, Error> {
        Self::new(default_task_types())
    }

    pub fn lookup(&self, name: &str) -> Option<&TaskType> {
        self.tasks
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskType> {
        self.tasks.iter()
    }

    pub fn loops_per_ms(&self) -> u64 {
        self.loops_per_ms
    }

    /// Runs this task type's calibrated CPU burn for its WCET duration.
    pub fn run_workload(&self, task: &TaskType) {
        workload::burn(self.loops_per_ms, task.wcet_ms);
    }
}
