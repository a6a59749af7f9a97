//! Response-Time Analysis (RTA) admission controller: a utilization bound
//! followed by a per-task response-time fixed point under Rate-Monotonic
//! priority assignment —
//! `R_{k+1} = C_i + sum_{j<i} ceil(R_k / T_j) * C_j`, iterated to a fixed
//! point or a hard iteration cap.

use crate::catalog::TaskType;

/// Hard iteration cap for the response-time fixed point. Convergence is
/// mathematically guaranteed whenever `U <= 1`, so this should never
/// fire; it exists purely as a defensive backstop.
const MAX_ITERATIONS: u32 = 100;

/// Why a candidate task set was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// `sum(wcet_i / period_i) > 1.0`.
    Utilization,
    /// A task's worst-case response time exceeds its deadline.
    Deadline { task: String },
    /// The fixed point failed to converge within [`MAX_ITERATIONS`] — should
    /// be unreachable whenever the utilization test already passed.
    Nonconvergent { task: String },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Utilization => write!(f, "utilization"),
            Rejection::Deadline { task } => write!(f, "deadline ({task})"),
            Rejection::Nonconvergent { task } => write!(f, "nonconvergent ({task})"),
        }
    }
}

/// A task reference used purely for RTA: name (tiebreak), wcet, period,
/// deadline, all in milliseconds. Built from a [`TaskType`] borrow so the
/// admission controller never needs to own or mutate catalog entries.
#[derive(Debug, Clone, Copy)]
struct RtaTask<'a> {
    name: &'a str,
    wcet_ms: u64,
    period_ms: u64,
    deadline_ms: u64,
}

impl<'a> From<&'a TaskType> for RtaTask<'a> {
    fn from(t: &'a TaskType) -> Self {
        RtaTask {
            name: &t.name,
            wcet_ms: t.wcet_ms,
            period_ms: t.period_ms,
            deadline_ms: t.deadline_ms,
        }
    }
}

/// Runs the admission test over `active ∪ {candidate}`.
///
/// `active` need not be sorted; this function sorts a local copy by
/// ascending period (ties broken by ascending name) to assign
/// Rate-Monotonic priorities.
pub fn admit<'a>(
    active: impl IntoIterator<Item = &'a TaskType>,
    candidate: &'a TaskType,
) -> Result<(), Rejection> {
    let mut tasks: Vec<RtaTask> = active.into_iter().map(RtaTask::from).collect();
    tasks.push(RtaTask::from(candidate));

    check_utilization(&tasks)?;

    tasks.sort_by(|a, b| a.period_ms.cmp(&b.period_ms).then_with(|| a.name.cmp(b.name)));

    for i in 0..tasks.len() {
        response_time_fixed_point(&tasks, i)?;
    }

    Ok(())
}

fn check_utilization(tasks: &[RtaTask]) -> Result<(), Rejection> {
    let utilization: f64 = tasks
        .iter()
        .map(|t| t.wcet_ms as f64 / t.period_ms as f64)
        .sum();

    if utilization > 1.0 {
        Err(Rejection::Utilization)
    } else {
        Ok(())
    }
}

/// Response-time fixed point for `tasks[i]`, with `tasks[..i]` as the
/// higher-priority interference set.
fn response_time_fixed_point(tasks: &[RtaTask], i: usize) -> Result<(), Rejection> {
    let task = tasks[i];
    let higher_priority = &tasks[..i];

    let mut response = task.wcet_ms as f64;

    for _ in 0..MAX_ITERATIONS {
        let interference: f64 = higher_priority
            .iter()
            .map(|hp| f64::ceil(response / hp.period_ms as f64) * hp.wcet_ms as f64)
            .sum();

        let next_response = task.wcet_ms as f64 + interference;

        if next_response > task.deadline_ms as f64 {
            return Err(Rejection::Deadline {
                task: task.name.to_owned(),
            });
        }

        if next_response == response {
            return Ok(());
        }

        response = next_response;
    }

    Err(Rejection::Nonconvergent {
        task: task.name.to_owned(),
    })
}
