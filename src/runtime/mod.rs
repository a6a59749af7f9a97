//! The periodic task execution engine: one `SCHED_FIFO` OS thread per
//! active instance, released on an absolute-time schedule so jitter in one
//! release never drifts the next.
//!
//! The instance pool sits behind a mutex, instance ids come from an
//! atomic counter starting at 1, and cancellation uses `SIGUSR1`
//! (installed without `SA_RESTART` so a blocked `clock_nanosleep` wakes
//! immediately) rather than a polled flag alone, so latency is bounded by
//! signal delivery instead of sleep granularity. `pthread_create` +
//! `sched_param` is replaced by `std::thread::Builder` followed by an
//! in-thread `sched_setscheduler` call, since Rust's thread API has no
//! portable way to hand `pthread_attr_t` to the new thread before it
//! starts — setting the policy from inside the thread right after spawn
//! is equivalent on Linux.

pub mod affinity;
pub mod priority;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use nix::sys::pthread::{self, Pthread};
use nix::sys::signal::{self as sig, SaFlags, SigAction, SigHandler, SigSet, Signal};
use thiserror::Error;

use crate::catalog::{Catalog, TaskType};
use crate::config::Config;

#[derive(Debug, Error)]
pub enum Error {
    #[error("at capacity: {0} instances already active")]
    AtCapacity(usize),
    #[error("no such instance: {0}")]
    NoSuchInstance(u64),
    #[error("failed to spawn task thread: {0}")]
    SpawnFailed(#[from] std::io::Error),
    #[error("failed to deliver cancellation signal: {0}")]
    SignalFailed(#[from] nix::Error),
}

/// Installs the empty `SIGUSR1` handler used to interrupt a task thread's
/// blocked `clock_nanosleep`. Must run once, before any task is activated.
/// An empty handler with no `SA_RESTART` makes the syscall return
/// `EINTR` instead of transparently resuming.
pub fn install_cancellation_signal() -> nix::Result<()> {
    extern "C" fn noop_handler(_: libc::c_int) {}

    let action = SigAction::new(
        SigHandler::Handler(noop_handler),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe { sig::sigaction(Signal::SIGUSR1, &action) }?;
    Ok(())
}

/// Point-in-time counters for one active instance, shared between its
/// task thread and whatever calls [`Runtime::list`]/[`Runtime::info`].
#[derive(Debug, Default)]
pub struct InstanceStats {
    releases: AtomicU64,
    missed_deadlines: AtomicU64,
}

impl InstanceStats {
    pub fn releases(&self) -> u64 {
        self.releases.load(Ordering::Relaxed)
    }

    pub fn missed_deadlines(&self) -> u64 {
        self.missed_deadlines.load(Ordering::Relaxed)
    }
}

/// A snapshot of one active instance, suitable for `LIST`/`INFO` rendering.
#[derive(Debug, Clone)]
pub struct InstanceInfo {
    pub id: u64,
    pub task_name: String,
    pub releases: u64,
    pub missed_deadlines: u64,
}

struct Instance {
    task_name: String,
    stats: Arc<InstanceStats>,
    cancel: Arc<AtomicBool>,
    native: Pthread,
    handle: Option<JoinHandle<()>>,
}

/// Owns the pool of active task instances and the calibrated catalog they
/// run against.
pub struct Runtime {
    catalog: Arc<Catalog>,
    cfg: Config,
    instances: std::sync::Mutex<HashMap<u64, Instance>>,
    next_id: AtomicU64,
}

impl Runtime {
    pub fn new(catalog: Arc<Catalog>, cfg: Config) -> Self {
        Self {
            catalog,
            cfg,
            instances: std::sync::Mutex::new(HashMap::new()),
            // IDs start at 1; 0 is reserved to mean "no instance".
            next_id: AtomicU64::new(1),
        }
    }

    /// Spawns a new instance of `task` and returns its instance id.
    pub fn activate(&self, task: &TaskType) -> Result<u64, Error> {
        let mut instances = self.instances.lock().unwrap_or_else(|e| e.into_inner());
        if instances.len() >= self.cfg.max_instances {
            return Err(Error::AtCapacity(self.cfg.max_instances));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let stats = Arc::new(InstanceStats::default());
        let cancel = Arc::new(AtomicBool::new(false));
        let priority = priority::priority_for_period(task.period_ms, &self.cfg);

        let (tid_tx, tid_rx) = crossbeam_channel::bounded(1);
        let task_owned = task.clone();
        let catalog = Arc::clone(&self.catalog);
        let stats_for_thread = Arc::clone(&stats);
        let cancel_for_thread = Arc::clone(&cancel);

        let handle = std::thread::Builder::new()
            .name(format!("task-{id}"))
            .spawn(move || {
                set_fifo_priority(priority);
                let _ = tid_tx.send(pthread::pthread_self());
                task_thread_entry(&task_owned, &catalog, &cancel_for_thread, &stats_for_thread);
            })?;

        // The spawned thread reports its own pthread_t before doing any
        // other work, so this recv never blocks on anything but a context
        // switch.
        let native = tid_rx
            .recv()
            .expect("task thread always reports its pthread id before exiting");

        instances.insert(
            id,
            Instance {
                task_name: task.name.clone(),
                stats,
                cancel,
                native,
                handle: Some(handle),
            },
        );

        Ok(id)
    }

    /// Cancels and removes an active instance. Sends `SIGUSR1` to
    /// interrupt a blocked sleep, then joins the thread.
    pub fn deactivate(&self, id: u64) -> Result<(), Error> {
        let instance = {
            let mut instances = self.instances.lock().unwrap_or_else(|e| e.into_inner());
            instances.remove(&id).ok_or(Error::NoSuchInstance(id))?
        };

        instance.cancel.store(true, Ordering::Relaxed);
        pthread::pthread_kill(instance.native, Signal::SIGUSR1)?;

        if let Some(handle) = instance.handle {
            let _ = handle.join();
        }

        Ok(())
    }

    /// Cancels and joins every active instance, in no particular order.
    /// Used during shutdown.
    pub fn deactivate_all(&self) {
        let ids: Vec<u64> = {
            let instances = self.instances.lock().unwrap_or_else(|e| e.into_inner());
            instances.keys().copied().collect()
        };
        for id in ids {
            let _ = self.deactivate(id);
        }
    }

    pub fn list(&self) -> Vec<InstanceInfo> {
        let instances = self.instances.lock().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<InstanceInfo> = instances
            .iter()
            .map(|(&id, instance)| InstanceInfo {
                id,
                task_name: instance.task_name.clone(),
                releases: instance.stats.releases(),
                missed_deadlines: instance.stats.missed_deadlines(),
            })
            .collect();
        out.sort_by_key(|info| info.id);
        out
    }

    pub fn info(&self, id: u64) -> Option<InstanceInfo> {
        let instances = self.instances.lock().unwrap_or_else(|e| e.into_inner());
        instances.get(&id).map(|instance| InstanceInfo {
            id,
            task_name: instance.task_name.clone(),
            releases: instance.stats.releases(),
            missed_deadlines: instance.stats.missed_deadlines(),
        })
    }

    pub fn len(&self) -> usize {
        self.instances.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sets the calling thread's scheduling policy to `SCHED_FIFO` at
/// `priority`. Best-effort: failure (typically `EPERM` without
/// `CAP_SYS_NICE`) is logged and the thread keeps running under whatever
/// policy it inherited, so a non-root run still functions (with looser
/// timing guarantees) instead of aborting.
///
/// Exposed so `lib.rs`'s bootstrap can apply the same real-time policy to
/// the network and supervisor threads (priorities 99 and 98), not just
/// task threads.
pub fn set_fifo_priority(priority: i32) {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let rc = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if rc != 0 {
        tracing::warn!(
            priority,
            error = %std::io::Error::last_os_error(),
            "failed to set SCHED_FIFO priority, continuing under default policy"
        );
    }
}

/// The drift-free periodic release loop: each iteration's next release
/// time is computed from the *previous* scheduled release plus the
/// period, never from "now", so a late release doesn't push every
/// subsequent one back by the same amount.
fn task_thread_entry(
    task: &TaskType,
    catalog: &Catalog,
    cancel: &AtomicBool,
    stats: &InstanceStats,
) {
    let mut next_release = monotonic_now();

    while !cancel.load(Ordering::Relaxed) {
        let release_time = next_release;

        catalog.run_workload(task);
        stats.releases.fetch_add(1, Ordering::Relaxed);

        let finished = monotonic_now();
        let elapsed_ms = timespec_diff_ms(release_time, finished);
        if elapsed_ms > task.deadline_ms as i64 {
            stats.missed_deadlines.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                task = %task.name,
                elapsed_ms,
                deadline_ms = task.deadline_ms,
                "deadline miss"
            );
        }

        next_release = timespec_add_ms(release_time, task.period_ms);

        if cancel.load(Ordering::Relaxed) {
            break;
        }
        sleep_until_abs(next_release);
    }
}

fn monotonic_now() -> libc::timespec {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    ts
}

fn timespec_add_ms(ts: libc::timespec, ms: u64) -> libc::timespec {
    const NS_PER_SEC: i64 = 1_000_000_000;
    let total_ns = ts.tv_nsec + (ms as i64 % 1000) * 1_000_000;
    let mut tv_sec = ts.tv_sec + (ms as i64 / 1000) + total_ns / NS_PER_SEC;
    let mut tv_nsec = total_ns % NS_PER_SEC;
    if tv_nsec < 0 {
        tv_nsec += NS_PER_SEC;
        tv_sec -= 1;
    }
    libc::timespec { tv_sec, tv_nsec }
}

fn timespec_diff_ms(start: libc::timespec, end: libc::timespec) -> i64 {
    let sec_diff = end.tv_sec - start.tv_sec;
    let nsec_diff = end.tv_nsec - start.tv_nsec;
    sec_diff * 1000 + nsec_diff / 1_000_000
}

/// Sleeps until the absolute monotonic-clock deadline `until`. A `SIGUSR1`
/// delivered during the sleep interrupts it with `EINTR` (no
/// `SA_RESTART`); the caller re-checks its cancel flag and exits instead
/// of looping back into another sleep, so cancellation latency is bounded
/// by signal delivery, not by how much of the period is left.
fn sleep_until_abs(until: libc::timespec) {
    let rc = unsafe {
        libc::clock_nanosleep(
            libc::CLOCK_MONOTONIC,
            libc::TIMER_ABSTIME,
            &until,
            std::ptr::null_mut(),
        )
    };
    if rc != 0 && rc != libc::EINTR {
        tracing::warn!(errno = rc, "clock_nanosleep failed unexpectedly");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timespec_add_ms_carries_seconds() {
        let start = libc::timespec {
            tv_sec: 10,
            tv_nsec: 900_000_000,
        };
        let result = timespec_add_ms(start, 200);
        assert_eq!(result.tv_sec, 11);
        assert_eq!(result.tv_nsec, 100_000_000);
    }

    #[test]
    fn timespec_diff_ms_measures_elapsed_milliseconds() {
        let start = libc::timespec {
            tv_sec: 5,
            tv_nsec: 0,
        };
        let end = libc::timespec {
            tv_sec: 5,
            tv_nsec: 250_000_000,
        };
        assert_eq!(timespec_diff_ms(start, end), 250);
    }

    #[test]
    fn activate_reports_capacity_once_max_instances_reached() {
        let catalog = Arc::new(Catalog::from_default().unwrap());
        let mut cfg = Config::default();
        cfg.max_instances = 1;
        let runtime = Runtime::new(catalog, cfg);
        let task = TaskType::new("t1", 50, 300, 300);

        let first = runtime.activate(&task).unwrap();
        let second = runtime.activate(&task);
        assert!(matches!(second, Err(Error::AtCapacity(1))));

        runtime.deactivate(first).unwrap();
    }

    #[test]
    fn deactivate_unknown_id_is_reported() {
        let catalog = Arc::new(Catalog::from_default().unwrap());
        let runtime = Runtime::new(catalog, Config::default());
        assert!(matches!(
            runtime.deactivate(999),
            Err(Error::NoSuchInstance(999))
        ));
    }

    #[test]
    fn list_reflects_activated_instances() {
        let catalog = Arc::new(Catalog::from_default().unwrap());
        let runtime = Runtime::new(catalog, Config::default());
        let task = TaskType::new("t1", 5, 50, 50);

        let id = runtime.activate(&task).unwrap();
        let listed = runtime.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].task_name, "t1");

        runtime.deactivate(id).unwrap();
        assert!(runtime.list().is_empty());
    }
}
