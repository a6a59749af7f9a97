//! The CPU-burn workload and its one-shot calibration.
//!
//! The workload's shape (`sqrt`/`sin` of a counter) is a fixed external
//! detail, not a tunable: changing it would change every calibrated WCET
//! in the system.

use std::hint::black_box;
use std::time::Instant;

/// One unit of non-optimizable floating-point work.
///
/// `black_box` stops the optimizer from proving the result unused and
/// folding the whole loop away.
#[inline]
pub fn workload(i: f64) {
    let r = f64::sqrt(i) * 0.001 + f64::sin(i / 1000.0);
    black_box(r);
}

/// Runs `workload` `loops_per_ms * ms` times — the per-activation CPU burn
/// a task's thread performs once per period.
pub fn burn(loops_per_ms: u64, ms: u64) {
    let iterations = loops_per_ms * ms;
    for i in 0..iterations {
        workload(i as f64);
    }
}

/// Sampling window used to calibrate `loops_per_ms`.
const CALIBRATION_WINDOW_MS: u128 = 100;

/// Measures how many `workload` iterations this CPU can perform per
/// millisecond, by running the workload for a fixed wall-clock window and
/// counting iterations.
///
/// This is deliberately a coarse, load-bearing calibration: every task's
/// WCET is expressed in milliseconds of *this* measurement, so admission
/// decisions are only meaningful on the machine that ran it.
pub fn calibrate() -> u64 {
    let start = Instant::now();
    let mut count: u64 = 0;

    while start.elapsed().as_millis() < CALIBRATION_WINDOW_MS {
        workload(count as f64);
        count += 1;
    }

    count / CALIBRATION_WINDOW_MS as u64
}
