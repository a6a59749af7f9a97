//! Rate-Monotonic priority mapping: shorter period maps to strictly
//! higher numeric `SCHED_FIFO` priority.
//!
//! `BASE=90, STEP=100, MIN=1, MAX=90` keeps every task priority strictly
//! below the supervisor thread's priority of 98.

use crate::config::Config;

/// Maps a task period to a `SCHED_FIFO` priority in `[min, max]`, strictly
/// decreasing in period.
pub fn priority_for_period(period_ms: u64, cfg: &Config) -> i32 {
    let raw = cfg.prio_base - (period_ms as i32 / cfg.prio_step);
    raw.clamp(cfg.prio_min, cfg.prio_max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorter_period_gets_strictly_higher_priority() {
        let cfg = Config::default();
        let p_short = priority_for_period(300, &cfg);
        let p_long = priority_for_period(1000, &cfg);
        assert!(p_short > p_long);
    }

    #[test]
    fn stays_within_clamp_bounds_for_extreme_periods() {
        let cfg = Config::default();
        assert_eq!(priority_for_period(0, &cfg), cfg.prio_max);
        assert_eq!(priority_for_period(1_000_000, &cfg), cfg.prio_min);
    }

    #[test]
    fn never_reaches_supervisor_priority() {
        let cfg = Config::default();
        for period_ms in [1, 50, 300, 500, 1000, 50_000] {
            assert!(
                priority_for_period(period_ms, &cfg) < crate::config::SUPERVISOR_THREAD_PRIORITY
            );
        }
    }
}
