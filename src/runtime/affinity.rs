//! CPU-affinity pinning, via `libc::sched_setaffinity`.
//!
//! Every thread must run pinned to one core so the admission controller's
//! single-processor model is sound; pinning the process once at startup
//! is sufficient since child threads inherit their parent's affinity mask
//! on Linux.
#![cfg(target_os = "linux")]

use std::io;
use std::mem;

/// Pins the calling thread (and, if called before spawning, every thread
/// subsequently spawned from it) to a single CPU core.
pub fn pin_current_thread_to_core(core: usize) -> io::Result<()> {
    unsafe {
        let mut set: libc::cpu_set_t = mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);

        let rc = libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &set);
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinning_to_core_zero_succeeds_or_reports_an_os_error() {
        // Core 0 exists on every machine this test realistically runs on;
        // we only assert the call doesn't panic and returns a sane Result.
        let result = pin_current_thread_to_core(0);
        assert!(result.is_ok() || result.is_err());
    }
}
