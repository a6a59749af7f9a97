//! Tunable constants, merged from defaults, an optional JSON overlay, and
//! CLI flags, in that order of increasing precedence.

use serde::Deserialize;

/// Server port.
pub const DEFAULT_SERVER_PORT: u16 = 8080;
/// CPU core every thread is pinned to.
pub const DEFAULT_CPU_PIN: usize = 0;
/// Maximum simultaneous client connections.
pub const DEFAULT_MAX_CLIENTS: usize = 25;
/// TCP listen backlog.
pub const DEFAULT_BACKLOG: i32 = 5;
/// Per-client receive buffer size, in bytes.
pub const DEFAULT_NET_BUFFER_SIZE: usize = 4096;
/// Response buffer size, in bytes (`LIST`/`INFO` truncate beyond this).
pub const DEFAULT_NET_RESPONSE_BUF_SIZE: usize = 4096;
/// Maximum concurrently admitted task instances.
pub const DEFAULT_MAX_INSTANCES: usize = 20;
/// Maximum queued-but-unprocessed control events.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 20;
/// Maximum catalog task-name length, in bytes.
pub const DEFAULT_TASK_NAME_LEN: usize = 32;

/// Priority-mapping constants: `prio = clamp(base - period_ms / step, min, max)`.
pub const DEFAULT_PRIO_BASE: i32 = 90;
pub const DEFAULT_PRIO_STEP: i32 = 100;
pub const DEFAULT_PRIO_MIN: i32 = 1;
pub const DEFAULT_PRIO_MAX: i32 = 90;

/// `SCHED_FIFO` priority of the network thread; strictly above the
/// supervisor and every task thread.
pub const NETWORK_THREAD_PRIORITY: i32 = 99;
/// `SCHED_FIFO` priority of the supervisor thread; strictly above every
/// task thread, strictly below the network thread.
pub const SUPERVISOR_THREAD_PRIORITY: i32 = 98;

/// Process-wide configuration, mergeable with an optional JSON overlay and
/// CLI overrides (see [`crate::cli::Cli::resolve_config`]).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server_port: u16,
    pub cpu_pin: usize,
    pub max_clients: usize,
    pub backlog: i32,
    pub net_buffer_size: usize,
    pub net_response_buf_size: usize,
    pub max_instances: usize,
    pub max_queue_size: usize,
    pub task_name_len: usize,
    pub prio_base: i32,
    pub prio_step: i32,
    pub prio_min: i32,
    pub prio_max: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: DEFAULT_SERVER_PORT,
            cpu_pin: DEFAULT_CPU_PIN,
            max_clients: DEFAULT_MAX_CLIENTS,
            backlog: DEFAULT_BACKLOG,
            net_buffer_size: DEFAULT_NET_BUFFER_SIZE,
            net_response_buf_size: DEFAULT_NET_RESPONSE_BUF_SIZE,
            max_instances: DEFAULT_MAX_INSTANCES,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            task_name_len: DEFAULT_TASK_NAME_LEN,
            prio_base: DEFAULT_PRIO_BASE,
            prio_step: DEFAULT_PRIO_STEP,
            prio_min: DEFAULT_PRIO_MIN,
            prio_max: DEFAULT_PRIO_MAX,
        }
    }
}

impl Config {
    /// Parses a JSON overlay applied on top of [`Config::default`]. Fields
    /// the overlay omits keep their default (`#[serde(default)]` on the
    /// struct), so a config file only needs to name what it overrides.
    pub fn from_json_overlay(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_the_documented_literal_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.server_port, 8080);
        assert_eq!(cfg.max_instances, 20);
        assert_eq!(cfg.max_queue_size, 20);
        assert_eq!(cfg.cpu_pin, 0);
    }

    #[test]
    fn json_overlay_only_overrides_present_fields() {
        let merged = Config::from_json_overlay(r#"{"server_port": 9000}"#).unwrap();
        assert_eq!(merged.server_port, 9000);
        assert_eq!(merged.max_instances, DEFAULT_MAX_INSTANCES);
    }
}
