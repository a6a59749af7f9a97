//! Process-level CLI, merged onto [`Config::default`] with precedence
//! defaults < JSON config file < explicit flags.
//!
//! A flat `clap::Parser` struct with doc-comment help text and `Option`
//! fields for everything overridable, so "not passed" is distinguishable
//! from "passed the default value".

use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;
use crate::error::Error;

#[derive(Parser, Debug)]
#[command(about = "Soft real-time task supervisor")]
pub struct Cli {
    /// TCP port to listen on
    #[arg(long)]
    pub port: Option<u16>,

    /// Maximum number of concurrently active task instances
    #[arg(long)]
    pub max_instances: Option<usize>,

    /// Maximum number of queued, unprocessed control events
    #[arg(long)]
    pub max_queue: Option<usize>,

    /// CPU core every thread is pinned to
    #[arg(long)]
    pub cpu: Option<usize>,

    /// Optional JSON file overriding config defaults, applied before
    /// the flags above
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Suppress informational logging (only warnings and errors)
    #[arg(short = 'q', long, action = clap::ArgAction::SetTrue)]
    pub quiet: bool,
}

impl Cli {
    /// Builds the effective [`Config`]: defaults, then the `--config` file
    /// (if any), then this CLI's explicit flags.
    pub fn resolve_config(&self) -> Result<Config, Error> {
        let mut cfg = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                Config::from_json_overlay(&raw)?
            }
            None => Config::default(),
        };

        if let Some(port) = self.port {
            cfg.server_port = port;
        }
        if let Some(max_instances) = self.max_instances {
            cfg.max_instances = max_instances;
        }
        if let Some(max_queue) = self.max_queue {
            cfg.max_queue_size = max_queue;
        }
        if let Some(cpu) = self.cpu {
            cfg.cpu_pin = cpu;
        }

        Ok(cfg)
    }
}
