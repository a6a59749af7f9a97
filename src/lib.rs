//! Soft real-time task supervisor: admission control plus a periodic task
//! runtime, fronted by a line-oriented TCP protocol.
//!
//! [`run`] wires every module together: install the cancellation signal,
//! pin the process to its CPU core, calibrate the catalog, then spawn the
//! network and supervisor threads.

pub mod admission;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod net;
pub mod queue;
pub mod runtime;
pub mod supervisor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use error::Error;

/// Boots the process: installs the cancellation signal handler, pins the
/// process to its configured CPU core, calibrates the catalog, then spawns
/// the network and supervisor threads and blocks until `SHUTDOWN` is
/// received.
///
/// Thread priorities: network 99, supervisor 98, task threads <= 90.
pub fn run(cli: cli::Cli) -> Result<(), Error> {
    init_tracing(cli.quiet);

    let cfg = cli.resolve_config()?;

    if let Err(err) = runtime::install_cancellation_signal() {
        tracing::warn!(error = %err, "failed to install SIGUSR1 handler; cancellation may be delayed");
    }

    #[cfg(target_os = "linux")]
    if let Err(err) = runtime::affinity::pin_current_thread_to_core(cfg.cpu_pin) {
        tracing::warn!(error = %err, core = cfg.cpu_pin, "failed to pin process to configured CPU core");
    }

    let catalog = Arc::new(catalog::Catalog::from_default()?);
    tracing::info!(tasks = catalog.iter().count(), "catalog ready");

    let queue = queue::EventQueue::new(cfg.max_queue_size);
    let (reply_tx, reply_rx) = crossbeam_channel::unbounded();
    let shutdown = Arc::new(AtomicBool::new(false));

    let server = net::Server::bind(cfg.clone())?;
    let bound_port = server.local_addr().map(|addr| addr.port()).unwrap_or(cfg.server_port);
    tracing::info!(port = bound_port, "listening");

    let network_thread = {
        let queue = queue.clone();
        let shutdown = Arc::clone(&shutdown);
        std::thread::Builder::new()
            .name("network".to_owned())
            .spawn(move || {
                runtime::set_fifo_priority(config::NETWORK_THREAD_PRIORITY);
                if let Err(err) = server.serve(queue, reply_rx, shutdown) {
                    tracing::error!(error = %err, "network thread exited with an error");
                }
            })
            .expect("failed to spawn network thread")
    };

    let supervisor_thread = {
        let mut supervisor = supervisor::Supervisor::new(Arc::clone(&catalog), cfg.clone());
        let queue = queue.clone();
        let shutdown = Arc::clone(&shutdown);
        std::thread::Builder::new()
            .name("supervisor".to_owned())
            .spawn(move || {
                runtime::set_fifo_priority(config::SUPERVISOR_THREAD_PRIORITY);
                supervisor.run(&queue, &reply_tx);
                // The network thread's poll loop only notices shutdown on
                // its own timeout tick; flipping this unblocks it promptly
                // on the next iteration instead of waiting the full
                // poll timeout every time.
                shutdown.store(true, Ordering::Relaxed);
            })
            .expect("failed to spawn supervisor thread")
    };

    supervisor_thread
        .join()
        .expect("supervisor thread panicked");
    network_thread.join().expect("network thread panicked");

    Ok(())
}

fn init_tracing(quiet: bool) {
    let default_filter = if quiet { "warn" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
