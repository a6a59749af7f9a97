//! The supervisor: sole writer of the active set, sole consumer of the
//! event queue, and the only component that calls both [`admission::admit`]
//! and [`runtime::Runtime`]. All state lives on an owned [`Supervisor`]
//! value rather than behind statics, so a process can in principle run
//! more than one independently.

use std::sync::Arc;

use crate::admission;
use crate::catalog::{Catalog, TaskType};
use crate::config::Config;
use crate::event::{ClientId, Event};
use crate::queue::EventQueue;
use crate::runtime::Runtime;

/// Whether the supervisor loop should keep running after processing an
/// event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Shutdown,
}

struct ActiveEntry {
    instance_id: u64,
    task_type: TaskType,
}

/// Owns the active set and drives admission control + the task runtime in
/// response to events popped off the event queue.
pub struct Supervisor {
    catalog: Arc<Catalog>,
    runtime: Runtime,
    cfg: Config,
    active: Vec<ActiveEntry>,
}

impl Supervisor {
    pub fn new(catalog: Arc<Catalog>, cfg: Config) -> Self {
        let runtime = Runtime::new(Arc::clone(&catalog), cfg.clone());
        Self {
            catalog,
            runtime,
            cfg,
            active: Vec::new(),
        }
    }

    /// Consumes events from `queue` until a `Shutdown` is processed (or the
    /// queue's producer side is gone), sending one `(client, reply)` pair
    /// to `replies` per event. The reply text never includes the
    /// `[SERVER]: ` prefix — that is the front-end's job, applied uniformly
    /// to every outbound message regardless of which handler produced it.
    pub fn run(
        &mut self,
        queue: &EventQueue,
        replies: &crossbeam_channel::Sender<(ClientId, String)>,
    ) {
        loop {
            let event = match queue.pop() {
                Ok(event) => event,
                Err(_) => return,
            };

            let (client, reply, outcome) = self.handle_event(event);
            let _ = replies.send((client, reply));

            if outcome == Outcome::Shutdown {
                return;
            }
        }
    }

    fn handle_event(&mut self, event: Event) -> (ClientId, String, Outcome) {
        match event {
            Event::Activate { client, task_name } => {
                (client, self.handle_activate(&task_name), Outcome::Continue)
            }
            Event::Deactivate {
                client,
                instance_id,
            } => (
                client,
                self.handle_deactivate(instance_id),
                Outcome::Continue,
            ),
            Event::List { client } => (client, self.handle_list(), Outcome::Continue),
            Event::Info { client } => (client, self.handle_info(), Outcome::Continue),
            Event::Shutdown { client } => {
                tracing::info!("shutdown requested, cleaning up active instances");
                self.runtime.deactivate_all();
                (client, "OK Shutting Down".to_owned(), Outcome::Shutdown)
            }
        }
    }

    /// Handles `ACTIVATE <name>`.
    fn handle_activate(&mut self, task_name: &str) -> String {
        let Some(candidate) = self.catalog.lookup(task_name) else {
            return "ERR Unknown Task".to_owned();
        };
        let candidate = candidate.clone();

        if let Err(rejection) =
            admission::admit(self.active.iter().map(|entry| &entry.task_type), &candidate)
        {
            tracing::info!(
                task = task_name,
                %rejection,
                "activation rejected by admission control"
            );
            return "ERR Schedulability".to_owned();
        }

        if self.active.len() >= self.cfg.max_instances {
            return "ERR System Full".to_owned();
        }

        match self.runtime.activate(&candidate) {
            Ok(instance_id) => {
                self.active.push(ActiveEntry {
                    instance_id,
                    task_type: candidate,
                });
                format!("OK ID={instance_id}")
            }
            Err(err) => {
                tracing::warn!(task = task_name, error = %err, "runtime failed to create instance");
                "ERR System Full".to_owned()
            }
        }
    }

    /// Handles `DEACTIVATE <id>`.
    fn handle_deactivate(&mut self, instance_id: u64) -> String {
        match self.runtime.deactivate(instance_id) {
            Ok(()) => {
                self.active.retain(|entry| entry.instance_id != instance_id);
                "OK".to_owned()
            }
            Err(err) => {
                tracing::debug!(instance_id, error = %err, "deactivate rejected");
                "ERR Invalid ID".to_owned()
            }
        }
    }

    /// Handles `LIST`.
    fn handle_list(&self) -> String {
        let mut out = format!("Running: {}\n", self.active.len());
        for entry in &self.active {
            out.push_str(&format!(
                "  [ID {}] {} (C={}, T={})\n",
                entry.instance_id, entry.task_type.name, entry.task_type.wcet_ms, entry.task_type.period_ms
            ));
        }
        truncate_response(out, self.cfg.net_response_buf_size)
    }

    /// Handles `INFO`.
    fn handle_info(&self) -> String {
        let mut out = format!(
            "Capacity: {}/{} active\nTasks:\n",
            self.active.len(),
            self.cfg.max_instances
        );
        for task in self.catalog.iter() {
            out.push_str(&format!(
                "  {} (C={}, T={}, D={})\n",
                task.name, task.wcet_ms, task.period_ms, task.deadline_ms
            ));
        }
        truncate_response(out, self.cfg.net_response_buf_size)
    }
}

/// Truncates `out` to at most `max_len` bytes, appending `...` when it had
/// to cut content short.
fn truncate_response(mut out: String, max_len: usize) -> String {
    if out.len() <= max_len {
        return out;
    }

    let mut cut = max_len.saturating_sub(4).min(out.len());
    while cut > 0 && !out.is_char_boundary(cut) {
        cut -= 1;
    }
    out.truncate(cut);
    out.push_str("...\n");
    out
}
