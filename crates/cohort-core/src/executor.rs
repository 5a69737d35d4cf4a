//! The node executor contract: the interface the engine needs from a
//! low-level parallel-command driver, plus the transport types that flow
//! over it.
//!
//! This module only specifies the contract. A concrete implementation over
//! local subprocesses lives in the separate `cohort-exec` crate so that the
//! engine core never depends on how commands actually reach a node.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;

/// Identifies one dispatched job (one `submit` call) for the lifetime of its
/// events. Assigned by the caller (the [`crate::manager::ActionManager`]),
/// not the executor.
pub type JobId = u64;

/// Identifies one installed timer for the lifetime of its firing.
pub type TimerId = u64;

/// A resolved command ready to hand to the executor.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub job_id: JobId,
    pub command: String,
    /// Opaque node-set expression (e.g. `"localhost"`, a comma-separated
    /// list, or a `prefix[a-b]` range); expansion is the executor's job.
    pub nodes: String,
    /// `Duration::ZERO` means no timeout.
    pub timeout: Duration,
}

/// The result of running a command on a single node.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub node: String,
    pub command: String,
    pub node_buffer: Option<Vec<u8>>,
    pub exit_code: Option<i32>,
}

impl NodeInfo {
    pub fn new(node: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            command: command.into(),
            node_buffer: None,
            exit_code: None,
        }
    }
}

/// The executor's handle to a finished job: per-node buffers, return codes,
/// and whether the job as a whole timed out.
///
/// Mirrors a parallel-command worker's usual contract: `last_read`, `last_retcode`,
/// `iter_retcodes`, `did_timeout`, `command`.
#[derive(Debug, Clone, Default)]
pub struct Worker {
    pub command: String,
    retcodes: HashMap<i32, Vec<String>>,
    last_read: Option<(String, Vec<u8>)>,
    last_retcode: Option<(String, i32)>,
    timed_out: bool,
}

impl Worker {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Record that `node` finished with `exit_code`, having produced `buffer`.
    pub fn record_node_result(&mut self, node: impl Into<String>, buffer: Vec<u8>, exit_code: i32) {
        let node = node.into();
        self.retcodes.entry(exit_code).or_default().push(node.clone());
        self.last_retcode = Some((node.clone(), exit_code));
        self.last_read = Some((node, buffer));
    }

    pub fn mark_timed_out(&mut self) {
        self.timed_out = true;
    }

    pub fn last_read(&self) -> Option<(&str, &[u8])> {
        self.last_read.as_ref().map(|(n, b)| (n.as_str(), b.as_slice()))
    }

    pub fn last_retcode(&self) -> Option<(&str, i32)> {
        self.last_retcode.as_ref().map(|(n, c)| (n.as_str(), *c))
    }

    pub fn iter_retcodes(&self) -> impl Iterator<Item = (i32, &[String])> {
        self.retcodes.iter().map(|(code, nodes)| (*code, nodes.as_slice()))
    }

    pub fn did_timeout(&self) -> bool {
        self.timed_out
    }
}

/// Events the executor reports back to the engine on the controller context.
#[derive(Debug)]
pub enum ExecutorEvent {
    /// A single node's connection closed (streamed progress).
    NodeComplete { job_id: JobId, info: NodeInfo },
    /// Every targeted node finished (or the job-wide timeout fired).
    JobComplete { job_id: JobId, worker: Worker },
    /// A previously-installed timer fired.
    TimerFired { timer_id: TimerId },
}

/// The node executor contract.
///
/// Not `Send`/`Sync`: the engine runs on a single cooperative execution
/// context (see the concurrency model), so the executor is held behind a
/// non-atomic `Rc`, not `Arc`.
pub trait NodeExecutor {
    /// Submit `spec` for execution; fire-and-forget. Results arrive later as
    /// [`ExecutorEvent::NodeComplete`]/[`ExecutorEvent::JobComplete`] on
    /// `events`.
    fn submit(&self, spec: CommandSpec, events: mpsc::UnboundedSender<ExecutorEvent>);

    /// Install a one-shot timer; fires [`ExecutorEvent::TimerFired`] after
    /// `delay` on `events`.
    fn install_timer(
        &self,
        timer_id: TimerId,
        delay: Duration,
        events: mpsc::UnboundedSender<ExecutorEvent>,
    );

    /// Adjust the in-flight concurrency ceiling. `None` means unconstrained.
    fn set_fanout(&self, fanout: Option<usize>);
}
