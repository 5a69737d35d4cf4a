//! Local process-based implementation of [`cohort_core::NodeExecutor`].
//!
//! Every "node" in a target expression runs the same shell command as an
//! independent local subprocess -- there is no remote transport here, just
//! enough fan-out, timeout, and partial-failure plumbing to exercise the
//! scheduler core without real hosts. A concrete SSH/ClusterShell-backed
//! executor would implement the same [`cohort_core::NodeExecutor`] trait and
//! slot in behind the same `Rc<dyn NodeExecutor>` seam.

mod nodeset;

use std::cell::RefCell;
use std::process::Stdio;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout as with_timeout;

use cohort_core::{CommandSpec, ExecutorEvent, JobId, NodeExecutor, NodeInfo, TimerId, Worker};

/// Grace period between `SIGTERM` and `SIGKILL` for a node process that
/// overran its action timeout.
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Executes resolved commands against local subprocesses.
///
/// Not `Send`/`Sync` by design: it is driven from the same single-threaded
/// cooperative context as [`cohort_core::manager::ActionManager`], so every
/// job and timer is spawned with
/// `tokio::task::spawn_local` rather than `tokio::spawn`. The fan-out ceiling
/// is swapped rather than resized in place: a `set_fanout` call installs a
/// fresh semaphore, so jobs already holding a permit from the old one are
/// unaffected and only newly-submitted jobs observe the new ceiling.
pub struct LocalNodeExecutor {
    fanout: RefCell<Option<Arc<Semaphore>>>,
}

impl LocalNodeExecutor {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            fanout: RefCell::new(None),
        })
    }
}

impl NodeExecutor for LocalNodeExecutor {
    fn submit(&self, spec: CommandSpec, events: mpsc::UnboundedSender<ExecutorEvent>) {
        let nodes = nodeset::expand(&spec.nodes);
        let fanout = self.fanout.borrow().clone();
        tokio::task::spawn_local(run_job(spec, nodes, fanout, events));
    }

    fn install_timer(&self, timer_id: TimerId, delay: Duration, events: mpsc::UnboundedSender<ExecutorEvent>) {
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(ExecutorEvent::TimerFired { timer_id });
        });
    }

    fn set_fanout(&self, fanout: Option<usize>) {
        *self.fanout.borrow_mut() = fanout.map(|n| Arc::new(Semaphore::new(n.max(1))));
    }
}

async fn run_job(
    spec: CommandSpec,
    nodes: Vec<String>,
    fanout: Option<Arc<Semaphore>>,
    events: mpsc::UnboundedSender<ExecutorEvent>,
) {
    let job_id = spec.job_id;
    let mut handles = Vec::with_capacity(nodes.len());

    for node in nodes {
        let command = spec.command.clone();
        let timeout = spec.timeout;
        let fanout = fanout.clone();
        let events = events.clone();
        handles.push(tokio::task::spawn_local(async move {
            let _permit = match &fanout {
                Some(sem) => Some(
                    Arc::clone(sem)
                        .acquire_owned()
                        .await
                        .expect("fan-out semaphore is never closed"),
                ),
                None => None,
            };
            let (exit_code, buffer, timed_out) = run_node(&command, timeout).await;
            let info = NodeInfo {
                node: node.clone(),
                command: command.clone(),
                node_buffer: Some(buffer),
                exit_code,
            };
            let _ = events.send(ExecutorEvent::NodeComplete {
                job_id,
                info: info.clone(),
            });
            (node, info, timed_out)
        }));
    }

    let mut worker = Worker::new(spec.command.clone());
    for handle in handles {
        if let Ok((node, info, timed_out)) = handle.await {
            if timed_out {
                // No exit code to report: the node was killed before it could
                // exit on its own, so it contributes to `did_timeout` but not
                // to the per-return-code error tally.
                worker.mark_timed_out();
            } else {
                worker.record_node_result(node, info.node_buffer.unwrap_or_default(), info.exit_code.unwrap_or(-1));
            }
        }
    }

    let _ = events.send(ExecutorEvent::JobComplete { job_id, worker });
}

/// Run `command` under `sh -c` for a single node; returns its exit code,
/// captured stdout+stderr, and whether it had to be killed for overrunning
/// `timeout` (`Duration::ZERO` means no timeout).
#[cfg(unix)]
async fn run_node(command: &str, timeout: Duration) -> (Option<i32>, Vec<u8>, bool) {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            tracing::error!(command, %err, "failed to spawn node process");
            return (None, format!("spawn failed: {err}").into_bytes(), false);
        }
    };

    let pid = child.id().map(|pid| pid as i32);
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    let collect = async {
        let mut buf = Vec::new();
        if let Some(out) = stdout.as_mut() {
            let _ = out.read_to_end(&mut buf).await;
        }
        if let Some(err) = stderr.as_mut() {
            let _ = err.read_to_end(&mut buf).await;
        }
        buf
    };

    let wait_and_collect = async { tokio::join!(child.wait(), collect) };

    if timeout.is_zero() {
        let (status, buf) = wait_and_collect.await;
        return (status.ok().and_then(|s| s.code()), buf, false);
    }

    match with_timeout(timeout, wait_and_collect).await {
        Ok((status, buf)) => (status.ok().and_then(|s| s.code()), buf, false),
        Err(_) => {
            if let Some(pid) = pid {
                // SAFETY: `pid` is a process group leader started with
                // `process_group(0)` just above; signalling the negated pid
                // targets the whole group, not an unrelated process.
                unsafe {
                    libc::kill(-pid, libc::SIGTERM);
                }
            }
            if with_timeout(KILL_GRACE, child.wait()).await.is_err() {
                if let Some(pid) = pid {
                    unsafe {
                        libc::kill(-pid, libc::SIGKILL);
                    }
                }
                let _ = child.wait().await;
            }
            (None, Vec::new(), true)
        }
    }
}

#[cfg(not(unix))]
async fn run_node(command: &str, timeout: Duration) -> (Option<i32>, Vec<u8>, bool) {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            tracing::error!(command, %err, "failed to spawn node process");
            return (None, format!("spawn failed: {err}").into_bytes(), false);
        }
    };

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let collect = async {
        let mut buf = Vec::new();
        if let Some(out) = stdout.as_mut() {
            let _ = out.read_to_end(&mut buf).await;
        }
        if let Some(err) = stderr.as_mut() {
            let _ = err.read_to_end(&mut buf).await;
        }
        buf
    };
    let wait_and_collect = async { tokio::join!(child.wait(), collect) };

    if timeout.is_zero() {
        let (status, buf) = wait_and_collect.await;
        return (status.ok().and_then(|s| s.code()), buf, false);
    }

    match with_timeout(timeout, wait_and_collect).await {
        Ok((status, buf)) => (status.ok().and_then(|s| s.code()), buf, false),
        Err(_) => {
            let _ = child.kill().await;
            (None, Vec::new(), true)
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::task::LocalSet;

    async fn run_spec(command: &str, nodes: &str, timeout: Duration) -> Worker {
        let executor = LocalNodeExecutor::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        executor.submit(
            CommandSpec {
                job_id: 1,
                command: command.to_string(),
                nodes: nodes.to_string(),
                timeout,
            },
            tx,
        );
        loop {
            match rx.recv().await.expect("executor never closes the channel") {
                ExecutorEvent::JobComplete { worker, .. } => return worker,
                _ => continue,
            }
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn true_command_succeeds_on_one_node() {
        let local = LocalSet::new();
        let worker = local.run_until(run_spec("true", "localhost", Duration::ZERO)).await;
        assert_eq!(worker.iter_retcodes().count(), 1);
        assert!(!worker.did_timeout());
        let (_, code) = worker.last_retcode().unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn fans_out_one_process_per_node() {
        let local = LocalSet::new();
        let worker = local
            .run_until(run_spec("true", "node[1-3]", Duration::ZERO))
            .await;
        let total_nodes: usize = worker.iter_retcodes().map(|(_, nodes)| nodes.len()).sum();
        assert_eq!(total_nodes, 3);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn overrunning_command_is_killed_and_flagged() {
        let local = LocalSet::new();
        let worker = local
            .run_until(run_spec("sleep 5", "localhost", Duration::from_millis(100)))
            .await;
        assert!(worker.did_timeout());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn captures_nonzero_exit_code() {
        let local = LocalSet::new();
        let worker = local
            .run_until(run_spec("exit 7", "localhost", Duration::ZERO))
            .await;
        let (_, code) = worker.last_retcode().unwrap();
        assert_eq!(code, 7);
    }
}
