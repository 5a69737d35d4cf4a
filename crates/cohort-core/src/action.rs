//! The `Action` entity: a single command bound to a node set, its
//! retry/timeout/fanout configuration, and the state-machine transitions
//! that drive it through the dependency graph.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::callback::{EventKind, Payload};
use crate::entity::{self, Dependency};
use crate::error::{EngineError, EngineResult};
use crate::executor::Worker;
use crate::manager;
use crate::service::{Service, ServiceRef};
use crate::status::{DepsStatus, Status};

pub type ActionRef = Rc<RefCell<Action>>;

/// A single command, the node set it runs on, and everything needed to
/// decide when/whether to run it again.
pub struct Action {
    pub name: String,
    pub target: String,
    pub command: String,
    /// `Duration::ZERO` means no per-attempt timeout.
    pub timeout: Duration,
    /// `Duration::ZERO` means dispatch as soon as ready.
    pub delay: Duration,
    /// Tolerance: an attempt is "too many errors" once the count of
    /// non-zero-exit nodes exceeds this.
    pub errors: u32,
    /// This action's own concurrency ceiling; the manager takes the minimum
    /// over every currently-running action.
    pub fanout: Option<usize>,
    retry: u32,
    /// The value `retry` was first assigned; restored by `reset`.
    retry_backup: Option<u32>,
    pub status: Status,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
    pub worker: Option<Worker>,
    pub parents: HashMap<String, Dependency>,
    pub children: HashMap<String, Dependency>,
    pub variables: HashMap<String, String>,
    pub service: Option<Weak<RefCell<Service>>>,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: String::new(),
            command: String::new(),
            timeout: Duration::ZERO,
            delay: Duration::ZERO,
            errors: 0,
            fanout: None,
            retry: 0,
            retry_backup: None,
            status: Status::NoStatus,
            start_time: None,
            stop_time: None,
            worker: None,
            parents: HashMap::new(),
            children: HashMap::new(),
            variables: HashMap::new(),
            service: None,
        }
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn errors(mut self, errors: u32) -> Self {
        self.errors = errors;
        self
    }

    pub fn fanout(mut self, fanout: usize) -> Self {
        self.fanout = Some(fanout);
        self
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Builder form of [`Action::set_retry`]; fails the same way.
    pub fn with_retry(mut self, retry: u32) -> EngineResult<Self> {
        self.set_retry(retry)?;
        Ok(self)
    }

    pub fn retry(&self) -> u32 {
        self.retry
    }

    /// Retry only makes sense alongside a delay between attempts; a
    /// zero-delay action that retried would hammer the same failing command
    /// in a tight loop.
    pub fn set_retry(&mut self, retry: u32) -> EngineResult<()> {
        if self.delay.is_zero() {
            return Err(EngineError::RetryWithoutDelay);
        }
        self.retry = retry;
        if self.retry_backup.is_none() {
            self.retry_backup = Some(retry);
        }
        Ok(())
    }

    pub(crate) fn decrement_retry(&mut self) {
        self.retry = self.retry.saturating_sub(1);
    }

    /// Wall-clock runtime of the last attempt, once both timestamps are set.
    pub fn duration(&self) -> Option<Duration> {
        match (self.start_time, self.stop_time) {
            (Some(start), Some(stop)) if stop >= start => (stop - start).to_std().ok(),
            _ => None,
        }
    }

    pub fn has_timed_out(&self) -> bool {
        self.worker.as_ref().map(Worker::did_timeout).unwrap_or(false)
    }

    /// `true` once the count of nodes that exited non-zero exceeds `errors`.
    pub fn has_too_many_errors(&self) -> bool {
        let Some(worker) = &self.worker else {
            return false;
        };
        let mut error_count = 0u32;
        for (code, nodes) in worker.iter_retcodes() {
            if code != 0 {
                error_count += nodes.len() as u32;
                if error_count > self.errors {
                    return true;
                }
            }
        }
        false
    }

    /// Clear everything about the last attempt so the action can be
    /// prepared again from `NoStatus`. `retry` is restored to its original
    /// value, not left at whatever an earlier attempt decremented it to.
    pub fn reset(&mut self) {
        self.status = Status::NoStatus;
        self.start_time = None;
        self.stop_time = None;
        self.worker = None;
        if let Some(backup) = self.retry_backup {
            self.retry = backup;
        }
    }

    /// The entry point that decides whether this action is
    /// ready to run, already satisfied, or still blocked on a predecessor.
    pub fn prepare(action: &ActionRef) {
        let status = action.borrow().status;
        let deps_status = entity::eval_deps_status(&action.borrow().parents);

        if status != Status::NoStatus || deps_status == DepsStatus::Waiting {
            return;
        }

        let no_parents = action.borrow().parents.is_empty();
        if deps_status == DepsStatus::Error || no_parents {
            Action::update_status(action, Status::WaitingStatus);
            Action::schedule(action, true);
        } else if deps_status == DepsStatus::Done {
            Action::update_status(action, Status::Done);
        } else {
            for dep in entity::parents_in_no_status(&action.borrow().parents) {
                dep.prepare();
            }
        }
    }

    /// Record the new status, notify, and -- if it is terminal --
    /// walk ready children or bubble up to the owning service.
    pub fn update_status(action: &ActionRef, status: Status) {
        action.borrow_mut().status = status;

        let manager = manager::action_manager_self();
        manager.notify(EventKind::StatusChanged, Payload::Action(Rc::clone(action)));

        if !status.is_terminal() {
            return;
        }

        manager.notify(EventKind::Complete, Payload::Action(Rc::clone(action)));

        let has_children = !action.borrow().children.is_empty();
        if has_children {
            let ready = entity::ready_children(&action.borrow().children);
            for dep in ready {
                manager.notify(
                    EventKind::TriggerDep,
                    Payload::TriggerDep(Dependency::action(action), dep.clone()),
                );
                dep.prepare();
            }
        } else if let Some(service) = action.borrow().service.as_ref().and_then(Weak::upgrade) {
            Service::update_status(&service, status);
        }
    }

    /// Record the start time and hand off to the manager, either
    /// immediately or via a delay timer.
    pub fn schedule(action: &ActionRef, allow_delay: bool) {
        {
            let mut a = action.borrow_mut();
            if a.start_time.is_none() {
                a.start_time = Some(Utc::now());
            }
        }

        let delay = action.borrow().delay;
        let manager = manager::action_manager_self();

        if allow_delay && !delay.is_zero() {
            manager.notify(EventKind::Delayed, Payload::Action(Rc::clone(action)));
            manager.perform_delayed_action(Rc::clone(action));
        } else {
            manager.notify(EventKind::Started, Payload::Action(Rc::clone(action)));
            manager.perform_action(Rc::clone(action));
        }
    }

    /// Kick off this action and block until every action it transitively
    /// triggers has reached a terminal status.
    pub async fn run(action: &ActionRef) {
        Action::prepare(action);
        manager::action_manager_self().run_loop().await;
    }

    pub fn owning_service(action: &ActionRef) -> Option<ServiceRef> {
        action.borrow().service.as_ref().and_then(Weak::upgrade)
    }
}
