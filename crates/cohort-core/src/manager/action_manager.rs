//! The action manager: owns the running-task set, the fanout ceiling
//! derived from it, and the single event loop that drains executor events
//! and feeds them back into the dependency graph.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use tokio::sync::mpsc;

use crate::action::{Action, ActionRef};
use crate::callback::{CallbackSink, EventKind, NullSink, Payload};
use crate::executor::{CommandSpec, ExecutorEvent, JobId, NodeExecutor, TimerId};
use crate::resolver;
use crate::service::Service;
use crate::status::Status;

pub type ActionManagerRef = Rc<ActionManager>;

/// Drives dispatch for the whole graph. Not `Send`/`Sync`: every field is a
/// plain `Cell`/`RefCell`, not an atomic -- this only ever runs on a single
/// cooperative execution context.
pub struct ActionManager {
    running: RefCell<Vec<ActionRef>>,
    tasks_done_count: Cell<u64>,
    fanout: Cell<Option<usize>>,
    executor: RefCell<Option<Rc<dyn NodeExecutor>>>,
    sink: RefCell<Rc<dyn CallbackSink>>,
    events_tx: mpsc::UnboundedSender<ExecutorEvent>,
    events_rx: RefCell<mpsc::UnboundedReceiver<ExecutorEvent>>,
    jobs: RefCell<HashMap<JobId, ActionRef>>,
    timers: RefCell<HashMap<TimerId, ActionRef>>,
    next_job_id: Cell<u64>,
    next_timer_id: Cell<u64>,
}

impl ActionManager {
    pub fn new(executor: Option<Rc<dyn NodeExecutor>>, sink: Rc<dyn CallbackSink>) -> ActionManagerRef {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Rc::new(Self {
            running: RefCell::new(Vec::new()),
            tasks_done_count: Cell::new(0),
            fanout: Cell::new(None),
            executor: RefCell::new(executor),
            sink: RefCell::new(sink),
            events_tx,
            events_rx: RefCell::new(events_rx),
            jobs: RefCell::new(HashMap::new()),
            timers: RefCell::new(HashMap::new()),
            next_job_id: Cell::new(0),
            next_timer_id: Cell::new(0),
        })
    }

    fn default_instance() -> ActionManagerRef {
        Self::new(None, Rc::new(NullSink))
    }

    pub fn set_executor(&self, executor: Rc<dyn NodeExecutor>) {
        *self.executor.borrow_mut() = Some(executor);
    }

    pub fn set_sink(&self, sink: Rc<dyn CallbackSink>) {
        *self.sink.borrow_mut() = sink;
    }

    pub fn notify(&self, kind: EventKind, payload: Payload) {
        self.sink.borrow().notify(kind, payload);
    }

    pub fn events_sender(&self) -> mpsc::UnboundedSender<ExecutorEvent> {
        self.events_tx.clone()
    }

    fn next_job_id(&self) -> JobId {
        let id = self.next_job_id.get();
        self.next_job_id.set(id + 1);
        id
    }

    fn next_timer_id(&self) -> TimerId {
        let id = self.next_timer_id.get();
        self.next_timer_id.set(id + 1);
        id
    }

    /// Add `action` to the running set if it is not already in it, and
    /// recompute the fanout ceiling.
    pub fn add_task(&self, action: ActionRef) {
        let already_running = self
            .running
            .borrow()
            .iter()
            .any(|a| Rc::ptr_eq(a, &action));
        if already_running {
            return;
        }
        self.running.borrow_mut().push(action);
        self.recompute_fanout();
    }

    /// Remove `action` from the running set, bump `tasks_done_count`, and
    /// recompute the fanout ceiling. A no-op if `action` was never running.
    pub fn remove_task(&self, action: &ActionRef) {
        let position = self
            .running
            .borrow()
            .iter()
            .position(|a| Rc::ptr_eq(a, action));
        let Some(position) = position else {
            return;
        };
        self.running.borrow_mut().remove(position);
        self.tasks_done_count.set(self.tasks_done_count.get() + 1);
        self.recompute_fanout();
    }

    fn recompute_fanout(&self) {
        let fanout = self
            .running
            .borrow()
            .iter()
            .filter_map(|a| a.borrow().fanout)
            .min();
        self.fanout.set(fanout);
        if let Some(executor) = self.executor.borrow().as_ref() {
            executor.set_fanout(fanout);
        }
    }

    pub fn running_tasks(&self) -> Vec<ActionRef> {
        self.running.borrow().clone()
    }

    pub fn tasks_count(&self) -> usize {
        self.running.borrow().len()
    }

    pub fn tasks_done_count(&self) -> u64 {
        self.tasks_done_count.get()
    }

    pub fn fanout(&self) -> Option<usize> {
        self.fanout.get()
    }

    pub fn is_running_task(&self, action: &ActionRef) -> bool {
        self.running.borrow().iter().any(|a| Rc::ptr_eq(a, action))
    }

    /// Dispatch `action` right away.
    pub fn perform_action(&self, action: ActionRef) {
        self.dispatch(action);
    }

    /// Install a one-shot delay timer; the action is dispatched (or,
    /// for a simulated service, short-circuited) when it fires.
    pub fn perform_delayed_action(&self, action: ActionRef) {
        let timer_id = self.next_timer_id();
        let delay = action.borrow().delay;
        self.timers.borrow_mut().insert(timer_id, action);
        if let Some(executor) = self.executor.borrow().as_ref() {
            executor.install_timer(timer_id, delay, self.events_tx.clone());
        }
    }

    /// The single choke point between "ready to run" and the node executor.
    /// A simulated service bypasses the executor entirely here, so both the
    /// immediate (`delay == 0`) and the delayed path end up suppressed the
    /// same way once the timer fires and re-enters via [`Action::schedule`].
    fn dispatch(&self, action: ActionRef) {
        if let Some(service) = Action::owning_service(&action) {
            if service.borrow().simulate {
                let deps_status = crate::entity::eval_deps_status(&service.borrow().parents);
                Service::update_status(&service, deps_status.into());
                return;
            }
        }

        let command = match resolver::resolve(&action) {
            Ok(command) => command,
            Err(err) => {
                tracing::error!(action = %action.borrow().name, error = %err, "failing action");
                Action::update_status(&action, Status::Error);
                return;
            }
        };

        self.add_task(Rc::clone(&action));
        let job_id = self.next_job_id();
        self.jobs.borrow_mut().insert(job_id, Rc::clone(&action));

        let spec = CommandSpec {
            job_id,
            command,
            nodes: action.borrow().target.clone(),
            timeout: action.borrow().timeout,
        };

        match self.executor.borrow().as_ref() {
            Some(executor) => executor.submit(spec, self.events_tx.clone()),
            None => tracing::error!(action = %action.borrow().name, "no executor configured"),
        }
    }

    pub(crate) fn take_job(&self, job_id: JobId) -> Option<ActionRef> {
        self.jobs.borrow_mut().remove(&job_id)
    }

    pub(crate) fn take_timer(&self, timer_id: TimerId) -> Option<ActionRef> {
        self.timers.borrow_mut().remove(&timer_id)
    }

    /// Drain executor events until there is nothing left running and no
    /// timer still pending.
    pub async fn run_loop(&self) {
        loop {
            let idle = self.running.borrow().is_empty() && self.timers.borrow().is_empty();
            if idle {
                break;
            }

            let event = {
                let mut rx = self.events_rx.borrow_mut();
                rx.recv().await
            };

            match event {
                Some(event) => crate::event_adapter::handle_event(self, event),
                None => break,
            }
        }
    }
}

thread_local! {
    static ACTION_MANAGER: RefCell<Option<ActionManagerRef>> = RefCell::new(None);
}

/// Install the process-wide action manager (the CLI does this once at
/// startup with a real executor and sink).
pub fn set_action_manager(manager: ActionManagerRef) {
    ACTION_MANAGER.with(|cell| *cell.borrow_mut() = Some(manager));
}

/// Fetch the thread-local action manager, lazily creating a no-op one (no
/// executor, [`NullSink`]) if nothing was installed. Tests that only care
/// about graph/fanout bookkeeping rely on this default.
pub fn action_manager_self() -> ActionManagerRef {
    ACTION_MANAGER.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            *slot = Some(ActionManager::default_instance());
        }
        Rc::clone(slot.as_ref().expect("just initialized"))
    })
}

/// Drop the thread-local action manager so the next call to
/// [`action_manager_self`] starts fresh. Used between test cases.
pub fn reset_action_manager() {
    ACTION_MANAGER.with(|cell| *cell.borrow_mut() = None);
}
