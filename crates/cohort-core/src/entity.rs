//! Dependency graph utilities shared by [`crate::action::Action`] and
//! [`crate::service::Service`]: parent/child link handling and the
//! aggregate status evaluation over a set of predecessors.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::action::{Action, ActionRef};
use crate::service::{Service, ServiceRef};
use crate::status::{DepsStatus, Status};

/// One end of a dependency edge: the peer an Action or Service depends on
/// (or is depended on by).
///
/// Edges are directed: a parent must reach a terminal status before its
/// children are prepared. The peer is held by a non-owning `Weak` reference
/// on both ends of the edge -- ownership of an Action lives in its owning
/// `Service`'s `actions` map, and ownership of a Service lives in the
/// `ServiceManager`'s `services` map (or, in a test, in whatever local
/// variable keeps its `Rc` alive). A strong reference here as well would
/// turn every `requires:` link into a permanent two-node reference cycle
/// regardless of whether the logical DAG is acyclic. The graph walk itself
/// must still be acyclic; nothing here enforces that at the type level, it
/// is a loader invariant.
#[derive(Clone)]
pub enum Dependency {
    Action(Weak<RefCell<Action>>),
    Service(Weak<RefCell<Service>>),
}

/// A dependency edge's peer must still be owned elsewhere (by its `Service`
/// or the `ServiceManager`) for as long as the edge exists; an expired
/// upgrade means something dropped the peer while the graph still links to
/// it, which is a programmer error, not a runtime condition to recover from.
fn upgrade_action(a: &Weak<RefCell<Action>>) -> ActionRef {
    a.upgrade().expect("dependency edge outlived its action target")
}

fn upgrade_service(s: &Weak<RefCell<Service>>) -> ServiceRef {
    s.upgrade().expect("dependency edge outlived its service target")
}

impl Dependency {
    /// Build a dependency edge endpoint pointing at `action`, held weakly.
    pub fn action(action: &ActionRef) -> Self {
        Dependency::Action(Rc::downgrade(action))
    }

    /// Build a dependency edge endpoint pointing at `service`, held weakly.
    pub fn service(service: &ServiceRef) -> Self {
        Dependency::Service(Rc::downgrade(service))
    }

    pub fn status(&self) -> Status {
        match self {
            Dependency::Action(a) => upgrade_action(a).borrow().status,
            Dependency::Service(s) => upgrade_service(s).borrow().status,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Dependency::Action(a) => upgrade_action(a).borrow().name.clone(),
            Dependency::Service(s) => upgrade_service(s).borrow().name.clone(),
        }
    }

    /// This dependency's own aggregate parent status (used to decide
    /// whether it is ready to be prepared in turn).
    pub fn deps_status(&self) -> DepsStatus {
        match self {
            Dependency::Action(a) => eval_deps_status(&upgrade_action(a).borrow().parents),
            Dependency::Service(s) => eval_deps_status(&upgrade_service(s).borrow().parents),
        }
    }

    /// `true` if this dependency's target has not started and its own
    /// parents are not mid-flight -- i.e. it is safe to `prepare` now.
    pub fn is_ready(&self) -> bool {
        is_ready(self.status(), self.deps_status())
    }

    /// Recursively prepare the target of this dependency (the "ready
    /// predecessor" walk in preparation, and the trigger walk on completion).
    pub fn prepare(&self) {
        match self {
            Dependency::Action(a) => Action::prepare(&upgrade_action(a)),
            Dependency::Service(s) => Service::prepare(&upgrade_service(s)),
        }
    }

    /// This dependency's own parents, for graph walks (e.g. cycle detection)
    /// that need to recurse upward starting from a `Dependency` rather than
    /// a concrete `Action`/`Service`.
    pub fn parents(&self) -> Vec<Dependency> {
        match self {
            Dependency::Action(a) => upgrade_action(a).borrow().parents.values().cloned().collect(),
            Dependency::Service(s) => upgrade_service(s).borrow().parents.values().cloned().collect(),
        }
    }

    /// Upgrade this dependency's target if it is an [`Action`]; `None` for a
    /// [`Service`] target.
    pub fn as_action(&self) -> Option<ActionRef> {
        match self {
            Dependency::Action(a) => a.upgrade(),
            Dependency::Service(_) => None,
        }
    }
}

/// Evaluate the aggregate status of `parents`:
///
/// - `Done` iff all parents are `DONE` -- vacuously true for an empty parent
///   set, so a root entity's own aggregate is `Done` on its own. Callers that
///   need "no parents" to mean "dispatch me" rather than "already satisfied"
///   check `parents.is_empty()` themselves instead of relying
///   on this return value.
/// - `Error` iff any parent is in a non-`DONE` terminal status.
/// - `Waiting` iff any parent is `WAITING_STATUS` (and none are `Error`).
/// - `NoStatus` otherwise (at least one parent exists and none have started).
pub fn eval_deps_status(parents: &HashMap<String, Dependency>) -> DepsStatus {
    if parents.is_empty() {
        return DepsStatus::Done;
    }

    let mut any_waiting = false;
    let mut any_error = false;
    let mut all_done = true;

    for dep in parents.values() {
        match dep.status() {
            Status::Done => {}
            Status::WaitingStatus => {
                any_waiting = true;
                all_done = false;
            }
            Status::NoStatus => {
                all_done = false;
            }
            Status::TimedOut | Status::TooManyErrors | Status::Error => {
                any_error = true;
                all_done = false;
            }
        }
    }

    if any_error {
        DepsStatus::Error
    } else if all_done {
        DepsStatus::Done
    } else if any_waiting {
        DepsStatus::Waiting
    } else {
        DepsStatus::NoStatus
    }
}

/// `true` if an entity with the given own `status` and parent aggregate
/// `deps_status` has not started yet and is safe to `prepare` now.
pub fn is_ready(status: Status, deps_status: DepsStatus) -> bool {
    status == Status::NoStatus && deps_status != DepsStatus::Waiting
}

/// Return every parent currently in [`Status::NoStatus`], for the
/// recursive-prepare branch of preparation.
pub fn parents_in_no_status(parents: &HashMap<String, Dependency>) -> Vec<Dependency> {
    parents
        .values()
        .filter(|d| d.status() == Status::NoStatus)
        .cloned()
        .collect()
}

/// Return every child that is now ready to be prepared, for the trigger
/// walk that fires on entering a terminal state.
pub fn ready_children(children: &HashMap<String, Dependency>) -> Vec<Dependency> {
    children.values().filter(|d| d.is_ready()).cloned().collect()
}

/// Link `parent` and `child` as one directed dependency edge: `parent` is
/// recorded in `child`'s `parents` map, and `child` in `parent`'s
/// `children` map. Either end may be an [`Action`] or a [`Service`]. Build
/// `parent`/`child` with [`Dependency::action`]/[`Dependency::service`] so
/// the edge holds its peer weakly.
pub fn link(parent: Dependency, child: Dependency) {
    let parent_name = parent.name();
    let child_name = child.name();

    match &child {
        Dependency::Action(c) => {
            upgrade_action(c).borrow_mut().parents.insert(parent_name, parent.clone());
        }
        Dependency::Service(c) => {
            upgrade_service(c).borrow_mut().parents.insert(parent_name, parent.clone());
        }
    }

    match &parent {
        Dependency::Action(p) => {
            upgrade_action(p).borrow_mut().children.insert(child_name, child);
        }
        Dependency::Service(p) => {
            upgrade_service(p).borrow_mut().children.insert(child_name, child);
        }
    }
}
