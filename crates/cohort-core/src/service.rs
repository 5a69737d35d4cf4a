//! The `Service` entity: a named group of actions, and -- by the same
//! extension the dependency graph applies everywhere else -- itself a node
//! in that graph. A service's own status is derived from its actions, not
//! set directly, except through the simulate short-circuit (see
//! [`crate::manager::ActionManager`]).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::action::{Action, ActionRef};
use crate::entity::{self, Dependency};
use crate::error::{EngineError, EngineResult};
use crate::status::{DepsStatus, Status};

pub type ServiceRef = Rc<RefCell<Service>>;

pub struct Service {
    pub name: String,
    pub actions: HashMap<String, ActionRef>,
    pub variables: HashMap<String, String>,
    /// A ghost service: actions are never dispatched to the executor, but
    /// the service's own status still derives from its dependency graph.
    pub simulate: bool,
    pub status: Status,
    pub parents: HashMap<String, Dependency>,
    pub children: HashMap<String, Dependency>,
}

impl Service {
    pub fn new(name: impl Into<String>) -> ServiceRef {
        Rc::new(RefCell::new(Self {
            name: name.into(),
            actions: HashMap::new(),
            variables: HashMap::new(),
            simulate: false,
            status: Status::NoStatus,
            parents: HashMap::new(),
            children: HashMap::new(),
        }))
    }

    pub fn simulate(self_ref: &ServiceRef, simulate: bool) {
        self_ref.borrow_mut().simulate = simulate;
    }

    pub fn set_variable(self_ref: &ServiceRef, name: impl Into<String>, value: impl Into<String>) {
        self_ref.borrow_mut().variables.insert(name.into(), value.into());
    }

    /// Add an already-built action to this service, wiring its back-link.
    /// Errors if the name is already taken within this service.
    pub fn add_action(self_ref: &ServiceRef, action: Action) -> EngineResult<ActionRef> {
        let name = action.name.clone();
        if self_ref.borrow().actions.contains_key(&name) {
            return Err(EngineError::DuplicateName(name));
        }
        let action_ref: ActionRef = Rc::new(RefCell::new(action));
        action_ref.borrow_mut().service = Some(Rc::downgrade(self_ref));
        self_ref.borrow_mut().actions.insert(name, Rc::clone(&action_ref));
        Ok(action_ref)
    }

    pub fn action(self_ref: &ServiceRef, name: &str) -> Option<ActionRef> {
        self_ref.borrow().actions.get(name).cloned()
    }

    /// A service is prepared exactly like an action (same deps-status
    /// gate), except that "ready to run" means kicking off every owned
    /// action still in `NoStatus` rather than dispatching a single command.
    /// The service's own status is then derived, not assigned here (see
    /// [`Service::update_status`]).
    pub fn prepare(self_ref: &ServiceRef) {
        let status = self_ref.borrow().status;
        let deps_status = entity::eval_deps_status(&self_ref.borrow().parents);

        if status != Status::NoStatus || deps_status == DepsStatus::Waiting {
            return;
        }

        let no_parents = self_ref.borrow().parents.is_empty();
        if deps_status == DepsStatus::Error || no_parents {
            let actions: Vec<ActionRef> = self_ref.borrow().actions.values().cloned().collect();
            for action in actions {
                if action.borrow().status == Status::NoStatus {
                    Action::prepare(&action);
                }
            }
        } else if deps_status == DepsStatus::Done {
            Service::update_status(self_ref, Status::Done);
        } else {
            for dep in entity::parents_in_no_status(&self_ref.borrow().parents) {
                dep.prepare();
            }
        }
    }

    /// Record a terminal status reached either by one of this service's own
    /// actions bubbling up (an action with no children, per
    /// [`Action::update_status`]) or by the simulate short-circuit deriving
    /// it straight from `eval_deps_status`. The first terminal status this
    /// service sees sticks; a later action completing successfully does not
    /// erase an earlier failure.
    pub fn update_status(self_ref: &ServiceRef, status: Status) {
        let recorded = {
            let mut s = self_ref.borrow_mut();
            if matches!(s.status, Status::NoStatus | Status::Done) {
                s.status = status;
            }
            s.status
        };

        tracing::info!(service = %self_ref.borrow().name, status = %recorded, "service status changed");

        if !recorded.is_terminal() {
            return;
        }

        let has_children = !self_ref.borrow().children.is_empty();
        if has_children {
            for dep in entity::ready_children(&self_ref.borrow().children) {
                dep.prepare();
            }
        }
    }

    /// Look up `action_name` within this service and run it to
    /// completion, blocking until every action it transitively triggers has
    /// reached a terminal status.
    pub async fn run(self_ref: &ServiceRef, action_name: &str) -> EngineResult<()> {
        let action = self_ref
            .borrow()
            .actions
            .get(action_name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownDependency(self_ref.borrow().name.clone(), action_name.to_string()))?;
        Action::run(&action).await;
        Ok(())
    }
}
