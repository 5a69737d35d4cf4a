//! The service manager: the registry of every service in the current
//! graph, plus the top-level attribute/variable layer the resolver falls
//! back to once an action and its owning service have both missed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{EngineError, EngineResult};
use crate::service::ServiceRef;

pub type ServiceManagerRef = Rc<ServiceManager>;

pub struct ServiceManager {
    services: RefCell<HashMap<String, ServiceRef>>,
    variables: RefCell<HashMap<String, String>>,
    target: RefCell<Option<String>>,
}

impl ServiceManager {
    pub fn new() -> ServiceManagerRef {
        Rc::new(Self {
            services: RefCell::new(HashMap::new()),
            variables: RefCell::new(HashMap::new()),
            target: RefCell::new(None),
        })
    }

    pub fn register(&self, service: ServiceRef) -> EngineResult<()> {
        let name = service.borrow().name.clone();
        let mut services = self.services.borrow_mut();
        if services.contains_key(&name) {
            return Err(EngineError::DuplicateName(name));
        }
        services.insert(name, service);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<ServiceRef> {
        self.services.borrow().get(name).cloned()
    }

    pub fn services(&self) -> Vec<ServiceRef> {
        self.services.borrow().values().cloned().collect()
    }

    pub fn set_variable(&self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.borrow_mut().insert(name.into(), value.into());
    }

    pub fn variable(&self, name: &str) -> Option<String> {
        self.variables.borrow().get(name).cloned()
    }

    pub fn target(&self) -> Option<String> {
        self.target.borrow().clone()
    }

    pub fn set_target(&self, target: impl Into<String>) {
        *self.target.borrow_mut() = Some(target.into());
    }

    /// Resolve every registered action's command up front, without
    /// dispatching anything. Lets a loader reject an unresolvable graph
    /// before the run starts rather than partway through it.
    pub fn verify_all_commands(&self) -> EngineResult<()> {
        for service in self.services() {
            let actions: Vec<_> = service.borrow().actions.values().cloned().collect();
            for action in actions {
                crate::resolver::resolve(&action)?;
            }
        }
        Ok(())
    }
}

thread_local! {
    static SERVICE_MANAGER: RefCell<Option<ServiceManagerRef>> = RefCell::new(None);
}

pub fn set_service_manager(manager: ServiceManagerRef) {
    SERVICE_MANAGER.with(|cell| *cell.borrow_mut() = Some(manager));
}

pub fn service_manager_self() -> ServiceManagerRef {
    SERVICE_MANAGER.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            *slot = Some(ServiceManager::new());
        }
        Rc::clone(slot.as_ref().expect("just initialized"))
    })
}

pub fn reset_service_manager() {
    SERVICE_MANAGER.with(|cell| *cell.borrow_mut() = None);
}
