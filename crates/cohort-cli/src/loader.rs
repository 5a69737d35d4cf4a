//! YAML service-definition loader: parses a declarative file of
//! services/actions/dependencies/variables into the in-memory action and
//! service graph `cohort-core` operates on.

use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use cohort_core::{link, Action, Dependency, EngineError, Service, ServiceRef};

/// Errors raised while parsing or wiring a service-definition file.
///
/// Kept distinct from [`EngineError`]: these are load-time input mistakes
/// (malformed YAML, a dangling `requires:`, a cycle) rather than runtime
/// scheduler failures, even where the underlying rule (e.g. "no `retry`
/// without `delay`") is shared with the engine.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("failed to parse {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("service '{service}' action '{action}' requires unknown peer action '{requires}'")]
    UnknownActionDependency {
        service: String,
        action: String,
        requires: String,
    },

    #[error("service '{service}' requires unknown peer service '{requires}'")]
    UnknownServiceDependency { service: String, requires: String },

    #[error("service '{service}' action '{action}' sets retry without a delay")]
    RetryWithoutDelay { service: String, action: String },

    #[error("dependency cycle detected involving '{0}'")]
    Cycle(String),

    #[error("duplicate service name '{0}'")]
    DuplicateService(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Deserialize)]
struct RawFile {
    services: HashMap<String, RawService>,
}

#[derive(Debug, Deserialize)]
struct RawService {
    #[serde(default)]
    target: String,
    #[serde(default)]
    simulate: bool,
    #[serde(default)]
    variables: HashMap<String, String>,
    #[serde(default)]
    requires: Vec<String>,
    #[serde(default)]
    actions: HashMap<String, RawAction>,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    command: String,
    /// Overrides the owning service's `target` for this action only.
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    timeout: f64,
    #[serde(default)]
    delay: f64,
    #[serde(default)]
    errors: u32,
    #[serde(default)]
    fanout: Option<usize>,
    #[serde(default)]
    retry: Option<u32>,
    #[serde(default)]
    requires: Vec<String>,
    #[serde(default)]
    vars: HashMap<String, String>,
}

/// Parse `path` and build the in-memory `Service`/`Action` graph described by
/// it, wiring every `requires:` entry into `parents`/`children` Dependency
/// links and rejecting cycles and the `retry`-without-`delay` contract
/// violation before returning.
///
/// Does not register the services with [`cohort_core::service_manager_self`]
/// -- the caller decides whether/when to do that.
pub fn load_file(path: &Path) -> Result<Vec<ServiceRef>, LoaderError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoaderError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_str(&text)
}

/// As [`load_file`], but from an in-memory string (used by tests and by
/// callers that already have the document, e.g. embedded config).
pub fn load_str(text: &str) -> Result<Vec<ServiceRef>, LoaderError> {
    let raw: RawFile = serde_yaml::from_str(text).map_err(|source| LoaderError::Yaml {
        path: "<string>".to_string(),
        source,
    })?;

    let mut services: HashMap<String, ServiceRef> = HashMap::new();

    for (name, raw_service) in &raw.services {
        if services.contains_key(name) {
            return Err(LoaderError::DuplicateService(name.clone()));
        }
        let service = Service::new(name.clone());
        Service::simulate(&service, raw_service.simulate);
        for (var_name, value) in &raw_service.variables {
            Service::set_variable(&service, var_name.clone(), value.clone());
        }

        for (action_name, raw_action) in &raw_service.actions {
            let mut action = Action::new(action_name.clone())
                .target(raw_action.target.clone().unwrap_or_else(|| raw_service.target.clone()))
                .command(raw_action.command.clone())
                .timeout(Duration::from_secs_f64(raw_action.timeout.max(0.0)))
                .delay(Duration::from_secs_f64(raw_action.delay.max(0.0)))
                .errors(raw_action.errors);
            if let Some(fanout) = raw_action.fanout {
                action = action.fanout(fanout);
            }
            for (var_name, value) in &raw_action.vars {
                action = action.variable(var_name.clone(), value.clone());
            }
            if let Some(retry) = raw_action.retry {
                if raw_action.delay <= 0.0 {
                    return Err(LoaderError::RetryWithoutDelay {
                        service: name.clone(),
                        action: action_name.clone(),
                    });
                }
                action = action.with_retry(retry)?;
            }

            Service::add_action(&service, action)?;
        }

        services.insert(name.clone(), service);
    }

    // Wire action-level `requires:` within each service.
    for (service_name, raw_service) in &raw.services {
        let service = &services[service_name];
        for (action_name, raw_action) in &raw_service.actions {
            let child = Service::action(service, action_name).expect("just inserted above");
            for requires in &raw_action.requires {
                let parent = Service::action(service, requires).ok_or_else(|| LoaderError::UnknownActionDependency {
                    service: service_name.clone(),
                    action: action_name.clone(),
                    requires: requires.clone(),
                })?;
                link(Dependency::action(&parent), Dependency::action(&child));
            }
        }
    }

    // Wire service-level `requires:`.
    for (service_name, raw_service) in &raw.services {
        let child = Rc::clone(&services[service_name]);
        for requires in &raw_service.requires {
            let parent = services.get(requires).ok_or_else(|| LoaderError::UnknownServiceDependency {
                service: service_name.clone(),
                requires: requires.clone(),
            })?;
            link(Dependency::service(parent), Dependency::service(&child));
        }
    }

    check_acyclic(&services)?;

    Ok(services.into_values().collect())
}

/// Reject a graph with a dependency cycle: the preparation walk would never
/// terminate otherwise. Walked in the `parents` direction (equivalent to walking
/// `children`, since every link is recorded on both ends).
fn check_acyclic(services: &HashMap<String, ServiceRef>) -> Result<(), LoaderError> {
    #[derive(PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn node_key(dep: &Dependency) -> usize {
        match dep {
            Dependency::Action(a) => std::rc::Weak::as_ptr(a) as usize,
            Dependency::Service(s) => std::rc::Weak::as_ptr(s) as usize,
        }
    }

    fn visit(dep: &Dependency, marks: &mut HashMap<usize, Mark>) -> Result<(), LoaderError> {
        let key = node_key(dep);
        match marks.get(&key) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(LoaderError::Cycle(dep.name())),
            None => {}
        }
        marks.insert(key, Mark::Visiting);

        for parent in dep.parents() {
            visit(&parent, marks)?;
        }

        marks.insert(key, Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    for service in services.values() {
        visit(&Dependency::service(service), &mut marks)?;
        let actions: Vec<_> = service.borrow().actions.values().cloned().collect();
        for action in actions {
            visit(&Dependency::action(&action), &mut marks)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = r#"
services:
  webapp:
    target: "node[1-4]"
    variables:
      PORT: "8080"
    actions:
      start:
        command: "systemctl start webapp --port $PORT"
        timeout: 30
      status:
        command: "systemctl status webapp"
        requires: [start]
      stop:
        command: "systemctl stop webapp"
        delay: 2
        retry: 3
"#;

    #[test]
    fn parses_services_actions_and_deps() {
        let services = load_str(SIMPLE).expect("should parse");
        assert_eq!(services.len(), 1);
        let service = &services[0];
        assert_eq!(service.borrow().name, "webapp");
        assert_eq!(service.borrow().actions.len(), 3);

        let status = Service::action(service, "status").unwrap();
        assert_eq!(status.borrow().parents.len(), 1);
        assert!(status.borrow().parents.contains_key("start"));

        let stop = Service::action(service, "stop").unwrap();
        assert_eq!(stop.borrow().retry(), 3);
    }

    #[test]
    fn cross_action_variable_is_reachable() {
        let services = load_str(SIMPLE).expect("should parse");
        let start = Service::action(&services[0], "start").unwrap();
        assert_eq!(start.borrow().command, "systemctl start webapp --port $PORT");
    }

    #[test]
    fn rejects_unknown_requires() {
        let yaml = r#"
services:
  webapp:
    actions:
      start:
        command: "true"
        requires: [missing]
"#;
        let err = load_str(yaml).unwrap_err();
        assert!(matches!(err, LoaderError::UnknownActionDependency { .. }));
    }

    #[test]
    fn rejects_retry_without_delay() {
        let yaml = r#"
services:
  webapp:
    actions:
      stop:
        command: "true"
        retry: 3
"#;
        let err = load_str(yaml).unwrap_err();
        assert!(matches!(err, LoaderError::RetryWithoutDelay { .. }));
    }

    #[test]
    fn rejects_dependency_cycle() {
        let yaml = r#"
services:
  webapp:
    actions:
      a:
        command: "true"
        requires: [b]
      b:
        command: "true"
        requires: [a]
"#;
        let err = load_str(yaml).unwrap_err();
        assert!(matches!(err, LoaderError::Cycle(_)));
    }

    #[test]
    fn load_file_reads_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cohort.yaml");
        std::fs::write(&path, SIMPLE).expect("write fixture");

        let services = load_file(&path).expect("should parse");
        assert_eq!(services.len(), 1);
    }

    #[test]
    fn load_file_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("does-not-exist.yaml");

        let err = load_file(&path).unwrap_err();
        assert!(matches!(err, LoaderError::Io { .. }));
    }

    #[test]
    fn service_level_requires_links_services() {
        let yaml = r#"
services:
  db:
    actions:
      start:
        command: "true"
  webapp:
    requires: [db]
    actions:
      start:
        command: "true"
"#;
        let services = load_str(yaml).expect("should parse");
        let webapp = services.iter().find(|s| s.borrow().name == "webapp").unwrap();
        assert!(webapp.borrow().parents.contains_key("db"));
    }
}
