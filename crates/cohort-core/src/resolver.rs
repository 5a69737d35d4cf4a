//! Command-template variable resolution: expand every `$NAME` token in
//! an action's command against a layered lookup order -- action attribute,
//! action variable, service attribute, service variable, manager attribute,
//! manager variable.

use std::sync::OnceLock;

use regex::Regex;

use crate::action::{Action, ActionRef};
use crate::error::{EngineError, EngineResult};
use crate::manager::{self, ServiceManager};
use crate::service::Service;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$[A-Za-z0-9_]+").expect("static token pattern is valid"))
}

/// Resolve every `$NAME` token in `action`'s command. Fails on the first
/// token with no match in any layer; the action is not mutated either way.
///
/// Builds the output with a single forward scan over match spans rather than
/// a blind string-wide `replace`: a resolved value is never itself rescanned
/// for tokens, so a substitution that happens to produce text like `$OTHER`
/// is not recursively expanded.
pub fn resolve(action: &ActionRef) -> EngineResult<String> {
    let command = action.borrow().command.clone();
    let mut resolved = String::with_capacity(command.len());
    let mut last_end = 0;

    for occurrence in token_pattern().find_iter(&command) {
        let name = &occurrence.as_str()[1..];
        let value = resolve_one(action, name).ok_or_else(|| EngineError::UndefinedVariable {
            name: name.to_string(),
            command: command.clone(),
        })?;
        resolved.push_str(&command[last_end..occurrence.start()]);
        resolved.push_str(&value);
        last_end = occurrence.end();
    }
    resolved.push_str(&command[last_end..]);

    Ok(resolved)
}

fn resolve_one(action: &ActionRef, name: &str) -> Option<String> {
    let lower = name.to_ascii_lowercase();

    {
        let a = action.borrow();
        if let Some(v) = action_attribute(&a, &lower) {
            return Some(v);
        }
        if let Some(v) = a.variables.get(name) {
            return Some(v.clone());
        }
    }

    if let Some(service) = Action::owning_service(action) {
        let s = service.borrow();
        if let Some(v) = service_attribute(&s, &lower) {
            return Some(v);
        }
        if let Some(v) = s.variables.get(name) {
            return Some(v.clone());
        }
    }

    let mgr = manager::service_manager_self();
    if let Some(v) = manager_attribute(&mgr, &lower) {
        return Some(v);
    }
    mgr.variable(name)
}

fn action_attribute(action: &Action, lower: &str) -> Option<String> {
    match lower {
        "name" => Some(action.name.clone()),
        "target" => Some(action.target.clone()),
        "command" => Some(action.command.clone()),
        _ => None,
    }
}

fn service_attribute(service: &Service, lower: &str) -> Option<String> {
    match lower {
        "name" => Some(service.name.clone()),
        _ => None,
    }
}

fn manager_attribute(manager: &ServiceManager, lower: &str) -> Option<String> {
    match lower {
        "target" => manager.target(),
        _ => None,
    }
}
