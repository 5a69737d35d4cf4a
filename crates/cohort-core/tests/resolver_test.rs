//! Variable resolution: the layered lookup order and the undefined-variable
//! error surface.

use cohort_core::{reset_service_manager, resolver, service_manager_self, Action, EngineError, Service};

fn reset() {
    reset_service_manager();
}

#[test]
fn command_with_no_tokens_is_returned_unchanged() {
    reset();
    let service = Service::new("svc");
    let action = Service::add_action(&service, Action::new("noop").command("echo hello")).unwrap();
    assert_eq!(resolver::resolve(&action).unwrap(), "echo hello");
}

#[test]
fn action_attribute_resolves_target() {
    reset();
    let service = Service::new("svc");
    let action = Service::add_action(
        &service,
        Action::new("ping").target("node1,node2").command("echo $TARGET"),
    )
    .unwrap();
    assert_eq!(resolver::resolve(&action).unwrap(), "echo node1,node2");
}

#[test]
fn action_variable_wins_over_service_variable() {
    reset();
    let service = Service::new("svc");
    Service::set_variable(&service, "PORT", "9000");
    let action = Service::add_action(
        &service,
        Action::new("start").command("start --port $PORT").variable("PORT", "8080"),
    )
    .unwrap();
    assert_eq!(resolver::resolve(&action).unwrap(), "start --port 8080");
}

#[test]
fn service_variable_resolves_when_action_has_none() {
    reset();
    let service = Service::new("svc");
    Service::set_variable(&service, "PORT", "8080");
    let action = Service::add_action(&service, Action::new("start").command("start --port $PORT")).unwrap();
    assert_eq!(resolver::resolve(&action).unwrap(), "start --port 8080");
}

#[test]
fn global_manager_variable_is_the_last_resort() {
    reset();
    let service = Service::new("svc");
    service_manager_self().set_variable("CLUSTER", "prod");
    let action = Service::add_action(&service, Action::new("start").command("deploy --cluster $CLUSTER")).unwrap();
    assert_eq!(resolver::resolve(&action).unwrap(), "deploy --cluster prod");
}

#[test]
fn undefined_variable_surfaces_name_and_command() {
    reset();
    let service = Service::new("svc");
    let action = Service::add_action(&service, Action::new("start").command("deploy --cluster $CLUSTER")).unwrap();

    let err = resolver::resolve(&action).unwrap_err();
    match err {
        EngineError::UndefinedVariable { name, command } => {
            assert_eq!(name, "CLUSTER");
            assert_eq!(command, "deploy --cluster $CLUSTER");
        }
        other => panic!("expected UndefinedVariable, got {other:?}"),
    }

    // Resolution failure does not mutate the action's stored command.
    assert_eq!(action.borrow().command, "deploy --cluster $CLUSTER");
}

#[test]
fn substituted_value_is_not_recursively_expanded() {
    reset();
    let service = Service::new("svc");
    let action = Service::add_action(
        &service,
        Action::new("start")
            .command("echo $A $B")
            .variable("A", "$B")
            .variable("B", "xyz"),
    )
    .unwrap();
    assert_eq!(resolver::resolve(&action).unwrap(), "echo $B xyz");
}

#[test]
fn every_occurrence_of_a_token_is_substituted() {
    reset();
    let service = Service::new("svc");
    let action = Service::add_action(
        &service,
        Action::new("start").command("echo $NAME $NAME").variable("NAME", "x"),
    )
    .unwrap();
    assert_eq!(resolver::resolve(&action).unwrap(), "echo x x");
}
