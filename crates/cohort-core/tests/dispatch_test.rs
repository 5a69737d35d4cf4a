//! End-to-end scheduling scenarios driven through the real local executor:
//! happy path, simulate suppresses dispatch, a delayed action, and a retry
//! budget being consumed by a command that always fails.

use std::rc::Rc;
use std::time::Duration;

use cohort_core::{
    reset_action_manager, reset_service_manager, set_action_manager, Action, ActionManager, CallbackSink, EventKind,
    NodeExecutor, NullSink, Payload, Service, Status, TracingSink,
};
use cohort_exec::LocalNodeExecutor;
use tokio::task::LocalSet;

fn fresh_manager_with_executor() -> Rc<ActionManager> {
    reset_action_manager();
    reset_service_manager();
    let executor = LocalNodeExecutor::new() as Rc<dyn NodeExecutor>;
    let sink = Rc::new(TracingSink) as Rc<dyn CallbackSink>;
    let manager = ActionManager::new(Some(executor), sink);
    set_action_manager(Rc::clone(&manager));
    manager
}

#[tokio::test(flavor = "current_thread")]
async fn happy_path_runs_once_and_completes_quickly() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let manager = fresh_manager_with_executor();

            let service = Service::new("one-action");
            let action = Service::add_action(&service, Action::new("start").target("localhost").command("/bin/true"))
                .unwrap();

            Service::run(&service, "start").await.unwrap();

            assert_eq!(manager.tasks_done_count(), 1);
            assert_eq!(action.borrow().status, Status::Done);
            let duration = action.borrow().duration().expect("both timestamps set");
            assert!(duration < Duration::from_millis(500), "duration was {duration:?}");
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn simulate_suppresses_dispatch() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let manager = fresh_manager_with_executor();

            let service = Service::new("ghost");
            Service::simulate(&service, true);
            Service::add_action(&service, Action::new("start").target("localhost").command("/bin/true")).unwrap();

            Service::run(&service, "start").await.unwrap();

            assert_eq!(manager.tasks_done_count(), 0);
            assert!(service.borrow().status.is_terminal());
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn delayed_action_waits_before_dispatch() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let manager = fresh_manager_with_executor();

            let service = Service::new("delayed");
            let action = Service::add_action(
                &service,
                Action::new("wait")
                    .target("localhost")
                    .command("sleep 0.5")
                    .delay(Duration::from_millis(500)),
            )
            .unwrap();

            Service::run(&service, "wait").await.unwrap();

            assert_eq!(manager.tasks_done_count(), 1);
            assert_eq!(action.borrow().status, Status::Done);
            let duration = action.borrow().duration().unwrap();
            assert!(
                duration >= Duration::from_millis(500) && duration <= Duration::from_millis(1400),
                "duration was {duration:?}"
            );
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn retry_budget_is_consumed_by_a_failing_command() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let manager = fresh_manager_with_executor();

            let service = Service::new("flaky");
            let mut action = Action::new("always-fails")
                .target("localhost")
                .command("exit 1")
                .delay(Duration::from_millis(100));
            action = action.with_retry(2).unwrap();
            let action = Service::add_action(&service, action).unwrap();

            Service::run(&service, "always-fails").await.unwrap();

            assert_eq!(manager.tasks_done_count(), 3, "first attempt plus two retries");
            assert_eq!(action.borrow().status, Status::TooManyErrors);
            assert_eq!(action.borrow().retry(), 0);
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn dependent_action_waits_for_its_parent() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let _manager = fresh_manager_with_executor();

            let service = Service::new("pipeline");
            let first = Service::add_action(&service, Action::new("first").target("localhost").command("/bin/true"))
                .unwrap();
            let second = Service::add_action(&service, Action::new("second").target("localhost").command("/bin/true"))
                .unwrap();
            cohort_core::link(
                cohort_core::Dependency::action(&first),
                cohort_core::Dependency::action(&second),
            );

            Service::run(&service, "second").await.unwrap();

            assert_eq!(first.borrow().status, Status::Done);
            assert_eq!(second.borrow().status, Status::Done);
        })
        .await;
}

#[test]
fn null_sink_discards_every_event() {
    // Exercises the no-op sink's contract independent of any manager state.
    let sink = NullSink;
    sink.notify(EventKind::Started, Payload::Action(Rc::new(std::cell::RefCell::new(Action::new("x")))));
}
