//! Fan-out bookkeeping on the Action Manager singleton: identity,
//! effective-minimum computation, `unset` handling, and restoring the
//! minimum as members are removed.

use std::rc::Rc;

use cohort_core::{action_manager_self, reset_action_manager, Action};

fn reset() {
    reset_action_manager();
}

fn action_with_fanout(name: &str, fanout: Option<usize>) -> cohort_core::ActionRef {
    let mut action = Action::new(name);
    if let Some(f) = fanout {
        action = action.fanout(f);
    }
    Rc::new(std::cell::RefCell::new(action))
}

#[test]
fn singleton_identity() {
    reset();
    let a = action_manager_self();
    let b = action_manager_self();
    assert!(Rc::ptr_eq(&a, &b));
}

#[test]
fn fanout_minimum_across_three_actions() {
    reset();
    let manager = action_manager_self();

    manager.add_task(action_with_fanout("a", Some(60)));
    manager.add_task(action_with_fanout("b", Some(12)));
    manager.add_task(action_with_fanout("c", Some(50)));

    assert_eq!(manager.fanout(), Some(12));

    manager.add_task(action_with_fanout("d", Some(3)));
    assert_eq!(manager.fanout(), Some(3));
    assert_eq!(manager.tasks_count(), 4);
}

#[test]
fn fanout_ignores_unset_members() {
    reset();
    let manager = action_manager_self();

    manager.add_task(action_with_fanout("a", Some(60)));
    manager.add_task(action_with_fanout("b", None));
    manager.add_task(action_with_fanout("c", Some(50)));

    assert_eq!(manager.fanout(), Some(50));
}

#[test]
fn removal_restores_fanout_minimum() {
    reset();
    let manager = action_manager_self();

    let a = action_with_fanout("a", Some(260));
    let b1 = action_with_fanout("b1", Some(85));
    let b2 = action_with_fanout("b2", Some(85));
    let c = action_with_fanout("c", Some(148));

    manager.add_task(Rc::clone(&a));
    manager.add_task(Rc::clone(&b1));
    manager.add_task(Rc::clone(&b2));
    manager.add_task(Rc::clone(&c));
    assert_eq!(manager.fanout(), Some(85));

    manager.remove_task(&b1);
    assert_eq!(manager.fanout(), Some(85));

    manager.remove_task(&b2);
    assert_eq!(manager.fanout(), Some(148));

    manager.remove_task(&c);
    assert_eq!(manager.fanout(), Some(260));

    manager.remove_task(&a);
    assert_eq!(manager.fanout(), None);
    assert_eq!(manager.tasks_count(), 0);
    assert_eq!(manager.tasks_done_count(), 4);
}

#[test]
fn add_task_is_idempotent_by_identity() {
    reset();
    let manager = action_manager_self();
    let a = action_with_fanout("a", Some(10));

    manager.add_task(Rc::clone(&a));
    manager.add_task(Rc::clone(&a));

    assert_eq!(manager.tasks_count(), 1);
}

#[test]
fn is_running_task_reflects_membership() {
    reset();
    let manager = action_manager_self();
    let a = action_with_fanout("a", None);
    let b = action_with_fanout("b", None);

    manager.add_task(Rc::clone(&a));
    assert!(manager.is_running_task(&a));
    assert!(!manager.is_running_task(&b));
}
