//! The event adapter: the only place an [`ExecutorEvent`] turns back
//! into an [`Action`] state transition. Kept separate from
//! [`crate::manager::ActionManager`] so the manager's own methods stay
//! free of per-event-kind branching.

use std::rc::Rc;

use chrono::Utc;

use crate::action::Action;
use crate::callback::{EventKind, Payload};
use crate::executor::ExecutorEvent;
use crate::manager::ActionManager;
use crate::status::Status;

pub fn handle_event(manager: &ActionManager, event: ExecutorEvent) {
    match event {
        ExecutorEvent::NodeComplete { job_id: _, info } => {
            manager.notify(EventKind::Complete, Payload::Node(info));
        }

        ExecutorEvent::TimerFired { timer_id } => {
            if let Some(action) = manager.take_timer(timer_id) {
                Action::schedule(&action, false);
            }
        }

        ExecutorEvent::JobComplete { job_id, worker } => {
            let Some(action) = manager.take_job(job_id) else {
                return;
            };
            manager.remove_task(&action);

            {
                let mut a = action.borrow_mut();
                a.stop_time = Some(Utc::now());
                a.worker = Some(worker);
            }

            let timed_out = action.borrow().has_timed_out();
            let too_many_errors = action.borrow().has_too_many_errors();
            let retries_left = action.borrow().retry() > 0;

            if (timed_out || too_many_errors) && retries_left {
                action.borrow_mut().decrement_retry();
                Action::schedule(&Rc::clone(&action), true);
            } else if too_many_errors {
                Action::update_status(&action, Status::TooManyErrors);
            } else if timed_out {
                Action::update_status(&action, Status::TimedOut);
            } else {
                Action::update_status(&action, Status::Done);
            }
        }
    }
}
