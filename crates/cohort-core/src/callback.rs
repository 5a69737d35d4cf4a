//! The callback sink contract: a single typed notification channel
//! observed by UI/reporting collaborators.

use crate::action::ActionRef;
use crate::entity::Dependency;
use crate::executor::NodeInfo;

/// The event kinds the engine notifies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    StatusChanged,
    Complete,
    Started,
    Delayed,
    TriggerDep,
}

/// The payload carried alongside an [`EventKind`].
///
/// `Complete` carries [`Payload::Node`] for a single-node progress event and
/// [`Payload::Action`] for an action reaching a terminal status.
/// `TriggerDep` always carries [`Payload::TriggerDep`], `(from, to)`; `to`
/// may be a [`Dependency::Action`] or a [`Dependency::Service`] -- a
/// completed action's ready children are not necessarily other actions.
pub enum Payload {
    Node(NodeInfo),
    Action(ActionRef),
    TriggerDep(Dependency, Dependency),
}

/// Receives every notification the engine emits.
///
/// Implementations must not block the controller context for long: this is
/// called inline from `prepare`/`update_status`/`schedule`.
pub trait CallbackSink {
    fn notify(&self, kind: EventKind, payload: Payload);
}

/// A sink that discards every event. Used by tests that only care about the
/// resulting state, not the notification stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl CallbackSink for NullSink {
    fn notify(&self, _kind: EventKind, _payload: Payload) {}
}

/// A sink that logs each event through `tracing` at a level appropriate to
/// its severity. This is the default sink wired up by the CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl CallbackSink for TracingSink {
    fn notify(&self, kind: EventKind, payload: Payload) {
        match (kind, payload) {
            (EventKind::StatusChanged, Payload::Action(a)) => {
                let a = a.borrow();
                tracing::info!(action = %a.name, status = %a.status, "status changed");
            }
            (EventKind::Complete, Payload::Action(a)) => {
                let a = a.borrow();
                tracing::info!(action = %a.name, status = %a.status, "action complete");
            }
            (EventKind::Complete, Payload::Node(info)) => {
                tracing::debug!(
                    node = %info.node,
                    exit_code = ?info.exit_code,
                    "node complete"
                );
            }
            (EventKind::Started, Payload::Action(a)) => {
                let a = a.borrow();
                tracing::info!(action = %a.name, target = %a.target, "action started");
            }
            (EventKind::Delayed, Payload::Action(a)) => {
                let a = a.borrow();
                tracing::info!(action = %a.name, delay = a.delay.as_secs_f64(), "action delayed");
            }
            (EventKind::TriggerDep, Payload::TriggerDep(from, to)) => {
                tracing::debug!(from = %from.name(), to = %to.name(), "triggering dependent action");
            }
            (kind, _) => {
                tracing::warn!(?kind, "unexpected payload for event kind");
            }
        }
    }
}
