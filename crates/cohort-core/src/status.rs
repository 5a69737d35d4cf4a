//! The status enums shared by [`crate::action::Action`] and
//! [`crate::service::Service`].

use std::fmt;

/// Lifecycle status of an [`crate::action::Action`] or [`crate::service::Service`].
///
/// Terminal statuses (everything but [`Status::NoStatus`] and
/// [`Status::WaitingStatus`]) are sticky until an explicit `reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Initial status: nothing has happened yet.
    NoStatus,
    /// Prepared and dispatched (or waiting on a delay timer); not yet terminal.
    WaitingStatus,
    /// Completed successfully.
    Done,
    /// The node executor reported a timeout for this attempt.
    TimedOut,
    /// The count of non-zero per-node exits exceeded the configured tolerance.
    TooManyErrors,
    /// A generic terminal failure (e.g. a dependency failed upstream).
    Error,
}

impl Status {
    /// `true` once an entity has left [`Status::NoStatus`]/[`Status::WaitingStatus`]
    /// and will not change again without an explicit `reset`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::NoStatus | Status::WaitingStatus)
    }

    /// `true` for the single success terminal state.
    pub fn is_success(self) -> bool {
        matches!(self, Status::Done)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::NoStatus => "NO_STATUS",
            Status::WaitingStatus => "WAITING_STATUS",
            Status::Done => "DONE",
            Status::TimedOut => "TIMED_OUT",
            Status::TooManyErrors => "TOO_MANY_ERRORS",
            Status::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// The aggregate status of an entity's parent set, computed by
/// [`crate::entity::eval_deps_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepsStatus {
    /// At least one parent exists and none have started yet.
    NoStatus,
    /// At least one parent is still `WAITING_STATUS`.
    Waiting,
    /// All parents reached `DONE` (vacuously true for an empty parent set).
    Done,
    /// At least one parent reached a non-`DONE` terminal status.
    Error,
}

/// Maps a dependency aggregate onto the status vocabulary it was derived
/// from. Used by the simulate short-circuit, which never runs a command and
/// so has to borrow its terminal status straight from `eval_deps_status`.
impl From<DepsStatus> for Status {
    fn from(deps_status: DepsStatus) -> Self {
        match deps_status {
            DepsStatus::NoStatus => Status::NoStatus,
            DepsStatus::Waiting => Status::WaitingStatus,
            DepsStatus::Done => Status::Done,
            DepsStatus::Error => Status::Error,
        }
    }
}
