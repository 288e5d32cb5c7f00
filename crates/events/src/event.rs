//! Status event definitions for the batch execution engine.
//!
//! A single [`StatusEvent`] is emitted on every task state transition. Consumers
//! (a terminal progress renderer, a JSON log sink, a test assertion) subscribe
//! to the bus in [`crate::bus`] and observe these as they occur.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies a task within one engine run. Tasks are held in an arena by the
/// executor; this id is the only handle workers and the status channel carry.
pub type TaskId = u64;

/// The lifecycle states a task passes through, in order, on the way to a
/// terminal state. Every transition is reported exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    /// Registered with the executor, waiting for a worker.
    Queued,
    /// A worker has claimed the task; archive/workspace setup is starting.
    Initializing,
    /// Workspace materialized, base commit recorded; about to run step 0.
    Preparing,
    /// Running the step at the given zero-based index.
    Step {
        /// Index of the step currently executing.
        index: usize,
    },
    /// All steps finished; computing diff, building changeset specs.
    Finalizing,
    /// Terminal: the task produced a result (possibly zero changeset specs).
    Done,
    /// Terminal: the task failed with an error.
    Errored,
    /// Terminal: the task was cancelled before completion.
    Cancelled,
}

impl TaskState {
    /// Whether this state is terminal — no further transitions follow it.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Errored | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Initializing => write!(f, "initializing"),
            Self::Preparing => write!(f, "preparing"),
            Self::Step { index } => write!(f, "step[{index}]"),
            Self::Finalizing => write!(f, "finalizing"),
            Self::Done => write!(f, "done"),
            Self::Errored => write!(f, "errored"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A single task state transition, as published on the status channel.
///
/// Mirrors the informative wire schema of the external status-event contract:
/// `{task_id, repository, path, state, step_index?, stdout_tail?, stderr_tail?, error?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    /// The task this transition belongs to.
    pub task_id: TaskId,
    /// Display name of the task's repository, for human-facing consumers.
    pub repository: String,
    /// Sub-path within the repository the task operates on ("" means the whole repo).
    pub path: String,
    /// State before this transition.
    pub old_state: TaskState,
    /// State after this transition.
    pub new_state: TaskState,
    /// Optional human-readable detail (e.g. a truncated stdout/stderr tail or error summary).
    pub message: Option<String>,
    /// When the transition was observed.
    pub timestamp: DateTime<Utc>,
}

impl StatusEvent {
    /// Build a transition event for `task_id`, stamped with the current time.
    #[must_use]
    pub fn new(
        task_id: TaskId,
        repository: impl Into<String>,
        path: impl Into<String>,
        old_state: TaskState,
        new_state: TaskState,
        message: Option<String>,
    ) -> Self {
        Self {
            task_id,
            repository: repository.into(),
            path: path.into(),
            old_state,
            new_state,
            message,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(TaskState::Done.is_terminal());
        assert!(TaskState::Errored.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(!TaskState::Queued.is_terminal());
        assert!(!TaskState::Step { index: 0 }.is_terminal());
    }

    #[test]
    fn status_event_round_trips_through_json() {
        let event = StatusEvent::new(
            1,
            "github.com/acme/widgets",
            "services/widget",
            TaskState::Preparing,
            TaskState::Step { index: 0 },
            None,
        );
        let json = serde_json::to_string(&event).unwrap();
        let parsed: StatusEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.task_id, event.task_id);
        assert_eq!(parsed.new_state, event.new_state);
    }

    #[test]
    fn display_formats_step_state_with_index() {
        assert_eq!(TaskState::Step { index: 3 }.to_string(), "step[3]");
    }
}
