use serde::{Deserialize, Serialize};

/// Task lifecycle status. Terminal states are only ever reached through explicit
/// transitions performed by the scan handler; `PROCESSING` occurs only between the
/// end of the scan proper and the end of post-processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Requested,
    Queued,
    Running,
    StopRequested,
    Stopped,
    Interrupted,
    Processing,
    Done,
    DeleteRequested,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Stopped | TaskStatus::Interrupted | TaskStatus::Done
        )
    }

    pub fn is_stop_requested_or_stopped(self) -> bool {
        matches!(self, TaskStatus::StopRequested | TaskStatus::Stopped)
    }
}
