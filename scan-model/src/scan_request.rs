use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{OwnerId, ReportId, TaskId};

/// How a handler should treat a report that may already have a partial scan on the
/// scanner side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartFromMode {
    FromScratch,
    ResumeRequired,
    ResumeOrScratch,
}

impl StartFromMode {
    /// `start_from` is treated as "nonzero" throughout the component design whenever
    /// resume preparation should run before a fresh launch.
    pub fn requires_resume_preparation(self) -> bool {
        !matches!(self, StartFromMode::FromScratch)
    }
}

/// The durable record a scan request is made of while it sits in the queue store.
///
/// `handler_pid` of `None` means no handler is currently assigned; the queue store
/// assigns `position` at `enqueue` time and updates it on `move_to_end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub report_id: ReportId,
    pub report_row_key: i64,
    pub task_row_key: i64,
    pub task_id: TaskId,
    pub owner_key: OwnerId,
    pub start_from: StartFromMode,
    pub handler_pid: Option<u32>,
    pub position: u64,
}

impl ScanRequest {
    pub fn new(
        report_id: ReportId,
        report_row_key: i64,
        task_row_key: i64,
        task_id: TaskId,
        owner_key: OwnerId,
        start_from: StartFromMode,
    ) -> Self {
        Self {
            report_id,
            report_row_key,
            task_row_key,
            task_id,
            owner_key,
            start_from,
            handler_pid: None,
            position: 0,
        }
    }

    pub fn has_live_handler_candidate(&self) -> bool {
        self.handler_pid.is_some_and(|pid| pid != 0)
    }
}

/// A row as stored by a persistence-backed queue store, carrying the ordering
/// position and timestamps a `ScanRequest` itself does not need to know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequestRow {
    pub request: ScanRequest,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
