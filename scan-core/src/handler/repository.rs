use std::collections::HashMap;

use async_trait::async_trait;
use scan_model::{ReportId, ScannerConnectionData, ScannerKind, TaskId, TaskStatus};
use tokio::sync::RwLock;

use crate::error::{Result, ScanError};

/// The handler's view of a task's target record: enough to assemble a
/// `StartScanRequest`. Credential/preference bodies are passed through
/// opaquely; their structure is owned by the persistence collaborator.
#[derive(Debug, Clone)]
pub struct ScanTarget {
    pub hosts: Vec<String>,
    pub ports: Vec<String>,
    pub exclude_hosts: Vec<String>,
    pub alive_test: Option<String>,
    pub reverse_lookup_only: bool,
    pub reverse_lookup_unify: bool,
    pub vt_list: Vec<String>,
    pub scanner_kind: ScannerKind,
    pub in_assets: bool,
}

impl Default for ScanTarget {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            ports: Vec::new(),
            exclude_hosts: Vec::new(),
            alive_test: None,
            reverse_lookup_only: false,
            reverse_lookup_unify: false,
            vt_list: Vec::new(),
            scanner_kind: ScannerKind::OpenVas,
            in_assets: false,
        }
    }
}

/// The persistence-backed collaborator a handler mutates task/report state
/// through. Schema and storage are explicitly out of scope; this trait is the
/// whole surface the handler needs.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn task_status(&self, task_id: &TaskId) -> Result<TaskStatus>;
    async fn set_task_status(&self, task_id: &TaskId, status: TaskStatus) -> Result<()>;
    async fn set_report_status(&self, report_id: &ReportId, status: TaskStatus) -> Result<()>;
    async fn target(&self, task_id: &TaskId) -> Result<ScanTarget>;
    /// Connection parameters for the scanner bound to this task. Looked up
    /// fresh on each loop iteration rather than cached (see [`ScannerConnectionData`]).
    async fn scanner_connection(&self, task_id: &TaskId) -> Result<ScannerConnectionData>;
    async fn add_result(&self, report_id: &ReportId, message: &str) -> Result<()>;
    async fn record_progress(&self, report_id: &ReportId, progress: i32) -> Result<()>;
    async fn mark_processing_required(&self, report_id: &ReportId, in_assets: bool) -> Result<()>;
    async fn trim_partial_report(&self, report_id: &ReportId) -> Result<()>;
}

/// In-memory `TaskRepository`, used by tests and by the server when no
/// database is configured. Connection data is static per instance rather
/// than per task, since the in-memory mode has no scanner inventory to read
/// it from.
#[derive(Default)]
pub struct InMemoryTaskRepository {
    statuses: RwLock<HashMap<TaskId, TaskStatus>>,
    report_statuses: RwLock<HashMap<ReportId, TaskStatus>>,
    targets: RwLock<HashMap<TaskId, ScanTarget>>,
    results: RwLock<HashMap<ReportId, Vec<String>>>,
    connection: ScannerConnectionData,
}

impl InMemoryTaskRepository {
    pub fn new(connection: ScannerConnectionData) -> Self {
        Self {
            connection,
            ..Self::default()
        }
    }

    pub async fn seed_task(&self, task_id: TaskId, target: ScanTarget, status: TaskStatus) {
        self.targets.write().await.insert(task_id, target);
        self.statuses.write().await.insert(task_id, status);
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn task_status(&self, task_id: &TaskId) -> Result<TaskStatus> {
        self.statuses
            .read()
            .await
            .get(task_id)
            .copied()
            .ok_or_else(|| ScanError::ScanNotFound(task_id.to_string()))
    }

    async fn set_task_status(&self, task_id: &TaskId, status: TaskStatus) -> Result<()> {
        self.statuses.write().await.insert(*task_id, status);
        Ok(())
    }

    async fn set_report_status(&self, report_id: &ReportId, status: TaskStatus) -> Result<()> {
        self.report_statuses.write().await.insert(report_id.clone(), status);
        Ok(())
    }

    async fn target(&self, task_id: &TaskId) -> Result<ScanTarget> {
        self.targets
            .read()
            .await
            .get(task_id)
            .cloned()
            .ok_or_else(|| ScanError::ScanNotFound(task_id.to_string()))
    }

    async fn scanner_connection(&self, _task_id: &TaskId) -> Result<ScannerConnectionData> {
        Ok(self.connection.clone())
    }

    async fn add_result(&self, report_id: &ReportId, message: &str) -> Result<()> {
        self.results
            .write()
            .await
            .entry(report_id.clone())
            .or_default()
            .push(message.to_string());
        Ok(())
    }

    async fn record_progress(&self, _report_id: &ReportId, _progress: i32) -> Result<()> {
        Ok(())
    }

    async fn mark_processing_required(&self, _report_id: &ReportId, _in_assets: bool) -> Result<()> {
        Ok(())
    }

    async fn trim_partial_report(&self, _report_id: &ReportId) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unseeded_task_reports_not_found() {
        let repo = InMemoryTaskRepository::default();
        let task_id = TaskId::new();
        assert!(matches!(
            repo.task_status(&task_id).await,
            Err(ScanError::ScanNotFound(_))
        ));
    }

    #[tokio::test]
    async fn seeded_task_round_trips_status() {
        let repo = InMemoryTaskRepository::default();
        let task_id = TaskId::new();
        repo.seed_task(task_id, ScanTarget::default(), TaskStatus::Requested).await;
        assert_eq!(repo.task_status(&task_id).await.unwrap(), TaskStatus::Requested);
        repo.set_task_status(&task_id, TaskStatus::Running).await.unwrap();
        assert_eq!(repo.task_status(&task_id).await.unwrap(), TaskStatus::Running);
    }
}
