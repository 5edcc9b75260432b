//! The scan handler (H): a per-scan process body that drives a single scan
//! through its external protocol to completion.

mod body;
mod fork;
mod launcher;
mod repository;
mod retry;

pub use body::{build_start_request, handle_scan, handle_scan_start, HandlerOutcome, HandlerRuntimeConfig};
pub use fork::{spawn_handler, ForkedHandler, ProcessProbe, UnixProcessProbe};
#[cfg(test)]
pub use fork::MockProcessProbe;
pub use launcher::ForkingHandlerLauncher;
pub use repository::{InMemoryTaskRepository, ScanTarget, TaskRepository};
pub use retry::RetryBudget;

use scan_model::{ScanRequest, TaskStatus};

use crate::error::Result;
use crate::queue::QueueStore;
use crate::scanner::{ScanCredentials, ScannerClient, StartScanRequest};
use crate::semaphore::SemaphoreGate;

/// Everything the handler's main body needs, grouped so `run` reads as the
/// procedure in §4.5 rather than a long parameter list.
pub struct HandlerDeps<'a> {
    pub scanner: &'a dyn ScannerClient,
    pub repo: &'a dyn TaskRepository,
    pub gate: &'a dyn SemaphoreGate,
    pub queue: &'a dyn QueueStore,
    pub config: HandlerRuntimeConfig,
}

/// Runs the handler main body (§4.5 steps 1-4) for one queue entry: resolves
/// the scanner, dispatches to the start or poll phase, then performs the
/// single post-step that updates task/report status and the queue entry.
pub async fn run(deps: &HandlerDeps<'_>, request: &ScanRequest, wait_until_active: bool) -> Result<HandlerOutcome> {
    let target = deps.repo.target(&request.task_id).await?;
    if !target.scanner_kind.is_supported() {
        deps.repo
            .set_task_status(&request.task_id, TaskStatus::Interrupted)
            .await?;
        deps.repo
            .set_report_status(&request.report_id, TaskStatus::Interrupted)
            .await?;
        return Ok(HandlerOutcome::Interrupted);
    }

    let status = deps.repo.task_status(&request.task_id).await?;
    let scan_id = request.report_id.as_str().to_string();

    let outcome = if status == TaskStatus::Requested {
        let start_request = build_start_request(
            scan_id.clone(),
            &target,
            ScanCredentials::default(),
            &[],
            &[],
            None,
            None,
            None,
        );
        let outcome = match start_request {
            Ok(start_request) => {
                run_start_phase(deps, request, &start_request, wait_until_active).await?
            }
            Err(_) => {
                deps.repo
                    .add_result(&request.report_id, "Scan launch failed: empty VT list")
                    .await?;
                HandlerOutcome::Error
            }
        };
        outcome
    } else {
        run_poll_phase(deps, request, &scan_id).await?
    };

    post_step(deps, request, outcome).await?;
    Ok(outcome)
}

async fn run_start_phase(
    deps: &HandlerDeps<'_>,
    request: &ScanRequest,
    start_request: &StartScanRequest,
    wait_until_active: bool,
) -> Result<HandlerOutcome> {
    let connection_data = deps.repo.scanner_connection(&request.task_id).await?;
    let Some(conn) = deps.scanner.connect(&connection_data).await? else {
        return Ok(HandlerOutcome::Error);
    };

    let code = handle_scan_start(
        deps.scanner,
        &conn,
        deps.repo,
        &request.report_id,
        &request.task_id,
        start_request,
        request.start_from,
        wait_until_active,
        deps.config,
    )
    .await?;

    deps.scanner.close(conn).await?;

    Ok(match code {
        0 => HandlerOutcome::Running,
        _ => HandlerOutcome::Error,
    })
}

async fn run_poll_phase(deps: &HandlerDeps<'_>, request: &ScanRequest, scan_id: &str) -> Result<HandlerOutcome> {
    let connection_data = deps.repo.scanner_connection(&request.task_id).await?;
    let Some(conn) = deps.scanner.connect(&connection_data).await? else {
        return Ok(HandlerOutcome::Error);
    };

    let outcome = handle_scan(
        deps.scanner,
        &conn,
        deps.gate,
        deps.repo,
        deps.queue,
        &request.task_id,
        &request.report_id,
        scan_id,
        deps.config,
    )
    .await?;

    deps.scanner.close(conn).await?;
    Ok(outcome)
}

/// The single post-step all handler exits funnel through (§4.5 step 4): on
/// `Running`, move the queue entry to the end; on any terminal outcome, remove
/// it and set final task/report status.
async fn post_step(deps: &HandlerDeps<'_>, request: &ScanRequest, outcome: HandlerOutcome) -> Result<()> {
    match outcome {
        HandlerOutcome::Running | HandlerOutcome::TransientRetry => {
            deps.queue.move_to_end(&request.report_id).await?;
        }
        HandlerOutcome::Finished => {
            deps.queue.remove(&request.report_id).await?;
            deps.repo
                .set_task_status(&request.task_id, TaskStatus::Done)
                .await?;
            deps.repo
                .set_report_status(&request.report_id, TaskStatus::Done)
                .await?;
            let target = deps.repo.target(&request.task_id).await?;
            deps.repo
                .mark_processing_required(&request.report_id, target.in_assets)
                .await?;
        }
        HandlerOutcome::StoppedByScanner => {
            finish_terminal(deps, request, TaskStatus::Stopped).await?;
        }
        HandlerOutcome::Interrupted => {
            finish_terminal(deps, request, TaskStatus::Interrupted).await?;
        }
        HandlerOutcome::Error => {
            finish_terminal(deps, request, TaskStatus::Interrupted).await?;
        }
        HandlerOutcome::AlreadyStopped => {
            finish_terminal(deps, request, TaskStatus::Stopped).await?;
        }
    }
    Ok(())
}

async fn finish_terminal(deps: &HandlerDeps<'_>, request: &ScanRequest, status: TaskStatus) -> Result<()> {
    deps.queue.remove(&request.report_id).await?;
    deps.repo.set_task_status(&request.task_id, status).await?;
    deps.repo.set_report_status(&request.report_id, status).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use scan_model::{OwnerId, ReportId, ScanStatus, ScannerConnectionData, ScannerKind, StartFromMode, TaskId};

    use super::*;
    use crate::queue::InMemoryQueueStore;
    use crate::scanner::{ScanPop, ScannerConnection};
    use crate::semaphore::LocalSemaphoreGate;

    /// A scripted `ScannerClient` exercising `run()` end to end, the way the
    /// body module's own scripted scanner exercises `handle_scan` in isolation.
    struct StubScanner {
        pops: Mutex<Vec<ScanPop>>,
        statuses: Mutex<Vec<ScanStatus>>,
    }

    impl StubScanner {
        fn new(pops: Vec<ScanPop>, statuses: Vec<ScanStatus>) -> Self {
            Self {
                pops: Mutex::new(pops),
                statuses: Mutex::new(statuses),
            }
        }
    }

    #[async_trait]
    impl ScannerClient for StubScanner {
        async fn connect(&self, _data: &ScannerConnectionData) -> Result<Option<ScannerConnection>> {
            Ok(Some(ScannerConnection { inner: Box::new(()) }))
        }

        async fn delete_scan(&self, _conn: &ScannerConnection, _scan_id: &str) -> Result<()> {
            Ok(())
        }

        async fn start_scan(&self, _conn: &ScannerConnection, _request: &StartScanRequest) -> Result<()> {
            Ok(())
        }

        async fn get_scan_pop(
            &self,
            _conn: &ScannerConnection,
            _scan_id: &str,
            _details: bool,
            _pop_results: bool,
        ) -> Result<ScanPop> {
            let mut pops = self.pops.lock().unwrap();
            if pops.is_empty() {
                panic!("stub scanner ran out of pop entries");
            }
            Ok(pops.remove(0))
        }

        async fn get_scan_status(&self, _conn: &ScannerConnection, _scan_id: &str) -> Result<ScanStatus> {
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.is_empty() {
                panic!("stub scanner ran out of status entries");
            }
            Ok(statuses.remove(0))
        }

        async fn stop_scan(&self, _conn: &ScannerConnection, _scan_id: &str) -> Result<()> {
            Ok(())
        }

        async fn close(&self, _conn: ScannerConnection) -> Result<()> {
            Ok(())
        }
    }

    fn target(vts: Vec<&str>) -> ScanTarget {
        ScanTarget {
            hosts: vec!["10.0.0.1".to_string()],
            vt_list: vts.into_iter().map(str::to_string).collect(),
            scanner_kind: ScannerKind::OpenVas,
            ..ScanTarget::default()
        }
    }

    #[tokio::test]
    async fn run_dispatches_start_phase_and_requeues_on_running() {
        let repo = InMemoryTaskRepository::default();
        let task_id = TaskId::new();
        let report_id = ReportId::new("scan-1");
        repo.seed_task(task_id, target(vec!["1.3.6.1"]), TaskStatus::Requested).await;

        let scanner = StubScanner::new(vec![], vec![]);
        let gate = LocalSemaphoreGate::new(1);
        let queue = InMemoryQueueStore::new();
        let request = ScanRequest::new(report_id.clone(), 1, 1, task_id, OwnerId::new(), StartFromMode::FromScratch);
        queue.enqueue(request.clone()).await.unwrap();

        let deps = HandlerDeps {
            scanner: &scanner,
            repo: &repo,
            gate: &gate,
            queue: &queue,
            config: HandlerRuntimeConfig::default(),
        };

        let outcome = run(&deps, &request, false).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Running);

        let entries = queue.iterate().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].report_id, report_id);
    }

    #[tokio::test]
    async fn run_dispatches_poll_phase_and_finishes_report() {
        let repo = InMemoryTaskRepository::default();
        let task_id = TaskId::new();
        let report_id = ReportId::new("scan-1");
        repo.seed_task(task_id, target(vec!["1.3.6.1"]), TaskStatus::Running).await;

        let scanner = StubScanner::new(
            vec![
                ScanPop { progress: 100, report_xml: String::new() },
                ScanPop { progress: 100, report_xml: "<report/>".to_string() },
            ],
            vec![ScanStatus::Finished],
        );
        let gate = LocalSemaphoreGate::new(1);
        let queue = InMemoryQueueStore::new();
        let request = ScanRequest::new(report_id.clone(), 1, 1, task_id, OwnerId::new(), StartFromMode::FromScratch);
        queue.enqueue(request.clone()).await.unwrap();

        let deps = HandlerDeps {
            scanner: &scanner,
            repo: &repo,
            gate: &gate,
            queue: &queue,
            config: HandlerRuntimeConfig::default(),
        };

        let outcome = run(&deps, &request, false).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Finished);
        assert_eq!(queue.length().await.unwrap(), 0);
        assert_eq!(repo.task_status(&task_id).await.unwrap(), TaskStatus::Done);
    }

    #[tokio::test]
    async fn run_rejects_unsupported_scanner_kind_without_touching_the_scanner() {
        let repo = InMemoryTaskRepository::default();
        let task_id = TaskId::new();
        let report_id = ReportId::new("scan-1");
        let mut unsupported = target(vec!["1.3.6.1"]);
        unsupported.scanner_kind = ScannerKind::Unsupported("acme".to_string());
        repo.seed_task(task_id, unsupported, TaskStatus::Requested).await;

        let scanner = StubScanner::new(vec![], vec![]);
        let gate = LocalSemaphoreGate::new(1);
        let queue = InMemoryQueueStore::new();
        let request = ScanRequest::new(report_id.clone(), 1, 1, task_id, OwnerId::new(), StartFromMode::FromScratch);
        queue.enqueue(request.clone()).await.unwrap();

        let deps = HandlerDeps {
            scanner: &scanner,
            repo: &repo,
            gate: &gate,
            queue: &queue,
            config: HandlerRuntimeConfig::default(),
        };

        let outcome = run(&deps, &request, false).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Interrupted);
        assert_eq!(repo.task_status(&task_id).await.unwrap(), TaskStatus::Interrupted);
    }
}
