use std::time::Duration;

use scan_model::{ReportId, ScanStatus, ScannerConnectionData, StartFromMode, TaskId, TaskStatus};
use tracing::{info, warn};

use super::repository::TaskRepository;
use crate::error::{Result, ScanError};
use crate::scanner::{ScanCredentials, ScannerClient, ScannerConnection, StartScanRequest};
use crate::semaphore::{AcquireOutcome, SemaphoreGate};

/// Terminal/non-terminal outcomes of a handler run, matching the return codes
/// in the component design: `0` finished, `2` running (keep queued), `-1`
/// error, `-2` stopped by scanner, `-3` interrupted, `-4` already stopped.
///
/// `TransientRetry` reports externally as the same `2` ("keep queued") code as
/// `Running`; it exists only so the poll loop can tell a retried transient
/// error (which already decremented the retry budget and slept 1s) apart from
/// an ordinary iteration, and skip re-arming the budget and the generic 5s
/// sleep on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    Finished,
    Running,
    TransientRetry,
    Error,
    StoppedByScanner,
    Interrupted,
    AlreadyStopped,
}

impl HandlerOutcome {
    pub fn code(self) -> i32 {
        match self {
            HandlerOutcome::Finished => 0,
            HandlerOutcome::Running | HandlerOutcome::TransientRetry => 2,
            HandlerOutcome::Error => -1,
            HandlerOutcome::StoppedByScanner => -2,
            HandlerOutcome::Interrupted => -3,
            HandlerOutcome::AlreadyStopped => -4,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, HandlerOutcome::Running | HandlerOutcome::TransientRetry)
    }
}

/// Runtime configuration threaded explicitly through the handler body rather
/// than read from module statics, per the design notes.
#[derive(Debug, Clone, Copy)]
pub struct HandlerRuntimeConfig {
    pub scan_handler_active_time: Duration,
    pub scanner_connection_retry_ceiling: u32,
    pub semaphore_wait: Duration,
    /// `0` means unbounded, matching `max_active_scan_handlers`'s contract.
    pub max_active_scan_handlers: usize,
}

impl Default for HandlerRuntimeConfig {
    fn default() -> Self {
        Self {
            scan_handler_active_time: Duration::from_secs(0),
            scanner_connection_retry_ceiling: 3,
            semaphore_wait: Duration::from_secs(5),
            max_active_scan_handlers: 0,
        }
    }
}

/// Resume preparation: inspects the remote scan and decides whether the
/// handler should start fresh, continue with the existing scan, or fail.
/// Returns `1` to start fresh, `0` to continue with the existing scan, `-1`
/// on failure.
pub async fn resume_preparation(
    scanner: &dyn ScannerClient,
    conn: &ScannerConnection,
    repo: &dyn TaskRepository,
    report_id: &ReportId,
    scan_id: &str,
) -> Result<i32> {
    let status = match scanner.get_scan_status(conn, scan_id).await {
        Ok(status) => status,
        Err(ScanError::ScanNotFound(_)) => {
            return Ok(0);
        }
        Err(_) => return Ok(-1),
    };

    match status {
        ScanStatus::Running | ScanStatus::Queued => {
            scanner.stop_scan(conn, scan_id).await?;
            scanner.delete_scan(conn, scan_id).await?;
        }
        ScanStatus::Finished | ScanStatus::Stopped | ScanStatus::Interrupted | ScanStatus::Error => {
            scanner.delete_scan(conn, scan_id).await?;
        }
    }
    repo.trim_partial_report(report_id).await?;
    Ok(1)
}

fn vt_preference_encoding(kind: &str, raw: &str) -> String {
    match kind {
        "checkbox" => {
            if raw.eq_ignore_ascii_case("yes") {
                "1".to_string()
            } else {
                "0".to_string()
            }
        }
        "radio" => raw.split(';').next().unwrap_or(raw).to_string(),
        "file" => base64::Engine::encode(&base64::engine::general_purpose::STANDARD, raw.as_bytes()),
        _ => raw.to_string(),
    }
}

fn yes_no_to_bit(value: &str) -> String {
    if value.eq_ignore_ascii_case("yes") {
        "1".to_string()
    } else if value.eq_ignore_ascii_case("no") {
        "0".to_string()
    } else {
        value.to_string()
    }
}

/// Assembles a scanner launch request from the task's target record,
/// translating scanner preferences (dropping any `timeout.*` key and mapping
/// yes/no to 1/0) and VT preferences per their declared type.
pub fn build_start_request(
    scan_id: String,
    target: &super::repository::ScanTarget,
    credentials: ScanCredentials,
    raw_scanner_preferences: &[(String, String)],
    raw_vt_preferences: &[(String, String, String)],
    max_checks: Option<u32>,
    max_hosts: Option<u32>,
    hosts_ordering: Option<String>,
) -> Result<StartScanRequest> {
    if target.vt_list.is_empty() {
        return Err(ScanError::EmptyVtList(scan_id));
    }

    let scanner_preferences = raw_scanner_preferences
        .iter()
        .filter(|(key, _)| !key.starts_with("timeout."))
        .map(|(key, value)| (key.clone(), yes_no_to_bit(value)))
        .collect();

    let vt_preferences = raw_vt_preferences
        .iter()
        .map(|(key, kind, raw)| (key.clone(), vt_preference_encoding(kind, raw)))
        .collect();

    Ok(StartScanRequest {
        scan_id,
        hosts: target.hosts.clone(),
        ports: target.ports.clone(),
        exclude_hosts: target.exclude_hosts.clone(),
        alive_test: target.alive_test.clone(),
        reverse_lookup_only: target.reverse_lookup_only,
        reverse_lookup_unify: target.reverse_lookup_unify,
        credentials,
        scanner_preferences,
        vt_list: target.vt_list.clone(),
        vt_preferences,
        max_checks,
        max_hosts,
        hosts_ordering,
    })
}

/// The start phase (§4.5.1): optional resume preparation, launch, and an
/// optional wait for the scanner to report the scan as queued or running.
pub async fn handle_scan_start(
    scanner: &dyn ScannerClient,
    conn: &ScannerConnection,
    repo: &dyn TaskRepository,
    report_id: &ReportId,
    task_id: &TaskId,
    request: &StartScanRequest,
    start_from: StartFromMode,
    wait_until_active: bool,
    config: HandlerRuntimeConfig,
) -> Result<i32> {
    if start_from.requires_resume_preparation() {
        let outcome = resume_preparation(scanner, conn, repo, report_id, &request.scan_id).await?;
        if outcome < 0 {
            return Ok(-1);
        }
    }

    if request.vt_list.is_empty() {
        repo.add_result(
            report_id,
            "Scan launch failed: the virus test (VT) list was empty",
        )
        .await?;
        return Ok(-1);
    }

    scanner.start_scan(conn, request).await?;

    if !wait_until_active {
        // Open question preserved from the source system: a successful launch
        // with `wait_until_active=false` reports `0` even though the scan may
        // not yet be scheduled on the scanner.
        return Ok(0);
    }

    let mut budget = super::retry::RetryBudget::new(config.scanner_connection_retry_ceiling);
    loop {
        let status = repo.task_status(task_id).await?;
        if status.is_stop_requested_or_stopped() {
            return Ok(-1);
        }

        match scanner.get_scan_status(conn, &request.scan_id).await {
            Ok(ScanStatus::Queued | ScanStatus::Running) => return Ok(0),
            Ok(_) => {}
            Err(ScanError::Transient(_)) => {
                if !budget.try_consume() {
                    return Ok(-1);
                }
            }
            Err(e) => return Err(e),
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

/// One iteration of `update(scan)` (§4.5.2 step 3): fetches progress, fetches
/// the full report, ingests results, and interprets scanner status.
async fn update_once(
    scanner: &dyn ScannerClient,
    conn: &ScannerConnection,
    repo: &dyn TaskRepository,
    task_id: &TaskId,
    report_id: &ReportId,
    scan_id: &str,
    budget: &mut super::retry::RetryBudget,
) -> Result<HandlerOutcome> {
    let pop = scanner.get_scan_pop(conn, scan_id, false, false).await?;
    if pop.progress < 0 {
        return interpret_negative_progress(pop.progress, repo, report_id, budget).await;
    }
    if pop.progress > 100 {
        repo.add_result(report_id, "Erroneous scan progress value").await?;
        return Ok(HandlerOutcome::Error);
    }

    let full = scanner.get_scan_pop(conn, scan_id, true, true).await?;
    if full.progress < 0 {
        return interpret_negative_progress(full.progress, repo, report_id, budget).await;
    }
    if full.progress > 100 {
        repo.add_result(report_id, "Erroneous scan progress value").await?;
        return Ok(HandlerOutcome::Error);
    }
    repo.record_progress(report_id, full.progress).await?;

    let status = scanner.get_scan_status(conn, scan_id).await?;
    match status {
        ScanStatus::Queued => {
            let current = repo.task_status(task_id).await?;
            if current != TaskStatus::Queued {
                repo.set_task_status(task_id, TaskStatus::Queued).await?;
            }
            Ok(HandlerOutcome::Running)
        }
        ScanStatus::Interrupted => {
            repo.add_result(report_id, "Task interrupted unexpectedly").await?;
            scanner.delete_scan(conn, scan_id).await?;
            Ok(HandlerOutcome::Interrupted)
        }
        ScanStatus::Stopped if full.progress < 100 => {
            if budget.try_consume() {
                Ok(HandlerOutcome::Running)
            } else {
                repo.add_result(report_id, "Scan stopped unexpectedly").await?;
                Ok(HandlerOutcome::Error)
            }
        }
        ScanStatus::Stopped => Ok(HandlerOutcome::Running),
        ScanStatus::Finished if full.progress == 100 => {
            scanner.delete_scan(conn, scan_id).await?;
            let current = repo.task_status(task_id).await?;
            if current != TaskStatus::Running {
                repo.set_task_status(task_id, TaskStatus::Running).await?;
            }
            Ok(HandlerOutcome::Finished)
        }
        ScanStatus::Finished => Ok(HandlerOutcome::Running),
        ScanStatus::Running => {
            let current = repo.task_status(task_id).await?;
            if current != TaskStatus::Running {
                repo.set_task_status(task_id, TaskStatus::Running).await?;
            }
            Ok(HandlerOutcome::Running)
        }
        ScanStatus::Error => {
            repo.add_result(report_id, "Scanner reported an error status").await?;
            Ok(HandlerOutcome::Error)
        }
    }
}

async fn interpret_negative_progress(
    progress: i32,
    repo: &dyn TaskRepository,
    report_id: &ReportId,
    budget: &mut super::retry::RetryBudget,
) -> Result<HandlerOutcome> {
    match progress {
        -1 => {
            if budget.try_consume() {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(HandlerOutcome::TransientRetry)
            } else {
                repo.add_result(report_id, "Erroneous scan progress value").await?;
                Ok(HandlerOutcome::Error)
            }
        }
        -2 => Ok(HandlerOutcome::StoppedByScanner),
        _ => {
            repo.add_result(report_id, "Erroneous scan progress value").await?;
            Ok(HandlerOutcome::Error)
        }
    }
}

/// The poll phase (§4.5.2): loops `update_once` until a terminal outcome or a
/// yield condition is hit.
pub async fn handle_scan(
    scanner: &dyn ScannerClient,
    conn: &ScannerConnection,
    gate: &dyn SemaphoreGate,
    repo: &dyn TaskRepository,
    queue: &dyn crate::queue::QueueStore,
    task_id: &TaskId,
    report_id: &ReportId,
    scan_id: &str,
    config: HandlerRuntimeConfig,
) -> Result<HandlerOutcome> {
    let mut budget = super::retry::RetryBudget::new(config.scanner_connection_retry_ceiling);
    let yield_time = if config.scan_handler_active_time.is_zero() {
        None
    } else {
        Some(tokio::time::Instant::now() + config.scan_handler_active_time)
    };

    loop {
        let status = repo.task_status(task_id).await?;
        if status.is_stop_requested_or_stopped() {
            return Ok(HandlerOutcome::AlreadyStopped);
        }

        let acquired = match gate.acquire(config.semaphore_wait).await {
            Ok(AcquireOutcome::Acquired) => true,
            Ok(AcquireOutcome::TimedOut) => false,
            Err(e) => {
                warn!(error = %e, "semaphore signaling error, deleting remote scan");
                let _ = scanner.delete_scan(conn, scan_id).await;
                return Ok(HandlerOutcome::Interrupted);
            }
        };
        if !acquired {
            continue;
        }

        let outcome = update_once(scanner, conn, repo, task_id, report_id, scan_id, &mut budget).await;
        gate.release().await?;

        let outcome = outcome?;
        if outcome.is_terminal() {
            return Ok(outcome);
        }

        if let Some(yield_time) = yield_time {
            let max_active = config.max_active_scan_handlers;
            if tokio::time::Instant::now() >= yield_time && queue.length().await? > max_active {
                info!(scan_id = %scan_id, "handler yielding before active-time budget exceeded");
                return Ok(HandlerOutcome::Running);
            }
        }
        if outcome != HandlerOutcome::TransientRetry {
            budget.reset();
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }
}
