//! The queue supervisor (S): the periodic tick that inspects the queue, reaps
//! dead handlers, forks new ones up to a concurrency cap, and rotates waiting
//! entries.

use tracing::{info, warn};

use crate::error::Result;
use crate::handler::ProcessProbe;
use crate::queue::QueueStore;

/// Tunables read fresh each tick, mirroring the handler's own runtime config
/// (never cached in a module-level static).
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    pub use_scan_queue: bool,
    /// `0` means unbounded.
    pub max_active_scan_handlers: usize,
}

/// Forks a handler process for one queue entry and returns its pid, or `None`
/// if the fork itself failed (the entry is rotated, not removed, on `None`).
#[async_trait::async_trait]
pub trait HandlerLauncher: Send + Sync {
    async fn launch(&self, request: &scan_model::ScanRequest) -> Result<Option<u32>>;
}

/// Runs one supervisor tick (§4.4). Returns the number of entries counted active.
pub async fn tick(
    queue: &dyn QueueStore,
    probe: &dyn ProcessProbe,
    launcher: &dyn HandlerLauncher,
    config: SupervisorConfig,
) -> Result<usize> {
    if !config.use_scan_queue {
        return Ok(0);
    }

    let entries = queue.iterate().await?;
    let mut active = 0usize;

    for request in entries {
        if config.max_active_scan_handlers > 0 && active >= config.max_active_scan_handlers {
            break;
        }

        match request.handler_pid {
            Some(pid) if pid != 0 => {
                if probe.is_alive(pid) {
                    active += 1;
                } else {
                    warn!(pid, report_id = %request.report_id, "handler pid no longer alive, rotating entry");
                    queue.move_to_end(&request.report_id).await?;
                }
            }
            _ => match launcher.launch(&request).await {
                Ok(Some(pid)) => {
                    queue.set_handler_pid(&request.report_id, pid).await?;
                    active += 1;
                    info!(pid, report_id = %request.report_id, "forked handler");
                }
                Ok(None) | Err(_) => {
                    queue.move_to_end(&request.report_id).await?;
                }
            },
        }
    }

    Ok(active)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::MockProcessProbe;
    use crate::queue::InMemoryQueueStore;
    use scan_model::{OwnerId, ReportId, ScanRequest, StartFromMode, TaskId};

    struct FixedLauncher {
        pid: Option<u32>,
    }

    #[async_trait::async_trait]
    impl HandlerLauncher for FixedLauncher {
        async fn launch(&self, _request: &ScanRequest) -> Result<Option<u32>> {
            Ok(self.pid)
        }
    }

    fn request(n: i64) -> ScanRequest {
        ScanRequest::new(
            ReportId::new(format!("report-{n}")),
            n,
            n,
            TaskId::new(),
            OwnerId::new(),
            StartFromMode::FromScratch,
        )
    }

    #[tokio::test]
    async fn forks_up_to_concurrency_cap() {
        let queue = InMemoryQueueStore::new();
        for n in 0..5 {
            queue.enqueue(request(n)).await.unwrap();
        }
        let probe = MockProcessProbe::new();
        let launcher = FixedLauncher { pid: Some(100) };
        let config = SupervisorConfig {
            use_scan_queue: true,
            max_active_scan_handlers: 2,
        };

        let active = tick(&queue, &probe, &launcher, config).await.unwrap();
        assert_eq!(active, 2);
    }

    #[tokio::test]
    async fn dead_pid_is_rotated_not_removed() {
        let queue = InMemoryQueueStore::new();
        let req = request(0);
        let report_id = req.report_id.clone();
        queue.enqueue(req).await.unwrap();
        queue.set_handler_pid(&report_id, 999).await.unwrap();

        let mut probe = MockProcessProbe::new();
        probe.expect_is_alive().with(mockall::predicate::eq(999)).returning(|_| false);
        let launcher = FixedLauncher { pid: None };
        let config = SupervisorConfig {
            use_scan_queue: true,
            max_active_scan_handlers: 0,
        };

        let active = tick(&queue, &probe, &launcher, config).await.unwrap();
        assert_eq!(active, 0);
        assert_eq!(queue.length().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn disabled_queue_is_a_no_op() {
        let queue = InMemoryQueueStore::new();
        queue.enqueue(request(0)).await.unwrap();
        let probe = MockProcessProbe::new();
        let launcher = FixedLauncher { pid: Some(1) };
        let config = SupervisorConfig {
            use_scan_queue: false,
            max_active_scan_handlers: 1,
        };

        let active = tick(&queue, &probe, &launcher, config).await.unwrap();
        assert_eq!(active, 0);
        assert_eq!(queue.length().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn fork_failure_rotates_entry() {
        let queue = InMemoryQueueStore::new();
        queue.enqueue(request(0)).await.unwrap();
        let probe = MockProcessProbe::new();
        let launcher = FixedLauncher { pid: None };
        let config = SupervisorConfig {
            use_scan_queue: true,
            max_active_scan_handlers: 0,
        };

        let active = tick(&queue, &probe, &launcher, config).await.unwrap();
        assert_eq!(active, 0);
        assert_eq!(queue.length().await.unwrap(), 1);
    }
}
