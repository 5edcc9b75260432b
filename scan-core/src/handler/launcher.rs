//! The production `HandlerLauncher`: forks a real handler process per scan
//! via [`spawn_handler`] and drives [`run`](super::run) to completion inside
//! the grandchild.

use std::sync::Arc;

use async_trait::async_trait;
use scan_model::ScanRequest;

use super::fork::spawn_handler;
use super::{HandlerDeps, HandlerRuntimeConfig, TaskRepository};
use crate::error::Result;
use crate::queue::QueueStore;
use crate::scanner::ScannerClient;
use crate::semaphore::SemaphoreGate;
use crate::supervisor::HandlerLauncher;

/// Collaborators are held as `Arc`s so the grandchild's closure can take its
/// own clones across the fork boundary; each clone only touches the copy of
/// the address space that process owns.
pub struct ForkingHandlerLauncher {
    scanner: Arc<dyn ScannerClient>,
    repo: Arc<dyn TaskRepository>,
    gate: Arc<dyn SemaphoreGate>,
    queue: Arc<dyn QueueStore>,
    config: HandlerRuntimeConfig,
}

impl ForkingHandlerLauncher {
    pub fn new(
        scanner: Arc<dyn ScannerClient>,
        repo: Arc<dyn TaskRepository>,
        gate: Arc<dyn SemaphoreGate>,
        queue: Arc<dyn QueueStore>,
        config: HandlerRuntimeConfig,
    ) -> Self {
        Self {
            scanner,
            repo,
            gate,
            queue,
            config,
        }
    }
}

#[async_trait]
impl HandlerLauncher for ForkingHandlerLauncher {
    async fn launch(&self, request: &ScanRequest) -> Result<Option<u32>> {
        let scanner = self.scanner.clone();
        let repo = self.repo.clone();
        let gate = self.gate.clone();
        let queue = self.queue.clone();
        let config = self.config;
        let request = request.clone();

        let forked = spawn_handler(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(_) => return 1,
            };
            let deps = HandlerDeps {
                scanner: scanner.as_ref(),
                repo: repo.as_ref(),
                gate: gate.as_ref(),
                queue: queue.as_ref(),
                config,
            };
            match runtime.block_on(super::run(&deps, &request, true)) {
                Ok(_) => 0,
                Err(_) => 1,
            }
        })?;

        Ok(Some(forked.grandchild_pid))
    }
}
