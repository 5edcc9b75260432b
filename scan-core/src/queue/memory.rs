use std::collections::VecDeque;

use async_trait::async_trait;
use scan_model::{ReportId, ScanRequest};
use tokio::sync::RwLock;

use super::QueueStore;
use crate::error::{Result, ScanError};

/// An in-process queue store backed by a `VecDeque`, following the same
/// `RwLock`-guarded-collection shape the job queue uses for its pending set.
/// Used by the test suite and by the server when no database is configured.
#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    entries: RwLock<VecDeque<ScanRequest>>,
    next_position: RwLock<u64>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn next_position(&self) -> u64 {
        let mut guard = self.next_position.write().await;
        let position = *guard;
        *guard += 1;
        position
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn enqueue(&self, mut request: ScanRequest) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.report_id == request.report_id) {
            return Err(ScanError::Internal(format!(
                "report {} already queued",
                request.report_id
            )));
        }
        request.position = self.next_position().await;
        entries.push_back(request);
        Ok(())
    }

    async fn iterate(&self) -> Result<Vec<ScanRequest>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().cloned().collect())
    }

    async fn move_to_end(&self, report_id: &ReportId) -> Result<()> {
        let mut entries = self.entries.write().await;
        let Some(index) = entries.iter().position(|e| &e.report_id == report_id) else {
            return Err(ScanError::ScanNotFound(report_id.to_string()));
        };
        let mut entry = entries.remove(index).expect("index just located");
        drop(entries);
        entry.position = self.next_position().await;
        self.entries.write().await.push_back(entry);
        Ok(())
    }

    async fn set_handler_pid(&self, report_id: &ReportId, pid: u32) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .iter_mut()
            .find(|e| &e.report_id == report_id)
            .ok_or_else(|| ScanError::ScanNotFound(report_id.to_string()))?;
        entry.handler_pid = Some(pid);
        Ok(())
    }

    async fn remove(&self, report_id: &ReportId) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.retain(|e| &e.report_id != report_id);
        Ok(())
    }

    async fn length(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_model::{OwnerId, StartFromMode, TaskId};

    fn request(report_id: &str) -> ScanRequest {
        ScanRequest::new(
            ReportId::new(report_id),
            1,
            1,
            TaskId::new(),
            OwnerId::new(),
            StartFromMode::FromScratch,
        )
    }

    #[tokio::test]
    async fn enqueue_order_is_monotonic() {
        let store = InMemoryQueueStore::new();
        store.enqueue(request("a")).await.unwrap();
        store.enqueue(request("b")).await.unwrap();
        let entries = store.iterate().await.unwrap();
        assert_eq!(entries[0].report_id, ReportId::new("a"));
        assert_eq!(entries[1].report_id, ReportId::new("b"));
    }

    #[tokio::test]
    async fn move_to_end_rotates_entry_to_the_back() {
        let store = InMemoryQueueStore::new();
        store.enqueue(request("a")).await.unwrap();
        store.enqueue(request("b")).await.unwrap();
        store.move_to_end(&ReportId::new("a")).await.unwrap();
        let entries = store.iterate().await.unwrap();
        assert_eq!(entries[0].report_id, ReportId::new("b"));
        assert_eq!(entries[1].report_id, ReportId::new("a"));
    }

    #[tokio::test]
    async fn each_report_appears_at_most_once() {
        let store = InMemoryQueueStore::new();
        store.enqueue(request("a")).await.unwrap();
        assert!(store.enqueue(request("a")).await.is_err());
    }
}
