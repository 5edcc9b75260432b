//! The queue store: a persistent FIFO of scan requests with per-entry
//! handler-pid and start-from fields, consumed by the supervisor and handler.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::InMemoryQueueStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresQueueStore;

use async_trait::async_trait;
use scan_model::{ReportId, ScanRequest};

use crate::error::Result;

/// Persistent FIFO of scan requests. Implementations must guarantee: every
/// report appears at most once; enqueue order is total and monotonic; a
/// mutation is visible to the next `iterate()` call.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn enqueue(&self, request: ScanRequest) -> Result<()>;

    /// Entries in queue order.
    async fn iterate(&self) -> Result<Vec<ScanRequest>>;

    /// Re-queues an entry to the back, giving it a fresh, larger position.
    async fn move_to_end(&self, report_id: &ReportId) -> Result<()>;

    async fn set_handler_pid(&self, report_id: &ReportId, pid: u32) -> Result<()>;

    async fn remove(&self, report_id: &ReportId) -> Result<()>;

    async fn length(&self) -> Result<usize>;
}
