use thiserror::Error;

/// Error taxonomy for the scan dispatch core, following the error handling design:
/// transient scanner errors are retried, the rest terminate a scan with a fixed
/// code that the handler maps onto final task/report status.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("transient scanner error: {0}")]
    Transient(String),

    #[error("scan not found: {0}")]
    ScanNotFound(String),

    #[error("scan interrupted: {0}")]
    Interrupted(String),

    #[error("scan stopped prematurely: {0}")]
    PrematureStop(String),

    #[error("semaphore error: {0}")]
    SemaphoreError(String),

    #[error("empty vt list for scan {0}")]
    EmptyVtList(String),

    #[error("fork failed: {0}")]
    ForkFailed(#[source] std::io::Error),

    #[error("filter parser reached an illegal internal state: {0}")]
    ParseAssert(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
