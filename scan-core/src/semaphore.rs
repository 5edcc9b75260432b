//! The semaphore gate: a named counting semaphore guarding concurrent
//! result-ingestion bursts. Handlers are separate OS processes, so the gate
//! must be a cross-process primitive when more than one process shares it;
//! when a single address space hosts every handler it collapses to an
//! in-memory counting semaphore, per the design notes.

use std::ffi::CString;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, ScanError};

/// Outcome of `acquire`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired,
    TimedOut,
}

#[async_trait]
pub trait SemaphoreGate: Send + Sync {
    async fn acquire(&self, wait: Duration) -> Result<AcquireOutcome>;
    async fn release(&self) -> Result<()>;
}

/// In-process gate over `tokio::sync::Semaphore`, used when the queue runs in a
/// single address space (the server's in-memory mode, and all tests).
pub struct LocalSemaphoreGate {
    inner: tokio::sync::Semaphore,
}

impl LocalSemaphoreGate {
    /// `capacity == 0` disables gating: every acquire succeeds immediately.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: tokio::sync::Semaphore::new(capacity.max(1)),
        }
    }
}

#[async_trait]
impl SemaphoreGate for LocalSemaphoreGate {
    async fn acquire(&self, wait: Duration) -> Result<AcquireOutcome> {
        match tokio::time::timeout(wait, self.inner.acquire()).await {
            Ok(Ok(permit)) => {
                permit.forget();
                Ok(AcquireOutcome::Acquired)
            }
            Ok(Err(_)) => Err(ScanError::SemaphoreError("semaphore closed".to_string())),
            Err(_) => Ok(AcquireOutcome::TimedOut),
        }
    }

    async fn release(&self) -> Result<()> {
        self.inner.add_permits(1);
        Ok(())
    }
}

/// Cross-process named counting semaphore via POSIX `sem_open`/`sem_timedwait`.
/// Used when handlers are genuinely separate OS processes and must coordinate
/// ingestion bursts through a kernel object rather than in-process state.
pub struct PosixSemaphoreGate {
    handle: *mut libc::sem_t,
}

// SAFETY: a named POSIX semaphore handle may be used from any thread; the
// kernel serializes access to the underlying object.
unsafe impl Send for PosixSemaphoreGate {}
unsafe impl Sync for PosixSemaphoreGate {}

impl PosixSemaphoreGate {
    /// Opens (creating if necessary) a named semaphore with the given initial
    /// capacity. `capacity == 0` still creates a semaphore of value 1 and the
    /// caller is expected to bypass acquire/release entirely when gating is
    /// disabled, matching the "0 disables gating" contract at the call site.
    pub fn open(name: &str, capacity: u32) -> Result<Self> {
        let c_name = CString::new(format!("/{name}"))
            .map_err(|e| ScanError::SemaphoreError(e.to_string()))?;
        let value = capacity.max(1);
        // SAFETY: c_name is a valid NUL-terminated string for the call's duration.
        let handle = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT,
                0o600 as libc::mode_t,
                value as libc::c_uint,
            )
        };
        if handle == libc::SEM_FAILED {
            return Err(ScanError::SemaphoreError(
                std::io::Error::last_os_error().to_string(),
            ));
        }
        Ok(Self { handle })
    }
}

impl Drop for PosixSemaphoreGate {
    fn drop(&mut self) {
        // SAFETY: `handle` was returned by a successful `sem_open` and is not
        // shared with any other owner of this struct.
        unsafe {
            libc::sem_close(self.handle);
        }
    }
}

#[async_trait]
impl SemaphoreGate for PosixSemaphoreGate {
    async fn acquire(&self, wait: Duration) -> Result<AcquireOutcome> {
        let handle = self.handle as usize;
        tokio::task::spawn_blocking(move || {
            let handle = handle as *mut libc::sem_t;
            let deadline = std::time::SystemTime::now() + wait;
            let since_epoch = deadline
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default();
            let ts = libc::timespec {
                tv_sec: since_epoch.as_secs() as libc::time_t,
                tv_nsec: since_epoch.subsec_nanos() as libc::c_long,
            };
            // SAFETY: handle is a valid, open semaphore for the lifetime of this call.
            let rc = unsafe { libc::sem_timedwait(handle, &ts) };
            if rc == 0 {
                Ok(AcquireOutcome::Acquired)
            } else {
                let err = std::io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::ETIMEDOUT) {
                    Ok(AcquireOutcome::TimedOut)
                } else {
                    Err(ScanError::SemaphoreError(err.to_string()))
                }
            }
        })
        .await
        .map_err(|e| ScanError::SemaphoreError(e.to_string()))?
    }

    async fn release(&self) -> Result<()> {
        let handle = self.handle as usize;
        tokio::task::spawn_blocking(move || {
            let handle = handle as *mut libc::sem_t;
            // SAFETY: handle is a valid, open semaphore for the lifetime of this call.
            let rc = unsafe { libc::sem_post(handle) };
            if rc == 0 {
                Ok(())
            } else {
                Err(ScanError::SemaphoreError(
                    std::io::Error::last_os_error().to_string(),
                ))
            }
        })
        .await
        .map_err(|e| ScanError::SemaphoreError(e.to_string()))?
    }
}
