//! Scan dispatch core: the queue supervisor, scan handler, filter-term
//! parser, and asset-key merge decision engine.

pub mod error;
pub mod filter;
pub mod handler;
pub mod merge;
pub mod oci;
pub mod queue;
pub mod scanner;
pub mod semaphore;
pub mod supervisor;

pub use error::{Result, ScanError};
