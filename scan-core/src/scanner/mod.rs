//! The scanner client: a thin abstraction for starting, polling, stopping and
//! deleting a scan on the external scanner. The wire protocol itself is an
//! external collaborator — only the envelope (connect/TLS, framing hooks) and
//! the verb surface are specified here.

mod osp;

pub use osp::OspScannerClient;

use async_trait::async_trait;
use scan_model::{ScanStatus, ScannerConnectionData};

use crate::error::Result;

/// A scan launch request assembled by the start phase from the task's target
/// record, credentials, scanner preferences, VT list/preferences, and
/// scheduling preferences.
#[derive(Debug, Clone, Default)]
pub struct StartScanRequest {
    pub scan_id: String,
    pub hosts: Vec<String>,
    pub ports: Vec<String>,
    pub exclude_hosts: Vec<String>,
    pub alive_test: Option<String>,
    pub reverse_lookup_only: bool,
    pub reverse_lookup_unify: bool,
    pub credentials: ScanCredentials,
    pub scanner_preferences: Vec<(String, String)>,
    pub vt_list: Vec<String>,
    pub vt_preferences: Vec<(String, String)>,
    pub max_checks: Option<u32>,
    pub max_hosts: Option<u32>,
    pub hosts_ordering: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScanCredentials {
    pub ssh: Option<String>,
    pub smb: Option<String>,
    pub esxi: Option<String>,
    pub snmp: Option<String>,
    pub krb5: Option<String>,
}

/// A connected handle to a scanner endpoint.
pub struct ScannerConnection {
    pub(crate) inner: Box<dyn std::any::Any + Send + Sync>,
}

/// Progress and raw report payload returned by `get_scan_pop`.
#[derive(Debug, Clone)]
pub struct ScanPop {
    pub progress: i32,
    pub report_xml: String,
}

#[async_trait]
pub trait ScannerClient: Send + Sync {
    async fn connect(&self, data: &ScannerConnectionData) -> Result<Option<ScannerConnection>>;
    async fn delete_scan(&self, conn: &ScannerConnection, scan_id: &str) -> Result<()>;
    async fn start_scan(&self, conn: &ScannerConnection, request: &StartScanRequest) -> Result<()>;
    async fn get_scan_pop(
        &self,
        conn: &ScannerConnection,
        scan_id: &str,
        details: bool,
        pop_results: bool,
    ) -> Result<ScanPop>;
    async fn get_scan_status(&self, conn: &ScannerConnection, scan_id: &str) -> Result<ScanStatus>;
    async fn stop_scan(&self, conn: &ScannerConnection, scan_id: &str) -> Result<()>;
    async fn close(&self, conn: ScannerConnection) -> Result<()>;
}
