use serde::{Deserialize, Serialize};

/// Scanner backends the queue is allowed to dispatch to. A task bound to anything
/// else must be rejected by the handler before it does any work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScannerKind {
    OpenVas,
    OspSensor,
    /// Any other scanner kind a task may be bound to; the queue rejects these.
    Unsupported(String),
}

impl ScannerKind {
    pub fn is_supported(&self) -> bool {
        matches!(self, ScannerKind::OpenVas | ScannerKind::OspSensor)
    }
}

/// Status as reported by the external scanner for a single scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanStatus {
    Queued,
    Running,
    Finished,
    Stopped,
    Interrupted,
    Error,
}

/// Connection parameters for one scanner endpoint. Created once per scan-loop
/// iteration and released on each loop exit — it is never cached across scans.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScannerConnectionData {
    /// A unix-socket path (leading `/`) or a TCP host name/address.
    pub host: String,
    /// `0` when `host` names a unix socket.
    pub port: u16,
    pub ca_certificate: Option<Vec<u8>>,
    pub client_certificate: Option<Vec<u8>>,
    pub client_private_key: Option<Vec<u8>>,
    pub use_relay_mapper: bool,
}

impl ScannerConnectionData {
    pub fn is_unix_socket(&self) -> bool {
        self.host.starts_with('/')
    }
}
