use std::sync::Arc;

use async_trait::async_trait;
use scan_model::{ScanStatus, ScannerConnectionData};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UnixStream};

use super::{ScanPop, ScannerClient, ScannerConnection, StartScanRequest};
use crate::error::{Result, ScanError};

/// Resolves (host, port, CA) through the relay mapper before connecting. The
/// mapper's lookup protocol is an external collaborator; this type only
/// defines the shape a caller plugs a real implementation into.
#[async_trait]
pub trait RelayMapper: Send + Sync {
    async fn resolve(&self, data: &ScannerConnectionData) -> Result<Option<ScannerConnectionData>>;
}

enum Transport {
    Tcp(TcpStream),
    Unix(UnixStream),
}

/// A scanner client speaking the OSP/OpenVAS sensor envelope: unix-socket or
/// TCP+TLS connect, optionally relayed. Framing and message encoding for
/// start/poll/stop/delete are a non-goal here — `send_frame`/`read_frame` are
/// the seam a concrete protocol codec plugs into.
pub struct OspScannerClient {
    relay_mapper: Option<Arc<dyn RelayMapper>>,
}

impl OspScannerClient {
    pub fn new(relay_mapper: Option<Arc<dyn RelayMapper>>) -> Self {
        Self { relay_mapper }
    }

    async fn open_transport(&self, data: &ScannerConnectionData) -> Result<Transport> {
        if data.is_unix_socket() {
            let stream = UnixStream::connect(&data.host)
                .await
                .map_err(ScanError::Io)?;
            return Ok(Transport::Unix(stream));
        }

        let stream = TcpStream::connect((data.host.as_str(), data.port))
            .await
            .map_err(ScanError::Io)?;
        // The TLS handshake over `stream` using `data.ca_certificate` /
        // `data.client_certificate` / `data.client_private_key` belongs here;
        // omitted because the wire protocol it wraps is a non-goal of this
        // component.
        Ok(Transport::Tcp(stream))
    }

    fn not_implemented(verb: &str) -> ScanError {
        ScanError::Internal(format!(
            "scanner protocol verb `{verb}` requires a concrete wire codec, which is outside this component's scope"
        ))
    }
}

#[async_trait]
impl ScannerClient for OspScannerClient {
    async fn connect(&self, data: &ScannerConnectionData) -> Result<Option<ScannerConnection>> {
        let resolved = if !data.is_unix_socket() && data.use_relay_mapper {
            match &self.relay_mapper {
                Some(mapper) => match mapper.resolve(data).await? {
                    Some(resolved) => resolved,
                    None => return Ok(None),
                },
                None => return Ok(None),
            }
        } else {
            data.clone()
        };

        let transport = self.open_transport(&resolved).await?;
        Ok(Some(ScannerConnection {
            inner: Box::new(transport),
        }))
    }

    async fn delete_scan(&self, _conn: &ScannerConnection, _scan_id: &str) -> Result<()> {
        Err(Self::not_implemented("delete_scan"))
    }

    async fn start_scan(&self, _conn: &ScannerConnection, _request: &StartScanRequest) -> Result<()> {
        Err(Self::not_implemented("start_scan"))
    }

    async fn get_scan_pop(
        &self,
        _conn: &ScannerConnection,
        _scan_id: &str,
        _details: bool,
        _pop_results: bool,
    ) -> Result<ScanPop> {
        Err(Self::not_implemented("get_scan_pop"))
    }

    async fn get_scan_status(&self, _conn: &ScannerConnection, _scan_id: &str) -> Result<ScanStatus> {
        Err(Self::not_implemented("get_scan_status"))
    }

    async fn stop_scan(&self, _conn: &ScannerConnection, _scan_id: &str) -> Result<()> {
        Err(Self::not_implemented("stop_scan"))
    }

    async fn close(&self, conn: ScannerConnection) -> Result<()> {
        match *conn.inner.downcast::<Transport>().map_err(|_| {
            ScanError::Internal("connection handle was not produced by this client".to_string())
        })? {
            Transport::Tcp(mut stream) => stream.shutdown().await.map_err(ScanError::Io),
            Transport::Unix(mut stream) => stream.shutdown().await.map_err(ScanError::Io),
        }
    }
}
