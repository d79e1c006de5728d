use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use super::traits::Connectivity;
use crate::config::{
    CONNECTIVITY_PROBE_HOST, CONNECTIVITY_PROBE_PORT, CONNECTIVITY_PROBE_TIMEOUT_MILLIS,
};

/// Reachability check that opens a TCP connection to a well-known host.
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(
            CONNECTIVITY_PROBE_HOST,
            CONNECTIVITY_PROBE_PORT,
            Duration::from_millis(CONNECTIVITY_PROBE_TIMEOUT_MILLIS),
        )
    }
}

#[async_trait]
impl Connectivity for TcpProbe {
    async fn is_connected(&self) -> bool {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("connectivity probe {}:{} failed: {}", self.host, self.port, e);
                false
            }
            Err(_) => {
                debug!("connectivity probe {}:{} timed out", self.host, self.port);
                false
            }
        }
    }
}

/// Connectivity that always reports a network, for hosts without a probe.
pub struct AlwaysOnline;

#[async_trait]
impl Connectivity for AlwaysOnline {
    async fn is_connected(&self) -> bool {
        true
    }
}
