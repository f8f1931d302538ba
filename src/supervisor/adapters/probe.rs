//! TCP connect probe adapter.

use crate::supervisor::ports::PortProbe;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Default per-attempt connect timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Probes ports by opening and immediately dropping a TCP connection.
#[derive(Debug, Clone, Copy)]
pub struct TcpPortProbe {
    connect_timeout: Duration,
}

impl Default for TcpPortProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpPortProbe {
    /// Creates a probe with a 500 ms connect timeout.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Replaces the per-attempt connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

#[async_trait]
impl PortProbe for TcpPortProbe {
    async fn is_accepting(&self, host: &str, port: u16) -> bool {
        let accepted = matches!(
            timeout(self.connect_timeout, TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        );
        tracing::trace!(host, port, accepted, "probed port");
        accepted
    }
}
