//! Port-liveness probe port.

use async_trait::async_trait;

/// Checks whether a TCP port is accepting connections.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PortProbe: Send + Sync {
    /// Returns `true` when a connection to `host:port` is accepted.
    ///
    /// Refused, timed-out and unroutable connections all report `false`.
    async fn is_accepting(&self, host: &str, port: u16) -> bool;
}
