//! Subserver endpoint value objects.

use super::{ParseProtocolError, ProcessId, SupervisorDomainError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU16;

/// Protocol spoken by one listening endpoint of the server family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Plain HTTP.
    Http,
    /// HTTP over TLS.
    Https,
    /// Plain WebSocket.
    Ws,
    /// WebSocket over TLS.
    Wss,
}

impl Protocol {
    /// Returns the canonical serialised representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Ws => "ws",
            Self::Wss => "wss",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Protocol {
    type Error = ParseProtocolError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            "ws" => Ok(Self::Ws),
            "wss" => Ok(Self::Wss),
            _ => Err(ParseProtocolError(value.to_owned())),
        }
    }
}

/// A configured endpoint: which protocol is served on which port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubserverPort {
    protocol: Protocol,
    port: NonZeroU16,
}

impl SubserverPort {
    /// Creates a configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorDomainError::ZeroPort`] when `port` is zero.
    pub const fn new(protocol: Protocol, port: u16) -> Result<Self, SupervisorDomainError> {
        match NonZeroU16::new(port) {
            Some(value) => Ok(Self {
                protocol,
                port: value,
            }),
            None => Err(SupervisorDomainError::ZeroPort),
        }
    }

    /// Returns the endpoint protocol.
    #[must_use]
    pub const fn protocol(self) -> Protocol {
        self.protocol
    }

    /// Returns the endpoint port.
    #[must_use]
    pub const fn port(self) -> u16 {
        self.port.get()
    }

    /// Builds the registry record for this endpoint owned by `pid`.
    #[must_use]
    pub const fn owned_by(self, pid: ProcessId) -> SubserverRecord {
        SubserverRecord {
            protocol: self.protocol,
            port: self.port,
            pid,
        }
    }
}

impl fmt::Display for SubserverPort {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.protocol, self.port)
    }
}

/// One listening endpoint as persisted in the registry.
///
/// Exactly the `protocol`, `port` and `pid` fields are accepted when
/// deserialising; `port` and `pid` must be positive scalar integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubserverRecord {
    protocol: Protocol,
    port: NonZeroU16,
    pid: ProcessId,
}

impl SubserverRecord {
    /// Creates a registry record.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorDomainError::ZeroPort`] when `port` is zero.
    pub fn new(protocol: Protocol, port: u16, pid: ProcessId) -> Result<Self, SupervisorDomainError> {
        Ok(SubserverPort::new(protocol, port)?.owned_by(pid))
    }

    /// Returns the endpoint protocol.
    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Returns the endpoint port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port.get()
    }

    /// Returns the process that owns the endpoint.
    #[must_use]
    pub const fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Returns the configured endpoint this record describes.
    #[must_use]
    pub const fn endpoint(&self) -> SubserverPort {
        SubserverPort {
            protocol: self.protocol,
            port: self.port,
        }
    }
}

/// Returns the web-platform-test subserver layout.
///
/// Two HTTP ports, one HTTPS port, and one port each for plain and secure
/// WebSockets.
#[must_use]
pub fn default_web_platform_subservers() -> Vec<SubserverPort> {
    const LAYOUT: [(Protocol, u16); 5] = [
        (Protocol::Http, 8800),
        (Protocol::Http, 8801),
        (Protocol::Https, 9443),
        (Protocol::Ws, 49001),
        (Protocol::Wss, 49002),
    ];
    LAYOUT
        .into_iter()
        .filter_map(|(protocol, port)| SubserverPort::new(protocol, port).ok())
        .collect()
}
