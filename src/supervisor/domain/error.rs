//! Error types for supervisor domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing supervisor domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SupervisorDomainError {
    /// The server name is empty after trimming.
    #[error("server name must not be empty")]
    EmptyServerName,

    /// The server name contains characters outside `[a-z0-9_]`.
    #[error(
        "server name '{0}' contains invalid characters (only lowercase alphanumeric and underscores allowed)"
    )]
    InvalidServerName(String),

    /// The server name exceeds the 100-character limit.
    #[error("server name exceeds 100 character limit: {0}")]
    ServerNameTooLong(String),

    /// Process identifiers must be positive.
    #[error("process id must be positive")]
    ZeroProcessId,

    /// Process identifiers must fit the signed range the kernel uses.
    #[error("process id {0} is out of range")]
    ProcessIdOutOfRange(u32),

    /// Subserver ports must be positive.
    #[error("subserver port must be positive")]
    ZeroPort,

    /// A configuration lists no subservers at all.
    #[error("at least one subserver must be configured")]
    NoSubservers,

    /// Two configured subservers share a port.
    #[error("port {0} is configured more than once")]
    DuplicatePort(u16),

    /// The server command is empty.
    #[error("server command must not be empty")]
    EmptyCommand,

    /// A path value is empty after trimming.
    #[error("{0} must not be empty")]
    EmptyPath(&'static str),

    /// The probe host is empty after trimming.
    #[error("probe host must not be empty")]
    EmptyHost,

    /// Poll timeouts and intervals must be non-zero.
    #[error("poll settings must use a non-zero timeout and interval")]
    InvalidPollSettings,
}

/// Error returned while parsing a protocol name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown subserver protocol: {0}")]
pub struct ParseProtocolError(pub String);

/// Reasons a persisted registry cannot be trusted.
///
/// Corruption is never surfaced to callers of the supervisor; it selects the
/// delete-and-continue path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryCorruption {
    /// The content is not a JSON array of record objects with exactly the
    /// `protocol`, `port` and `pid` fields.
    #[error("registry content is malformed: {0}")]
    Malformed(String),

    /// The same port is listed by more than one record.
    #[error("registry lists port {0} more than once")]
    DuplicatePort(u16),

    /// The registry file holds bytes that are not UTF-8 text.
    #[error("registry content is not UTF-8 text")]
    NotText,
}
