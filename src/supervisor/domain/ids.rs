//! Identifier and validated-name types for supervised servers.

use super::SupervisorDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;

/// Maximum length for a server name.
const MAX_SERVER_NAME_LENGTH: usize = 100;

/// Largest process identifier the operating system can signal (`i32::MAX`).
pub const MAX_PROCESS_ID: u32 = 2_147_483_647;

/// Positive operating-system process identifier in `1..=i32::MAX`.
///
/// Deserialisation goes through [`ProcessId::new`], so a registry entry such
/// as `"pid": {}`, `"pid": 0` or `"pid": 3000000000` is rejected outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ProcessId(NonZeroU32);

impl ProcessId {
    /// Creates a process identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorDomainError::ZeroProcessId`] when `value` is zero
    /// and [`SupervisorDomainError::ProcessIdOutOfRange`] when it exceeds
    /// [`MAX_PROCESS_ID`].
    pub const fn new(value: u32) -> Result<Self, SupervisorDomainError> {
        if value > MAX_PROCESS_ID {
            return Err(SupervisorDomainError::ProcessIdOutOfRange(value));
        }
        match NonZeroU32::new(value) {
            Some(pid) => Ok(Self(pid)),
            None => Err(SupervisorDomainError::ZeroProcessId),
        }
    }

    /// Returns the raw process identifier.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl TryFrom<u32> for ProcessId {
    type Error = SupervisorDomainError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProcessId> for u32 {
    fn from(value: ProcessId) -> Self {
        value.get()
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Validated logical name of a server family, such as `wpttest`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerName(String);

impl ServerName {
    /// Creates a validated server name.
    ///
    /// The input is trimmed and lowercased. Only characters in `[a-z0-9_]`
    /// are accepted, which keeps derived file names portable.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorDomainError`] when validation fails.
    pub fn new(value: impl Into<String>) -> Result<Self, SupervisorDomainError> {
        let normalized = value.into().trim().to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(SupervisorDomainError::EmptyServerName);
        }

        let is_valid = normalized.chars().all(|character| {
            character.is_ascii_lowercase() || character.is_ascii_digit() || character == '_'
        });
        if !is_valid {
            return Err(SupervisorDomainError::InvalidServerName(normalized));
        }

        if normalized.len() > MAX_SERVER_NAME_LENGTH {
            return Err(SupervisorDomainError::ServerNameTooLong(normalized));
        }

        Ok(Self(normalized))
    }

    /// Returns the server name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ServerName {
    type Error = SupervisorDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ServerName> for String {
    fn from(value: ServerName) -> Self {
        value.0
    }
}

impl AsRef<str> for ServerName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ServerName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
