//! Domain model for subserver supervision.
//!
//! Models the server family identity, subserver endpoints, the persisted
//! registry and pid file, and the configuration a supervisor is built from.
//! Parsing of persisted state never fails loudly: malformed content is
//! classified as corrupt and handed back as a value.

mod config;
mod error;
mod ids;
mod pid_file;
mod registry;
mod subserver;

pub use config::{PollSettings, ServerCommand, SupervisorConfig, SupervisorSettings};
pub use error::{ParseProtocolError, RegistryCorruption, SupervisorDomainError};
pub use ids::{MAX_PROCESS_ID, ProcessId, ServerName};
pub use pid_file::PidFileContents;
pub use registry::{RegistryContents, RegistryPolicy, RegistryViolation, SubserverRecordSet};
pub use subserver::{Protocol, SubserverPort, SubserverRecord, default_web_platform_subservers};
