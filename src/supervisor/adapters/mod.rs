//! Adapter implementations for supervisor ports.
//!
//! Production adapters talk to the local operating system; the in-memory
//! adapters under [`memory`] simulate a host for deterministic tests.

pub mod memory;

mod filesystem;
mod probe;
#[cfg(unix)]
mod process;

pub use filesystem::CapStdFilesystem;
pub use probe::TcpPortProbe;
#[cfg(unix)]
pub use process::OsProcessControl;
