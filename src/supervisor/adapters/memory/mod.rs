//! In-memory adapters for supervisor ports.

mod filesystem;
mod host;

pub use filesystem::InMemoryFilesystem;
pub use host::InMemoryHost;
