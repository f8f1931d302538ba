//! Port contracts for the collaborators a supervisor drives.

mod filesystem;
mod probe;
mod process;

pub use filesystem::{Filesystem, FilesystemError, FilesystemResult};
pub use probe::PortProbe;
pub use process::{ProcessControl, ProcessControlError, ProcessControlResult, SpawnRequest};

#[cfg(test)]
pub use filesystem::MockFilesystem;
#[cfg(test)]
pub use probe::MockPortProbe;
#[cfg(test)]
pub use process::MockProcessControl;
