//! Pid file contents.

use super::ProcessId;

/// Classified contents of the pid file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidFileContents {
    /// No pid file exists.
    Absent,
    /// The file exists but records no process (`0` or blank).
    NoProcess,
    /// The file records a process identifier.
    Recorded(ProcessId),
    /// The file content is not a usable process identifier.
    Corrupt,
}

impl PidFileContents {
    /// Classifies raw pid file text. Surrounding whitespace is ignored.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Self::NoProcess;
        }
        match trimmed.parse::<u32>() {
            Ok(0) => Self::NoProcess,
            Ok(raw) => ProcessId::new(raw).map_or(Self::Corrupt, Self::Recorded),
            Err(_) => Self::Corrupt,
        }
    }

    /// Classifies the result of reading the pid file, where `None` means the
    /// file does not exist.
    #[must_use]
    pub fn from_file_text(text: Option<&str>) -> Self {
        text.map_or(Self::Absent, Self::parse)
    }

    /// Returns the recorded process, if any.
    #[must_use]
    pub const fn recorded(self) -> Option<ProcessId> {
        match self {
            Self::Recorded(pid) => Some(pid),
            Self::Absent | Self::NoProcess | Self::Corrupt => None,
        }
    }

    /// Renders the file content recorded for `pid`.
    #[must_use]
    pub fn render(pid: ProcessId) -> String {
        format!("{pid}\n")
    }
}
