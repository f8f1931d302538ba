//! Starts, stops, or inspects a supervised server family.
//!
//! Usage:
//!
//! ```text
//! subserver_ctl <operation> <settings-path>
//! ```
//!
//! The `operation` must be `start`, `stop`, or `status`. The JSON document at
//! `settings-path` must deserialize into
//! [`SupervisorSettings`](harbourmaster::supervisor::domain::SupervisorSettings).
//! A representative document is:
//!
//! ```json
//! {
//!   "name": "wpttest",
//!   "output_dir": "/tmp/layout-test-results",
//!   "command": "python3",
//!   "args": ["wpt", "serve", "--config", "/tmp/wpt.json"],
//!   "env": { "PYTHONUNBUFFERED": "1" },
//!   "subservers": [
//!     { "protocol": "http", "port": 8800 },
//!     { "protocol": "https", "port": 9443 }
//!   ],
//!   "startup_timeout_ms": 20000
//! }
//! ```
//!
//! `status` exits with code 0 when the family is serving every port and 3
//! otherwise. Log verbosity follows `RUST_LOG` and defaults to `info`.

#[cfg(unix)]
use camino::{Utf8Path, Utf8PathBuf};
#[cfg(unix)]
use cap_std::{ambient_authority, fs_utf8::Dir};
#[cfg(unix)]
use harbourmaster::supervisor::{
    adapters::{CapStdFilesystem, OsProcessControl, TcpPortProbe},
    domain::{SupervisorConfig, SupervisorDomainError, SupervisorSettings},
    services::{ServerSupervisor, StartOutcome, SupervisorError},
};
#[cfg(unix)]
use std::env;
#[cfg(unix)]
use std::io::Write;
#[cfg(unix)]
use std::process::ExitCode;
#[cfg(unix)]
use std::sync::Arc;
#[cfg(unix)]
use thiserror::Error;
#[cfg(unix)]
use tokio::runtime::Builder;
#[cfg(unix)]
use tracing_subscriber::EnvFilter;

/// Exit code reported by `status` when the family is not running.
#[cfg(unix)]
const NOT_RUNNING_EXIT_CODE: u8 = 3;

/// Boxed error type for the main result.
#[cfg(not(unix))]
type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while driving the supervisor.
#[cfg(unix)]
#[derive(Debug, Error)]
enum CtlError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("failed to read settings {path}: {source}")]
    SettingsRead {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings: {0}")]
    SettingsParse(#[source] serde_json::Error),
    #[error("invalid settings: {0}")]
    InvalidSettings(#[source] SupervisorDomainError),
    #[error("runtime init failed: {0}")]
    RuntimeInit(#[source] std::io::Error),
    #[error("failed to write report: {0}")]
    Report(#[source] std::io::Error),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

#[cfg(unix)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Start,
    Stop,
    Status,
}

#[cfg(unix)]
impl Operation {
    fn parse(arg: &str) -> Result<Self, CtlError> {
        match arg {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "status" => Ok(Self::Status),
            other => Err(CtlError::InvalidArgs(format!(
                "unknown operation '{other}'; expected start, stop, or status"
            ))),
        }
    }
}

#[cfg(unix)]
type OsSupervisor = ServerSupervisor<CapStdFilesystem, OsProcessControl, TcpPortProbe>;

#[cfg(unix)]
fn main() -> ExitCode {
    init_tracing();
    match run(env::args_os().map(|arg| arg.into_string())) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "subserver_ctl failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(unix)]
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(unix)]
fn run<I, E>(args: I) -> Result<ExitCode, CtlError>
where
    I: Iterator<Item = Result<String, E>>,
{
    let (operation, settings_path) = parse_args(args)?;
    let config = load_config(&settings_path)?;
    let supervisor = ServerSupervisor::new(
        config,
        Arc::new(CapStdFilesystem::new()),
        Arc::new(OsProcessControl::new()),
        Arc::new(TcpPortProbe::new()),
    );
    build_runtime()?.block_on(execute(operation, &supervisor))
}

#[cfg(unix)]
fn parse_args<I, E>(mut args: I) -> Result<(Operation, Utf8PathBuf), CtlError>
where
    I: Iterator<Item = Result<String, E>>,
{
    let mut next_arg = |what: &str| -> Result<String, CtlError> {
        args.next()
            .ok_or_else(|| CtlError::InvalidArgs(format!("missing {what} argument")))?
            .map_err(|_| CtlError::InvalidArgs("argument is not valid UTF-8".into()))
    };
    let _program = next_arg("program");
    let operation = Operation::parse(&next_arg("operation")?)?;
    let settings_path = Utf8PathBuf::from(next_arg("settings path")?);
    if let Some(extra) = args.next() {
        let extra_arg = extra.unwrap_or_else(|_| "<non-UTF-8>".to_owned());
        return Err(CtlError::InvalidArgs(format!(
            "unexpected extra argument: {extra_arg}"
        )));
    }
    Ok((operation, settings_path))
}

#[cfg(unix)]
fn load_config(path: &Utf8Path) -> Result<SupervisorConfig, CtlError> {
    let text = read_settings_file(path).map_err(|source| CtlError::SettingsRead {
        path: path.to_owned(),
        source,
    })?;
    parse_settings(&text)
}

#[cfg(unix)]
fn parse_settings(text: &str) -> Result<SupervisorConfig, CtlError> {
    let settings: SupervisorSettings =
        serde_json::from_str(text).map_err(CtlError::SettingsParse)?;
    settings.into_config().map_err(CtlError::InvalidSettings)
}

#[cfg(unix)]
fn read_settings_file(path: &Utf8Path) -> std::io::Result<String> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{path} does not name a file"),
        )
    })?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    dir.read_to_string(file_name)
}

#[cfg(unix)]
fn build_runtime() -> Result<tokio::runtime::Runtime, CtlError> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CtlError::RuntimeInit)
}

#[cfg(unix)]
async fn execute(operation: Operation, supervisor: &OsSupervisor) -> Result<ExitCode, CtlError> {
    let name = supervisor.config().name();
    let (line, code) = match operation {
        Operation::Start => match supervisor.start().await? {
            StartOutcome::Reused { pid } => {
                (format!("{name}: reusing running server {pid}"), ExitCode::SUCCESS)
            }
            StartOutcome::Spawned { pid } => {
                (format!("{name}: started server {pid}"), ExitCode::SUCCESS)
            }
        },
        Operation::Stop => {
            let outcome = supervisor.stop().await?;
            let count = outcome.terminated().len();
            (
                format!("{name}: stopped ({count} process(es) terminated)"),
                ExitCode::SUCCESS,
            )
        }
        Operation::Status => {
            if supervisor.is_running().await? {
                (format!("{name}: running"), ExitCode::SUCCESS)
            } else {
                (
                    format!("{name}: not running"),
                    ExitCode::from(NOT_RUNNING_EXIT_CODE),
                )
            }
        }
    };
    report(&mut std::io::stdout().lock(), &line)?;
    Ok(code)
}

#[cfg(unix)]
fn report(out: &mut impl Write, line: &str) -> Result<(), CtlError> {
    writeln!(out, "{line}").map_err(CtlError::Report)
}

#[cfg(not(unix))]
fn main() -> Result<(), BoxError> {
    Err("subserver_ctl is not supported on non-Unix platforms".into())
}
