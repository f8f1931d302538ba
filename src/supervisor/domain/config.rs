//! Supervisor configuration value objects.

use super::{
    RegistryPolicy, ServerName, SubserverPort, SupervisorDomainError,
    default_web_platform_subservers,
};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

const DEFAULT_PROBE_HOST: &str = "127.0.0.1";
const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_REUSE_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(5);

/// Command used to launch the supervised server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCommand {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl ServerCommand {
    /// Creates a command for `program` with no arguments.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorDomainError::EmptyCommand`] when `program` is empty
    /// after trimming.
    pub fn new(program: impl Into<String>) -> Result<Self, SupervisorDomainError> {
        let normalized = program.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(SupervisorDomainError::EmptyCommand);
        }

        Ok(Self {
            program: normalized,
            args: Vec::new(),
            env: BTreeMap::new(),
        })
    }

    /// Replaces command-line arguments.
    #[must_use]
    pub fn with_args(mut self, values: impl IntoIterator<Item = String>) -> Self {
        self.args = values.into_iter().collect();
        self
    }

    /// Replaces additional environment variables.
    #[must_use]
    pub fn with_env(mut self, values: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env = values.into_iter().collect();
        self
    }

    /// Returns the executable.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns command-line arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns additional environment variables.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }
}

/// Bounded polling parameters: overall timeout and a doubling interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    timeout: Duration,
    initial_interval: Duration,
    max_interval: Duration,
}

impl PollSettings {
    /// Creates poll settings with a one-second interval ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorDomainError::InvalidPollSettings`] when the timeout
    /// or interval is zero.
    pub fn new(timeout: Duration, initial_interval: Duration) -> Result<Self, SupervisorDomainError> {
        if timeout.is_zero() || initial_interval.is_zero() {
            return Err(SupervisorDomainError::InvalidPollSettings);
        }
        Ok(Self {
            timeout,
            initial_interval,
            max_interval: DEFAULT_MAX_INTERVAL.max(initial_interval),
        })
    }

    /// Caps the interval growth. Values below the initial interval are
    /// raised to it.
    #[must_use]
    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval.max(self.initial_interval);
        self
    }

    /// Returns the overall polling budget.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the delay before the second attempt.
    #[must_use]
    pub const fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    /// Returns the interval ceiling.
    #[must_use]
    pub const fn max_interval(&self) -> Duration {
        self.max_interval
    }

    const fn startup_default() -> Self {
        Self {
            timeout: DEFAULT_STARTUP_TIMEOUT,
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
        }
    }

    const fn reuse_default() -> Self {
        Self {
            timeout: DEFAULT_REUSE_TIMEOUT,
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            max_interval: Duration::from_millis(500),
        }
    }
}

/// Fixed configuration of one server supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    name: ServerName,
    output_dir: Utf8PathBuf,
    pid_file: Utf8PathBuf,
    command: ServerCommand,
    host: String,
    subservers: Vec<SubserverPort>,
    registry_policy: RegistryPolicy,
    startup_poll: PollSettings,
    reuse_poll: PollSettings,
    termination_grace: Duration,
}

impl SupervisorConfig {
    /// Creates a configuration using the web-platform-test subserver layout
    /// and default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorDomainError::EmptyPath`] when either path is empty.
    pub fn new(
        name: ServerName,
        output_dir: impl Into<Utf8PathBuf>,
        pid_file: impl Into<Utf8PathBuf>,
        command: ServerCommand,
    ) -> Result<Self, SupervisorDomainError> {
        Ok(Self {
            name,
            output_dir: non_empty_path(output_dir.into(), "output directory")?,
            pid_file: non_empty_path(pid_file.into(), "pid file path")?,
            command,
            host: DEFAULT_PROBE_HOST.to_owned(),
            subservers: default_web_platform_subservers(),
            registry_policy: RegistryPolicy::default(),
            startup_poll: PollSettings::startup_default(),
            reuse_poll: PollSettings::reuse_default(),
            termination_grace: DEFAULT_TERMINATION_GRACE,
        })
    }

    /// Replaces the configured subservers.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorDomainError::NoSubservers`] for an empty list and
    /// [`SupervisorDomainError::DuplicatePort`] when a port repeats.
    pub fn with_subservers(
        mut self,
        subservers: impl IntoIterator<Item = SubserverPort>,
    ) -> Result<Self, SupervisorDomainError> {
        let collected: Vec<SubserverPort> = subservers.into_iter().collect();
        if collected.is_empty() {
            return Err(SupervisorDomainError::NoSubservers);
        }
        let mut seen = HashSet::with_capacity(collected.len());
        for subserver in &collected {
            if !seen.insert(subserver.port()) {
                return Err(SupervisorDomainError::DuplicatePort(subserver.port()));
            }
        }
        self.subservers = collected;
        Ok(self)
    }

    /// Sets the host probed for port liveness.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorDomainError::EmptyHost`] when `host` is empty after
    /// trimming.
    pub fn with_host(mut self, host: impl Into<String>) -> Result<Self, SupervisorDomainError> {
        let normalized = host.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(SupervisorDomainError::EmptyHost);
        }
        self.host = normalized;
        Ok(self)
    }

    /// Replaces the registry plausibility policy.
    #[must_use]
    pub const fn with_registry_policy(mut self, policy: RegistryPolicy) -> Self {
        self.registry_policy = policy;
        self
    }

    /// Replaces the health confirmation polling used after a spawn.
    #[must_use]
    pub const fn with_startup_poll(mut self, settings: PollSettings) -> Self {
        self.startup_poll = settings;
        self
    }

    /// Replaces the polling used to confirm a previously spawned instance.
    #[must_use]
    pub const fn with_reuse_poll(mut self, settings: PollSettings) -> Self {
        self.reuse_poll = settings;
        self
    }

    /// Sets how long a terminated process may take to exit before it is
    /// killed.
    #[must_use]
    pub const fn with_termination_grace(mut self, grace: Duration) -> Self {
        self.termination_grace = grace;
        self
    }

    /// Returns the server family name.
    #[must_use]
    pub const fn name(&self) -> &ServerName {
        &self.name
    }

    /// Returns the output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    /// Returns the pid file path.
    #[must_use]
    pub fn pid_file(&self) -> &Utf8Path {
        &self.pid_file
    }

    /// Returns the registry file path, `<output_dir>/<name>_servers.json`.
    #[must_use]
    pub fn registry_path(&self) -> Utf8PathBuf {
        self.output_dir.join(format!("{}_servers.json", self.name))
    }

    /// Returns the path receiving the server's standard output.
    #[must_use]
    pub fn stdout_log_path(&self) -> Utf8PathBuf {
        self.output_dir
            .join(format!("{}_process_log.out.txt", self.name))
    }

    /// Returns the path receiving the server's standard error.
    #[must_use]
    pub fn stderr_log_path(&self) -> Utf8PathBuf {
        self.output_dir
            .join(format!("{}_process_log.err.txt", self.name))
    }

    /// Returns the launch command.
    #[must_use]
    pub const fn command(&self) -> &ServerCommand {
        &self.command
    }

    /// Returns the host probed for port liveness.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the configured subservers.
    #[must_use]
    pub fn subservers(&self) -> &[SubserverPort] {
        &self.subservers
    }

    /// Returns the registry plausibility policy.
    #[must_use]
    pub const fn registry_policy(&self) -> &RegistryPolicy {
        &self.registry_policy
    }

    /// Returns the health confirmation polling settings.
    #[must_use]
    pub const fn startup_poll(&self) -> &PollSettings {
        &self.startup_poll
    }

    /// Returns the reuse confirmation polling settings.
    #[must_use]
    pub const fn reuse_poll(&self) -> &PollSettings {
        &self.reuse_poll
    }

    /// Returns the termination grace period.
    #[must_use]
    pub const fn termination_grace(&self) -> Duration {
        self.termination_grace
    }
}

fn non_empty_path(
    path: Utf8PathBuf,
    label: &'static str,
) -> Result<Utf8PathBuf, SupervisorDomainError> {
    if path.as_str().trim().is_empty() {
        return Err(SupervisorDomainError::EmptyPath(label));
    }
    Ok(path)
}

/// Serialisable supervisor settings, as read from a JSON settings file.
///
/// Durations are given in milliseconds. Omitted optional values fall back to
/// the defaults of [`SupervisorConfig::new`]. A representative file is:
///
/// ```json
/// {
///   "name": "wpttest",
///   "output_dir": "/tmp/layout-test-results",
///   "command": "python3",
///   "args": ["wpt", "serve"],
///   "subservers": [
///     { "protocol": "http", "port": 8800 },
///     { "protocol": "https", "port": 9443 }
///   ],
///   "startup_timeout_ms": 30000
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorSettings {
    /// Server family name.
    pub name: String,
    /// Directory holding the registry and process logs.
    pub output_dir: String,
    /// Pid file path; defaults to `<output_dir>/<name>_pid.txt`.
    #[serde(default)]
    pub pid_file: Option<String>,
    /// Executable launching the server.
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Additional environment variables for the server.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Host probed for port liveness.
    #[serde(default)]
    pub host: Option<String>,
    /// Subserver layout.
    #[serde(default)]
    pub subservers: Option<Vec<SubserverPort>>,
    /// Registry plausibility policy.
    #[serde(default)]
    pub registry_policy: Option<RegistryPolicy>,
    /// Health confirmation timeout in milliseconds.
    #[serde(default)]
    pub startup_timeout_ms: Option<u64>,
    /// Reuse confirmation timeout in milliseconds.
    #[serde(default)]
    pub reuse_timeout_ms: Option<u64>,
    /// Termination grace period in milliseconds.
    #[serde(default)]
    pub termination_grace_ms: Option<u64>,
}

impl SupervisorSettings {
    /// Validates the settings and builds a [`SupervisorConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorDomainError`] when any value fails validation.
    pub fn into_config(self) -> Result<SupervisorConfig, SupervisorDomainError> {
        let name = ServerName::new(self.name)?;
        let output_dir = Utf8PathBuf::from(self.output_dir);
        let pid_file = self.pid_file.map_or_else(
            || output_dir.join(format!("{name}_pid.txt")),
            Utf8PathBuf::from,
        );
        let command = ServerCommand::new(self.command)?
            .with_args(self.args)
            .with_env(self.env);

        let mut config = SupervisorConfig::new(name, output_dir, pid_file, command)?;
        if let Some(host) = self.host {
            config = config.with_host(host)?;
        }
        if let Some(subservers) = self.subservers {
            config = config.with_subservers(subservers)?;
        }
        if let Some(policy) = self.registry_policy {
            config = config.with_registry_policy(policy);
        }
        if let Some(timeout_ms) = self.startup_timeout_ms {
            let poll = PollSettings::new(Duration::from_millis(timeout_ms), DEFAULT_INITIAL_INTERVAL)?;
            config = config.with_startup_poll(poll);
        }
        if let Some(timeout_ms) = self.reuse_timeout_ms {
            let poll = PollSettings::new(Duration::from_millis(timeout_ms), DEFAULT_INITIAL_INTERVAL)?
                .with_max_interval(Duration::from_millis(500));
            config = config.with_reuse_poll(poll);
        }
        if let Some(grace_ms) = self.termination_grace_ms {
            config = config.with_termination_grace(Duration::from_millis(grace_ms));
        }
        Ok(config)
    }
}
