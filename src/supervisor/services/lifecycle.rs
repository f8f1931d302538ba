//! Start/stop convergence for a supervised server family.

use super::poll_until;
use crate::supervisor::{
    domain::{
        PidFileContents, PollSettings, ProcessId, Protocol, RegistryContents, RegistryCorruption,
        RegistryViolation, ServerName, SubserverRecordSet, SupervisorConfig,
    },
    ports::{
        Filesystem, FilesystemError, PortProbe, ProcessControl, ProcessControlError, SpawnRequest,
    },
};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Number of trailing stderr lines attached to a failed start.
const DIAGNOSTIC_LINES: usize = 20;

/// Failures of the environment the supervisor runs in.
#[derive(Debug, Clone, Error)]
pub enum EnvironmentFailure {
    /// A filesystem operation failed.
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
    /// A process-table operation failed.
    #[error(transparent)]
    Process(#[from] ProcessControlError),
    /// The registry could not be serialised.
    #[error("failed to serialise registry: {0}")]
    Serialisation(Arc<serde_json::Error>),
}

/// Caller-visible supervisor errors.
///
/// Corrupt or stale persisted state never appears here; it is repaired in
/// place.
#[derive(Debug, Clone, Error)]
pub enum SupervisorError {
    /// A configured port is held by a process this supervisor does not own.
    #[error("{protocol} port {port} is already in use by another process")]
    PortConflict {
        /// Protocol configured for the port.
        protocol: Protocol,
        /// Occupied port.
        port: u16,
    },

    /// The spawned server exited, or did not listen on every port in time.
    #[error("{name} server did not start listening on all ports within {timeout:?}")]
    ServerDidNotStart {
        /// Server family name.
        name: ServerName,
        /// Health confirmation budget that elapsed.
        timeout: Duration,
        /// Trailing lines of the server's standard error, when available.
        diagnostics: Option<String>,
    },

    /// The filesystem or process table is unusable.
    #[error(transparent)]
    Environment(#[from] EnvironmentFailure),
}

impl From<FilesystemError> for SupervisorError {
    fn from(err: FilesystemError) -> Self {
        Self::Environment(err.into())
    }
}

impl From<ProcessControlError> for SupervisorError {
    fn from(err: ProcessControlError) -> Self {
        Self::Environment(err.into())
    }
}

/// Result type for supervisor operations.
pub type SupervisorResult<T> = Result<T, SupervisorError>;

/// How [`ServerSupervisor::start`] satisfied the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A previously spawned instance was already serving every port.
    Reused {
        /// Process recorded in the pid file.
        pid: ProcessId,
    },
    /// A fresh server process was spawned.
    Spawned {
        /// Process that was spawned.
        pid: ProcessId,
    },
}

impl StartOutcome {
    /// Returns the process serving the family.
    #[must_use]
    pub const fn pid(self) -> ProcessId {
        match self {
            Self::Reused { pid } | Self::Spawned { pid } => pid,
        }
    }

    /// Returns whether this call spawned a process.
    #[must_use]
    pub const fn spawned(self) -> bool {
        matches!(self, Self::Spawned { .. })
    }
}

/// Result of [`ServerSupervisor::stop`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopOutcome {
    terminated: Vec<ProcessId>,
}

impl StopOutcome {
    /// Returns the processes that were running and have been terminated.
    #[must_use]
    pub fn terminated(&self) -> &[ProcessId] {
        &self.terminated
    }
}

/// Why a well-formed registry was judged stale.
#[derive(Debug, Error)]
enum StaleRegistry {
    #[error(transparent)]
    Implausible(#[from] RegistryViolation),
    #[error("port {port} is accepting connections but its recorded process {pid} is gone")]
    PortTakenOver { port: u16, pid: ProcessId },
}

/// Verdict on a well-formed registry left by an earlier run.
enum RegistryAssessment {
    Stale(StaleRegistry),
    Leftover(Vec<ProcessId>),
}

/// Supervises one server family.
///
/// The supervisor exclusively owns the registry file and the pid file. Every
/// operation converges the host to a defined state whatever it finds on disk;
/// corrupt or stale records are deleted rather than reported.
#[derive(Clone)]
pub struct ServerSupervisor<F, P, N>
where
    F: Filesystem,
    P: ProcessControl,
    N: PortProbe,
{
    config: SupervisorConfig,
    filesystem: Arc<F>,
    processes: Arc<P>,
    probe: Arc<N>,
}

impl<F, P, N> ServerSupervisor<F, P, N>
where
    F: Filesystem,
    P: ProcessControl,
    N: PortProbe,
{
    /// Creates a supervisor over the given collaborators.
    #[must_use]
    pub const fn new(
        config: SupervisorConfig,
        filesystem: Arc<F>,
        processes: Arc<P>,
        probe: Arc<N>,
    ) -> Self {
        Self {
            config,
            filesystem,
            processes,
            probe,
        }
    }

    /// Returns the supervisor configuration.
    #[must_use]
    pub const fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Returns the registry file path.
    #[must_use]
    pub fn registry_path(&self) -> Utf8PathBuf {
        self.config.registry_path()
    }

    /// Returns the pid file path.
    #[must_use]
    pub fn pid_file_path(&self) -> &Utf8Path {
        self.config.pid_file()
    }

    /// Starts the server family, or attaches to an instance that is already
    /// serving every configured port.
    ///
    /// On success the family listens on all configured ports and the registry
    /// describes the live instance. Corrupt or stale persisted state is
    /// deleted along the way.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::PortConflict`] when a configured port is
    /// held by an unrelated process, [`SupervisorError::ServerDidNotStart`]
    /// when the spawned server exits or does not come up in time (after
    /// cleaning up), and [`SupervisorError::Environment`] when the
    /// filesystem or process table fails.
    #[instrument(skip(self), fields(server = %self.config.name()))]
    pub async fn start(&self) -> SupervisorResult<StartOutcome> {
        if let Some(pid) = self.try_reuse().await? {
            return Ok(StartOutcome::Reused { pid });
        }

        self.discard_previous_registry().await?;
        self.ensure_ports_available().await?;
        self.remove_stale_logs().await?;

        let pid = self.processes.spawn(&self.spawn_request()).await?;
        info!(%pid, "spawned server process");
        if let Err(err) = self
            .filesystem
            .write_text(self.config.pid_file(), &PidFileContents::render(pid))
            .await
        {
            self.terminate_quietly(pid).await;
            return Err(err.into());
        }

        let exited = AtomicBool::new(false);
        let settled = poll_until(self.config.startup_poll(), || {
            self.listening_or_exited(pid, &exited)
        })
        .await;
        let exited_early = exited.load(Ordering::SeqCst);
        if !settled || exited_early {
            return Err(self.abandon_start(pid, exited_early).await);
        }

        self.write_registry(&SubserverRecordSet::owned_by(self.config.subservers(), pid))
            .await?;
        info!(%pid, ports = self.config.subservers().len(), "server is listening on all ports");
        Ok(StartOutcome::Spawned { pid })
    }

    /// Stops every supervisor-managed process and removes the registry and
    /// pid files.
    ///
    /// Safe to call when nothing was started and idempotent. Processes that
    /// are already gone and termination failures are logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Environment`] only when the filesystem is
    /// unusable.
    #[instrument(skip(self), fields(server = %self.config.name()))]
    pub async fn stop(&self) -> SupervisorResult<StopOutcome> {
        let registry_path = self.config.registry_path();
        let mut attempted = Vec::new();
        let mut terminated = Vec::new();

        match self.load_registry().await? {
            RegistryContents::Absent => debug!(path = %registry_path, "no registry to stop"),
            RegistryContents::Corrupt(reason) => {
                warn!(path = %registry_path, %reason, "discarding corrupt registry");
            }
            RegistryContents::Valid(set) => match self
                .config
                .registry_policy()
                .first_violation(&set, self.config.subservers())
            {
                Some(violation) => {
                    warn!(path = %registry_path, %violation, "ignoring implausible registry");
                }
                None => {
                    for pid in set.distinct_pids() {
                        attempted.push(pid);
                        if self.terminate_quietly(pid).await {
                            terminated.push(pid);
                        }
                    }
                }
            },
        }

        if let Some(pid) = self.read_pid_file().await?.recorded()
            && !attempted.contains(&pid)
            && self.terminate_quietly(pid).await
        {
            terminated.push(pid);
        }

        self.filesystem.remove(self.config.pid_file()).await?;
        self.filesystem.remove(&registry_path).await?;
        info!(terminated = terminated.len(), "server stopped");
        Ok(StopOutcome { terminated })
    }

    /// Reports whether the recorded instance is alive and serving every
    /// configured port right now. Does not wait and changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Environment`] when the pid file cannot be
    /// read or the process table cannot be queried.
    pub async fn is_running(&self) -> SupervisorResult<bool> {
        let Some(pid) = self.read_pid_file().await?.recorded() else {
            return Ok(false);
        };
        if !self.processes.is_alive(pid).await? {
            return Ok(false);
        }
        Ok(self.all_ports_accepting().await)
    }

    async fn try_reuse(&self) -> SupervisorResult<Option<ProcessId>> {
        let pid_file = self.config.pid_file();
        let pid = match self.read_pid_file().await? {
            PidFileContents::Absent => return Ok(None),
            PidFileContents::NoProcess => {
                self.filesystem.remove(pid_file).await?;
                return Ok(None);
            }
            PidFileContents::Corrupt => {
                warn!(path = %pid_file, "discarding corrupt pid file");
                self.filesystem.remove(pid_file).await?;
                return Ok(None);
            }
            PidFileContents::Recorded(pid) => pid,
        };

        let alive = self.processes.is_alive(pid).await?;
        if alive && self.all_ports_accepting_within(self.config.reuse_poll()).await {
            info!(%pid, "reusing server that is already listening on all ports");
            self.ensure_registry_describes(pid).await?;
            return Ok(Some(pid));
        }

        info!(%pid, alive, "recorded server is not serving all ports; discarding pid file");
        if alive {
            if self.registry_lists(pid).await? {
                self.terminate_quietly(pid).await;
            } else {
                warn!(%pid, "pid file process is not listed by the registry; leaving it running");
            }
        }
        self.filesystem.remove(pid_file).await?;
        Ok(None)
    }

    /// Reports whether a well-formed, plausible registry records `pid` as
    /// the owner of one of the configured ports.
    async fn registry_lists(&self, pid: ProcessId) -> SupervisorResult<bool> {
        let RegistryContents::Valid(set) = self.load_registry().await? else {
            return Ok(false);
        };
        let plausible = self
            .config
            .registry_policy()
            .first_violation(&set, self.config.subservers())
            .is_none();
        Ok(plausible && set.records().iter().any(|record| record.pid() == pid))
    }

    async fn ensure_registry_describes(&self, pid: ProcessId) -> SupervisorResult<()> {
        let expected = SubserverRecordSet::owned_by(self.config.subservers(), pid);
        match self.load_registry().await? {
            RegistryContents::Valid(current) if current == expected => Ok(()),
            _ => {
                debug!(%pid, "rewriting registry for reused server");
                self.write_registry(&expected).await
            }
        }
    }

    async fn discard_previous_registry(&self) -> SupervisorResult<()> {
        let path = self.config.registry_path();
        match self.load_registry().await? {
            RegistryContents::Absent => return Ok(()),
            RegistryContents::Corrupt(reason) => {
                warn!(%path, %reason, "discarding corrupt registry");
            }
            RegistryContents::Valid(set) => match self.assess_registry(&set).await? {
                RegistryAssessment::Stale(reason) => {
                    warn!(%path, %reason, "discarding stale registry");
                }
                RegistryAssessment::Leftover(pids) => {
                    for pid in pids {
                        info!(%pid, "stopping subserver left by an earlier run");
                        self.terminate_quietly(pid).await;
                    }
                }
            },
        }
        self.filesystem.remove(&path).await?;
        Ok(())
    }

    /// Judges a well-formed registry. Implausible records, and ports that are
    /// accepting connections after their recorded owner exited, make it
    /// stale. Otherwise every record still alive and listening is a leftover
    /// of ours.
    async fn assess_registry(
        &self,
        set: &SubserverRecordSet,
    ) -> SupervisorResult<RegistryAssessment> {
        if let Some(violation) = self
            .config
            .registry_policy()
            .first_violation(set, self.config.subservers())
        {
            return Ok(RegistryAssessment::Stale(violation.into()));
        }

        let mut leftovers = Vec::new();
        for record in set.records() {
            let alive = self.processes.is_alive(record.pid()).await?;
            let accepting = self
                .probe
                .is_accepting(self.config.host(), record.port())
                .await;
            match (alive, accepting) {
                (false, true) => {
                    return Ok(RegistryAssessment::Stale(StaleRegistry::PortTakenOver {
                        port: record.port(),
                        pid: record.pid(),
                    }));
                }
                (true, true) if !leftovers.contains(&record.pid()) => leftovers.push(record.pid()),
                _ => {}
            }
        }
        Ok(RegistryAssessment::Leftover(leftovers))
    }

    async fn ensure_ports_available(&self) -> SupervisorResult<()> {
        for subserver in self.config.subservers() {
            if self
                .probe
                .is_accepting(self.config.host(), subserver.port())
                .await
            {
                warn!(%subserver, "configured port is already in use");
                return Err(SupervisorError::PortConflict {
                    protocol: subserver.protocol(),
                    port: subserver.port(),
                });
            }
        }
        Ok(())
    }

    async fn remove_stale_logs(&self) -> SupervisorResult<()> {
        for path in [self.config.stdout_log_path(), self.config.stderr_log_path()] {
            if self.filesystem.remove(&path).await? {
                debug!(%path, "removed stale process log");
            }
        }
        Ok(())
    }

    fn spawn_request(&self) -> SpawnRequest {
        SpawnRequest {
            command: self.config.command().clone(),
            working_directory: self.config.output_dir().to_owned(),
            stdout_log: self.config.stdout_log_path(),
            stderr_log: self.config.stderr_log_path(),
        }
    }

    /// Cleans up after a spawn that never became healthy and builds the
    /// error to report.
    async fn abandon_start(&self, pid: ProcessId, exited: bool) -> SupervisorError {
        let timeout = self.config.startup_poll().timeout();
        if exited {
            warn!(%pid, "server process exited before listening on all ports");
        } else {
            warn!(%pid, ?timeout, "server did not start listening on all ports");
        }
        let diagnostics = self.read_diagnostics().await;
        self.terminate_quietly(pid).await;

        for path in [self.config.pid_file().to_owned(), self.config.registry_path()] {
            if let Err(err) = self.filesystem.remove(&path).await {
                return err.into();
            }
        }

        SupervisorError::ServerDidNotStart {
            name: self.config.name().clone(),
            timeout,
            diagnostics,
        }
    }

    async fn read_diagnostics(&self) -> Option<String> {
        let text = self
            .filesystem
            .read_text(&self.config.stderr_log_path())
            .await
            .ok()
            .flatten()?;
        let lines: Vec<&str> = text.lines().collect();
        let tail = lines
            .get(lines.len().saturating_sub(DIAGNOSTIC_LINES)..)
            .unwrap_or_default()
            .join("\n");
        let trimmed = tail.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_owned())
    }

    /// Terminates `pid`, returning whether a running process was stopped.
    async fn terminate_quietly(&self, pid: ProcessId) -> bool {
        match self
            .processes
            .terminate(pid, self.config.termination_grace())
            .await
        {
            Ok(()) => {
                debug!(%pid, "terminated process");
                true
            }
            Err(ProcessControlError::NotFound(_)) => {
                debug!(%pid, "process already gone");
                false
            }
            Err(err) => {
                warn!(%pid, error = %err, "failed to terminate process");
                false
            }
        }
    }

    async fn all_ports_accepting(&self) -> bool {
        for subserver in self.config.subservers() {
            if !self
                .probe
                .is_accepting(self.config.host(), subserver.port())
                .await
            {
                return false;
            }
        }
        true
    }

    /// Health check for a freshly spawned server. Settles once every port
    /// accepts, or once the process is gone, which is flagged in `exited`.
    async fn listening_or_exited(&self, pid: ProcessId, exited: &AtomicBool) -> bool {
        if self.all_ports_accepting().await {
            return true;
        }
        if matches!(self.processes.is_alive(pid).await, Ok(false)) {
            exited.store(true, Ordering::SeqCst);
            return true;
        }
        false
    }

    async fn all_ports_accepting_within(&self, settings: &PollSettings) -> bool {
        poll_until(settings, || self.all_ports_accepting()).await
    }

    async fn read_pid_file(&self) -> SupervisorResult<PidFileContents> {
        match self.filesystem.read_text(self.config.pid_file()).await {
            Ok(text) => Ok(PidFileContents::from_file_text(text.as_deref())),
            Err(FilesystemError::NotText(_)) => Ok(PidFileContents::Corrupt),
            Err(err) => Err(err.into()),
        }
    }

    async fn load_registry(&self) -> SupervisorResult<RegistryContents> {
        match self.filesystem.read_text(&self.config.registry_path()).await {
            Ok(text) => Ok(RegistryContents::from_file_text(text.as_deref())),
            Err(FilesystemError::NotText(_)) => {
                Ok(RegistryContents::Corrupt(RegistryCorruption::NotText))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn write_registry(&self, set: &SubserverRecordSet) -> SupervisorResult<()> {
        let text = set
            .to_registry_text()
            .map_err(|err| EnvironmentFailure::Serialisation(Arc::new(err)))?;
        self.filesystem
            .write_text(&self.config.registry_path(), &text)
            .await?;
        Ok(())
    }
}
