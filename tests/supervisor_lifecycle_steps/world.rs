//! Shared world state for server family lifecycle BDD scenarios.

use std::sync::Arc;
use std::time::Duration;

use harbourmaster::supervisor::{
    adapters::memory::{InMemoryFilesystem, InMemoryHost},
    domain::{
        PollSettings, ProcessId, Protocol, ServerCommand, ServerName, SubserverPort,
        SupervisorConfig,
    },
    services::{ServerSupervisor, StartOutcome, StopOutcome, SupervisorResult},
};
use rstest::fixture;

/// Supervisor type used by the BDD world.
pub type TestSupervisor = ServerSupervisor<InMemoryFilesystem, InMemoryHost, InMemoryHost>;

/// Scenario world for supervisor lifecycle behaviour tests.
pub struct SupervisorWorld {
    pub filesystem: Arc<InMemoryFilesystem>,
    pub host: Arc<InMemoryHost>,
    pub supervisor: Option<TestSupervisor>,
    pub bystander: Option<ProcessId>,
    pub last_start: Option<SupervisorResult<StartOutcome>>,
    pub last_stop: Option<SupervisorResult<StopOutcome>>,
}

impl SupervisorWorld {
    /// Creates a world with an empty simulated host.
    #[must_use]
    pub fn new() -> Self {
        Self {
            filesystem: Arc::new(InMemoryFilesystem::new()),
            host: Arc::new(InMemoryHost::new()),
            supervisor: None,
            bystander: None,
            last_start: None,
            last_stop: None,
        }
    }

    /// Builds the supervisor for `name` serving HTTP on `http_port` and HTTPS
    /// on `https_port`, with spawned servers binding both.
    pub fn configure(
        &mut self,
        name: &str,
        http_port: u16,
        https_port: u16,
    ) -> Result<(), eyre::Report> {
        let startup = PollSettings::new(Duration::from_millis(200), Duration::from_millis(10))?;
        let reuse = PollSettings::new(Duration::from_millis(50), Duration::from_millis(10))?;
        let config = SupervisorConfig::new(
            ServerName::new(name)?,
            "/srv/results",
            format!("/srv/results/{name}_pid.txt"),
            ServerCommand::new("wpt")?.with_args(["serve".to_owned()]),
        )?
        .with_subservers([
            SubserverPort::new(Protocol::Http, http_port)?,
            SubserverPort::new(Protocol::Https, https_port)?,
        ])?
        .with_startup_poll(startup)
        .with_reuse_poll(reuse);

        self.host.listen_on_spawn([http_port, https_port])?;
        self.supervisor = Some(ServerSupervisor::new(
            config,
            self.filesystem.clone(),
            self.host.clone(),
            self.host.clone(),
        ));
        Ok(())
    }

    /// Returns the configured supervisor.
    pub fn supervisor(&self) -> Result<&TestSupervisor, eyre::Report> {
        self.supervisor
            .as_ref()
            .ok_or_else(|| eyre::eyre!("missing supervisor in scenario world"))
    }
}

impl Default for SupervisorWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> SupervisorWorld {
    SupervisorWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
