//! In-memory host adapter simulating a process table and TCP listeners.

use crate::supervisor::{
    domain::ProcessId,
    ports::{PortProbe, ProcessControl, ProcessControlError, ProcessControlResult, SpawnRequest},
};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// First process identifier handed out by the simulated host.
const FIRST_SIMULATED_PID: u32 = 4000;

/// In-memory host shared by the process and port-probe ports.
///
/// Spawned processes bind the ports set with
/// [`InMemoryHost::listen_on_spawn`]. Foreign processes and out-of-band kills
/// can be simulated to exercise recovery paths. The probe ignores the host
/// name and answers from the simulated listener table.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHost {
    state: Arc<RwLock<InMemoryHostState>>,
}

#[derive(Debug, Default)]
struct InMemoryHostState {
    last_pid: Option<u32>,
    running: HashSet<ProcessId>,
    listeners: HashMap<u16, ProcessId>,
    ports_on_spawn: BTreeSet<u16>,
    spawn_failure: Option<String>,
    exit_on_spawn: bool,
    spawned: Vec<SpawnRequest>,
    terminated: Vec<ProcessId>,
}

impl InMemoryHostState {
    fn allocate_pid(&mut self) -> ProcessControlResult<ProcessId> {
        let next = self
            .last_pid
            .map_or(FIRST_SIMULATED_PID, |last| last.saturating_add(1));
        let pid = ProcessId::new(next).map_err(ProcessControlError::runtime)?;
        self.last_pid = Some(next);
        Ok(pid)
    }

    fn remove_process(&mut self, pid: ProcessId) -> bool {
        self.listeners.retain(|_, owner| *owner != pid);
        self.running.remove(&pid)
    }
}

fn lock_error(err: impl ToString) -> ProcessControlError {
    ProcessControlError::runtime(std::io::Error::other(err.to_string()))
}

impl InMemoryHost {
    /// Creates a host with no processes and no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ports every subsequently spawned process binds.
    ///
    /// # Errors
    ///
    /// Returns process control errors when lock acquisition fails.
    pub fn listen_on_spawn(&self, ports: impl IntoIterator<Item = u16>) -> ProcessControlResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        state.ports_on_spawn = ports.into_iter().collect();
        Ok(())
    }

    /// Makes every subsequent spawn fail with `message`.
    ///
    /// # Errors
    ///
    /// Returns process control errors when lock acquisition fails.
    pub fn fail_spawns(&self, message: impl Into<String>) -> ProcessControlResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        state.spawn_failure = Some(message.into());
        Ok(())
    }

    /// Makes every subsequently spawned process exit straight away without
    /// binding any port, like a server rejecting its arguments.
    ///
    /// # Errors
    ///
    /// Returns process control errors when lock acquisition fails.
    pub fn exit_on_spawn(&self) -> ProcessControlResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        state.exit_on_spawn = true;
        Ok(())
    }

    /// Adds a running process that binds `ports`, as if started elsewhere.
    ///
    /// # Errors
    ///
    /// Returns process control errors when lock acquisition fails.
    pub fn start_external_process(
        &self,
        ports: impl IntoIterator<Item = u16>,
    ) -> ProcessControlResult<ProcessId> {
        let mut state = self.state.write().map_err(lock_error)?;
        let pid = state.allocate_pid()?;
        state.running.insert(pid);
        for port in ports {
            state.listeners.insert(port, pid);
        }
        Ok(pid)
    }

    /// Kills a process without going through the supervisor.
    ///
    /// # Errors
    ///
    /// Returns process control errors when lock acquisition fails.
    pub fn kill_out_of_band(&self, pid: ProcessId) -> ProcessControlResult<bool> {
        let mut state = self.state.write().map_err(lock_error)?;
        Ok(state.remove_process(pid))
    }

    /// Returns every spawn request received, in order.
    #[must_use]
    pub fn spawned(&self) -> Vec<SpawnRequest> {
        self.state
            .read()
            .map(|state| state.spawned.clone())
            .unwrap_or_default()
    }

    /// Returns the number of processes spawned through the port.
    #[must_use]
    pub fn spawn_count(&self) -> usize {
        self.state.read().map_or(0, |state| state.spawned.len())
    }

    /// Returns every process terminated through the port, in order.
    #[must_use]
    pub fn terminated(&self) -> Vec<ProcessId> {
        self.state
            .read()
            .map(|state| state.terminated.clone())
            .unwrap_or_default()
    }

    /// Returns the identifiers of all running processes.
    #[must_use]
    pub fn running(&self) -> BTreeSet<ProcessId> {
        self.state
            .read()
            .map(|state| state.running.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns the process listening on `port`, if any.
    #[must_use]
    pub fn listener(&self, port: u16) -> Option<ProcessId> {
        self.state
            .read()
            .ok()
            .and_then(|state| state.listeners.get(&port).copied())
    }
}

#[async_trait]
impl ProcessControl for InMemoryHost {
    async fn spawn(&self, request: &SpawnRequest) -> ProcessControlResult<ProcessId> {
        let mut state = self.state.write().map_err(lock_error)?;
        if let Some(message) = state.spawn_failure.clone() {
            return Err(ProcessControlError::spawn(
                request.command.program(),
                std::io::Error::new(std::io::ErrorKind::NotFound, message),
            ));
        }

        let pid = state.allocate_pid()?;
        state.spawned.push(request.clone());
        if state.exit_on_spawn {
            return Ok(pid);
        }
        state.running.insert(pid);
        let ports: Vec<u16> = state.ports_on_spawn.iter().copied().collect();
        for port in ports {
            state.listeners.entry(port).or_insert(pid);
        }
        Ok(pid)
    }

    async fn is_alive(&self, pid: ProcessId) -> ProcessControlResult<bool> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.running.contains(&pid))
    }

    async fn terminate(&self, pid: ProcessId, _grace: Duration) -> ProcessControlResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        state.terminated.push(pid);
        if state.remove_process(pid) {
            Ok(())
        } else {
            Err(ProcessControlError::NotFound(pid))
        }
    }
}

#[async_trait]
impl PortProbe for InMemoryHost {
    async fn is_accepting(&self, _host: &str, port: u16) -> bool {
        self.state
            .read()
            .is_ok_and(|state| state.listeners.contains_key(&port))
    }
}
