//! Operating-system process adapter for Unix hosts.

use crate::supervisor::{
    domain::ProcessId,
    ports::{ProcessControl, ProcessControlError, ProcessControlResult, SpawnRequest},
};
use async_trait::async_trait;
use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill, killpg};
use nix::unistd::{Pid, getpgid};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::{Child, Command};

/// Interval between liveness checks while waiting for a process to exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound on waiting for a killed process that is not our child.
const KILL_SETTLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Spawns and signals real processes.
///
/// Spawned servers are placed in their own process group so that signals
/// reach any helper processes they fork. Children spawned by this adapter are
/// retained so their exit can be observed and reaped; processes recorded by
/// earlier invocations are probed and signalled by pid alone.
#[derive(Debug, Clone, Default)]
pub struct OsProcessControl {
    children: Arc<Mutex<HashMap<ProcessId, Child>>>,
}

impl OsProcessControl {
    /// Creates the adapter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_children(
        &self,
    ) -> ProcessControlResult<std::sync::MutexGuard<'_, HashMap<ProcessId, Child>>> {
        self.children
            .lock()
            .map_err(|err| ProcessControlError::runtime(std::io::Error::other(err.to_string())))
    }

    /// Checks an owned child, reaping it when it has exited. Returns `None`
    /// when `pid` was not spawned by this adapter.
    fn owned_child_alive(&self, pid: ProcessId) -> ProcessControlResult<Option<bool>> {
        let mut children = self.lock_children()?;
        let Some(child) = children.get_mut(&pid) else {
            return Ok(None);
        };
        match child.try_wait() {
            Ok(None) => Ok(Some(true)),
            Ok(Some(status)) => {
                tracing::debug!(%pid, %status, "reaped exited server process");
                children.remove(&pid);
                Ok(Some(false))
            }
            Err(err) => Err(ProcessControlError::runtime(err)),
        }
    }

    async fn wait_for_exit(&self, pid: ProcessId, limit: Duration) -> ProcessControlResult<bool> {
        let waiting = async {
            loop {
                if !self.is_alive(pid).await? {
                    return Ok::<(), ProcessControlError>(());
                }
                tokio::time::sleep(EXIT_POLL_INTERVAL).await;
            }
        };
        match tokio::time::timeout(limit, waiting).await {
            Ok(result) => result.map(|()| true),
            Err(_) => Ok(false),
        }
    }

    async fn reap_owned(&self, pid: ProcessId) -> ProcessControlResult<()> {
        let child = self.lock_children()?.remove(&pid);
        if let Some(mut owned) = child {
            owned.wait().await.map_err(ProcessControlError::runtime)?;
        }
        Ok(())
    }
}

fn to_nix_pid(pid: ProcessId) -> ProcessControlResult<Pid> {
    i32::try_from(pid.get())
        .map(Pid::from_raw)
        .map_err(ProcessControlError::runtime)
}

/// Signals the process group led by `pid` when there is one, otherwise the
/// process alone.
fn deliver(pid: ProcessId, signal: Signal) -> ProcessControlResult<()> {
    let target = to_nix_pid(pid)?;
    let leads_group = getpgid(Some(target)).is_ok_and(|group| group == target);
    let outcome = if leads_group {
        killpg(target, signal)
    } else {
        kill(target, signal)
    };
    match outcome {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => Err(ProcessControlError::NotFound(pid)),
        Err(errno) => Err(ProcessControlError::runtime(std::io::Error::from(errno))),
    }
}

fn open_log(path: &Utf8Path) -> std::io::Result<Stdio> {
    let parent = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| std::io::Error::other(format!("log path {path} has no file name")))?;
    Dir::create_ambient_dir_all(parent, ambient_authority())?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())?;
    let file = dir.create(file_name)?;
    Ok(Stdio::from(file.into_std()))
}

#[async_trait]
impl ProcessControl for OsProcessControl {
    async fn spawn(&self, request: &SpawnRequest) -> ProcessControlResult<ProcessId> {
        let program = request.command.program();
        let stdout = open_log(&request.stdout_log)
            .map_err(|err| ProcessControlError::spawn(program, err))?;
        let stderr = open_log(&request.stderr_log)
            .map_err(|err| ProcessControlError::spawn(program, err))?;

        let child = Command::new(program)
            .args(request.command.args())
            .envs(request.command.env())
            .current_dir(request.working_directory.as_std_path())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .process_group(0)
            .spawn()
            .map_err(|err| ProcessControlError::spawn(program, err))?;

        let raw_pid = child.id().ok_or_else(|| {
            ProcessControlError::spawn(
                program,
                std::io::Error::other("process exited before its id could be read"),
            )
        })?;
        let pid = ProcessId::new(raw_pid).map_err(ProcessControlError::runtime)?;
        self.lock_children()?.insert(pid, child);
        tracing::debug!(%pid, program, "spawned server process");
        Ok(pid)
    }

    async fn is_alive(&self, pid: ProcessId) -> ProcessControlResult<bool> {
        if let Some(alive) = self.owned_child_alive(pid)? {
            return Ok(alive);
        }
        match kill(to_nix_pid(pid)?, None) {
            Ok(()) | Err(Errno::EPERM) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(errno) => Err(ProcessControlError::runtime(std::io::Error::from(errno))),
        }
    }

    async fn terminate(&self, pid: ProcessId, grace: Duration) -> ProcessControlResult<()> {
        if !self.is_alive(pid).await? {
            return Err(ProcessControlError::NotFound(pid));
        }

        deliver(pid, Signal::SIGTERM)?;
        if self.wait_for_exit(pid, grace).await? {
            return self.reap_owned(pid).await;
        }

        tracing::warn!(%pid, ?grace, "process ignored SIGTERM, sending SIGKILL");
        match deliver(pid, Signal::SIGKILL) {
            Ok(()) | Err(ProcessControlError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }
        self.reap_owned(pid).await?;
        if !self.wait_for_exit(pid, KILL_SETTLE_TIMEOUT).await? {
            return Err(ProcessControlError::runtime(std::io::Error::other(format!(
                "process {pid} survived SIGKILL"
            ))));
        }
        Ok(())
    }
}
