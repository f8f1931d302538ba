//! Then steps for server family lifecycle BDD scenarios.

use super::world::SupervisorWorld;
use harbourmaster::supervisor::{
    domain::{PidFileContents, ProcessId, RegistryContents, SubserverRecordSet},
    services::{StartOutcome, SupervisorError},
};
use rstest_bdd_macros::then;

fn start_outcome(world: &SupervisorWorld) -> Result<StartOutcome, eyre::Report> {
    match world.last_start.as_ref() {
        Some(Ok(outcome)) => Ok(*outcome),
        Some(Err(err)) => Err(eyre::eyre!("start failed: {err}")),
        None => Err(eyre::eyre!("missing start result")),
    }
}

fn start_error(world: &SupervisorWorld) -> Result<&SupervisorError, eyre::Report> {
    match world.last_start.as_ref() {
        Some(Err(err)) => Ok(err),
        Some(Ok(outcome)) => Err(eyre::eyre!("expected start to fail, got {outcome:?}")),
        None => Err(eyre::eyre!("missing start result")),
    }
}

fn running_pid(world: &SupervisorWorld) -> Result<ProcessId, eyre::Report> {
    let running = world.host.running();
    match running.iter().copied().collect::<Vec<_>>().as_slice() {
        [pid] => Ok(*pid),
        other => Err(eyre::eyre!("expected one running process, found {other:?}")),
    }
}

#[then("the server was spawned")]
fn server_was_spawned(world: &SupervisorWorld) -> Result<(), eyre::Report> {
    let outcome = start_outcome(world)?;
    if !outcome.spawned() {
        return Err(eyre::eyre!("expected a fresh spawn, got {outcome:?}"));
    }
    Ok(())
}

#[then("the running server was reused")]
fn server_was_reused(world: &SupervisorWorld) -> Result<(), eyre::Report> {
    let outcome = start_outcome(world)?;
    let pid = running_pid(world)?;
    if outcome != (StartOutcome::Reused { pid }) {
        return Err(eyre::eyre!("expected reuse of {pid}, got {outcome:?}"));
    }
    Ok(())
}

#[then("the registry records every port for the running server")]
fn registry_records_ports(world: &SupervisorWorld) -> Result<(), eyre::Report> {
    let supervisor = world.supervisor()?;
    let pid = running_pid(world)?;
    let text = world.filesystem.contents(supervisor.registry_path());
    let expected = SubserverRecordSet::owned_by(supervisor.config().subservers(), pid);
    match RegistryContents::from_file_text(text.as_deref()) {
        RegistryContents::Valid(set) if set == expected => Ok(()),
        other => Err(eyre::eyre!("expected registry {expected:?}, found {other:?}")),
    }
}

#[then("the pid file names the running server")]
fn pid_file_names_server(world: &SupervisorWorld) -> Result<(), eyre::Report> {
    let supervisor = world.supervisor()?;
    let pid = running_pid(world)?;
    let text = world.filesystem.contents(supervisor.pid_file_path());
    let recorded = PidFileContents::from_file_text(text.as_deref()).recorded();
    if recorded != Some(pid) {
        return Err(eyre::eyre!("expected pid file to name {pid}, found {recorded:?}"));
    }
    Ok(())
}

#[then("the unrelated process is still running")]
fn bystander_survives(world: &SupervisorWorld) -> Result<(), eyre::Report> {
    let pid = world
        .bystander
        .ok_or_else(|| eyre::eyre!("missing unrelated process in scenario world"))?;
    if !world.host.running().contains(&pid) || world.host.terminated().contains(&pid) {
        return Err(eyre::eyre!("expected {pid} to be left alone"));
    }
    Ok(())
}

#[then("the pid file names the server that was started")]
fn pid_file_names_started_server(world: &SupervisorWorld) -> Result<(), eyre::Report> {
    let pid = start_outcome(world)?.pid();
    let supervisor = world.supervisor()?;
    let text = world.filesystem.contents(supervisor.pid_file_path());
    let recorded = PidFileContents::from_file_text(text.as_deref()).recorded();
    if recorded != Some(pid) {
        return Err(eyre::eyre!("expected pid file to name {pid}, found {recorded:?}"));
    }
    Ok(())
}

#[then("the spawn count is {count:usize}")]
fn spawn_count_is(world: &SupervisorWorld, count: usize) -> Result<(), eyre::Report> {
    let actual = world.host.spawn_count();
    if actual != count {
        return Err(eyre::eyre!("expected {count} spawns, found {actual}"));
    }
    Ok(())
}

#[then("the stop succeeds")]
fn stop_succeeds(world: &SupervisorWorld) -> Result<(), eyre::Report> {
    match world.last_stop.as_ref() {
        Some(Ok(_)) => Ok(()),
        Some(Err(err)) => Err(eyre::eyre!("stop failed: {err}")),
        None => Err(eyre::eyre!("missing stop result")),
    }
}

#[then("no server process is running")]
fn nothing_running(world: &SupervisorWorld) -> Result<(), eyre::Report> {
    let running = world.host.running();
    if !running.is_empty() {
        return Err(eyre::eyre!("expected no running processes, found {running:?}"));
    }
    Ok(())
}

#[then("neither the registry nor the pid file exists")]
fn no_persisted_state(world: &SupervisorWorld) -> Result<(), eyre::Report> {
    let supervisor = world.supervisor()?;
    for path in [
        supervisor.registry_path(),
        supervisor.pid_file_path().to_owned(),
    ] {
        if world.filesystem.contains(&path) {
            return Err(eyre::eyre!("expected {path} to be removed"));
        }
    }
    Ok(())
}

#[then("the start fails with a port conflict on port {port:u16}")]
fn start_fails_with_conflict(world: &SupervisorWorld, port: u16) -> Result<(), eyre::Report> {
    let err = start_error(world)?;
    if !matches!(err, SupervisorError::PortConflict { port: actual, .. } if *actual == port) {
        return Err(eyre::eyre!("expected port conflict on {port}, got {err:?}"));
    }
    Ok(())
}

#[then("the start fails because the server did not start")]
fn start_fails_with_timeout(world: &SupervisorWorld) -> Result<(), eyre::Report> {
    let err = start_error(world)?;
    if !matches!(err, SupervisorError::ServerDidNotStart { .. }) {
        return Err(eyre::eyre!("expected ServerDidNotStart, got {err:?}"));
    }
    Ok(())
}
