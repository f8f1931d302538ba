//! Given steps for server family lifecycle BDD scenarios.

use super::world::{SupervisorWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::given;

#[given(r#"a supervisor for "{name}" serving ports {http_port:u16} and {https_port:u16}"#)]
fn supervisor_for_family(
    world: &mut SupervisorWorld,
    name: String,
    http_port: u16,
    https_port: u16,
) -> Result<(), eyre::Report> {
    world.configure(&name, http_port, https_port)
}

#[given("the server has been started")]
fn server_started(world: &mut SupervisorWorld) -> Result<(), eyre::Report> {
    run_async(world.supervisor()?.start()).wrap_err("start server in scenario setup")?;
    Ok(())
}

#[given(r#"the registry file contains "{contents}""#)]
fn registry_contains(world: &mut SupervisorWorld, contents: String) -> Result<(), eyre::Report> {
    let path = world.supervisor()?.registry_path();
    world.filesystem.insert_text(&path, &contents)?;
    Ok(())
}

#[given("another process is listening on port {port:u16}")]
fn foreign_listener(world: &mut SupervisorWorld, port: u16) -> Result<(), eyre::Report> {
    world.host.start_external_process([port])?;
    Ok(())
}

#[given("the pid file names an unrelated process that listens on no port")]
fn pid_file_names_bystander(world: &mut SupervisorWorld) -> Result<(), eyre::Report> {
    let pid = world.host.start_external_process(std::iter::empty())?;
    let path = world.supervisor()?.pid_file_path().to_owned();
    world.filesystem.insert_text(&path, &format!("{pid}\n"))?;
    world.bystander = Some(pid);
    Ok(())
}

#[given("spawned servers only listen on port {port:u16}")]
fn partial_listener(world: &mut SupervisorWorld, port: u16) -> Result<(), eyre::Report> {
    world.host.listen_on_spawn([port])?;
    Ok(())
}
