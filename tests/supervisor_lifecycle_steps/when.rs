//! When steps for server family lifecycle BDD scenarios.

use super::world::{SupervisorWorld, run_async};
use rstest_bdd_macros::when;

#[when("the supervisor starts the server")]
fn start_server(world: &mut SupervisorWorld) -> Result<(), eyre::Report> {
    let result = run_async(world.supervisor()?.start());
    world.last_start = Some(result);
    Ok(())
}

#[when("the supervisor stops the server")]
fn stop_server(world: &mut SupervisorWorld) -> Result<(), eyre::Report> {
    let result = run_async(world.supervisor()?.stop());
    world.last_stop = Some(result);
    Ok(())
}
