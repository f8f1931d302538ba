//! Supervisor tests driving the ports through `mockall` doubles.

use crate::supervisor::{
    adapters::memory::InMemoryFilesystem,
    domain::{
        PollSettings, ProcessId, Protocol, ServerCommand, ServerName, SubserverPort,
        SubserverRecordSet, SupervisorConfig,
    },
    ports::{
        FilesystemError, MockFilesystem, MockPortProbe, MockProcessControl, ProcessControlError,
    },
    services::{EnvironmentFailure, ServerSupervisor, SupervisorError},
};
use rstest::{fixture, rstest};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

const STDERR_LOG: &str = "/srv/out/wpttest_process_log.err.txt";
const REGISTRY: &str = "/srv/out/wpttest_servers.json";
const PID_FILE: &str = "/srv/out/wpttest_pid.txt";

fn pid(raw: u32) -> ProcessId {
    ProcessId::new(raw).expect("non-zero pid")
}

#[fixture]
fn config() -> SupervisorConfig {
    SupervisorConfig::new(
        ServerName::new("wpttest").expect("valid name"),
        "/srv/out",
        PID_FILE,
        ServerCommand::new("wpt").expect("valid command"),
    )
    .expect("valid config")
    .with_subservers([SubserverPort::new(Protocol::Http, 8800).expect("valid port")])
    .expect("unique ports")
    .with_startup_poll(
        PollSettings::new(Duration::from_millis(300), Duration::from_millis(20))
            .expect("valid poll settings"),
    )
}

fn silent_probe() -> MockPortProbe {
    let mut probe = MockPortProbe::new();
    probe.expect_is_accepting().returning(|_, _| false);
    probe
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn failed_start_reports_stderr_tail(config: SupervisorConfig) {
    let filesystem = Arc::new(InMemoryFilesystem::new());
    let log_sink = filesystem.as_ref().clone();
    let mut processes = MockProcessControl::new();
    processes.expect_spawn().times(1).returning(move |_| {
        let mut stderr = String::new();
        for line in 1..=25 {
            writeln!(stderr, "traceback line {line}").map_err(ProcessControlError::runtime)?;
        }
        log_sink
            .insert_text(STDERR_LOG, &stderr)
            .map_err(ProcessControlError::runtime)?;
        Ok(pid(5150))
    });
    processes.expect_is_alive().returning(|_| Ok(true));
    processes
        .expect_terminate()
        .withf(|target, _| *target == pid(5150))
        .times(1)
        .returning(|_, _| Ok(()));

    let supervisor = ServerSupervisor::new(
        config,
        filesystem.clone(),
        Arc::new(processes),
        Arc::new(silent_probe()),
    );
    let result = supervisor.start().await;

    let Err(SupervisorError::ServerDidNotStart {
        diagnostics: Some(diagnostics),
        ..
    }) = result
    else {
        panic!("expected ServerDidNotStart with diagnostics, got {result:?}");
    };
    assert!(diagnostics.starts_with("traceback line 6"));
    assert!(diagnostics.ends_with("traceback line 25"));
    assert!(!filesystem.contains(PID_FILE));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn crashed_server_is_reported_on_first_liveness_check(config: SupervisorConfig) {
    let filesystem = Arc::new(InMemoryFilesystem::new());
    let log_sink = filesystem.as_ref().clone();
    let mut processes = MockProcessControl::new();
    processes.expect_spawn().times(1).returning(move |_| {
        log_sink
            .insert_text(STDERR_LOG, "error: unrecognised argument --bogus\n")
            .map_err(ProcessControlError::runtime)?;
        Ok(pid(6001))
    });
    processes
        .expect_is_alive()
        .withf(|target| *target == pid(6001))
        .times(1)
        .returning(|_| Ok(false));
    processes
        .expect_terminate()
        .times(1)
        .returning(|target, _| Err(ProcessControlError::NotFound(target)));

    let supervisor = ServerSupervisor::new(
        config,
        filesystem.clone(),
        Arc::new(processes),
        Arc::new(silent_probe()),
    );
    let began = tokio::time::Instant::now();
    let result = supervisor.start().await;

    let Err(SupervisorError::ServerDidNotStart {
        diagnostics: Some(diagnostics),
        ..
    }) = result
    else {
        panic!("expected ServerDidNotStart with diagnostics, got {result:?}");
    };
    assert_eq!(diagnostics, "error: unrecognised argument --bogus");
    assert!(began.elapsed() < Duration::from_millis(20));
    assert!(!filesystem.contains(PID_FILE));
}

#[rstest]
#[tokio::test]
async fn configured_host_and_grace_reach_the_ports(config: SupervisorConfig) {
    let remote = config
        .with_host("localhost")
        .expect("valid host")
        .with_termination_grace(Duration::from_millis(250));
    let filesystem = Arc::new(InMemoryFilesystem::new());
    filesystem
        .insert_text(PID_FILE, "4242\n")
        .expect("seed pid file");

    let mut processes = MockProcessControl::new();
    processes.expect_is_alive().returning(|_| Ok(true));
    processes
        .expect_terminate()
        .withf(|target, grace| *target == pid(4242) && *grace == Duration::from_millis(250))
        .times(1)
        .returning(|_, _| Ok(()));
    let mut probe = MockPortProbe::new();
    probe
        .expect_is_accepting()
        .withf(|host, port| host == "localhost" && *port == 8800)
        .returning(|_, _| true);

    let supervisor =
        ServerSupervisor::new(remote, filesystem, Arc::new(processes), Arc::new(probe));

    assert!(supervisor.is_running().await.expect("query"));
    let stopped = supervisor.stop().await.expect("stop should succeed");
    assert_eq!(stopped.terminated(), [pid(4242)]);
}

#[rstest]
#[tokio::test]
async fn pid_file_write_failure_terminates_spawned_process(config: SupervisorConfig) {
    let mut filesystem = MockFilesystem::new();
    filesystem.expect_read_text().returning(|_| Ok(None));
    filesystem.expect_remove().returning(|_| Ok(false));
    filesystem
        .expect_write_text()
        .times(1)
        .returning(|path, _| Err(FilesystemError::io(path, std::io::Error::other("disk full"))));

    let mut processes = MockProcessControl::new();
    processes.expect_spawn().times(1).returning(|_| Ok(pid(7)));
    processes
        .expect_terminate()
        .withf(|target, _| *target == pid(7))
        .times(1)
        .returning(|_, _| Ok(()));

    let supervisor = ServerSupervisor::new(
        config,
        Arc::new(filesystem),
        Arc::new(processes),
        Arc::new(silent_probe()),
    );
    let result = supervisor.start().await;

    assert!(matches!(
        result,
        Err(SupervisorError::Environment(EnvironmentFailure::Filesystem(
            FilesystemError::Io { .. }
        )))
    ));
}

#[rstest]
#[tokio::test]
async fn unreadable_state_aborts_start_before_spawning(config: SupervisorConfig) {
    let mut filesystem = MockFilesystem::new();
    filesystem.expect_read_text().returning(|path| {
        Err(FilesystemError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        ))
    });
    let mut processes = MockProcessControl::new();
    processes.expect_spawn().never();

    let supervisor = ServerSupervisor::new(
        config,
        Arc::new(filesystem),
        Arc::new(processes),
        Arc::new(silent_probe()),
    );

    assert!(matches!(
        supervisor.start().await,
        Err(SupervisorError::Environment(EnvironmentFailure::Filesystem(
            _
        )))
    ));
}

#[rstest]
#[tokio::test]
async fn stop_logs_and_skips_termination_failures(config: SupervisorConfig) {
    let filesystem = Arc::new(InMemoryFilesystem::new());
    let set = SubserverRecordSet::owned_by(config.subservers(), pid(31));
    filesystem
        .insert_text(REGISTRY, &set.to_registry_text().expect("serialisable"))
        .expect("seed registry");
    filesystem
        .insert_text(PID_FILE, "31\n")
        .expect("seed pid file");

    let mut processes = MockProcessControl::new();
    processes
        .expect_terminate()
        .times(1)
        .returning(|_, _| {
            Err(ProcessControlError::runtime(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "operation not permitted",
            )))
        });

    let supervisor = ServerSupervisor::new(
        config,
        filesystem.clone(),
        Arc::new(processes),
        Arc::new(silent_probe()),
    );
    let stopped = supervisor.stop().await.expect("stop should succeed");

    assert!(stopped.terminated().is_empty());
    assert!(!filesystem.contains(REGISTRY));
    assert!(!filesystem.contains(PID_FILE));
}
