//! Tests for registration
//!
//! Tests the registration flow including:
//! - Reply grammar (`OK <id>`, `KO ...`, anything else)
//! - Identity carried by the register command
//! - Behavior when rstats never answers

use super::fixtures::{FakeDaemon, capture_logs, config_for, ping_agent};
use crate::agent::CollectAgent;
use crate::environment::JobEnvironment;
use crate::logging::{Facility, LogOptions};
use crate::Error;
use collect_agent_rpc::Command;
use std::time::{Duration, Instant};

async fn register_with_reply(reply: &str) -> (bool, u32) {
    let temp_dir = tempfile::tempdir().unwrap();
    let daemon = FakeDaemon::replying(&[reply]).await;
    let mut agent = ping_agent(&daemon, temp_dir.path());
    let registered = agent
        .register("/opt/ping.conf", LogOptions::PID, Facility::USER, false)
        .await;
    (registered, agent.session().connection_id())
}

#[tokio::test]
async fn test_register_ok_reply() {
    assert_eq!(register_with_reply("OK 42").await, (true, 42));
}

#[tokio::test]
async fn test_register_ko_reply() {
    assert_eq!(register_with_reply("KO anything").await, (false, 0));
}

#[tokio::test]
async fn test_register_garbage_reply() {
    assert_eq!(register_with_reply("garbage").await, (false, 0));
}

#[tokio::test]
async fn test_register_ok_zero_is_success() {
    assert_eq!(register_with_reply("OK 0").await, (true, 0));
}

#[tokio::test]
async fn test_register_ok_without_id_is_malformed() {
    assert_eq!(register_with_reply("OK").await, (false, 0));
    assert_eq!(register_with_reply("OK -1").await, (false, 0));
}

#[tokio::test]
async fn test_register_sends_identity() {
    let temp_dir = tempfile::tempdir().unwrap();
    let agent_name_file = temp_dir.path().join("agent_name");
    std::fs::write(&agent_name_file, "agent-7\n").unwrap();

    let daemon = FakeDaemon::replying(&["OK 5"]).await;
    let mut config = config_for(&daemon, temp_dir.path());
    config.agent_name_files = vec![agent_name_file];
    let mut agent = CollectAgent::new(config).with_environment(super::fixtures::ping_environment());

    assert!(
        agent
            .register("/opt/ping.conf", LogOptions::PID, Facility::USER, true)
            .await
    );

    let commands = daemon.commands();
    assert_eq!(commands.len(), 1);
    let Command::Register(params) = &commands[0] else {
        panic!("expected a register command, got {:?}", commands[0]);
    };
    assert_eq!(params.confpath, "/opt/ping.conf");
    assert_eq!(params.job_name, "ping");
    assert_eq!(params.agent_name, "agent-7");
    assert_eq!(params.job_instance_id, 3);
    assert_eq!(params.scenario_instance_id, 17);
    assert_eq!(params.owner_scenario_instance_id, 16);
    assert!(params.overwrite);

    assert_eq!(agent.session().identity().agent_name, "agent-7");
}

#[tokio::test]
async fn test_register_without_agent_name_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let daemon = FakeDaemon::replying(&["OK 1"]).await;
    let mut agent = ping_agent(&daemon, temp_dir.path());

    agent
        .register("", LogOptions::default(), Facility::default(), false)
        .await;
    assert_eq!(
        agent.session().identity().agent_name,
        "agent_name_not_found"
    );
}

#[tokio::test]
async fn test_register_defaults_without_environment() {
    let temp_dir = tempfile::tempdir().unwrap();
    let daemon = FakeDaemon::replying(&["OK 1"]).await;
    let mut agent = CollectAgent::new(config_for(&daemon, temp_dir.path()))
        .with_environment(JobEnvironment::default());

    assert!(
        agent
            .register("", LogOptions::default(), Facility::default(), false)
            .await
    );
    let identity = agent.session().identity();
    assert_eq!(identity.job_name, "job_debug");
    assert_eq!(identity.job_instance_id, 0);
}

#[tokio::test]
async fn test_reregistration_replaces_session() {
    let temp_dir = tempfile::tempdir().unwrap();
    let daemon = FakeDaemon::replying(&["OK 8", "KO already registered"]).await;
    let mut agent = ping_agent(&daemon, temp_dir.path());

    assert!(agent.register("", LogOptions::PID, Facility::USER, false).await);
    assert_eq!(agent.session().connection_id(), 8);

    assert!(!agent.register("", LogOptions::PID, Facility::USER, false).await);
    assert_eq!(agent.session().connection_id(), 0);
}

#[tokio::test]
async fn test_try_register_reports_refusal_as_protocol_error() {
    let temp_dir = tempfile::tempdir().unwrap();
    let daemon = FakeDaemon::replying(&["KO unknown job"]).await;
    let mut agent = ping_agent(&daemon, temp_dir.path());

    let err = agent
        .try_register("", LogOptions::PID, Facility::USER, false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
    assert!(err.to_string().contains("KO unknown job"));
}

#[tokio::test]
async fn test_register_against_silent_daemon() {
    let temp_dir = tempfile::tempdir().unwrap();
    let daemon = FakeDaemon::silent().await;
    let mut agent = ping_agent(&daemon, temp_dir.path());

    let start = Instant::now();
    let err = agent
        .try_register("", LogOptions::PID, Facility::USER, false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(agent.session().connection_id(), 0);
    // 200ms send + 200ms receive, with slack for slow machines
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_register_transport_failure_reaches_job_log() {
    let temp_dir = tempfile::tempdir().unwrap();
    let daemon = FakeDaemon::silent().await;
    let mut agent = ping_agent(&daemon, temp_dir.path());
    let (logs, _guard) = capture_logs();

    assert!(!agent.register("", LogOptions::PID, Facility::USER, false).await);

    let errors = logs.errors();
    let closed = "Error: Connexion to rstats was closed, could not get an answer";
    assert!(errors.iter().any(|line| line.contains(closed)), "{errors:?}");
    let failure = errors
        .iter()
        .find(|line| line.contains("Failed to register to rstats service: "))
        .unwrap();
    assert!(failure.contains("JOB_INSTANCE_ID 3, AGENT_NAME agent_name_not_found, "));
    assert!(failure.contains("ident=ping"));
}

#[tokio::test]
async fn test_open_session_sends_nothing() {
    let temp_dir = tempfile::tempdir().unwrap();
    let daemon = FakeDaemon::replying(&["OK 42"]).await;
    let mut agent = ping_agent(&daemon, temp_dir.path());

    let session = agent.open_session(LogOptions::PID, Facility::LOCAL0);
    assert_eq!(session.identity().job_name, "ping");
    assert_eq!(session.identity().job_instance_id, 3);
    assert_eq!(session.connection_id(), 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(daemon.commands().is_empty());
}
