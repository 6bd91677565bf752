mod common;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mgmt_agent::capability::Capability;
use mgmt_agent::config::AgentConfig;
use mgmt_agent::dto::{ResultStatus, UnitInfo, UnitState};
use mgmt_agent::extensions::EXTENSION_NAME_PROPERTY;
use mgmt_agent::host::memory::{MemoryConfigAdmin, MemoryLogReader};
use mgmt_agent::host::{
    CommandShell, HostRuntime, InMemoryHost, LeakDetector, LeakSink, LogRecord,
};
use mgmt_agent::push::PushEvent;
use mgmt_agent::values::{ConfigValue, TypedValue, ValueType};
use mgmt_agent::AgentServer;
use mgmt_agent_error::AgentError;
use serde_json::{json, Map, Value};

use common::*;

#[tokio::test]
async fn install_without_location_follows_symbolic_name_matches() {
    let host = Arc::new(InMemoryHost::new());
    let agent = new_agent(&host);

    let fresh = agent
        .install(None, &unit_image("com.acme.core", "1.0.0"), 3)
        .await
        .expect("fresh install");
    assert_eq!(fresh.location, "manual:com.acme.core");
    assert_eq!(fresh.start_level, 3);

    let updated = agent
        .install(None, &unit_image("com.acme.core", "1.1.0"), 3)
        .await
        .expect("update in place");
    assert_eq!(updated.id, fresh.id);
    assert_eq!(updated.version, "1.1.0");

    agent
        .install(Some("file:/units/core-copy.zip"), &unit_image("com.acme.core", "2.0.0"), 1)
        .await
        .expect("explicit location installs alongside");

    let err = agent
        .install(None, &unit_image("com.acme.core", "3.0.0"), 1)
        .await
        .expect_err("two matches are ambiguous");
    match err {
        AgentError::AmbiguousInstall { symbolic_name, locations } => {
            assert_eq!(symbolic_name, "com.acme.core");
            assert_eq!(locations.len(), 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn corrupt_image_is_an_invalid_unit() {
    let host = Arc::new(InMemoryHost::new());
    let agent = new_agent(&host);
    let err = agent.install(None, &corrupt_image(), 1).await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidUnit { .. }));
    assert_eq!(agent.list_units().len(), 1);
}

#[tokio::test]
async fn identity_is_unique_across_locations() {
    let host = Arc::new(InMemoryHost::new());
    let agent = new_agent(&host);
    let image = unit_image("com.acme.dup", "1.0.0");

    let first = agent
        .install(Some("file:/units/a.zip"), &image, 1)
        .await
        .expect("first location");
    let err = agent
        .install(Some("file:/units/b.zip"), &image, 1)
        .await
        .expect_err("same identity at a second location");
    assert!(matches!(err, AgentError::HostFailure { .. }));
    assert!(host.unit_by_location("file:/units/b.zip").is_none());

    let other = agent
        .install(Some("file:/units/c.zip"), &unit_image("com.acme.dup", "2.0.0"), 1)
        .await
        .expect("different version");
    let err = agent
        .install(Some("file:/units/c.zip"), &image, 1)
        .await
        .expect_err("update onto a held identity");
    assert!(matches!(err, AgentError::HostFailure { .. }));
    assert_eq!(host.unit(other.id).unwrap().version, "2.0.0");

    let matching = agent
        .list_units()
        .into_iter()
        .filter(|unit| unit.symbolic_name == "com.acme.dup" && unit.version == "1.0.0")
        .count();
    assert_eq!(matching, 1);
    assert_eq!(host.unit(first.id).unwrap().location, "file:/units/a.zip");
}

#[tokio::test]
async fn start_reports_only_failed_ids() {
    let host = Arc::new(InMemoryHost::new());
    let agent = new_agent(&host);

    let mut ids = Vec::new();
    for index in 0..5 {
        let unit = agent
            .install(None, &unit_image(&format!("com.acme.u{index}"), "1.0.0"), 1)
            .await
            .unwrap();
        ids.push(unit.id);
    }
    let valid = ids.clone();
    ids.extend(100..105);

    let failures = agent.start(&ids).expect("some ids are unknown");
    let lines: Vec<&str> = failures.lines().collect();
    assert_eq!(lines.len(), 5);
    for (line, id) in lines.iter().zip(100..105) {
        assert_eq!(*line, format!("unit {id} does not exist"));
    }
    assert!(failures.ends_with('\n'));
    for id in &valid {
        assert_eq!(host.unit(*id).unwrap().state, UnitState::Active);
    }

    assert_eq!(agent.stop(&valid), None);
}

#[tokio::test]
async fn concurrent_starts_report_only_their_failed_ids() {
    let host = Arc::new(InMemoryHost::new());
    let agent = new_agent(&host);

    let mut ids = Vec::new();
    for index in 0..5 {
        let unit = agent
            .install(None, &unit_image(&format!("com.acme.c{index}"), "1.0.0"), 1)
            .await
            .unwrap();
        ids.push(unit.id);
        ids.push(200 + index);
    }

    let results: Vec<Option<String>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| agent.start(&ids)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("start thread"))
            .collect()
    });

    let expected: String = (200..205)
        .map(|id| format!("unit {id} does not exist\n"))
        .collect();
    for failures in results {
        assert_eq!(failures.as_deref(), Some(expected.as_str()));
    }
    for id in ids.iter().filter(|id| **id < 200) {
        assert_eq!(host.unit(*id).unwrap().state, UnitState::Active);
    }
}

#[tokio::test]
async fn uninstall_aggregates_failures_and_removes_units() {
    let host = Arc::new(InMemoryHost::new());
    let agent = new_agent(&host);
    let unit = agent
        .install(None, &unit_image("com.acme.gone", "1.0.0"), 1)
        .await
        .unwrap();

    let failures = agent.uninstall(&[unit.id, 999]).await;
    assert_eq!(failures.as_deref(), Some("unit 999 does not exist\n"));
    assert!(host.unit(unit.id).is_none());
}

#[tokio::test]
async fn batch_install_is_optimistic_and_skips_refresh_on_failure() {
    let host = Arc::new(InMemoryHost::new());
    let agent = new_agent(&host);
    let before = host.refresh_count();

    let result = agent
        .install_batch(&[unit_image("com.acme.good", "1.0.0"), corrupt_image()], 1)
        .await;
    assert_eq!(result.status, ResultStatus::Success);
    assert_eq!(result.message.lines().count(), 1);
    assert!(result.message.ends_with('\n'));
    assert!(host.unit_by_location("manual:com.acme.good").is_some());
    assert_eq!(host.refresh_count(), before);

    let result = agent
        .install_batch(&[unit_image("com.acme.other", "1.0.0")], 1)
        .await;
    assert_eq!(result.status, ResultStatus::Success);
    assert!(result.message.is_empty());
    assert_eq!(host.refresh_count(), before + 1);
}

#[tokio::test]
async fn synchronous_refresh_waits_for_completion() {
    let host = Arc::new(InMemoryHost::new());
    let agent = new_agent(&host);
    host.set_refresh_delay(Some(Duration::from_millis(300)));

    let started = Instant::now();
    agent.refresh(true).await;
    assert!(started.elapsed() < Duration::from_millis(150));

    let started = Instant::now();
    agent.refresh(false).await;
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[test]
fn gated_calls_skip_until_the_subsystem_appears() {
    let host = Arc::new(InMemoryHost::new());
    let agent = new_agent(&host);

    let skipped = agent.execute_health_checks(&[], &[]);
    assert!(skipped.is_skipped());
    assert!(agent.list_configurations().is_skipped());

    host.configure(|subsystems| {
        subsystems.health_checks = Some(Arc::new(StaticHealthChecks));
        subsystems.config_admin = Some(Arc::new(MemoryConfigAdmin::default()));
    });
    host.wire(Capability::HealthCheck);
    host.wire(Capability::Cm);

    let results = agent.execute_health_checks(&[], &[]).value().expect("populated");
    assert_eq!(results.len(), 1);
    assert_eq!(agent.list_health_checks().value().map(|checks| checks.len()), Some(1));

    let created = agent
        .create_or_update_configuration("com.acme.pid", &[ConfigValue::new("port", ValueType::Integer, "8080")])
        .unwrap();
    assert_eq!(created.status, ResultStatus::Success);
    let configurations = agent.list_configurations().value().unwrap();
    assert_eq!(configurations[0].pid, "com.acme.pid");
    assert_eq!(configurations[0].properties.get("port"), Some(&json!(8080)));
}

#[test]
fn conversion_failures_are_error_results() {
    let host = InMemoryHost::standalone();
    let agent = new_agent(&host);

    let result = agent
        .create_or_update_configuration("pid", &[ConfigValue::new("port", ValueType::Integer, "eighty")])
        .unwrap();
    assert_eq!(result.status, ResultStatus::Error);
    assert!(result
        .message
        .starts_with("One or more configuration properties cannot be converted to the requested type"));

    let result = agent
        .send_event("acme/topic", &[ConfigValue::new("flag", ValueType::Boolean, "maybe")])
        .unwrap();
    assert_eq!(result.status, ResultStatus::Error);
    assert_eq!(result.message, "Event could not be sent successfully");

    let result = agent
        .send_event("acme/topic", &[ConfigValue::new("flag", ValueType::Boolean, "true")])
        .unwrap();
    assert_eq!(result.status, ResultStatus::Success);

    assert!(matches!(
        agent.delete_configuration(" "),
        Err(AgentError::InvalidRequest { .. })
    ));
}

#[test]
fn extension_lookup_tracks_registration() {
    let host = Arc::new(InMemoryHost::new());
    let agent = new_agent(&host);
    let mut context = Map::new();
    context.insert("a".to_string(), Value::from(1));

    let err = agent.execute_extension("unknown", &Map::new()).unwrap_err();
    assert!(matches!(err, AgentError::ExtensionNotFound { .. }));

    let service_id = register_extension(&host, "x", Arc::new(Doubler));
    let output = agent.execute_extension("x", &context).expect("registered");
    assert_eq!(output.get("doubled"), Some(&Value::from(2)));

    let mut wrong = Map::new();
    wrong.insert("a".to_string(), Value::from("one"));
    let err = agent.execute_extension("x", &wrong).unwrap_err();
    assert!(matches!(err, AgentError::ExtensionFailed { .. }));

    assert!(host.unregister_service(service_id));
    let err = agent.execute_extension("x", &context).unwrap_err();
    match err {
        AgentError::ExtensionNotFound { name } => assert_eq!(name, "x"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn extension_lookups_never_miss_during_modification() {
    let host = Arc::new(InMemoryHost::new());
    let agent = new_agent(&host);
    let service_id = register_extension(&host, "x", Arc::new(Doubler));
    let mut context = Map::new();
    context.insert("a".to_string(), Value::from(4));

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for revision in 0..200 {
                let mut properties = BTreeMap::new();
                properties.insert(
                    EXTENSION_NAME_PROPERTY.to_string(),
                    TypedValue::String("x".to_string()),
                );
                properties.insert("revision".to_string(), TypedValue::Integer(revision));
                assert!(host.modify_service(service_id, properties));
            }
        });
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..200 {
                    let output = agent
                        .execute_extension("x", &context)
                        .expect("old or new handler");
                    assert_eq!(output.get("doubled"), Some(&Value::from(8)));
                }
            });
        }
    });

    assert_eq!(agent.extension_names(), vec!["x".to_string()]);
    assert!(host.unregister_service(service_id));
    assert!(agent.extension_names().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redirects_close_the_previous_session_once() {
    let host = Arc::new(InMemoryHost::new());
    let shell = Arc::new(CountingShell::default());
    host.configure(|subsystems| {
        subsystems.command_shell = Some(shell.clone() as Arc<dyn CommandShell>);
    });
    let agent = new_agent(&host);
    assert!(agent.redirect(-1).await.unwrap());

    let (first, second) = {
        let (a, b) = (agent.clone(), agent.clone());
        tokio::join!(
            tokio::spawn(async move { a.redirect(1).await }),
            tokio::spawn(async move { b.redirect(1).await }),
        )
    };
    let switched = [first.unwrap().unwrap(), second.unwrap().unwrap()];
    assert_eq!(switched.iter().filter(|switched| **switched).count(), 1);
    assert_eq!(shell.closed(), 1);

    let (first, second) = {
        let (a, b) = (agent.clone(), agent.clone());
        tokio::join!(
            tokio::spawn(async move { a.redirect(-1).await }),
            tokio::spawn(async move { b.redirect(-1).await }),
        )
    };
    let switched = [first.unwrap().unwrap(), second.unwrap().unwrap()];
    assert_eq!(switched.iter().filter(|switched| **switched).count(), 1);
    assert_eq!(shell.opened(), 2);

    assert!(agent.shutdown().await);
    assert_eq!(shell.closed(), 2);
}

#[tokio::test]
async fn redirect_is_idempotent_and_closes_once() {
    let host = Arc::new(InMemoryHost::new());
    let shell = Arc::new(CountingShell::default());
    host.configure(|subsystems| {
        subsystems.command_shell = Some(shell.clone() as Arc<dyn CommandShell>);
    });
    let agent = new_agent(&host);

    assert!(agent.redirect(-1).await.unwrap());
    assert!(!agent.redirect(-1).await.unwrap());
    assert_eq!(shell.opened(), 1);
    assert_eq!(shell.closed(), 0);

    assert!(agent.redirect(1).await.unwrap());
    assert_eq!(shell.closed(), 1);
    assert!(!agent.redirect(1).await.unwrap());
    assert!(agent.stdin("hello").await.unwrap());

    assert!(agent.redirect(0).await.unwrap());
    assert!(!agent.stdin("nobody listening").await.unwrap());
    assert_eq!(shell.closed(), 1);

    let output = agent.exec_shell_command("lb").await.unwrap();
    assert_eq!(output.as_deref(), Some("ran: lb"));
    agent.exec_shell_command("lb").await.unwrap();
    assert_eq!(shell.opened(), 2);

    assert!(agent.shutdown().await);
    assert_eq!(shell.closed(), 2);
}

#[tokio::test]
async fn missing_shell_is_reported() {
    let host = Arc::new(InMemoryHost::new());
    let agent = new_agent(&host);
    let err = agent.exec_shell_command("lb").await.unwrap_err();
    assert!(matches!(err, AgentError::ShellUnavailable { .. }));
}

#[tokio::test]
async fn shutdown_is_idempotent_and_detaches_forwarders() {
    let host = Arc::new(InMemoryHost::new());
    let reader = Arc::new(MemoryLogReader::default());
    host.configure(|subsystems| subsystems.log_reader = Some(reader.clone()));
    host.wire(Capability::Log);
    let agent = new_agent(&host);
    assert_eq!(reader.listener_count(), 1);

    reader.log(LogRecord {
        unit_id: 0,
        level: "INFO".to_string(),
        logger: "runtime".to_string(),
        message: "started".to_string(),
    });
    let (replay, _rx) = agent.push_channel().subscribe(None);
    assert!(matches!(&replay[0].event, PushEvent::Log(record) if record.message == "started"));

    assert!(agent.ping());
    assert!(agent.abort().await);
    assert!(!agent.close().await);
    assert!(!agent.shutdown().await);
    assert!(!agent.ping());
    assert_eq!(reader.listener_count(), 0);
    assert_eq!(host.watcher_count(), 0);
}

#[test]
fn unknown_revision_ids_are_rejected() {
    let host = Arc::new(InMemoryHost::new());
    let agent = new_agent(&host);
    let err = agent.list_unit_revisions(&[0, 42]).unwrap_err();
    assert!(matches!(err, AgentError::UnitNotFound { id: 42 }));
}

#[test]
fn uptime_is_reported_only_with_management_interface() {
    let host = Arc::new(InMemoryHost::new());
    let agent = new_agent(&host);
    std::thread::sleep(Duration::from_millis(5));
    assert_eq!(agent.memory_info().uptime_ms, 0);
    host.wire(Capability::Jmx);
    assert!(agent.memory_info().uptime_ms > 0);
}

#[derive(Default)]
struct RecordingLeakDetector {
    sink: Mutex<Option<LeakSink>>,
}

impl RecordingLeakDetector {
    fn alert(&self, units: Vec<UnitInfo>) {
        if let Some(sink) = self.sink.lock().unwrap().clone() {
            sink(units);
        }
    }
}

impl LeakDetector for RecordingLeakDetector {
    fn suspicious_units(&self) -> Vec<UnitInfo> {
        Vec::new()
    }

    fn set_alert_sink(&self, sink: Option<LeakSink>) {
        *self.sink.lock().unwrap() = sink;
    }
}

#[tokio::test]
async fn leak_alerts_are_pushed_while_the_link_is_open() {
    let host = Arc::new(InMemoryHost::new());
    let detector = Arc::new(RecordingLeakDetector::default());
    let agent = AgentServer::new(
        host.clone(),
        AgentConfig::default(),
        Some(detector.clone() as Arc<dyn LeakDetector>),
    );
    assert!(agent.classloader_leaks().is_empty());

    let suspect = host.unit(0).unwrap();
    detector.alert(vec![suspect.clone()]);
    let (replay, _rx) = agent.push_channel().subscribe(None);
    assert_eq!(replay.len(), 1);
    assert_eq!(replay[0].event, PushEvent::LeakAlert(vec![suspect]));

    agent.shutdown().await;
    assert!(detector.sink.lock().unwrap().is_none());
}
