mod common;

use std::sync::Arc;

use mgmt_agent::host::{HostRuntime, InMemoryHost};
use mgmt_agent::install::InstallPipeline;
use mgmt_agent_error::AgentError;

use common::*;

fn write_image(name: &str, image: &[u8]) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("mgmt-agent-{}-{name}", std::process::id()));
    std::fs::write(&path, image).expect("write unit image");
    path
}

#[tokio::test]
async fn file_urls_are_installed_and_recorded() {
    let host = Arc::new(InMemoryHost::new());
    let pipeline = InstallPipeline::new(host.clone());
    let path = write_image("remote.zip", &unit_image("com.acme.remote", "1.2.3"));
    let url = url::Url::from_file_path(&path).expect("absolute path").to_string();

    let unit = pipeline
        .install_from_url("remote:com.acme.remote", &url)
        .await
        .expect("install from url");
    assert_eq!(unit.symbolic_name, "com.acme.remote");
    assert_eq!(unit.version, "1.2.3");
    assert_eq!(unit.location, "remote:com.acme.remote");

    let recorded = pipeline.installed_from_urls().await;
    assert_eq!(recorded.get("remote:com.acme.remote"), Some(&url));

    pipeline.forget("remote:com.acme.remote").await;
    assert!(pipeline.installed_from_urls().await.is_empty());
    let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn malformed_urls_are_invalid_requests() {
    let host = Arc::new(InMemoryHost::new());
    let pipeline = InstallPipeline::new(host);
    let err = pipeline
        .install_from_url("remote:x", "not a url")
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::InvalidRequest { .. }));
}

#[tokio::test]
async fn uninstall_through_agent_drops_url_record() {
    let host = Arc::new(InMemoryHost::new());
    let agent = new_agent(&host);
    let path = write_image("tracked.zip", &unit_image("com.acme.tracked", "1.0.0"));
    let url = url::Url::from_file_path(&path).expect("absolute path").to_string();

    let unit = agent
        .install_from_url("remote:tracked", &url)
        .await
        .expect("install from url");
    assert!(host.unit(unit.id).is_some());
    assert_eq!(agent.uninstall(&[unit.id]).await, None);
    assert!(host.unit(unit.id).is_none());
    let _ = std::fs::remove_file(path);
}

#[test]
fn location_resolution_uses_placeholder_for_new_units() {
    let host = Arc::new(InMemoryHost::new());
    let pipeline = InstallPipeline::new(host.clone());
    let image = unit_image("com.acme.fresh", "1.0.0");
    assert_eq!(
        pipeline.resolve_location(&image).unwrap(),
        "manual:com.acme.fresh"
    );

    host.install("file:/units/fresh.zip", &image).unwrap();
    assert_eq!(
        pipeline.resolve_location(&image).unwrap(),
        "file:/units/fresh.zip"
    );
}

#[tokio::test]
async fn explicit_location_updates_existing_unit_and_refreshes() {
    let host = Arc::new(InMemoryHost::new());
    let pipeline = InstallPipeline::new(host.clone());
    let first = pipeline
        .install(Some("file:/units/a.zip"), &unit_image("com.acme.a", "1.0.0"), 4, true)
        .await
        .unwrap();
    assert_eq!(first.start_level, 4);
    let refreshes = host.refresh_count();

    let second = pipeline
        .install(Some("file:/units/a.zip"), &unit_image("com.acme.a", "1.0.1"), 4, true)
        .await
        .unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.version, "1.0.1");
    assert_eq!(host.refresh_count(), refreshes + 1);
}
