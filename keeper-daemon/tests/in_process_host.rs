use std::path::PathBuf;

use serde_json::json;
use tempfile::TempDir;

use keeper_core::{DaemonError, DaemonErrorKind, DaemonIdentity, SyncStatus};
use keeper_daemon::paths::{pid_path, socket_path};
use keeper_daemon::{
    report_error, spawn_in_thread, DaemonProxy, PidFileRegistry, ProcessRegistry, ProxyError,
};

fn identity() -> DaemonIdentity {
    DaemonIdentity::from("itest")
}

#[test]
fn in_process_host_serves_proxy_surface() {
    let home = TempDir::new().expect("home");
    let daemon = spawn_in_thread(home.path(), &identity()).expect("spawn host");

    let registry = PidFileRegistry::new(home.path());
    let pid = registry.find_process(&identity()).expect("lookup");
    assert_eq!(pid, Some(std::process::id()));

    let proxy = registry.connect(&identity()).expect("connect");
    assert_eq!(proxy.status().expect("status"), SyncStatus::Idle);
    assert!(!proxy.paused().expect("paused"));

    proxy.pause_sync().expect("pause");
    assert!(proxy.paused().expect("paused"));
    assert_eq!(proxy.status().expect("status"), SyncStatus::Paused);
    proxy.resume_sync().expect("resume");
    assert!(!proxy.paused().expect("paused"));

    proxy
        .set_config("main", "path", json!("/srv/mirror"))
        .expect("set path");
    assert_eq!(
        proxy.dropbox_path().expect("root"),
        PathBuf::from("/srv/mirror")
    );
    assert_eq!(
        proxy.to_local_path("/a/b.txt").expect("local"),
        PathBuf::from("/srv/mirror/a/b.txt")
    );

    daemon.stop().expect("stop host");
    assert!(!socket_path(home.path(), &identity()).exists());
    assert!(!pid_path(home.path(), &identity()).exists());
}

#[test]
fn reported_errors_are_consumed_once() {
    let home = TempDir::new().expect("home");
    let daemon = spawn_in_thread(home.path(), &identity()).expect("spawn host");
    let socket = socket_path(home.path(), &identity());

    report_error(
        &socket,
        DaemonError::new(DaemonErrorKind::CursorResetError, "Reset", "cursor reset"),
    )
    .expect("report");
    report_error(
        &socket,
        DaemonError::new(DaemonErrorKind::DropboxDeletedError, "Gone", "root deleted"),
    )
    .expect("report");

    let registry = PidFileRegistry::new(home.path());
    let proxy = registry.connect(&identity()).expect("connect");
    let batch = proxy.pending_errors().expect("errors");
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[1].kind, DaemonErrorKind::DropboxDeletedError);
    assert_eq!(proxy.status().expect("status"), SyncStatus::SyncError);

    proxy.clear_errors().expect("clear");
    assert!(proxy.pending_errors().expect("errors").is_empty());

    daemon.stop().expect("stop host");
}

#[test]
fn second_host_for_same_identity_is_refused() {
    let home = TempDir::new().expect("home");
    let daemon = spawn_in_thread(home.path(), &identity()).expect("spawn host");

    let err = spawn_in_thread(home.path(), &identity()).unwrap_err();
    assert!(err.to_string().contains("already in use"));

    daemon.stop().expect("stop host");
}

#[test]
fn terminate_stops_host_and_later_calls_report_loss() {
    let home = TempDir::new().expect("home");
    let daemon = spawn_in_thread(home.path(), &identity()).expect("spawn host");
    let registry = PidFileRegistry::new(home.path());
    let proxy = registry.connect(&identity()).expect("connect");

    registry.terminate_process(&identity()).expect("terminate");
    daemon.stop().expect("join host");

    assert_eq!(registry.find_process(&identity()).expect("lookup"), None);
    let err = proxy.status().unwrap_err();
    assert!(err.is_connection_loss());
}

#[test]
fn released_proxy_refuses_calls() {
    let home = TempDir::new().expect("home");
    let daemon = spawn_in_thread(home.path(), &identity()).expect("spawn host");
    let proxy = PidFileRegistry::new(home.path())
        .connect(&identity())
        .expect("connect");

    proxy.release();
    assert!(matches!(
        proxy.ping().unwrap_err(),
        ProxyError::ChannelClosed(_)
    ));

    daemon.stop().expect("stop host");
}

#[tokio::test(flavor = "current_thread")]
async fn host_starts_from_inside_an_async_caller() {
    let home = TempDir::new().expect("home");
    let daemon = spawn_in_thread(home.path(), &identity()).expect("spawn host");

    let proxy = PidFileRegistry::new(home.path())
        .connect(&identity())
        .expect("connect");
    assert_eq!(proxy.status().expect("status"), SyncStatus::Idle);

    daemon.stop().expect("stop host");
    assert!(!socket_path(home.path(), &identity()).exists());
}
