use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn keeper_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("keeper"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("KEEPER_CONFIG")
        .env_remove("KEEPER_DAEMON_BINARY");
    cmd
}

#[test]
fn config_edits_land_in_identity_file_without_daemon() {
    let home = TempDir::new().expect("home");
    keeper_cmd(home.path())
        .args(["config", "set", "main", "path", "/srv/mirror"])
        .assert()
        .success();

    let config = home.path().join(".keeper").join("keeper").join("config.yaml");
    let contents = std::fs::read_to_string(&config).expect("config.yaml written");
    assert!(contents.contains("/srv/mirror"));

    keeper_cmd(home.path())
        .args(["config", "get", "main", "path"])
        .assert()
        .success()
        .stdout(contains("\"/srv/mirror\""));
}

#[test]
fn identity_comes_from_env_when_flag_absent() {
    let home = TempDir::new().expect("home");
    keeper_cmd(home.path())
        .env("KEEPER_CONFIG", "work")
        .args(["config", "set", "app", "update_notification_interval", "0"])
        .assert()
        .success();

    assert!(home
        .path()
        .join(".keeper")
        .join("work")
        .join("config.yaml")
        .exists());
}

#[test]
fn link_and_unlink_manage_the_token() {
    let home = TempDir::new().expect("home");
    keeper_cmd(home.path())
        .args(["link", "sl.abc"])
        .assert()
        .success()
        .stdout(contains("linked 'keeper'"));
    assert!(home.path().join(".keeper/keeper/token").exists());

    keeper_cmd(home.path())
        .arg("unlink")
        .assert()
        .success()
        .stdout(contains("unlinked 'keeper'"));
    keeper_cmd(home.path())
        .arg("unlink")
        .assert()
        .success()
        .stdout(contains("was not linked"));
}

#[test]
fn unlinked_front_end_asks_for_setup_and_exits() {
    let home = TempDir::new().expect("home");
    assert_cmd::Command::from_std(keeper_cmd(home.path()))
        .arg("run")
        .write_stdin("")
        .assert()
        .success()
        .stdout(contains("keeper link"));

    assert!(!home.path().join(".keeper/keeper/daemon.sock").exists());
}

#[test]
fn linked_front_end_without_mirror_folder_asks_for_one() {
    let home = TempDir::new().expect("home");
    keeper_cmd(home.path())
        .args(["link", "sl.abc"])
        .assert()
        .success();
    let missing = home.path().join("gone");
    keeper_cmd(home.path())
        .args(["config", "set", "main", "path"])
        .arg(&missing)
        .assert()
        .success();

    assert_cmd::Command::from_std(keeper_cmd(home.path()))
        .arg("run")
        .write_stdin("")
        .assert()
        .success()
        .stdout(contains("keeper config set main path").and(contains("keeper link").not()));

    assert!(!home.path().join(".keeper/keeper/daemon.sock").exists());
}

#[test]
fn invalid_identity_is_rejected() {
    let home = TempDir::new().expect("home");
    keeper_cmd(home.path())
        .args(["--config-name", "../escape", "config", "get", "main", "path"])
        .assert()
        .failure()
        .stderr(contains("escape").or(contains("identity")));
}
