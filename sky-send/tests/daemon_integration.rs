//! Integration tests for the sky-send worker

use assert_cmd::Command;
use chrono::Utc;
use libskyshare::tasks::{Task, TaskQueue, TaskStatus};
use libskyshare::Database;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Setup test environment with config and database
async fn setup_test_env() -> (TempDir, String, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("skyshare.db");

    let config_content = format!(
        r#"
[database]
path = "{}"

[bluesky]
default_domain = "http://127.0.0.1:9"
timeout_secs = 2

[scheduling]
poll_interval = 1
refresh_interval = "1week"
"#,
        db_path.display().to_string().replace('\\', "/")
    );

    fs::write(&config_path, config_content).unwrap();

    // Initialize database
    let _db = Database::new(db_path.to_str().unwrap()).await.unwrap();

    (
        temp_dir,
        config_path.to_str().unwrap().to_string(),
        db_path.to_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn test_once_with_empty_queue() {
    let (_temp_dir, config_path, _db_path) = setup_test_env().await;

    Command::cargo_bin("sky-send")
        .unwrap()
        .env("SKYSHARE_CONFIG", &config_path)
        .arg("--once")
        .assert()
        .success()
        .stdout(predicate::str::contains("Processed 0 task(s)"));
}

#[tokio::test]
async fn test_once_skips_send_without_session() {
    let (_temp_dir, config_path, db_path) = setup_test_env().await;

    let db = Database::new(&db_path).await.unwrap();
    let id = db
        .schedule_once(
            Task::SendPost {
                content_id: "1".to_string(),
            },
            Utc::now(),
        )
        .await
        .unwrap();
    drop(db);

    Command::cargo_bin("sky-send")
        .unwrap()
        .env("SKYSHARE_CONFIG", &config_path)
        .arg("--once")
        .assert()
        .success()
        .stdout(predicate::str::contains("Processed 1 task(s): 1 succeeded, 0 failed"));

    let db = Database::new(&db_path).await.unwrap();
    let task = db
        .list()
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.id == id)
        .unwrap();
    assert_eq!(task.status, TaskStatus::Done);
}

#[tokio::test]
async fn test_invalid_config_is_configuration_error() {
    let temp_dir = TempDir::new().unwrap();
    let invalid_config = temp_dir.path().join("invalid.toml");
    fs::write(&invalid_config, "invalid toml content [[[").unwrap();

    Command::cargo_bin("sky-send")
        .unwrap()
        .env("SKYSHARE_CONFIG", invalid_config.to_str().unwrap())
        .arg("--once")
        .assert()
        .code(2);
}

#[tokio::test]
async fn test_zero_refresh_interval_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        format!(
            "[database]\npath = \"{}\"\n\n[scheduling]\nrefresh_interval = \"0s\"\n",
            temp_dir.path().join("db.sqlite").display().to_string().replace('\\', "/")
        ),
    )
    .unwrap();

    Command::cargo_bin("sky-send")
        .unwrap()
        .env("SKYSHARE_CONFIG", config_path.to_str().unwrap())
        .arg("--once")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("refresh_interval"));
}

#[test]
fn test_help_describes_worker() {
    Command::cargo_bin("sky-send")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--poll-interval"))
        .stdout(predicate::str::contains("--once"));
}
