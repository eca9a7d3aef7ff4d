//! End-to-end CLI tests for the harvester binary.

#![allow(deprecated)]

mod support;

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use support::{Hits, WorksByWindow};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

/// Binary with config lookup pointed at an empty directory.
fn harvester(config_home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("harvester").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home).env_remove("RUST_LOG");
    cmd
}

fn write_harvester_config(config_home: &Path, contents: &str) {
    let dir = config_home.join("harvester");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), contents).unwrap();
}

#[test]
fn test_help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    harvester(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Harvest bibliographic metadata"))
        .stdout(predicate::str::contains("merge"))
        .stdout(predicate::str::contains("normalize"));
}

#[test]
fn test_version_displays_name() {
    let home = TempDir::new().unwrap();
    harvester(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("harvester"));
}

#[test]
fn test_missing_subcommand_fails() {
    let home = TempDir::new().unwrap();
    harvester(home.path()).assert().failure();
}

#[test]
fn test_invalid_date_is_usage_error() {
    let home = TempDir::new().unwrap();
    harvester(home.path())
        .args(["harvest", "--begin", "2020-02-30", "--end", "2020-03-01"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_merge_writes_freshest_records() {
    let home = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let dump = dir.path().join("dump.ldj");
    let update = dir.path().join("update.ldj");
    let output = dir.path().join("out").join("merged.ldj");
    std::fs::write(&dump, "{\"URL\":\"a\",\"v\":1}\n{\"URL\":\"b\",\"v\":1}\n").unwrap();
    std::fs::write(&update, "{\"URL\":\"a\",\"v\":2}\n").unwrap();

    harvester(home.path())
        .arg("-q")
        .arg("merge")
        .arg("--dump")
        .arg(&dump)
        .arg("--update")
        .arg(&update)
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    assert_eq!(
        std::fs::read_to_string(&output).unwrap(),
        "{\"URL\":\"b\",\"v\":1}\n{\"URL\":\"a\",\"v\":2}\n"
    );
}

#[test]
fn test_merge_uses_key_field_from_config() {
    let home = TempDir::new().unwrap();
    write_harvester_config(home.path(), "[records]\nkey_field = \"id\"\n");
    let dir = TempDir::new().unwrap();
    let dump = dir.path().join("dump.ldj");
    let update = dir.path().join("update.ldj");
    let output = dir.path().join("merged.ldj");
    std::fs::write(&dump, "{\"id\":1,\"v\":\"old\"}\n").unwrap();
    std::fs::write(&update, "{\"id\":1,\"v\":\"new\"}\n").unwrap();

    harvester(home.path())
        .arg("merge")
        .arg("--dump")
        .arg(&dump)
        .arg("--update")
        .arg(&update)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    assert_eq!(
        std::fs::read_to_string(&output).unwrap(),
        "{\"id\":1,\"v\":\"new\"}\n"
    );
}

#[test]
fn test_merge_missing_input_fails_and_leaves_no_output() {
    let home = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let update = dir.path().join("update.ldj");
    std::fs::write(&update, "").unwrap();
    let output = dir.path().join("merged.ldj");

    harvester(home.path())
        .arg("merge")
        .arg("--dump")
        .arg(dir.path().join("absent.ldj"))
        .arg("--update")
        .arg(&update)
        .arg("-o")
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("absent.ldj"));

    assert!(!output.exists());
    assert!(!dir.path().join("merged.ldj.partial").exists());
}

#[test]
fn test_invalid_config_file_is_reported() {
    let home = TempDir::new().unwrap();
    write_harvester_config(home.path(), "[harvest]\nconcurrency = 99\n");
    let dir = TempDir::new().unwrap();
    let chunk = dir.path().join("chunk.ldj");
    std::fs::write(&chunk, "").unwrap();

    harvester(home.path())
        .arg("normalize")
        .arg("-o")
        .arg(dir.path().join("out.ldj"))
        .arg(&chunk)
        .assert()
        .failure()
        .stderr(predicate::str::contains("harvest.concurrency"));
}

#[test]
fn test_normalize_flattens_and_deduplicates() {
    let home = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let chunks = dir.path().join("deposit");
    std::fs::create_dir_all(&chunks).unwrap();
    std::fs::write(
        chunks.join("2020-01-01_2020-02-01.ldj"),
        concat!(
            r#"{"status":"ok","message":{"items":[{"URL":"a"},{"URL":"b"}]}}"#,
            "\n"
        ),
    )
    .unwrap();
    std::fs::write(
        chunks.join("2020-02-01_2020-03-01.ldj"),
        concat!(
            r#"{"status":"ok","message":{"items":[{"URL":"b"},{"URL":"c"}]}}"#,
            "\n"
        ),
    )
    .unwrap();
    let output = dir.path().join("records.ldj");

    harvester(home.path())
        .arg("normalize")
        .arg("--chunk-dir")
        .arg(&chunks)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    assert_eq!(
        std::fs::read_to_string(&output).unwrap(),
        "{\"URL\":\"a\"}\n{\"URL\":\"b\"}\n{\"URL\":\"c\"}\n"
    );
}

#[test]
fn test_indicators_writes_tsv() {
    let home = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    let dump = dir.path().join("dump.ldj");
    let update = dir.path().join("update.ldj");
    let output = dir.path().join("indicators.tsv");
    std::fs::write(&dump, "{\"URL\":\"a\"}\n").unwrap();
    std::fs::write(&update, "{\"URL\":\"a\"}\n{\"URL\":\"z\"}\n").unwrap();

    harvester(home.path())
        .arg("indicators")
        .arg("--dump")
        .arg(&dump)
        .arg("--update")
        .arg(&update)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    assert_eq!(
        std::fs::read_to_string(&output).unwrap(),
        "1\tdump\ta\n1\tupdate\ta\n2\tupdate\tz\n"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_harvest_against_mock_api_prints_artifacts() {
    let hits = Hits::default();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works"))
        .respond_with(WorksByWindow::new(2, hits.clone()))
        .mount(&server)
        .await;

    let home = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let endpoint = server.uri();
    let out_path = out.path().to_path_buf();
    let cache_path = cache.path().to_path_buf();
    let home_path = home.path().to_path_buf();

    let output = tokio::task::spawn_blocking(move || {
        harvester(&home_path)
            .args(["-q", "harvest", "--begin", "2020-01-01", "--end", "2020-03-01"])
            .arg("--endpoint")
            .arg(&endpoint)
            .arg("--output-dir")
            .arg(&out_path)
            .arg("--cache-dir")
            .arg(&cache_path)
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).unwrap();
    let printed: Vec<&str> = stdout.lines().collect();
    assert_eq!(printed.len(), 2, "{stdout}");
    assert!(printed[0].ends_with("2020-01-01_2020-02-01.ldj"));
    assert!(printed[1].ends_with("2020-02-01_2020-03-01.ldj"));

    let deposit = out.path().join("deposit");
    assert!(deposit.join("2020-01-01_2020-02-01.ldj").is_file());
    assert!(deposit.join("2020-02-01_2020-03-01.ldj").is_file());
    // One non-empty page and one empty page per chunk
    assert_eq!(hits.count(), 4);
}

#[cfg(unix)]
#[test]
fn test_ctrl_c_stops_merge_without_output() {
    use std::os::unix::process::ExitStatusExt;
    use std::process::{Command as StdCommand, Stdio};
    use std::time::{Duration, Instant};

    use assert_cmd::cargo::CommandCargoExt;

    let home = TempDir::new().unwrap();
    let dir = TempDir::new().unwrap();
    // Named pipes with no writer keep the merge blocked on its inputs
    let dump = dir.path().join("dump.ldj");
    let update = dir.path().join("update.ldj");
    for pipe in [&dump, &update] {
        let status = StdCommand::new("mkfifo").arg(pipe).status().unwrap();
        assert!(status.success());
    }
    let output = dir.path().join("merged.ldj");

    let mut child = StdCommand::cargo_bin("harvester")
        .unwrap()
        .env("XDG_CONFIG_HOME", home.path())
        .env_remove("RUST_LOG")
        .args(["-q", "merge", "--dump"])
        .arg(&dump)
        .arg("--update")
        .arg(&update)
        .arg("-o")
        .arg(&output)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    std::thread::sleep(Duration::from_millis(500));
    let sent = StdCommand::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(sent.success());

    let deadline = Instant::now() + Duration::from_secs(10);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if Instant::now() > deadline {
            child.kill().unwrap();
            panic!("merge kept running after SIGINT");
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    assert!(!status.success());
    assert_eq!(status.signal(), Some(2), "{status:?}");
    assert!(!output.exists());
}
