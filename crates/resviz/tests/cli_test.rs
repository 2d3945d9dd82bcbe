#![allow(deprecated)] // Command::cargo_bin

use assert_cmd::Command;
use chrono::Utc;
use predicates::prelude::*;
use resviz_cloud::{
    CacheStore, CollectionRequest, FetchError, KindOutcome, ReportStore, ResourceKind,
    ResourceRecord, ResultAssembler,
};
use tempfile::TempDir;

/// 設定・キャッシュ・状態をすべて一時ディレクトリに閉じ込めたコマンド
struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn cache_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("cache")
    }

    fn state_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("state")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("resviz").unwrap();
        cmd.current_dir(self.dir.path())
            .env("HOME", self.dir.path())
            .env("XDG_CONFIG_HOME", self.dir.path().join("config"))
            .env("RESVIZ_CACHE_DIR", self.cache_dir())
            .env("RESVIZ_STATE_DIR", self.state_dir())
            .env("RESVIZ_LOG_DIR", self.dir.path().join("logs"))
            .env("NO_COLOR", "1")
            .env_remove("RESVIZ_CONFIG_PATH")
            .env_remove("RESVIZ_RUN_TYPE")
            .env_remove("AWS_DEFAULT_REGION")
            .env_remove("AWS_PROFILE")
            .env_remove("RUST_LOG");
        cmd
    }
}

fn record(kind: ResourceKind, id: &str, project: Option<&str>) -> ResourceRecord {
    let record = ResourceRecord::new(kind, id);
    match project {
        Some(p) => record.with_tag("CostProject", p),
        None => record,
    }
}

/// sandbox/us-east-1 の収集結果を保存しておく
async fn save_report(sandbox: &Sandbox, ec2_fails: bool) {
    let request = CollectionRequest::new(
        "sandbox",
        "us-east-1",
        vec![ResourceKind::Ec2, ResourceKind::S3],
    )
    .unwrap();

    let ec2 = if ec2_fails {
        KindOutcome::failed(ResourceKind::Ec2, FetchError::auth("expired token"), 1, 5)
    } else {
        KindOutcome::fetched(
            ResourceKind::Ec2,
            vec![
                record(ResourceKind::Ec2, "i-0aaa", Some("alpha")),
                record(ResourceKind::Ec2, "i-0bbb", None),
            ],
            1,
            5,
        )
    };
    let s3 = KindOutcome::cached(
        ResourceKind::S3,
        vec![record(ResourceKind::S3, "logs-bucket", Some("beta"))],
        1,
    );

    let result = ResultAssembler::default().assemble(&request, &[ec2, s3], Utc::now());
    ReportStore::new(sandbox.state_dir())
        .save(&result)
        .await
        .unwrap();
}

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    Sandbox::new()
        .cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("collect"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("cache"));
}

#[test]
fn test_cli_version() {
    Sandbox::new()
        .cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("resviz"));
}

#[test]
fn test_collect_help() {
    Sandbox::new()
        .cmd()
        .args(["collect", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--services"))
        .stdout(predicate::str::contains("--clear-cache"))
        .stdout(predicate::str::contains("--force"))
        .stdout(predicate::str::contains("--no-cache"));
}

#[test]
fn test_collect_rejects_unknown_service() {
    Sandbox::new()
        .cmd()
        .args(["collect", "--services", "Redshift"])
        .assert()
        .failure();
}

#[test]
fn test_invalid_command() {
    Sandbox::new().cmd().arg("invalid-command").assert().failure();
}

#[test]
fn test_status_not_found() {
    let output = Sandbox::new()
        .cmd()
        .args(["status", "--region", "us-east-1"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["status"], "not_found");
    assert_eq!(json["identity"], "sandbox");
    assert_eq!(json["region"], "us-east-1");
    assert!(json["running"].is_null());
}

#[tokio::test]
async fn test_status_reports_last_run() {
    let sandbox = Sandbox::new();
    save_report(&sandbox, false).await;

    let output = sandbox
        .cmd()
        .args(["status", "--region", "us-east-1", "--profile", "sandbox"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["status"], "completed");
    assert_eq!(json["last_run"]["success_count"], 2);
    assert_eq!(json["last_run"]["results"]["EC2"], 2);
}

#[tokio::test]
async fn test_status_failed_run() {
    let sandbox = Sandbox::new();
    save_report(&sandbox, true).await;

    let output = sandbox
        .cmd()
        .args(["status", "--region", "us-east-1"])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    // S3 は成功しているので全体としては成功
    assert_eq!(json["status"], "completed");
    assert!(json["last_run"]["errors"]["EC2"].is_string());
}

#[test]
fn test_show_without_report() {
    Sandbox::new()
        .cmd()
        .args(["show", "--region", "us-east-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("収集結果がありません"));
}

#[tokio::test]
async fn test_show_renders_records() {
    let sandbox = Sandbox::new();
    save_report(&sandbox, false).await;

    sandbox
        .cmd()
        .args(["show", "--region", "us-east-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("i-0aaa"))
        .stdout(predicate::str::contains("i-0bbb"))
        .stdout(predicate::str::contains("logs-bucket"))
        .stdout(predicate::str::contains("CostProject:alpha"));
}

#[tokio::test]
async fn test_show_filters_by_tag_and_service() {
    let sandbox = Sandbox::new();
    save_report(&sandbox, false).await;

    sandbox
        .cmd()
        .args(["show", "--region", "us-east-1", "--tag", "CostProject=alpha"])
        .assert()
        .success()
        .stdout(predicate::str::contains("i-0aaa"))
        .stdout(predicate::str::contains("i-0bbb").not())
        .stdout(predicate::str::contains("logs-bucket").not());

    sandbox
        .cmd()
        .args(["show", "--region", "us-east-1", "--service", "s3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("logs-bucket"))
        .stdout(predicate::str::contains("i-0aaa").not());
}

#[tokio::test]
async fn test_show_paginates() {
    let sandbox = Sandbox::new();
    save_report(&sandbox, false).await;

    sandbox
        .cmd()
        .args(["show", "--region", "us-east-1", "--page-size", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1-2 / 3件"))
        .stdout(predicate::str::contains("--page 2"));
}

#[test]
fn test_show_rejects_bad_tag_filter() {
    Sandbox::new()
        .cmd()
        .args(["show", "--region", "us-east-1", "--tag", "CostProject"])
        .assert()
        .failure();
}

#[tokio::test]
async fn test_cache_size_and_clear() {
    let sandbox = Sandbox::new();
    let cache = CacheStore::new(sandbox.cache_dir());
    let records = vec![record(ResourceKind::Lambda, "resize", None)];
    cache
        .put("sandbox", "us-east-1", ResourceKind::Lambda, &records)
        .await
        .unwrap();
    cache
        .put("demo", "us-east-1", ResourceKind::Lambda, &records)
        .await
        .unwrap();

    sandbox
        .cmd()
        .args(["cache", "size"])
        .assert()
        .success()
        .stdout(predicate::str::contains("エントリ数: 2"));

    sandbox
        .cmd()
        .args(["cache", "info", "--region", "us-east-1", "--services", "lambda"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"))
        .stdout(predicate::str::contains("有効: 1/1"));

    sandbox
        .cmd()
        .args(["cache", "clear", "--region", "us-east-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 件削除"));

    sandbox
        .cmd()
        .args(["cache", "clear", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 件削除"));

    sandbox
        .cmd()
        .args(["cache", "size"])
        .assert()
        .success()
        .stdout(predicate::str::contains("エントリ数: 0"));
}
