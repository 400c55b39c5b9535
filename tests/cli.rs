//! End-to-end checks of the CLI exit contract. Network-touching paths are
//! exercised only up to their argument validation.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn pulse() -> Command {
    Command::cargo_bin("commitpulse").unwrap()
}

#[test]
fn chart_without_cache_fails_before_any_network_access() {
    let temp = TempDir::new().unwrap();
    pulse()
        .arg("chart")
        .arg("--data-dir")
        .arg(temp.path().join("data"))
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no commit data"));
}

#[test]
fn chart_with_empty_window_fails_cleanly() {
    let temp = TempDir::new().unwrap();
    let data_dir = temp.path().join("data");
    std::fs::create_dir_all(&data_dir).unwrap();
    std::fs::write(
        data_dir.join("monthly_commits.csv"),
        "month,commits\n2023-01,100\n2023-02,105\n",
    )
    .unwrap();

    pulse()
        .arg("chart")
        .arg("--data-dir")
        .arg(&data_dir)
        .arg("--start")
        .arg("2024-01")
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("requested chart range"));
}

#[test]
fn scan_rejects_a_reversed_date_range() {
    let temp = TempDir::new().unwrap();
    pulse()
        .arg("scan")
        .arg("--start")
        .arg("2023-02-01")
        .arg("--end")
        .arg("2023-01-01")
        .arg("--data-dir")
        .arg(temp.path().join("data"))
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("after end date"));
}

#[test]
fn query_requires_a_billing_project() {
    let temp = TempDir::new().unwrap();
    pulse()
        .arg("query")
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("--project"));
}

#[test]
fn month_arguments_are_validated_up_front() {
    let temp = TempDir::new().unwrap();
    pulse()
        .arg("chart")
        .arg("--start")
        .arg("2023-13")
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid month"));
}
