//! CLI tests for the `refresher` binary.
//!
//! Spawns the binary against scratch sites and verifies exit codes and the
//! summary printed on stdout.

use std::fs;
use std::process::{Command, Output};

use refresher::core::splice::BEGIN_MARKER;
use refresher::exit_codes;
use refresher::test_support::{SAMPLE_PAGE, SiteFixture};

fn refresher(site: &SiteFixture, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_refresher"))
        .arg("--root")
        .arg(site.path())
        .args(args)
        .env_remove("OPENAI_API_KEY")
        .env_remove("MODEL")
        .env_remove("RUST_LOG")
        .output()
        .expect("run refresher")
}

#[test]
fn counter_mode_commits_and_exits_ok() {
    let site = SiteFixture::new().expect("site");
    let output = refresher(&site, &["--mode", "counter"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Updated counter to 1 and wrote"), "{stdout}");
    assert!(stdout.contains("Reasoning log:"));
    assert!(site.read_document().expect("doc").contains("Counter: 1"));
}

#[test]
fn llm_mode_without_api_key_falls_back_and_exits_ok() {
    let site = SiteFixture::new().expect("site");
    let output = refresher(&site, &["--dry-run"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Dry run complete. No files were modified."));
    assert!(stdout.contains("Reasoning log would be saved to"));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("fallback(missing_api_key)"), "{stderr}");

    assert_eq!(site.read_document().expect("doc"), SAMPLE_PAGE);
    assert!(!site.paths().state_path.exists());
    assert_eq!(site.log_entries().expect("logs").len(), 1);
}

#[test]
fn missing_document_exits_with_missing_document_code() {
    let site = SiteFixture::new().expect("site");
    fs::remove_file(site.paths().document_path).expect("remove");

    let output = refresher(&site, &["--mode", "deterministic"]);
    assert_eq!(output.status.code(), Some(exit_codes::MISSING_DOCUMENT));
    assert!(String::from_utf8_lossy(&output.stderr).contains("document not found"));
}

#[test]
fn missing_markers_exit_with_missing_anchors_code() {
    let site = SiteFixture::new().expect("site");
    site.write_document(&SAMPLE_PAGE.replace(BEGIN_MARKER, ""))
        .expect("doc");

    let output = refresher(&site, &["--mode", "counter"]);
    assert_eq!(output.status.code(), Some(exit_codes::MISSING_ANCHORS));
    assert!(!site.paths().state_path.exists());
}

#[test]
fn invalid_config_exits_with_invalid_code() {
    let site = SiteFixture::new().expect("site");
    fs::write(site.path().join("refresher.toml"), "[backend]\ntimeout_secs = 0\n")
        .expect("config");

    let output = refresher(&site, &["--mode", "counter"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("timeout_secs"));
}
