//! CLI arg parsing tests for sysdash (client)
use std::process::Command;

fn run(args: &[&str]) -> (bool, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_sysdash"))
        .args(args)
        .output()
        .expect("run sysdash");
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    (output.status.success(), text)
}

#[test]
fn test_help_mentions_short_and_long_flags() {
    let (_ok, text) = run(&["--help"]);
    for flag in ["--tls-ca", "-t", "--profile", "-P", "--synthetic", "--alerts", "--interval"] {
        assert!(text.contains(flag), "help text missing {flag}\n{text}");
    }
}

#[test]
fn test_flags_accepted_before_help() {
    // --help last exits after parsing, so no network is touched
    for args in [
        &["--tls-ca", "/tmp/cert.pem", "--help"][..],
        &["-t", "/tmp/cert.pem", "--help"][..],
        &["--profile", "dev", "--help"][..],
        &["--cpu", "70", "--network", "off", "--help"][..],
    ] {
        let (ok, text) = run(args);
        assert!(ok, "sysdash {args:?} did not succeed");
        assert!(text.contains("Usage:"), "{text}");
    }
}

#[test]
fn test_bad_threshold_is_reported() {
    let (_ok, text) = run(&["--cpu", "120", "ws://127.0.0.1:1/ws"]);
    assert!(text.contains("--cpu"), "{text}");
}

#[test]
fn test_no_target_and_no_profiles_exits_cleanly() {
    let td = tempfile::tempdir().unwrap();
    let assert = assert_cmd::Command::cargo_bin("sysdash")
        .unwrap()
        .env("XDG_CONFIG_HOME", td.path())
        .arg("--dry-run")
        .assert()
        .success();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains("No URL provided"), "{stderr}");
}
