//! Tests for profile load/save and resolution logic (non-interactive paths only)
use std::fs;
use std::process::Command;
use std::sync::Mutex;

// Global lock to serialize tests that mutate process-wide environment variables.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn run_sysdash(args: &[&str]) -> (bool, String) {
    let exe = env!("CARGO_BIN_EXE_sysdash");
    let output = Command::new(exe).args(args).output().expect("run sysdash");
    let ok = output.status.success();
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    (ok, text)
}

fn config_dir() -> std::path::PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        std::path::PathBuf::from(xdg).join("sysdash")
    } else {
        dirs_next::config_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join("sysdash")
    }
}

fn profiles_path() -> std::path::PathBuf {
    config_dir().join("profiles.json")
}

fn isolated() -> tempfile::TempDir {
    let td = tempfile::tempdir().unwrap();
    std::env::set_var("XDG_CONFIG_HOME", td.path());
    std::fs::create_dir_all(td.path().join("sysdash")).unwrap();
    let _ = fs::remove_file(profiles_path());
    td
}

#[test]
fn test_profile_created_on_first_use() {
    let _guard = ENV_LOCK.lock().unwrap();
    let _td = isolated();
    // --dry-run resolves and saves, then exits before connecting
    let (ok, out) = run_sysdash(&["--profile", "unittest", "ws://example:1/ws", "--dry-run"]);
    assert!(ok, "{out}");
    assert!(out.contains("ws://example:1/ws"), "{out}");
    let data = fs::read_to_string(profiles_path()).expect("profiles.json created");
    assert!(
        data.contains("unittest"),
        "profiles.json missing profile entry: {data}"
    );
}

#[test]
fn test_profile_overwrite_only_when_changed() {
    let _guard = ENV_LOCK.lock().unwrap();
    let _td = isolated();
    run_sysdash(&["--profile", "prod", "ws://one/ws", "--dry-run"]);
    let first = fs::read_to_string(profiles_path()).unwrap();
    run_sysdash(&["--profile", "prod", "ws://one/ws", "--dry-run"]);
    let second = fs::read_to_string(profiles_path()).unwrap();
    assert_eq!(first, second, "Profile file changed despite identical input");
    // Overwrite with different URL using --save (no prompt path)
    run_sysdash(&["--profile", "prod", "--save", "ws://two/ws", "--dry-run"]);
    let third = fs::read_to_string(profiles_path()).unwrap();
    assert!(third.contains("two"), "Updated URL not written: {third}");
}

#[test]
fn test_profile_tls_ca_persisted() {
    let _guard = ENV_LOCK.lock().unwrap();
    let _td = isolated();
    run_sysdash(&[
        "--profile",
        "secureX",
        "--tls-ca",
        "/tmp/cert.pem",
        "wss://host/ws",
        "--dry-run",
    ]);
    let data = fs::read_to_string(profiles_path()).unwrap();
    assert!(data.contains("secureX"));
    assert!(data.contains("cert.pem"));
}

#[test]
fn test_saved_profile_is_loaded_by_name() {
    let _guard = ENV_LOCK.lock().unwrap();
    let _td = isolated();
    run_sysdash(&["--profile", "lab", "ws://lab-host:3000/ws", "--dry-run"]);
    let (ok, out) = run_sysdash(&["--profile", "lab", "--dry-run"]);
    assert!(ok, "{out}");
    assert!(out.contains("ws://lab-host:3000/ws"), "{out}");
}

#[test]
fn test_corrupt_profiles_file_is_ignored() {
    let _guard = ENV_LOCK.lock().unwrap();
    let _td = isolated();
    fs::write(profiles_path(), "{ not json").unwrap();
    let (ok, out) = run_sysdash(&["ws://direct/ws", "--dry-run"]);
    assert!(ok, "{out}");
    assert!(out.contains("ws://direct/ws"), "{out}");
}
