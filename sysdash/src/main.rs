//! Entry point for the sysdash TUI. Parses args and runs the App.

mod app;
mod profiles;
mod ui;

use std::env;
use std::fs;
use std::io::{self, Write};

use anyhow::Context;
use app::App;
use profiles::{load_profiles, save_profiles, ProfileEntry, ProfileRequest, ResolveProfile};
use sysdash::threshold::ThresholdConfig;
use sysdash::views::SyntheticMode;
use tracing::warn;

const DEMO_PORT: u16 = 3231;

#[derive(Debug, Default)]
struct ParsedArgs {
    url: Option<String>,
    tls_ca: Option<String>,
    profile: Option<String>,
    save: bool,
    demo: bool,
    dry_run: bool,
    synthetic: bool,
    config: ThresholdConfig,
}

fn usage(prog: &str) -> String {
    format!(
        "Usage: {prog} [--tls-ca CERT_PEM|-t CERT_PEM] [--profile NAME|-P NAME] [--save] [--demo] \
         [--dry-run] [--synthetic] [--alerts] [--cpu PCT] [--memory PCT] [--disk PCT] \
         [--network PCT] [--interval MS] [ws://HOST:PORT/ws]"
    )
}

fn parse_percent(flag: &str, v: Option<String>) -> Result<Option<f64>, String> {
    let v = v.ok_or_else(|| format!("{flag} needs a value"))?;
    if v == "off" {
        return Ok(None);
    }
    match v.parse::<f64>() {
        Ok(p) if (0.0..=100.0).contains(&p) => Ok(Some(p)),
        _ => Err(format!("{flag}: expected a percentage 0-100 or 'off', got '{v}'")),
    }
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "sysdash".into());
    let mut parsed = ParsedArgs::default();

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => return Err(usage(&prog)),
            "--tls-ca" | "-t" => parsed.tls_ca = it.next(),
            "--profile" | "-P" => parsed.profile = it.next(),
            "--save" => parsed.save = true,
            "--demo" => parsed.demo = true,
            "--dry-run" => parsed.dry_run = true,
            "--synthetic" => parsed.synthetic = true,
            "--alerts" => parsed.config.enabled = true,
            "--cpu" => parsed.config.thresholds.cpu = parse_percent("--cpu", it.next())?,
            "--memory" => parsed.config.thresholds.memory = parse_percent("--memory", it.next())?,
            "--disk" => parsed.config.thresholds.disk = parse_percent("--disk", it.next())?,
            "--network" => {
                parsed.config.thresholds.network = parse_percent("--network", it.next())?
            }
            "--interval" => {
                let v = it.next().unwrap_or_default();
                parsed.config.update_interval_ms = v
                    .parse::<u64>()
                    .ok()
                    .filter(|ms| *ms > 0)
                    .ok_or_else(|| format!("--interval: expected milliseconds, got '{v}'"))?;
            }
            _ if arg.starts_with("--tls-ca=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        parsed.tls_ca = Some(v.to_string());
                    }
                }
            }
            _ if arg.starts_with("--profile=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        parsed.profile = Some(v.to_string());
                    }
                }
            }
            _ => {
                if parsed.url.is_none() {
                    parsed.url = Some(arg);
                } else {
                    return Err(format!("Unexpected argument. {}", usage(&prog)));
                }
            }
        }
    }
    Ok(parsed)
}

/// File logging when SYSDASH_LOG is set; the terminal belongs to the UI.
fn init_logging() {
    let Some(filter) = env::var_os("SYSDASH_LOG") else {
        return;
    };
    let dir = profiles::config_dir();
    let file = fs::create_dir_all(&dir).and_then(|_| {
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("sysdash.log"))
    });
    let Ok(file) = file else {
        return;
    };
    let filter = tracing_subscriber::EnvFilter::try_new(filter.to_string_lossy())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .try_init();
}

fn signed_in_user() -> String {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "local".into())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = match parse_args(env::args()) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };
    init_logging();

    let synthetic = if parsed.synthetic {
        SyntheticMode::On
    } else {
        SyntheticMode::Off
    };

    // Demo mode short-circuit
    if parsed.demo || matches!(parsed.profile.as_deref(), Some("demo")) {
        if parsed.dry_run {
            return Ok(());
        }
        return run_demo_mode(parsed.config, synthetic).await;
    }

    let profiles_file = load_profiles();
    let req = ProfileRequest {
        profile_name: parsed.profile.clone(),
        url: parsed.url.clone(),
        tls_ca: parsed.tls_ca.clone(),
    };

    let mut profiles_mut = profiles_file.clone();
    let (url, tls_ca): (String, Option<String>) = match req.resolve(&profiles_file) {
        ResolveProfile::Direct(u, t) => {
            if let Some(name) = parsed.profile.as_ref() {
                let write = match profiles_mut.profiles.get(name) {
                    // New profile: save immediately
                    None => true,
                    Some(entry) if entry.url != u || entry.tls_ca != t => {
                        parsed.save
                            || prompt_yes_no(&format!("Overwrite existing profile '{name}'? [y/N]: "))
                    }
                    Some(_) => false,
                };
                if write {
                    profiles_mut.profiles.insert(
                        name.clone(),
                        ProfileEntry {
                            url: u.clone(),
                            tls_ca: t.clone(),
                        },
                    );
                    if let Err(e) = save_profiles(&profiles_mut) {
                        warn!("could not save profile '{}': {}", name, e);
                        eprintln!("warning: could not save profile '{name}': {e}");
                    }
                }
            }
            (u, t)
        }
        ResolveProfile::Loaded(u, t) => (u, t),
        ResolveProfile::PromptSelect(mut names) => {
            if !names.iter().any(|n| n == "demo") {
                names.push("demo".into());
            }
            eprintln!("Select profile:");
            for (i, n) in names.iter().enumerate() {
                eprintln!("  {}. {}", i + 1, n);
            }
            let line = prompt_string("Enter number (or blank to abort): ")?;
            let Some(name) = line
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|idx| idx.checked_sub(1))
                .and_then(|idx| names.get(idx))
            else {
                return Ok(());
            };
            if name == "demo" {
                return run_demo_mode(parsed.config, synthetic).await;
            }
            match profiles_mut.profiles.get(name) {
                Some(entry) => (entry.url.clone(), entry.tls_ca.clone()),
                None => return Ok(()),
            }
        }
        ResolveProfile::PromptCreate(name) => {
            eprintln!("Profile '{name}' does not exist yet.");
            let url = prompt_string("Enter URL (ws://HOST:PORT/ws or wss://...): ")?;
            if url.trim().is_empty() {
                return Ok(());
            }
            let ca = prompt_string("Enter TLS CA path (or leave blank): ")?;
            let ca_opt = Some(ca.trim().to_string()).filter(|c| !c.is_empty());
            profiles_mut.profiles.insert(
                name.clone(),
                ProfileEntry {
                    url: url.trim().to_string(),
                    tls_ca: ca_opt.clone(),
                },
            );
            save_profiles(&profiles_mut).with_context(|| format!("saving profile '{name}'"))?;
            (url.trim().to_string(), ca_opt)
        }
        ResolveProfile::None => {
            eprintln!("No URL provided and no profiles to select.");
            return Ok(());
        }
    };

    if parsed.dry_run {
        println!("would connect to {url}");
        return Ok(());
    }

    let mut app = App::new(parsed.config, synthetic, signed_in_user());
    app.run(&url, tls_ca.as_deref()).await
}

fn prompt_yes_no(prompt: &str) -> bool {
    eprint!("{prompt}");
    let _ = io::stderr().flush();
    let mut line = String::new();
    if io::stdin().read_line(&mut line).is_ok() {
        matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    } else {
        false
    }
}

fn prompt_string(prompt: &str) -> io::Result<String> {
    eprint!("{prompt}");
    let _ = io::stderr().flush();
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line)
}

// --- Demo Mode ---

async fn run_demo_mode(config: ThresholdConfig, synthetic: SyntheticMode) -> anyhow::Result<()> {
    let url = format!("ws://127.0.0.1:{DEMO_PORT}/ws");
    let child = spawn_demo_agent(DEMO_PORT, config.update_interval_ms)?;
    let mut app = App::new(config, synthetic, signed_in_user());
    tokio::select! {
        res = app.run(&url, None) => { drop(child); res }
        _ = tokio::signal::ctrl_c() => {
            drop(child);
            Ok(())
        }
    }
}

struct DemoGuard(std::process::Child);

impl Drop for DemoGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

/// The agent samples at the dashboard's interval so per-interval rates line up.
fn demo_agent_args(port: u16, interval_ms: u64) -> Vec<String> {
    vec![
        "--port".into(),
        port.to_string(),
        "--interval-ms".into(),
        interval_ms.to_string(),
    ]
}

fn spawn_demo_agent(port: u16, interval_ms: u64) -> anyhow::Result<DemoGuard> {
    let candidate = find_agent_executable();
    let child = std::process::Command::new(&candidate)
        .args(demo_agent_args(port, interval_ms))
        .env("SYSDASH_AGENT_TEMP", "0")
        .stderr(std::process::Stdio::null())
        .spawn()
        .with_context(|| format!("starting demo agent {}", candidate.display()))?;
    // Give the agent a brief moment to bind
    std::thread::sleep(std::time::Duration::from_millis(300));
    Ok(DemoGuard(child))
}

fn find_agent_executable() -> std::path::PathBuf {
    #[cfg(windows)]
    let name = "sysdash_agent.exe";
    #[cfg(not(windows))]
    let name = "sysdash_agent";
    if let Some(parent) = env::current_exe().ok().and_then(|e| e.parent().map(|p| p.to_path_buf())) {
        let candidate = parent.join(name);
        if candidate.exists() {
            return candidate;
        }
    }
    // Fallback to relying on PATH
    std::path::PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("sysdash")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn url_and_flags() {
        let p = parse_args(args(&["-t", "ca.pem", "--profile=lab", "--save", "wss://h/ws"])).unwrap();
        assert_eq!(p.url.as_deref(), Some("wss://h/ws"));
        assert_eq!(p.tls_ca.as_deref(), Some("ca.pem"));
        assert_eq!(p.profile.as_deref(), Some("lab"));
        assert!(p.save && !p.demo && !p.dry_run);
        assert_eq!(p.config, ThresholdConfig::default());
    }

    #[test]
    fn threshold_flags() {
        let p = parse_args(args(&[
            "--alerts", "--cpu", "65", "--disk", "off", "--interval", "2000",
        ]))
        .unwrap();
        assert!(p.config.enabled);
        assert_eq!(p.config.thresholds.cpu, Some(65.0));
        assert_eq!(p.config.thresholds.disk, None);
        assert_eq!(p.config.thresholds.memory, Some(80.0));
        assert_eq!(p.config.update_interval_ms, 2000);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse_args(args(&["--cpu", "150"])).is_err());
        assert!(parse_args(args(&["--network"])).is_err());
        assert!(parse_args(args(&["--interval", "0"])).is_err());
        assert!(parse_args(args(&["ws://a/ws", "ws://b/ws"])).is_err());
    }

    #[test]
    fn demo_agent_follows_update_interval() {
        let default = ThresholdConfig::default();
        assert_eq!(
            demo_agent_args(DEMO_PORT, default.update_interval_ms),
            vec!["--port", "3231", "--interval-ms", "5000"]
        );
        let p = parse_args(args(&["--demo", "--interval", "1500"])).unwrap();
        let agent = demo_agent_args(DEMO_PORT, p.config.update_interval_ms);
        assert_eq!(&agent[2..], ["--interval-ms", "1500"]);
    }

    #[test]
    fn help_is_usage() {
        let err = parse_args(args(&["--help"])).unwrap_err();
        assert!(err.starts_with("Usage: sysdash"));
    }
}
