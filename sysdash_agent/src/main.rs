//! sysdash agent entrypoint: sets up the sampler and the WebSocket server.

mod connections;
mod metrics;
mod sampler;
mod state;
mod types;
mod ws;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::sampler::spawn_sampler;
use crate::state::AppState;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_INTERVAL_MS: u64 = 1000;

#[derive(Debug, PartialEq)]
struct AgentArgs {
    port: u16,
    interval: Duration,
}

fn usage(prog: &str) -> String {
    format!("Usage: {prog} [--port PORT|-p PORT] [--interval-ms MS]")
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<AgentArgs, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "sysdash_agent".into());
    let mut port = DEFAULT_PORT;
    let mut interval_ms = DEFAULT_INTERVAL_MS;

    while let Some(a) = it.next() {
        let (flag, inline) = match a.split_once('=') {
            Some((f, v)) if f.starts_with("--") => (f.to_string(), Some(v.to_string())),
            _ => (a.clone(), None),
        };
        match flag.as_str() {
            "-h" | "--help" => return Err(usage(&prog)),
            "--port" | "-p" => {
                let v = inline.or_else(|| it.next()).unwrap_or_default();
                port = v.parse().map_err(|_| format!("invalid port '{v}'"))?;
            }
            "--interval-ms" => {
                let v = inline.or_else(|| it.next()).unwrap_or_default();
                interval_ms = v
                    .parse::<u64>()
                    .ok()
                    .filter(|ms| *ms > 0)
                    .ok_or_else(|| format!("invalid interval '{v}'"))?;
            }
            _ => return Err(format!("Unexpected argument '{a}'. {}", usage(&prog))),
        }
    }
    Ok(AgentArgs {
        port,
        interval: Duration::from_millis(interval_ms),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args(std::env::args()) {
        Ok(a) => a,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };

    let token = std::env::var("SYSDASH_AGENT_TOKEN")
        .ok()
        .filter(|t| !t.is_empty());
    let state = AppState::new(token);
    spawn_sampler(state.clone(), args.interval);

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        "agent pushing every {} ms at ws://{}/ws",
        args.interval.as_millis(),
        addr
    );
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("agent")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn port_long_short_and_assign() {
        assert_eq!(parse_args(args(&["--port", "9001"])).unwrap().port, 9001);
        assert_eq!(parse_args(args(&["-p", "9002"])).unwrap().port, 9002);
        assert_eq!(parse_args(args(&["--port=9003"])).unwrap().port, 9003);
        assert_eq!(
            parse_args(args(&[])).unwrap(),
            AgentArgs {
                port: DEFAULT_PORT,
                interval: Duration::from_millis(DEFAULT_INTERVAL_MS)
            }
        );
    }

    #[test]
    fn interval_and_errors() {
        let a = parse_args(args(&["--interval-ms", "250"])).unwrap();
        assert_eq!(a.interval, Duration::from_millis(250));
        assert!(parse_args(args(&["--interval-ms", "0"])).is_err());
        assert!(parse_args(args(&["--port", "99999"])).is_err());
        assert!(parse_args(args(&["--bogus"])).is_err());
        assert!(parse_args(args(&["--help"])).unwrap_err().starts_with("Usage:"));
    }
}
