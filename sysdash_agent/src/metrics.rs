//! Metrics collection using sysinfo for sysdash_agent.

use crate::connections::collect_connections;
use crate::state::AppState;
use crate::types::{CpuDetailed, MemoryDetailed, NetworkInfo, ProcessInfo, Snapshot};
use chrono::Utc;
use once_cell::sync::OnceCell;
use sysinfo::{Disks, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};
use tracing::warn;

const MB: f64 = 1024.0 * 1024.0;

// Runtime toggles (read once)
fn temp_enabled() -> bool {
    static ON: OnceCell<bool> = OnceCell::new();
    *ON.get_or_init(|| {
        std::env::var("SYSDASH_AGENT_TEMP")
            .map(|v| v != "0")
            .unwrap_or(true)
    })
}

fn connections_enabled() -> bool {
    static ON: OnceCell<bool> = OnceCell::new();
    *ON.get_or_init(|| {
        std::env::var("SYSDASH_AGENT_CONNECTIONS")
            .map(|v| v != "0")
            .unwrap_or(true)
    })
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        round1(part / whole * 100.0)
    } else {
        0.0
    }
}

/// `Buffers` and `Cached` from /proc/meminfo, in MB.
pub fn parse_meminfo(text: &str) -> (f64, f64) {
    let field = |key: &str| {
        text.lines()
            .find_map(|l| l.strip_prefix(key)?.strip_prefix(':'))
            .and_then(|rest| rest.split_whitespace().next()?.parse::<f64>().ok())
            .map(|kb| kb / 1024.0)
            .unwrap_or(0.0)
    };
    (field("Buffers"), field("Cached"))
}

fn buffers_and_cache() -> (f64, f64) {
    #[cfg(target_os = "linux")]
    {
        match std::fs::read_to_string("/proc/meminfo") {
            Ok(text) => parse_meminfo(&text),
            Err(e) => {
                warn!("reading /proc/meminfo: {e}");
                (0.0, 0.0)
            }
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        (0.0, 0.0)
    }
}

pub fn status_label(status: ProcessStatus) -> String {
    match status {
        ProcessStatus::Run => "running".into(),
        ProcessStatus::Sleep => "sleeping".into(),
        ProcessStatus::Idle => "idle".into(),
        ProcessStatus::Stop => "stopped".into(),
        ProcessStatus::Zombie => "zombie".into(),
        ProcessStatus::Tracing => "tracing-stop".into(),
        ProcessStatus::Dead => "dead".into(),
        ProcessStatus::Waking => "waking".into(),
        ProcessStatus::LockBlocked => "locked".into(),
        ProcessStatus::UninterruptibleDiskSleep => "disk-sleep".into(),
        other => other.to_string().to_lowercase(),
    }
}

/// The volume mounted at `/`, else the largest one.
fn root_disk_percent(disks: &Disks) -> f64 {
    let root = disks
        .list()
        .iter()
        .find(|d| d.mount_point() == std::path::Path::new("/"))
        .or_else(|| disks.list().iter().max_by_key(|d| d.total_space()));
    match root {
        Some(d) => percent(
            d.total_space().saturating_sub(d.available_space()) as f64,
            d.total_space() as f64,
        ),
        None => 0.0,
    }
}

pub async fn collect_snapshot(state: &AppState) -> Snapshot {
    let mut sys = state.sys.lock().await;
    if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        sys.refresh_cpu_all();
        sys.refresh_memory();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
    })) {
        warn!("sysinfo refresh panicked: {e:?}");
    }

    // CPU
    let cpu = round1(sys.global_cpu_usage() as f64);
    let per_core: Vec<f64> = sys
        .cpus()
        .iter()
        .map(|c| round1((c.cpu_usage() as f64).clamp(0.0, 100.0)))
        .collect();
    let freq_mhz = sys.cpus().first().map(|c| c.frequency()).unwrap_or(0);
    let frequency = round1(freq_mhz as f64 / 1000.0);
    let load = System::load_average();

    // Memory
    let (buffers, cached) = buffers_and_cache();
    let total = sys.total_memory() as f64 / MB;
    let available = sys.available_memory() as f64 / MB;
    let used = (total - available).max(0.0);
    let swap_total = sys.total_swap() as f64 / MB;
    let swap_used = sys.used_swap() as f64 / MB;
    let memory_detailed = MemoryDetailed {
        total: round1(total),
        used: round1(used),
        free: round1(sys.free_memory() as f64 / MB),
        available: round1(available),
        buffers: round1(buffers),
        cached: round1(cached),
        percent: percent(used, total),
        swap_total: round1(swap_total),
        swap_used: round1(swap_used),
        swap_free: round1(sys.free_swap() as f64 / MB),
        swap_percent: percent(swap_used, swap_total),
    };

    // Processes
    let processes: Vec<ProcessInfo> = sys
        .processes()
        .values()
        .map(|p| ProcessInfo {
            pid: p.pid().as_u32(),
            name: p.name().to_string_lossy().into_owned(),
            cpu_percent: round1(p.cpu_usage() as f64),
            memory_mb: round1(p.memory() as f64 / MB),
            status: status_label(p.status()),
        })
        .collect();
    drop(sys);

    // CPU temperature
    let temperature = if temp_enabled() {
        let mut components = state.components.lock().await;
        components.refresh(false);
        components
            .iter()
            .filter(|c| {
                let l = c.label().to_ascii_lowercase();
                l.contains("cpu") || l.contains("package") || l.contains("tctl") || l.contains("tdie")
            })
            .filter_map(|c| c.temperature())
            .map(f64::from)
            .reduce(f64::max)
            .map(round1)
    } else {
        None
    };

    let disk = {
        let mut disks = state.disks.lock().await;
        disks.refresh(false);
        root_disk_percent(&disks)
    };

    // Networks: cumulative totals in KB
    let (sent, received) = {
        let mut nets = state.networks.lock().await;
        nets.refresh(false);
        nets.iter().fold((0u64, 0u64), |(tx, rx), (_, data)| {
            (
                tx.saturating_add(data.total_transmitted()),
                rx.saturating_add(data.total_received()),
            )
        })
    };
    let details = if connections_enabled() {
        tokio::task::spawn_blocking(collect_connections)
            .await
            .unwrap_or_else(|e| {
                warn!("connection scan failed: {e}");
                Vec::new()
            })
    } else {
        Vec::new()
    };
    let active_connections = details.iter().filter(|c| c.protocol != "ERROR").count();

    Snapshot {
        timestamp: Utc::now().timestamp_millis(),
        cpu,
        cpu_freq_ghz: frequency,
        cpu_temp_c: temperature,
        cpu_detailed: CpuDetailed {
            usage: cpu,
            temperature,
            frequency,
            per_core,
            load_avg: [round1(load.one), round1(load.five), round1(load.fifteen)],
        },
        memory: memory_detailed.percent,
        memory_detailed,
        disk,
        network: NetworkInfo {
            sent: round1(sent as f64 / 1024.0),
            received: round1(received as f64 / 1024.0),
            active_connections,
            connection_details: connections_enabled().then_some(details),
        },
        processes,
    }
}
