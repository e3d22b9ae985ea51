//! Typed snapshot model produced by the decoder.
//!
//! Detailed sub-objects are `Option`s: absence means "fall back to the coarse scalar",
//! never "zero".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One decoded telemetry message.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    /// Upstream timestamp if the agent sent one, receipt instant otherwise.
    pub timestamp: DateTime<Utc>,
    pub cpu: Option<f64>,
    pub cpu_freq_ghz: Option<f64>,
    pub cpu_temp_c: Option<f64>,
    pub cpu_detailed: Option<CpuDetail>,
    pub memory: Option<f64>,
    pub memory_detailed: Option<MemoryDetail>,
    pub disk: Option<f64>,
    pub network: Option<NetworkCounters>,
    pub processes: Option<Vec<ProcessInfo>>,
}

impl Snapshot {
    /// CPU usage, preferring the coarse scalar and falling back to the detailed usage.
    pub fn cpu_usage(&self) -> Option<f64> {
        self.cpu.or(self.cpu_detailed.as_ref().map(|d| d.usage))
    }

    /// Memory percent, preferring the coarse scalar.
    pub fn memory_percent(&self) -> Option<f64> {
        self.memory
            .or(self.memory_detailed.as_ref().map(|d| d.percent))
    }

    pub fn cpu_temperature(&self) -> Option<f64> {
        self.cpu_detailed
            .as_ref()
            .and_then(|d| d.temperature)
            .or(self.cpu_temp_c)
    }

    pub fn cpu_frequency(&self) -> Option<f64> {
        self.cpu_detailed
            .as_ref()
            .and_then(|d| d.frequency)
            .or(self.cpu_freq_ghz)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CpuDetail {
    pub usage: f64,
    pub temperature: Option<f64>,
    /// GHz
    pub frequency: Option<f64>,
    /// One entry per logical core, each clamped to 0..=100.
    pub per_core: Vec<f64>,
    /// 1, 5 and 15 minute windows.
    pub load_avg: Option<[f64; 3]>,
}

/// Memory breakdown in megabytes (percents excepted).
///
/// `used + free` need not equal `total`; `available` is the figure to trust for
/// "free for allocation".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryDetail {
    pub total: f64,
    pub used: f64,
    pub free: f64,
    pub available: f64,
    pub buffers: f64,
    pub cached: f64,
    pub percent: f64,
    pub swap_total: f64,
    pub swap_used: f64,
    pub swap_free: f64,
    pub swap_percent: f64,
}

impl MemoryDetail {
    /// Used memory excluding buffers and cache, never negative.
    pub fn used_excluding_cache(&self) -> f64 {
        (self.used - self.buffers - self.cached).max(0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkCounters {
    // cumulative since agent start; the client diffs to get rates
    pub sent: Option<f64>,
    pub received: Option<f64>,
    pub active_connections: Option<u64>,
    pub connection_details: Option<Vec<Connection>>,
}

/// Protocol marker the agent uses for a row that reports an enumeration failure.
pub const ERROR_PROTOCOL: &str = "ERROR";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Connection {
    pub protocol: String,
    pub local_address: String,
    pub local_port: u16,
    pub remote_address: String,
    pub remote_port: u16,
    pub status: String,
    pub owning_pid: u32,
    pub process_name: String,
}

impl Connection {
    /// True for the row an agent emits when it lacks the privilege to list sockets.
    pub fn is_error_row(&self) -> bool {
        self.protocol == ERROR_PROTOCOL
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub status: ProcessStatus,
}

/// Scheduler state as reported by the agent. Unknown names are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProcessStatus {
    Running,
    Sleeping,
    Stopped,
    Zombie,
    DiskSleep,
    TracingStop,
    Dead,
    WakeKill,
    Waking,
    Idle,
    Locked,
    Waiting,
    Suspended,
    Other(String),
}

impl ProcessStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "running" => Self::Running,
            "sleeping" => Self::Sleeping,
            "stopped" => Self::Stopped,
            "zombie" => Self::Zombie,
            "disk-sleep" => Self::DiskSleep,
            "tracing-stop" => Self::TracingStop,
            "dead" => Self::Dead,
            "wake-kill" => Self::WakeKill,
            "waking" => Self::Waking,
            "idle" => Self::Idle,
            "locked" => Self::Locked,
            "waiting" => Self::Waiting,
            "suspended" => Self::Suspended,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "running",
            Self::Sleeping => "sleeping",
            Self::Stopped => "stopped",
            Self::Zombie => "zombie",
            Self::DiskSleep => "disk-sleep",
            Self::TracingStop => "tracing-stop",
            Self::Dead => "dead",
            Self::WakeKill => "wake-kill",
            Self::Waking => "waking",
            Self::Idle => "idle",
            Self::Locked => "locked",
            Self::Waiting => "waiting",
            Self::Suspended => "suspended",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for ProcessStatus {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<ProcessStatus> for String {
    fn from(s: ProcessStatus) -> Self {
        s.as_str().to_string()
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
