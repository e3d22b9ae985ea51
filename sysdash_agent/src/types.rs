//! Data types sent to the client over WebSocket.
//! This is the wire format; field names are what the dashboard decodes.

use serde::Serialize;

#[derive(Debug, Serialize, Clone, Default)]
pub struct CpuDetailed {
    pub usage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// GHz
    pub frequency: f64,
    pub per_core: Vec<f64>,
    pub load_avg: [f64; 3],
}

/// Megabytes except the percents.
#[derive(Debug, Serialize, Clone, Default)]
pub struct MemoryDetailed {
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

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub protocol: String,
    pub local_address: String,
    pub local_port: u16,
    pub remote_address: String,
    pub remote_port: u16,
    pub status: String,
    pub owning_pid: u32,
    pub process_name: String,
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct NetworkInfo {
    // cumulative KB since boot (client derives rates)
    pub sent: f64,
    pub received: f64,
    pub active_connections: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_details: Option<Vec<ConnectionInfo>>,
}

#[derive(Debug, Serialize, Clone)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub status: String,
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct Snapshot {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub cpu: f64,
    pub cpu_freq_ghz: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_temp_c: Option<f64>,
    pub cpu_detailed: CpuDetailed,
    pub memory: f64,
    pub memory_detailed: MemoryDetailed,
    pub disk: f64,
    pub network: NetworkInfo,
    pub processes: Vec<ProcessInfo>,
}
