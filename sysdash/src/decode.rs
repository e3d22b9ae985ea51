//! Snapshot decoder: raw text payload -> typed [`Snapshot`].
//!
//! The decoder is deliberately forgiving at the field level. Numbers may arrive as JSON
//! numbers or as unit-suffixed strings (`"45.2%"`, `"1000.00 KB"`, `"2.10 GHz"`), the
//! legacy Spanish key names are accepted as aliases, unknown keys are ignored and a
//! sub-object of the wrong shape is treated as absent. Only a payload that is not a
//! JSON object at all is a [`DecodeError`].

use chrono::{DateTime, TimeZone, Utc};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::error::DecodeError;
use crate::types::{
    Connection, CpuDetail, MemoryDetail, NetworkCounters, ProcessInfo, ProcessStatus, Snapshot,
};

/// Decode one payload, stamping it with the current wall-clock time if the agent did not.
pub fn decode(payload: &str) -> Result<Snapshot, DecodeError> {
    decode_at(payload, Utc::now())
}

pub fn decode_at(payload: &str, received_at: DateTime<Utc>) -> Result<Snapshot, DecodeError> {
    let value: Value = serde_json::from_str(payload)?;
    decode_value(value, received_at)
}

/// Decode one WebSocket frame, which may carry a single object or newline-delimited objects.
///
/// Each line is decoded on its own so that one bad line does not take its neighbours down.
pub fn decode_frame(frame: &str, received_at: DateTime<Utc>) -> Vec<Result<Snapshot, DecodeError>> {
    if frame.trim().is_empty() {
        return Vec::new();
    }
    match decode_at(frame, received_at) {
        Ok(s) => vec![Ok(s)],
        Err(e) if !frame.trim().contains('\n') => vec![Err(e)],
        Err(_) => frame
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| decode_at(l, received_at))
            .collect(),
    }
}

pub fn decode_value(value: Value, received_at: DateTime<Utc>) -> Result<Snapshot, DecodeError> {
    let kind = match &value {
        Value::Object(_) => None,
        Value::Null => Some("null"),
        Value::Bool(_) => Some("bool"),
        Value::Number(_) => Some("number"),
        Value::String(_) => Some("string"),
        Value::Array(_) => Some("array"),
    };
    if let Some(kind) = kind {
        return Err(DecodeError::NotAnObject(kind));
    }
    let wire: Wire = serde_json::from_value(value)?;
    Ok(wire.into_snapshot(received_at))
}

// ---------- lenient field helpers ----------

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Num(f64),
    Text(String),
    Other(IgnoredAny),
}

impl Loose {
    fn to_f64(&self) -> Option<f64> {
        match self {
            Loose::Num(n) => Some(*n),
            Loose::Text(s) => leading_number(s),
            Loose::Other(_) => None,
        }
    }
}

/// Parse the numeric prefix of a unit-suffixed string: `"55°C"` -> 55.0.
fn leading_number(s: &str) -> Option<f64> {
    let s = s.trim();
    let end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

fn lenient<'de, D>(d: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v: Option<Loose> = Option::deserialize(d)?;
    Ok(v.and_then(|l| l.to_f64()))
}

fn lenient_list<'de, D>(d: D) -> Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v: Option<Value> = Option::deserialize(d)?;
    let Some(Value::Array(items)) = v else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<Loose>(item).ok())
        .filter_map(|l| l.to_f64())
        .collect())
}

fn tolerant<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let v: Option<Value> = Option::deserialize(d)?;
    Ok(v.and_then(|v| match serde_json::from_value(v) {
        Ok(t) => Some(t),
        Err(e) => {
            debug!("dropping malformed sub-object: {e}");
            None
        }
    }))
}

/// A list whose malformed entries are dropped one by one.
fn tolerant_list<'de, D, T>(d: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let v: Option<Value> = Option::deserialize(d)?;
    Ok(match v {
        Some(Value::Array(items)) => Some(
            items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
        ),
        _ => None,
    })
}

// ---------- wire shape ----------

#[derive(Deserialize)]
struct Wire {
    #[serde(default, deserialize_with = "lenient")]
    timestamp: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    cpu: Option<f64>,
    #[serde(default, alias = "cpu_freq", deserialize_with = "lenient")]
    cpu_freq_ghz: Option<f64>,
    #[serde(default, alias = "cpu_temp", deserialize_with = "lenient")]
    cpu_temp_c: Option<f64>,
    #[serde(default, alias = "cpu_detallado", deserialize_with = "tolerant")]
    cpu_detailed: Option<WireCpuDetail>,
    #[serde(default, alias = "memoria", deserialize_with = "lenient")]
    memory: Option<f64>,
    #[serde(default, alias = "memoria_detallada", deserialize_with = "tolerant")]
    memory_detailed: Option<WireMemoryDetail>,
    #[serde(default, alias = "disco", deserialize_with = "lenient")]
    disk: Option<f64>,
    #[serde(default, deserialize_with = "tolerant")]
    network: Option<WireNetwork>,
    // legacy flat network keys
    #[serde(default, rename = "red_enviados", deserialize_with = "lenient")]
    flat_sent: Option<f64>,
    #[serde(default, rename = "red_recibidos", deserialize_with = "lenient")]
    flat_received: Option<f64>,
    #[serde(default, rename = "conexiones_red", deserialize_with = "lenient")]
    flat_connections: Option<f64>,
    #[serde(default, rename = "detalles_conexiones", deserialize_with = "tolerant_list")]
    flat_details: Option<Vec<WireConnection>>,
    #[serde(default, alias = "procesos", deserialize_with = "tolerant_list")]
    processes: Option<Vec<WireProcess>>,
}

#[derive(Deserialize, Default)]
struct WireNetwork {
    #[serde(default, deserialize_with = "lenient")]
    sent: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    received: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    active_connections: Option<f64>,
    #[serde(default, deserialize_with = "tolerant_list")]
    connection_details: Option<Vec<WireConnection>>,
}

#[derive(Deserialize)]
struct WireCpuDetail {
    #[serde(default, deserialize_with = "lenient")]
    usage: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    temperature: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    frequency: Option<f64>,
    #[serde(default, deserialize_with = "lenient_list")]
    per_core: Vec<f64>,
    #[serde(default, deserialize_with = "lenient_list")]
    load_avg: Vec<f64>,
}

#[derive(Deserialize)]
struct WireMemoryDetail {
    #[serde(default, deserialize_with = "lenient")]
    total: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    used: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    free: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    available: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    buffers: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    cached: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    swap_total: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    swap_used: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    swap_free: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    swap_percent: Option<f64>,
}

#[derive(Deserialize)]
struct WireConnection {
    #[serde(default, alias = "type")]
    protocol: Option<String>,
    #[serde(default)]
    local_address: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    local_port: Option<f64>,
    #[serde(default)]
    remote_address: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    remote_port: Option<f64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, alias = "pid", deserialize_with = "lenient")]
    owning_pid: Option<f64>,
    #[serde(default, alias = "process")]
    process_name: Option<String>,
}

#[derive(Deserialize)]
struct WireProcess {
    #[serde(default, deserialize_with = "lenient")]
    pid: Option<f64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    cpu_percent: Option<f64>,
    #[serde(default, alias = "memory", deserialize_with = "lenient")]
    memory_mb: Option<f64>,
    #[serde(default)]
    status: Option<String>,
}

impl Wire {
    fn into_snapshot(self, received_at: DateTime<Utc>) -> Snapshot {
        let timestamp = self
            .timestamp
            .and_then(|ms| Utc.timestamp_millis_opt(ms as i64).single())
            .unwrap_or(received_at);

        let cpu_detailed = self.cpu_detailed.and_then(|d| d.into_detail(self.cpu));
        let memory_detailed = self
            .memory_detailed
            .and_then(|d| d.into_detail(self.memory));

        let nested = self.network.unwrap_or_default();
        let details = nested.connection_details.or(self.flat_details);
        let counters = NetworkCounters {
            sent: nested.sent.or(self.flat_sent),
            received: nested.received.or(self.flat_received),
            active_connections: nested
                .active_connections
                .or(self.flat_connections)
                .map(|c| c.max(0.0) as u64),
            connection_details: details
                .map(|list| list.into_iter().map(WireConnection::into_connection).collect()),
        };
        let network = if counters == NetworkCounters::default() {
            None
        } else {
            Some(counters)
        };

        let processes = self
            .processes
            .map(|list| list.into_iter().filter_map(WireProcess::into_process).collect());

        Snapshot {
            timestamp,
            cpu: self.cpu,
            cpu_freq_ghz: self.cpu_freq_ghz,
            cpu_temp_c: self.cpu_temp_c,
            cpu_detailed,
            memory: self.memory,
            memory_detailed,
            disk: self.disk,
            network,
            processes,
        }
    }
}

impl WireCpuDetail {
    fn into_detail(self, coarse: Option<f64>) -> Option<CpuDetail> {
        let usage = self.usage.or(coarse)?;
        let load_avg = match self.load_avg.as_slice() {
            [a, b, c, ..] => Some([*a, *b, *c]),
            _ => None,
        };
        Some(CpuDetail {
            usage,
            temperature: self.temperature,
            frequency: self.frequency,
            per_core: self.per_core.iter().map(|v| v.clamp(0.0, 100.0)).collect(),
            load_avg,
        })
    }
}

impl WireMemoryDetail {
    fn into_detail(self, coarse: Option<f64>) -> Option<MemoryDetail> {
        let total = self.total?;
        let used = self.used.unwrap_or(0.0);
        let percent = self
            .percent
            .or(coarse)
            .unwrap_or(if total > 0.0 { used / total * 100.0 } else { 0.0 });
        Some(MemoryDetail {
            total,
            used,
            free: self.free.unwrap_or(0.0),
            available: self.available.unwrap_or(0.0),
            buffers: self.buffers.unwrap_or(0.0),
            cached: self.cached.unwrap_or(0.0),
            percent,
            swap_total: self.swap_total.unwrap_or(0.0),
            swap_used: self.swap_used.unwrap_or(0.0),
            swap_free: self.swap_free.unwrap_or(0.0),
            swap_percent: self.swap_percent.unwrap_or(0.0),
        })
    }
}

impl WireConnection {
    fn into_connection(self) -> Connection {
        Connection {
            protocol: self.protocol.unwrap_or_default(),
            local_address: self.local_address.unwrap_or_default(),
            local_port: port(self.local_port),
            remote_address: self.remote_address.unwrap_or_default(),
            remote_port: port(self.remote_port),
            status: self.status.unwrap_or_default(),
            owning_pid: self.owning_pid.map(|p| p.max(0.0) as u32).unwrap_or(0),
            process_name: self.process_name.unwrap_or_default(),
        }
    }
}

fn port(v: Option<f64>) -> u16 {
    v.map(|p| p.clamp(0.0, u16::MAX as f64) as u16).unwrap_or(0)
}

impl WireProcess {
    fn into_process(self) -> Option<ProcessInfo> {
        let pid = self.pid?;
        if pid < 0.0 {
            return None;
        }
        Some(ProcessInfo {
            pid: pid as u32,
            name: self.name.unwrap_or_default(),
            cpu_percent: self.cpu_percent.unwrap_or(0.0),
            memory_mb: self.memory_mb.unwrap_or(0.0),
            status: ProcessStatus::parse(self.status.as_deref().unwrap_or("unknown")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn coarse_scalars_only() {
        let s = decode_at(r#"{"cpu": 45.2, "memory": 30.0, "disk": 55.0}"#, at()).unwrap();
        assert_eq!(s.cpu, Some(45.2));
        assert_eq!(s.memory, Some(30.0));
        assert_eq!(s.disk, Some(55.0));
        assert_eq!(s.timestamp, at());
        assert!(s.cpu_detailed.is_none());
        assert!(s.memory_detailed.is_none());
        assert!(s.network.is_none());
        assert!(s.processes.is_none());
    }

    #[test]
    fn legacy_unit_strings_and_aliases() {
        let payload = r#"{
            "cpu": "12.5%",
            "cpu_freq": "2.10 GHz",
            "cpu_temp": "55°C",
            "memoria": "40.1%",
            "disco": "70%",
            "red_enviados": "1000.00 KB",
            "red_recibidos": "250.50 KB",
            "conexiones_red": 17,
            "procesos": [
                {"pid": 1, "name": "init", "cpu_percent": 0.0, "memory": 12.5, "status": "sleeping"}
            ]
        }"#;
        let s = decode_at(payload, at()).unwrap();
        assert_eq!(s.cpu, Some(12.5));
        assert_eq!(s.cpu_freq_ghz, Some(2.10));
        assert_eq!(s.cpu_temp_c, Some(55.0));
        assert_eq!(s.memory, Some(40.1));
        assert_eq!(s.disk, Some(70.0));
        let net = s.network.unwrap();
        assert_eq!(net.sent, Some(1000.0));
        assert_eq!(net.received, Some(250.5));
        assert_eq!(net.active_connections, Some(17));
        assert!(net.connection_details.is_none());
        let procs = s.processes.unwrap();
        assert_eq!(procs.len(), 1);
        assert_eq!(procs[0].memory_mb, 12.5);
        assert_eq!(procs[0].status, ProcessStatus::Sleeping);
    }

    #[test]
    fn unknown_fields_ignored_and_null_is_absent() {
        let s = decode_at(
            r#"{"cpu": 1.0, "gpu": {"x": 1}, "cpu_temp": null, "hostname": "box"}"#,
            at(),
        )
        .unwrap();
        assert_eq!(s.cpu, Some(1.0));
        assert_eq!(s.cpu_temp_c, None);
    }

    #[test]
    fn malformed_payloads_are_errors() {
        assert!(matches!(
            decode_at("{not json", at()),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode_at("[1,2]", at()),
            Err(DecodeError::NotAnObject("array"))
        ));
        assert!(matches!(
            decode_at("42", at()),
            Err(DecodeError::NotAnObject("number"))
        ));
    }

    #[test]
    fn wrong_shaped_sub_object_is_absent() {
        let s = decode_at(
            r#"{"cpu": 5, "cpu_detailed": "oops", "memory_detailed": 7}"#,
            at(),
        )
        .unwrap();
        assert_eq!(s.cpu, Some(5.0));
        assert!(s.cpu_detailed.is_none());
        assert!(s.memory_detailed.is_none());
    }

    #[test]
    fn cpu_detail_clamps_cores_and_reads_load() {
        let s = decode_at(
            r#"{"cpu_detailed": {"usage": 50, "frequency": 3.2,
                "per_core": [10, 120, -5, "40%"], "load_avg": [1.0, 0.5, 0.25]}}"#,
            at(),
        )
        .unwrap();
        let d = s.cpu_detailed.unwrap();
        assert_eq!(d.per_core, vec![10.0, 100.0, 0.0, 40.0]);
        assert_eq!(d.load_avg, Some([1.0, 0.5, 0.25]));
        assert_eq!(d.temperature, None);
        assert_eq!(s.cpu, None);
    }

    #[test]
    fn memory_detail_defaults_buffers_and_cached() {
        let s = decode_at(
            r#"{"memoria_detallada": {"total": 16000, "used": 8000, "free": 4000,
                "available": 7000, "percent": 50}}"#,
            at(),
        )
        .unwrap();
        let m = s.memory_detailed.as_ref().unwrap();
        assert_eq!(m.buffers, 0.0);
        assert_eq!(m.cached, 0.0);
        assert_eq!(m.available, 7000.0);
        assert_eq!(s.memory_percent(), Some(50.0));
    }

    #[test]
    fn nested_network_with_error_row() {
        let s = decode_at(
            r#"{"network": {"sent": 10, "received": 20, "active_connections": 0,
                "connection_details": [
                    {"type": "ERROR", "status": "Error de permisos", "pid": null},
                    {"protocol": "TCP", "local_address": "127.0.0.1", "local_port": 22,
                     "remote_address": null, "remote_port": null, "status": "LISTEN",
                     "owning_pid": 1, "process_name": "sshd"},
                    "garbage"
                ]}}"#,
            at(),
        )
        .unwrap();
        let details = s.network.unwrap().connection_details.unwrap();
        assert_eq!(details.len(), 2);
        assert!(details[0].is_error_row());
        assert_eq!(details[1].local_port, 22);
        assert_eq!(details[1].remote_address, "");
        assert_eq!(details[1].process_name, "sshd");
    }

    #[test]
    fn upstream_timestamp_wins() {
        let s = decode_at(r#"{"timestamp": 1700000000000, "cpu": 1}"#, at()).unwrap();
        assert_eq!(s.timestamp.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn processes_without_pid_are_dropped() {
        let s = decode_at(
            r#"{"processes": [{"name": "ghost"}, {"pid": 7, "name": null, "cpu_percent": null}]}"#,
            at(),
        )
        .unwrap();
        let procs = s.processes.unwrap();
        assert_eq!(procs.len(), 1);
        assert_eq!(procs[0].pid, 7);
        assert_eq!(procs[0].name, "");
        assert_eq!(procs[0].cpu_percent, 0.0);
    }

    #[test]
    fn frame_with_newline_delimited_objects() {
        let frame = "{\"cpu\": 1}\nnot json\n{\"cpu\": 2}\n";
        let out = decode_frame(frame, at());
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].as_ref().unwrap().cpu, Some(1.0));
        assert!(out[1].is_err());
        assert_eq!(out[2].as_ref().unwrap().cpu, Some(2.0));
    }

    #[test]
    fn pretty_printed_single_object_is_one_snapshot() {
        let frame = "{\n  \"cpu\": 3,\n  \"disk\": 4\n}";
        let out = decode_frame(frame, at());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap().disk, Some(4.0));
        assert!(decode_frame("  \n", at()).is_empty());
    }

    #[test]
    fn leading_number_parses_prefix() {
        assert_eq!(leading_number("45.2%"), Some(45.2));
        assert_eq!(leading_number(" -3 KB"), Some(-3.0));
        assert_eq!(leading_number("GHz"), None);
        assert_eq!(leading_number(""), None);
    }
}
