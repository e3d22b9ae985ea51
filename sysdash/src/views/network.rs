//! Detailed network monitor: rate history and a filterable connection table.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    time_label, Provenance, SortConfig, SortDirection, ViewContext, ViewStatus, DETAIL_CAPACITY,
};
use crate::channel::{ConnectionState, Reader};
use crate::error::ReaderError;
use crate::history::RollingBuffer;
use crate::rate::RateDeriver;
use crate::threshold::{Resource, ThresholdEvaluator};
use crate::types::{Connection, Snapshot};

/// Upper bound on fabricated connection rows.
pub const SYNTHETIC_CONNECTION_LIMIT: u64 = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkPoint {
    pub time: String,
    pub at: DateTime<Utc>,
    pub sent: f64,
    pub received: f64,
    pub connections: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKey {
    Protocol,
    LocalAddress,
    LocalPort,
    RemoteAddress,
    RemotePort,
    Status,
    Pid,
    Process,
}

/// Table filters. Empty strings match everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionFilter {
    pub tcp: bool,
    pub udp: bool,
    pub icmp: bool,
    pub other: bool,
    pub local_port: String,
    pub remote_port: String,
    pub process: String,
    pub status: String,
}

impl Default for ConnectionFilter {
    fn default() -> Self {
        Self {
            tcp: true,
            udp: true,
            icmp: true,
            other: true,
            local_port: String::new(),
            remote_port: String::new(),
            process: String::new(),
            status: String::new(),
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    needle.is_empty() || haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl ConnectionFilter {
    pub fn matches(&self, c: &Connection) -> bool {
        let protocol_on = match c.protocol.to_ascii_uppercase().as_str() {
            "TCP" => self.tcp,
            "UDP" => self.udp,
            "ICMP" => self.icmp,
            _ => self.other,
        };
        protocol_on
            && (self.local_port.is_empty() || c.local_port.to_string().contains(&self.local_port))
            && (self.remote_port.is_empty()
                || c.remote_port.to_string().contains(&self.remote_port))
            && contains_ci(&c.process_name, &self.process)
            && contains_ci(&c.status, &self.status)
    }
}

fn compare(a: &Connection, b: &Connection, key: ConnectionKey) -> std::cmp::Ordering {
    match key {
        ConnectionKey::Protocol => a.protocol.cmp(&b.protocol),
        ConnectionKey::LocalAddress => a.local_address.cmp(&b.local_address),
        ConnectionKey::LocalPort => a.local_port.cmp(&b.local_port),
        ConnectionKey::RemoteAddress => a.remote_address.cmp(&b.remote_address),
        ConnectionKey::RemotePort => a.remote_port.cmp(&b.remote_port),
        ConnectionKey::Status => a.status.cmp(&b.status),
        ConnectionKey::Pid => a.owning_pid.cmp(&b.owning_pid),
        ConnectionKey::Process => a.process_name.cmp(&b.process_name),
    }
}

/// Deterministic stand-in rows for a reported connection count.
pub fn synthetic_connections(count: u64) -> Vec<Connection> {
    const PROTOCOLS: [&str; 4] = ["TCP", "UDP", "ICMP", "SCTP"];
    const STATUSES: [&str; 5] = ["ESTABLISHED", "LISTEN", "TIME_WAIT", "CLOSE_WAIT", "SYN_SENT"];
    const PROCESSES: [&str; 6] = ["chrome", "firefox", "nginx", "node", "python", "sshd"];
    (0..count.min(SYNTHETIC_CONNECTION_LIMIT))
        .map(|i| {
            let i = i as usize;
            let protocol = PROTOCOLS[i % PROTOCOLS.len()];
            Connection {
                protocol: protocol.to_string(),
                local_address: "127.0.0.1".into(),
                local_port: 40000 + i as u16,
                remote_address: format!("10.0.0.{}", i % 254 + 1),
                remote_port: [443u16, 80, 53, 22][i % 4],
                status: if protocol == "TCP" {
                    STATUSES[i % STATUSES.len()].to_string()
                } else {
                    String::new()
                },
                owning_pid: 1000 + i as u32,
                process_name: PROCESSES[i % PROCESSES.len()].to_string(),
            }
        })
        .collect()
}

pub struct NetworkDetailView {
    history: RollingBuffer<NetworkPoint>,
    sent: RateDeriver,
    received: RateDeriver,
    connections: Vec<Connection>,
    connections_source: Provenance,
    privileged: bool,
    pub filter: ConnectionFilter,
    pub sort: SortConfig<ConnectionKey>,
    evaluator: ThresholdEvaluator,
    ctx: ViewContext,
    status: ViewStatus,
}

impl NetworkDetailView {
    pub fn new(ctx: ViewContext) -> Self {
        Self {
            history: RollingBuffer::new(DETAIL_CAPACITY),
            sent: RateDeriver::new(),
            received: RateDeriver::new(),
            connections: Vec::new(),
            connections_source: Provenance::Coarse,
            privileged: true,
            filter: ConnectionFilter::default(),
            sort: SortConfig::new(ConnectionKey::LocalPort, SortDirection::Ascending),
            evaluator: ThresholdEvaluator::new(Resource::Network),
            ctx,
            status: ViewStatus::default(),
        }
    }

    pub fn history(&self) -> &RollingBuffer<NetworkPoint> {
        &self.history
    }

    pub fn latest(&self) -> Option<&NetworkPoint> {
        self.history.latest()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn connections_source(&self) -> Provenance {
        self.connections_source
    }

    /// False once the agent reported it could not enumerate sockets.
    pub fn privileged(&self) -> bool {
        self.privileged
    }

    /// Filtered and sorted table rows.
    pub fn visible_connections(&self) -> Vec<&Connection> {
        let mut rows: Vec<&Connection> = self
            .connections
            .iter()
            .filter(|c| self.filter.matches(c))
            .collect();
        let sort = self.sort;
        rows.sort_by(|a, b| sort.direction.apply(compare(a, b, sort.key)));
        rows
    }

    /// Connection counts per protocol, excluding error rows.
    pub fn protocol_distribution(&self) -> BTreeMap<String, usize> {
        let mut dist = BTreeMap::new();
        for c in self.connections.iter().filter(|c| !c.is_error_row()) {
            *dist.entry(c.protocol.clone()).or_insert(0) += 1;
        }
        dist
    }

    pub fn request_sort(&mut self, key: ConnectionKey) {
        self.sort.request(key);
    }

    pub fn status(&self) -> &ViewStatus {
        &self.status
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.status.paused = paused;
    }

    /// History plus the currently visible rows.
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct Export<'a> {
            history: Vec<&'a NetworkPoint>,
            connections: Vec<&'a Connection>,
        }
        serde_json::to_string_pretty(&Export {
            history: self.history.to_series().collect(),
            connections: self.visible_connections(),
        })
    }
}

impl Reader for NetworkDetailView {
    fn name(&self) -> &str {
        "network-detail"
    }

    fn on_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), ReaderError> {
        let Some(net) = snapshot.network.as_ref() else {
            return Ok(());
        };
        // baselines track even while paused
        let sent = net.sent.map(|v| self.sent.derive(v)).unwrap_or(0.0);
        let received = net.received.map(|v| self.received.derive(v)).unwrap_or(0.0);
        if self.status.paused {
            return Ok(());
        }
        let count = net.active_connections.unwrap_or(0);
        self.history.push(NetworkPoint {
            time: time_label(snapshot.timestamp),
            at: snapshot.timestamp,
            sent,
            received,
            connections: count,
        });

        match &net.connection_details {
            Some(details) => {
                self.privileged = !details.iter().any(Connection::is_error_row);
                self.connections = details.clone();
                self.connections_source = Provenance::Reported;
            }
            None if self.ctx.synthetic.is_on() && count > 0 => {
                self.connections = synthetic_connections(count);
                self.connections_source = Provenance::Synthetic;
                self.privileged = true;
            }
            None => {
                self.connections.clear();
                self.connections_source = Provenance::Coarse;
                self.privileged = true;
            }
        }

        self.status.overloaded = self
            .evaluator
            .exceeds(&self.ctx.thresholds(), sent.max(received));
        Ok(())
    }

    fn on_state(&mut self, state: &ConnectionState) {
        self.status.connection = state.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NetworkCounters;
    use crate::views::testing::ctx;
    use crate::views::SyntheticMode;

    fn conn(protocol: &str, lport: u16, process: &str, status: &str) -> Connection {
        Connection {
            protocol: protocol.into(),
            local_address: "0.0.0.0".into(),
            local_port: lport,
            remote_address: "1.2.3.4".into(),
            remote_port: 443,
            status: status.into(),
            owning_pid: lport as u32,
            process_name: process.into(),
        }
    }

    fn snap(sent: f64, details: Option<Vec<Connection>>, count: u64) -> Snapshot {
        Snapshot {
            timestamp: Utc::now(),
            network: Some(NetworkCounters {
                sent: Some(sent),
                received: Some(0.0),
                active_connections: Some(count),
                connection_details: details,
            }),
            ..Default::default()
        }
    }

    fn table() -> Vec<Connection> {
        vec![
            conn("TCP", 8080, "nginx", "LISTEN"),
            conn("UDP", 53, "dnsmasq", ""),
            conn("TCP", 22, "sshd", "ESTABLISHED"),
            conn("SCTP", 9000, "custom", ""),
        ]
    }

    #[test]
    fn default_sort_is_local_port_ascending() {
        let (ctx, _rec) = ctx(false);
        let mut v = NetworkDetailView::new(ctx);
        v.on_snapshot(&snap(0.0, Some(table()), 4)).unwrap();
        let ports: Vec<u16> = v.visible_connections().iter().map(|c| c.local_port).collect();
        assert_eq!(ports, vec![22, 53, 8080, 9000]);
        v.request_sort(ConnectionKey::LocalPort);
        let ports: Vec<u16> = v.visible_connections().iter().map(|c| c.local_port).collect();
        assert_eq!(ports, vec![9000, 8080, 53, 22]);
    }

    #[test]
    fn filters_combine() {
        let (ctx, _rec) = ctx(false);
        let mut v = NetworkDetailView::new(ctx);
        v.on_snapshot(&snap(0.0, Some(table()), 4)).unwrap();
        v.filter.udp = false;
        v.filter.other = false;
        assert_eq!(v.visible_connections().len(), 2);
        v.filter.status = "estab".into();
        let rows = v.visible_connections();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].process_name, "sshd");
        v.filter = ConnectionFilter {
            local_port: "80".into(),
            ..Default::default()
        };
        assert_eq!(v.visible_connections().len(), 1);
        v.filter = ConnectionFilter {
            process: "NGI".into(),
            ..Default::default()
        };
        assert_eq!(v.visible_connections()[0].local_port, 8080);
    }

    #[test]
    fn error_row_clears_privileged_and_is_not_counted() {
        let (ctx, _rec) = ctx(false);
        let mut v = NetworkDetailView::new(ctx);
        let mut rows = table();
        rows.push(conn("ERROR", 0, "", "permission denied"));
        v.on_snapshot(&snap(0.0, Some(rows), 5)).unwrap();
        assert!(!v.privileged());
        let dist = v.protocol_distribution();
        assert_eq!(dist.get("TCP"), Some(&2));
        assert!(!dist.contains_key("ERROR"));
        v.on_snapshot(&snap(0.0, Some(table()), 4)).unwrap();
        assert!(v.privileged());
    }

    #[test]
    fn privileged_restored_when_details_go_missing() {
        let (ctx, _rec) = ctx(false);
        let mut v = NetworkDetailView::new(ctx.clone());
        let denied = vec![conn("ERROR", 0, "", "permission denied")];
        v.on_snapshot(&snap(0.0, Some(denied.clone()), 0)).unwrap();
        assert!(!v.privileged());
        v.on_snapshot(&snap(0.0, None, 0)).unwrap();
        assert!(v.privileged());

        let mut s = NetworkDetailView::new(ctx.with_synthetic(SyntheticMode::On));
        s.on_snapshot(&snap(0.0, Some(denied), 3)).unwrap();
        assert!(!s.privileged());
        s.on_snapshot(&snap(0.0, None, 3)).unwrap();
        assert!(s.privileged());
    }

    #[test]
    fn overload_flag_without_alert() {
        let (ctx, rec) = ctx(true);
        let mut v = NetworkDetailView::new(ctx);
        v.on_snapshot(&snap(0.0, None, 0)).unwrap();
        v.on_snapshot(&snap(1.0e12, None, 0)).unwrap();
        assert!(v.status().overloaded);
        assert_eq!(rec.count(), 0);
    }

    #[test]
    fn absent_details_clear_table_unless_synthetic() {
        let (ctx, _rec) = ctx(false);
        let mut v = NetworkDetailView::new(ctx.clone());
        v.on_snapshot(&snap(0.0, Some(table()), 4)).unwrap();
        v.on_snapshot(&snap(0.0, None, 4)).unwrap();
        assert!(v.connections().is_empty());
        assert_eq!(v.connections_source(), Provenance::Coarse);

        let mut s = NetworkDetailView::new(ctx.with_synthetic(SyntheticMode::On));
        s.on_snapshot(&snap(0.0, None, 6)).unwrap();
        assert_eq!(s.connections().len(), 6);
        assert_eq!(s.connections_source(), Provenance::Synthetic);
        assert_eq!(synthetic_connections(6), synthetic_connections(6));
    }

    #[test]
    fn rates_and_history() {
        let (ctx, _rec) = ctx(false);
        let mut v = NetworkDetailView::new(ctx);
        v.on_snapshot(&snap(1000.0, None, 1)).unwrap();
        v.on_snapshot(&snap(1500.0, None, 2)).unwrap();
        v.on_snapshot(&snap(200.0, None, 2)).unwrap();
        let sent: Vec<f64> = v.history().to_series().map(|p| p.sent).collect();
        assert_eq!(sent, vec![0.0, 500.0, 0.0]);
        assert_eq!(v.latest().unwrap().connections, 2);
    }

    #[test]
    fn export_has_history_and_rows() {
        let (ctx, _rec) = ctx(false);
        let mut v = NetworkDetailView::new(ctx);
        v.on_snapshot(&snap(0.0, Some(table()), 4)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&v.export_json().unwrap()).unwrap();
        assert_eq!(json["history"].as_array().unwrap().len(), 1);
        assert_eq!(json["connections"].as_array().unwrap().len(), 4);
    }
}
