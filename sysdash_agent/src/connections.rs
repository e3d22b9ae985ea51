//! Socket table for the connection details list.
//!
//! Linux reads `/proc/net/{tcp,tcp6,udp,udp6}` and maps socket inodes to owning processes
//! through `/proc/<pid>/fd`. Sockets owned by processes we may not inspect keep pid 0.
//! Anywhere else, or when the tables are unreadable, a single `ERROR` row is reported.

use crate::types::ConnectionInfo;

pub fn error_row(reason: &str) -> ConnectionInfo {
    ConnectionInfo {
        protocol: "ERROR".into(),
        local_address: String::new(),
        local_port: 0,
        remote_address: String::new(),
        remote_port: 0,
        status: reason.into(),
        owning_pid: 0,
        process_name: String::new(),
    }
}

#[cfg(not(target_os = "linux"))]
pub fn collect_connections() -> Vec<ConnectionInfo> {
    vec![error_row("connection listing is not supported on this platform")]
}

#[cfg(target_os = "linux")]
pub fn collect_connections() -> Vec<ConnectionInfo> {
    use std::fs;
    use tracing::debug;

    let owners = linux::socket_owners();
    let mut out = Vec::new();
    let mut readable = false;
    for (file, protocol) in [
        ("/proc/net/tcp", "TCP"),
        ("/proc/net/tcp6", "TCP"),
        ("/proc/net/udp", "UDP"),
        ("/proc/net/udp6", "UDP"),
    ] {
        match fs::read_to_string(file) {
            Ok(table) => {
                readable = true;
                out.extend(
                    table
                        .lines()
                        .skip(1)
                        .filter_map(|l| linux::parse_line(l, protocol, &owners)),
                );
            }
            Err(e) => debug!("skipping {}: {}", file, e),
        }
    }
    if !readable {
        return vec![error_row("permission denied reading the socket tables")];
    }
    out
}

#[cfg(target_os = "linux")]
mod linux {
    use std::collections::HashMap;
    use std::fs;
    use std::net::{Ipv4Addr, Ipv6Addr};

    use crate::types::ConnectionInfo;

    /// inode -> (pid, command name)
    pub type Owners = HashMap<u64, (u32, String)>;

    pub fn socket_owners() -> Owners {
        let mut owners = Owners::new();
        let Ok(procs) = fs::read_dir("/proc") else {
            return owners;
        };
        for entry in procs.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            let Ok(fds) = fs::read_dir(entry.path().join("fd")) else {
                continue;
            };
            let name = fs::read_to_string(entry.path().join("comm"))
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            for fd in fds.flatten() {
                if let Some(inode) = fs::read_link(fd.path())
                    .ok()
                    .and_then(|t| socket_inode(&t.to_string_lossy()))
                {
                    owners.entry(inode).or_insert_with(|| (pid, name.clone()));
                }
            }
        }
        owners
    }

    fn socket_inode(link: &str) -> Option<u64> {
        link.strip_prefix("socket:[")?.strip_suffix(']')?.parse().ok()
    }

    fn tcp_state(code: &str) -> &'static str {
        match code {
            "01" => "ESTABLISHED",
            "02" => "SYN_SENT",
            "03" => "SYN_RECV",
            "04" => "FIN_WAIT1",
            "05" => "FIN_WAIT2",
            "06" => "TIME_WAIT",
            "07" => "CLOSE",
            "08" => "CLOSE_WAIT",
            "09" => "LAST_ACK",
            "0A" => "LISTEN",
            "0B" => "CLOSING",
            _ => "UNKNOWN",
        }
    }

    /// `0100007F:0035` -> ("127.0.0.1", 53). Addresses are stored as host-order words.
    pub fn parse_endpoint(s: &str) -> Option<(String, u16)> {
        let (addr, port) = s.split_once(':')?;
        let port = u16::from_str_radix(port, 16).ok()?;
        let addr = match addr.len() {
            8 => Ipv4Addr::from(u32::from_str_radix(addr, 16).ok()?.swap_bytes()).to_string(),
            32 => {
                let mut bytes = [0u8; 16];
                for (i, chunk) in bytes.chunks_mut(4).enumerate() {
                    let word = u32::from_str_radix(addr.get(i * 8..i * 8 + 8)?, 16).ok()?;
                    chunk.copy_from_slice(&word.swap_bytes().to_be_bytes());
                }
                Ipv6Addr::from(bytes).to_string()
            }
            _ => return None,
        };
        Some((addr, port))
    }

    pub fn parse_line(line: &str, protocol: &str, owners: &Owners) -> Option<ConnectionInfo> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (local_address, local_port) = parse_endpoint(fields.get(1)?)?;
        let (remote_address, remote_port) = parse_endpoint(fields.get(2)?)?;
        let status = if protocol == "TCP" {
            tcp_state(fields.get(3)?).to_string()
        } else {
            "NONE".to_string()
        };
        let inode: u64 = fields.get(9)?.parse().ok()?;
        let (owning_pid, process_name) = owners.get(&inode).cloned().unwrap_or_default();
        Some(ConnectionInfo {
            protocol: protocol.into(),
            local_address,
            local_port,
            remote_address,
            remote_port,
            status,
            owning_pid,
            process_name,
        })
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        const TCP_LISTEN: &str = "   0: 0100007F:0CEA 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 41234 1 0000000000000000 100 0 0 10 0";
        const UDP6: &str = "  12: 00000000000000000000000001000000:0035 00000000000000000000000000000000:0000 07 00000000:00000000 00:00000000 00000000   101        0 999 2 0000000000000000 0";

        #[test]
        fn parses_ipv4_listen_socket_with_owner() {
            let mut owners = Owners::new();
            owners.insert(41234, (4321, "postgres".into()));
            let c = parse_line(TCP_LISTEN, "TCP", &owners).unwrap();
            assert_eq!(c.local_address, "127.0.0.1");
            assert_eq!(c.local_port, 3306);
            assert_eq!(c.remote_address, "0.0.0.0");
            assert_eq!(c.status, "LISTEN");
            assert_eq!((c.owning_pid, c.process_name.as_str()), (4321, "postgres"));
        }

        #[test]
        fn parses_ipv6_udp_without_owner() {
            let c = parse_line(UDP6, "UDP", &Owners::new()).unwrap();
            assert_eq!(c.local_address, "::1");
            assert_eq!(c.local_port, 53);
            assert_eq!(c.status, "NONE");
            assert_eq!(c.owning_pid, 0);
        }

        #[test]
        fn header_and_garbage_are_skipped() {
            let header = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode";
            assert!(parse_line(header, "TCP", &Owners::new()).is_none());
            assert!(parse_endpoint("zz:0035").is_none());
            assert_eq!(socket_inode("socket:[77]"), Some(77));
            assert_eq!(socket_inode("pipe:[77]"), None);
        }
    }
}
