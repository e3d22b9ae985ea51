//! Value extractors for the coarse monitors.

use super::{Probe, Sample};
use crate::rate::RateDeriver;
use crate::threshold::Resource;
use crate::types::Snapshot;

pub struct CpuProbe;

impl Probe for CpuProbe {
    const RESOURCE: Resource = Resource::Cpu;
    const NAME: &'static str = "cpu";

    fn series(&self) -> &'static [&'static str] {
        &["usage", "temperature", "frequency"]
    }

    fn sample(&mut self, snapshot: &Snapshot) -> Option<Sample> {
        let usage = snapshot.cpu_usage()?;
        Some(Sample {
            values: vec![
                Some(usage),
                snapshot.cpu_temperature(),
                snapshot.cpu_frequency(),
            ],
            watch: Some(usage),
        })
    }
}

// used/free split of a percentage
fn used_free(percent: f64) -> Sample {
    let used = percent.clamp(0.0, 100.0);
    Sample {
        values: vec![Some(used), Some(100.0 - used)],
        watch: Some(used),
    }
}

pub struct MemoryProbe;

impl Probe for MemoryProbe {
    const RESOURCE: Resource = Resource::Memory;
    const NAME: &'static str = "memory";

    fn series(&self) -> &'static [&'static str] {
        &["used", "free"]
    }

    fn sample(&mut self, snapshot: &Snapshot) -> Option<Sample> {
        snapshot.memory_percent().map(used_free)
    }
}

pub struct DiskProbe;

impl Probe for DiskProbe {
    const RESOURCE: Resource = Resource::Disk;
    const NAME: &'static str = "disk";

    fn series(&self) -> &'static [&'static str] {
        &["used", "free"]
    }

    fn sample(&mut self, snapshot: &Snapshot) -> Option<Sample> {
        snapshot.disk.map(used_free)
    }
}

/// Turns cumulative sent/received counters into per-interval rates.
#[derive(Default)]
pub struct NetworkProbe {
    sent: RateDeriver,
    received: RateDeriver,
}

impl Probe for NetworkProbe {
    const RESOURCE: Resource = Resource::Network;
    const NAME: &'static str = "network";

    fn series(&self) -> &'static [&'static str] {
        &["sent", "received", "connections"]
    }

    fn sample(&mut self, snapshot: &Snapshot) -> Option<Sample> {
        let net = snapshot.network.as_ref()?;
        let sent = net.sent.map(|v| self.sent.derive(v));
        let received = net.received.map(|v| self.received.derive(v));
        let watch = match (sent, received) {
            (Some(s), Some(r)) => Some(s.max(r)),
            (s, r) => s.or(r),
        };
        Some(Sample {
            values: vec![sent, received, net.active_connections.map(|c| c as f64)],
            watch,
        })
    }
}
