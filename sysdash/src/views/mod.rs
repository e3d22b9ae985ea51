//! Views: snapshot readers that own their history, rate baselines and evaluators.
//!
//! The four coarse monitors share one implementation, [`MetricView`], parameterized by a
//! [`Probe`]. The detailed monitors carry extra derived state and get their own types.

pub mod cpu;
pub mod memory;
pub mod network;
pub mod probes;
pub mod process;

use std::cmp::Ordering;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::channel::{shared, ConnectionState, Hub, Reader, SharedReader, Subscription};
use crate::error::ReaderError;
use crate::history::RollingBuffer;
use crate::threshold::{
    AlertSink, ConfigHandle, Resource, ThresholdConfig, ThresholdEvaluator,
};
use crate::types::Snapshot;

pub use cpu::CpuDetailView;
pub use memory::MemoryDetailView;
pub use network::NetworkDetailView;
pub use probes::{CpuProbe, DiskProbe, MemoryProbe, NetworkProbe};
pub use process::ProcessView;

pub const COARSE_CAPACITY: usize = 10;
pub const NETWORK_COARSE_CAPACITY: usize = 20;
pub const DETAIL_CAPACITY: usize = 60;

/// Time label format used on every history point.
pub const TIME_LABEL: &str = "%H:%M:%S";

pub fn time_label(at: DateTime<Utc>) -> String {
    at.with_timezone(&chrono::Local).format(TIME_LABEL).to_string()
}

/// Where a displayed figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Sent by the agent.
    #[default]
    Reported,
    /// The agent only sent the coarse scalar; the detailed figure is absent.
    Coarse,
    /// Fabricated from the coarse scalar in synthetic mode.
    Synthetic,
}

/// Whether absent detailed sub-objects may be filled with fabricated values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyntheticMode {
    #[default]
    Off,
    On,
}

impl SyntheticMode {
    pub fn is_on(self) -> bool {
        matches!(self, SyntheticMode::On)
    }
}

/// Colour band for a percentage or temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Normal,
    Elevated,
    High,
    Critical,
}

impl Severity {
    fn banded(value: f64, bands: [f64; 3]) -> Self {
        if value >= bands[2] {
            Severity::Critical
        } else if value >= bands[1] {
            Severity::High
        } else if value >= bands[0] {
            Severity::Elevated
        } else {
            Severity::Normal
        }
    }

    pub fn for_usage(percent: f64) -> Self {
        Self::banded(percent, [50.0, 70.0, 90.0])
    }

    pub fn for_temperature(celsius: f64) -> Self {
        Self::banded(celsius, [60.0, 70.0, 80.0])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn apply(self, ord: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    }
}

/// Column sort state for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortConfig<K> {
    pub key: K,
    pub direction: SortDirection,
}

impl<K: Copy + PartialEq> SortConfig<K> {
    pub fn new(key: K, direction: SortDirection) -> Self {
        Self { key, direction }
    }

    /// Same key while ascending flips to descending; anything else sorts ascending.
    pub fn request(&mut self, key: K) {
        self.direction = if self.key == key && self.direction == SortDirection::Ascending {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        };
        self.key = key;
    }
}

/// Everything a view needs from outside: the shared thresholds, the alert sink and
/// the synthetic-data policy.
#[derive(Clone)]
pub struct ViewContext {
    pub config: ConfigHandle,
    pub sink: Arc<dyn AlertSink>,
    pub synthetic: SyntheticMode,
}

impl ViewContext {
    pub fn new(config: ConfigHandle, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            config,
            sink,
            synthetic: SyntheticMode::Off,
        }
    }

    pub fn with_synthetic(mut self, mode: SyntheticMode) -> Self {
        self.synthetic = mode;
        self
    }

    pub fn thresholds(&self) -> ThresholdConfig {
        self.config.current()
    }
}

/// Output of a probe for one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// One entry per series name, `None` where this snapshot has no value.
    pub values: Vec<Option<f64>>,
    /// The figure compared against the threshold.
    pub watch: Option<f64>,
}

/// Extracts one resource's series from a snapshot. May hold per-view state such as a
/// rate baseline; `sample` is called for every snapshot even while the view is paused.
pub trait Probe: Send {
    const RESOURCE: Resource;
    const NAME: &'static str;

    fn series(&self) -> &'static [&'static str];

    /// `None` when the snapshot carries nothing for this resource.
    fn sample(&mut self, snapshot: &Snapshot) -> Option<Sample>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub time: String,
    pub at: DateTime<Utc>,
    pub values: Vec<Option<f64>>,
}

/// Shared view state: the pause switch, the overload flag and the last connection state.
#[derive(Debug, Clone)]
pub struct ViewStatus {
    pub paused: bool,
    pub overloaded: bool,
    pub connection: ConnectionState,
}

impl Default for ViewStatus {
    fn default() -> Self {
        Self {
            paused: false,
            overloaded: false,
            connection: ConnectionState::Waiting,
        }
    }
}

/// Generic coarse monitor.
pub struct MetricView<P: Probe> {
    probe: P,
    history: RollingBuffer<HistoryPoint>,
    evaluator: ThresholdEvaluator,
    ctx: ViewContext,
    status: ViewStatus,
}

impl<P: Probe> MetricView<P> {
    pub fn new(probe: P, capacity: usize, ctx: ViewContext) -> Self {
        Self {
            probe,
            history: RollingBuffer::new(capacity),
            evaluator: ThresholdEvaluator::new(P::RESOURCE),
            ctx,
            status: ViewStatus::default(),
        }
    }

    pub fn series(&self) -> &'static [&'static str] {
        self.probe.series()
    }

    pub fn history(&self) -> &RollingBuffer<HistoryPoint> {
        &self.history
    }

    pub fn latest(&self) -> Option<&HistoryPoint> {
        self.history.latest()
    }

    /// Values of one named series, oldest first.
    pub fn series_values(&self, name: &str) -> Vec<Option<f64>> {
        let Some(idx) = self.probe.series().iter().position(|s| *s == name) else {
            return Vec::new();
        };
        self.history
            .to_series()
            .map(|p| p.values.get(idx).copied().flatten())
            .collect()
    }

    pub fn threshold(&self) -> Option<f64> {
        self.ctx
            .thresholds()
            .thresholds
            .for_resource(P::RESOURCE)
            .map(|t| self.evaluator.effective_threshold(t))
    }

    pub fn status(&self) -> &ViewStatus {
        &self.status
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.status.paused = paused;
    }

    pub fn toggle_paused(&mut self) -> bool {
        self.status.paused = !self.status.paused;
        self.status.paused
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        let points: Vec<&HistoryPoint> = self.history.to_series().collect();
        serde_json::to_string_pretty(&points)
    }
}

impl<P: Probe> Reader for MetricView<P> {
    fn name(&self) -> &str {
        P::NAME
    }

    fn on_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), ReaderError> {
        let Some(sample) = self.probe.sample(snapshot) else {
            return Ok(());
        };
        if self.status.paused {
            return Ok(());
        }
        if sample.values.len() != self.probe.series().len() {
            return Err(ReaderError::new(format!(
                "{} produced {} values for {} series",
                P::NAME,
                sample.values.len(),
                self.probe.series().len()
            )));
        }
        self.history.push(HistoryPoint {
            time: time_label(snapshot.timestamp),
            at: snapshot.timestamp,
            values: sample.values,
        });
        if let Some(watch) = sample.watch {
            let cfg = self.ctx.thresholds();
            self.status.overloaded = self.evaluator.exceeds(&cfg, watch);
            if let Some(event) =
                self.evaluator
                    .evaluate(&cfg, P::RESOURCE.label(), watch, snapshot.timestamp)
            {
                self.ctx.sink.alert(event);
            }
        }
        Ok(())
    }

    fn on_state(&mut self, state: &ConnectionState) {
        self.status.connection = state.clone();
    }
}

pub type CpuView = MetricView<CpuProbe>;
pub type MemoryView = MetricView<MemoryProbe>;
pub type DiskView = MetricView<DiskProbe>;
pub type NetworkView = MetricView<NetworkProbe>;

/// Every view the dashboard mounts, each behind its own lock.
#[derive(Clone)]
pub struct ViewSet {
    pub cpu: Arc<Mutex<CpuView>>,
    pub memory: Arc<Mutex<MemoryView>>,
    pub disk: Arc<Mutex<DiskView>>,
    pub network: Arc<Mutex<NetworkView>>,
    pub cpu_detail: Arc<Mutex<CpuDetailView>>,
    pub memory_detail: Arc<Mutex<MemoryDetailView>>,
    pub network_detail: Arc<Mutex<NetworkDetailView>>,
    pub processes: Arc<Mutex<ProcessView>>,
}

impl ViewSet {
    pub fn new(ctx: &ViewContext) -> Self {
        Self {
            cpu: shared(MetricView::new(CpuProbe, COARSE_CAPACITY, ctx.clone())),
            memory: shared(MetricView::new(MemoryProbe, COARSE_CAPACITY, ctx.clone())),
            disk: shared(MetricView::new(DiskProbe, COARSE_CAPACITY, ctx.clone())),
            network: shared(MetricView::new(
                NetworkProbe::default(),
                NETWORK_COARSE_CAPACITY,
                ctx.clone(),
            )),
            cpu_detail: shared(CpuDetailView::new(ctx.clone())),
            memory_detail: shared(MemoryDetailView::new(ctx.clone())),
            network_detail: shared(NetworkDetailView::new(ctx.clone())),
            processes: shared(ProcessView::new(ctx.clone())),
        }
    }

    pub fn readers(&self) -> Vec<SharedReader> {
        vec![
            self.cpu.clone() as SharedReader,
            self.memory.clone() as SharedReader,
            self.disk.clone() as SharedReader,
            self.network.clone() as SharedReader,
            self.cpu_detail.clone() as SharedReader,
            self.memory_detail.clone() as SharedReader,
            self.network_detail.clone() as SharedReader,
            self.processes.clone() as SharedReader,
        ]
    }

    pub fn subscribe_all(&self, hub: &Hub) -> Vec<Subscription> {
        self.readers()
            .into_iter()
            .map(|r| hub.subscribe(r))
            .collect()
    }

    /// Pause or resume every view at once.
    pub fn set_paused(&self, paused: bool) {
        fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
            m.lock().unwrap_or_else(|e| e.into_inner())
        }
        lock(&self.cpu).set_paused(paused);
        lock(&self.memory).set_paused(paused);
        lock(&self.disk).set_paused(paused);
        lock(&self.network).set_paused(paused);
        lock(&self.cpu_detail).set_paused(paused);
        lock(&self.memory_detail).set_paused(paused);
        lock(&self.network_detail).set_paused(paused);
        lock(&self.processes).set_paused(paused);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::threshold::{AlertEvent, Thresholds};

    #[derive(Default)]
    pub struct Recorder(pub Mutex<Vec<AlertEvent>>);

    impl AlertSink for Recorder {
        fn alert(&self, event: AlertEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    impl Recorder {
        pub fn count(&self) -> usize {
            self.0.lock().unwrap().len()
        }
    }

    pub fn ctx(enabled: bool) -> (ViewContext, Arc<Recorder>) {
        let config = ConfigHandle::default();
        config.on_save(Thresholds::default(), 5000, enabled);
        let rec = Arc::new(Recorder::default());
        (ViewContext::new(config, rec.clone()), rec)
    }
}
