//! Threshold configuration, per-resource evaluators and the alert sink seam.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::warn;

use crate::history::RollingBuffer;
use crate::types::ProcessInfo;

/// Minimum network threshold (units per interval). Keeps utilization percentages sane.
pub const NETWORK_THRESHOLD_FLOOR: f64 = 1.0;

/// Anti-flood window for the process-table evaluator.
pub const PROCESS_ALERT_COOLDOWN_MS: i64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Cpu,
    Memory,
    Disk,
    Network,
    Process,
}

impl Resource {
    pub fn label(self) -> &'static str {
        match self {
            Resource::Cpu => "CPU",
            Resource::Memory => "Memory",
            Resource::Disk => "Disk",
            Resource::Network => "Network",
            Resource::Process => "Process",
        }
    }

    /// Disk fires at the threshold itself; everything else must exceed it.
    pub fn comparison(self) -> Comparison {
        match self {
            Resource::Disk => Comparison::AtLeast,
            _ => Comparison::Above,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `value > threshold`
    Above,
    /// `value >= threshold`
    AtLeast,
}

impl Comparison {
    pub fn exceeds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Above => value > threshold,
            Comparison::AtLeast => value >= threshold,
        }
    }
}

/// Per-resource ceilings; `None` disables evaluation for that resource.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub cpu: Option<f64>,
    pub memory: Option<f64>,
    pub disk: Option<f64>,
    pub network: Option<f64>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu: Some(80.0),
            memory: Some(80.0),
            disk: Some(90.0),
            network: Some(80.0),
        }
    }
}

impl Thresholds {
    /// The process table is judged against the CPU ceiling.
    pub fn for_resource(&self, resource: Resource) -> Option<f64> {
        match resource {
            Resource::Cpu | Resource::Process => self.cpu,
            Resource::Memory => self.memory,
            Resource::Disk => self.disk,
            Resource::Network => self.network,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub thresholds: Thresholds,
    pub update_interval_ms: u64,
    pub enabled: bool,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            update_interval_ms: 5000,
            enabled: false,
        }
    }
}

/// Shared configuration object. Replaced wholesale on save, read-only to views in between.
#[derive(Clone)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<ThresholdConfig>>,
}

impl ConfigHandle {
    pub fn new(initial: ThresholdConfig) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn on_save(&self, thresholds: Thresholds, update_interval_ms: u64, enabled: bool) {
        self.tx.send_replace(ThresholdConfig {
            thresholds,
            update_interval_ms,
            enabled,
        });
    }

    pub fn current(&self) -> ThresholdConfig {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ThresholdConfig> {
        self.tx.subscribe()
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(ThresholdConfig::default())
    }
}

/// One dispatched alert. Never stored by the core.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub resource: Resource,
    pub label: String,
    pub value: f64,
    pub at: DateTime<Utc>,
}

/// External notification surface.
pub trait AlertSink: Send + Sync {
    fn alert(&self, event: AlertEvent);
}

impl<F> AlertSink for F
where
    F: Fn(AlertEvent) + Send + Sync,
{
    fn alert(&self, event: AlertEvent) {
        self(event)
    }
}

/// Sink that logs each alert and keeps the most recent ones for display.
pub struct AlertLog {
    recent: Mutex<RollingBuffer<AlertEvent>>,
}

impl AlertLog {
    pub fn new(cap: usize) -> Self {
        Self {
            recent: Mutex::new(RollingBuffer::new(cap)),
        }
    }

    /// Newest first.
    pub fn recent(&self) -> Vec<AlertEvent> {
        let guard = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        guard.to_series().rev().cloned().collect()
    }
}

impl AlertSink for AlertLog {
    fn alert(&self, event: AlertEvent) {
        warn!(
            "alert: {} crossed its threshold: {:.1}",
            event.label, event.value
        );
        let mut guard = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        guard.push(event);
    }
}

/// Compares one resource against its configured threshold.
///
/// `idle --exceeds & cooldown expired--> fired --cooldown expires--> idle`. Without a
/// cooldown every qualifying evaluation fires. Cooldowns are measured on the wall clock
/// carried by the snapshots; if that clock steps backwards the cooldown counts as expired.
#[derive(Debug, Clone)]
pub struct ThresholdEvaluator {
    resource: Resource,
    comparison: Comparison,
    floor: Option<f64>,
    cooldown: Option<Duration>,
    last_fired: Option<DateTime<Utc>>,
}

impl ThresholdEvaluator {
    pub fn new(resource: Resource) -> Self {
        let floor = match resource {
            Resource::Network => Some(NETWORK_THRESHOLD_FLOOR),
            _ => None,
        };
        Self {
            resource,
            comparison: resource.comparison(),
            floor,
            cooldown: None,
            last_fired: None,
        }
    }

    pub fn with_cooldown_ms(mut self, ms: i64) -> Self {
        self.cooldown = Some(Duration::milliseconds(ms));
        self
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    /// The threshold actually compared against, after applying any floor.
    pub fn effective_threshold(&self, configured: f64) -> f64 {
        match self.floor {
            Some(floor) => configured.max(floor),
            None => configured,
        }
    }

    /// Whether `value` is over the configured threshold, ignoring cooldown.
    pub fn exceeds(&self, config: &ThresholdConfig, value: f64) -> bool {
        if !config.enabled {
            return false;
        }
        match config.thresholds.for_resource(self.resource) {
            Some(t) => self.comparison.exceeds(value, self.effective_threshold(t)),
            None => false,
        }
    }

    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        match (self.cooldown, self.last_fired) {
            (Some(cooldown), Some(last)) => {
                let elapsed = now.signed_duration_since(last);
                elapsed >= Duration::zero() && elapsed <= cooldown
            }
            _ => false,
        }
    }

    pub fn evaluate(
        &mut self,
        config: &ThresholdConfig,
        label: &str,
        value: f64,
        now: DateTime<Utc>,
    ) -> Option<AlertEvent> {
        if !self.exceeds(config, value) || self.in_cooldown(now) {
            return None;
        }
        self.last_fired = Some(now);
        Some(AlertEvent {
            resource: self.resource,
            label: label.to_string(),
            value,
            at: now,
        })
    }
}

/// Percentage of the (floored) network threshold a rate represents.
pub fn network_utilization(rate: f64, threshold: f64) -> f64 {
    rate / threshold.max(NETWORK_THRESHOLD_FLOOR) * 100.0
}

/// Process-table evaluator: first offender in display order, then a global cooldown.
#[derive(Debug, Clone)]
pub struct ProcessEvaluator {
    inner: ThresholdEvaluator,
}

impl Default for ProcessEvaluator {
    fn default() -> Self {
        Self::new(PROCESS_ALERT_COOLDOWN_MS)
    }
}

impl ProcessEvaluator {
    pub fn new(cooldown_ms: i64) -> Self {
        Self {
            inner: ThresholdEvaluator::new(Resource::Process).with_cooldown_ms(cooldown_ms),
        }
    }

    /// `processes` must already be in the order the user sees them.
    pub fn scan(
        &mut self,
        config: &ThresholdConfig,
        processes: &[ProcessInfo],
        now: DateTime<Utc>,
    ) -> Option<AlertEvent> {
        if !config.enabled || self.inner.in_cooldown(now) {
            return None;
        }
        let offender = processes
            .iter()
            .find(|p| self.inner.exceeds(config, p.cpu_percent))?;
        let label = format!("CPU of process {}", offender.name);
        let mut event = self
            .inner
            .evaluate(config, &label, offender.cpu_percent, now)?;
        event.value = (event.value * 10.0).round() / 10.0;
        Some(event)
    }

    pub fn any_over(&self, config: &ThresholdConfig, processes: &[ProcessInfo]) -> bool {
        processes
            .iter()
            .any(|p| self.inner.exceeds(config, p.cpu_percent))
    }
}
