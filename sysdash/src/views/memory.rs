//! Detailed memory monitor: RAM breakdown and swap summary.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{time_label, Provenance, ViewContext, ViewStatus, DETAIL_CAPACITY};
use crate::channel::{ConnectionState, Reader};
use crate::error::ReaderError;
use crate::history::RollingBuffer;
use crate::threshold::{Resource, ThresholdEvaluator};
use crate::types::{MemoryDetail, Snapshot};

/// Nominal RAM size (MB) used to fabricate a breakdown from a percentage.
pub const SYNTHETIC_TOTAL_MB: f64 = 16384.0;

/// Pie slices in MB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryBreakdown {
    pub used_real: f64,
    pub buffers: f64,
    pub cached: f64,
    pub available: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryPoint {
    pub time: String,
    pub at: DateTime<Utc>,
    pub percent: f64,
    pub detail: Option<MemoryDetail>,
    pub provenance: Provenance,
}

pub struct MemoryDetailView {
    history: RollingBuffer<MemoryPoint>,
    evaluator: ThresholdEvaluator,
    ctx: ViewContext,
    status: ViewStatus,
}

/// Breakdown guessed from a percentage: a 16 GiB machine, 20 % of free as buffers,
/// 30 % of free as cache, swap half of RAM at 10 % use.
pub fn synthetic_detail(percent: f64) -> MemoryDetail {
    let total = SYNTHETIC_TOTAL_MB;
    let used = total * percent / 100.0;
    let free = total - used;
    let buffers = free * 0.2;
    let cached = free * 0.3;
    let swap_total = total / 2.0;
    MemoryDetail {
        total,
        used,
        free,
        available: free - buffers - cached,
        buffers,
        cached,
        percent,
        swap_total,
        swap_used: swap_total * 0.1,
        swap_free: swap_total * 0.9,
        swap_percent: 10.0,
    }
}

impl MemoryDetailView {
    pub fn new(ctx: ViewContext) -> Self {
        Self {
            history: RollingBuffer::new(DETAIL_CAPACITY),
            evaluator: ThresholdEvaluator::new(Resource::Memory),
            ctx,
            status: ViewStatus::default(),
        }
    }

    pub fn history(&self) -> &RollingBuffer<MemoryPoint> {
        &self.history
    }

    pub fn latest(&self) -> Option<&MemoryPoint> {
        self.history.latest()
    }

    pub fn breakdown(&self) -> Option<MemoryBreakdown> {
        let d = self.latest()?.detail.as_ref()?;
        Some(MemoryBreakdown {
            used_real: d.used_excluding_cache(),
            buffers: d.buffers,
            cached: d.cached,
            available: d.available,
        })
    }

    pub fn status(&self) -> &ViewStatus {
        &self.status
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.status.paused = paused;
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        let points: Vec<&MemoryPoint> = self.history.to_series().collect();
        serde_json::to_string_pretty(&points)
    }
}

impl Reader for MemoryDetailView {
    fn name(&self) -> &str {
        "memory-detail"
    }

    fn on_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), ReaderError> {
        if self.status.paused {
            return Ok(());
        }
        let (percent, detail, provenance) = match (&snapshot.memory_detailed, snapshot.memory) {
            (Some(d), _) => (d.percent, Some(d.clone()), Provenance::Reported),
            (None, Some(p)) if self.ctx.synthetic.is_on() => {
                (p, Some(synthetic_detail(p)), Provenance::Synthetic)
            }
            (None, Some(p)) => (p, None, Provenance::Coarse),
            (None, None) => return Ok(()),
        };
        self.history.push(MemoryPoint {
            time: time_label(snapshot.timestamp),
            at: snapshot.timestamp,
            percent,
            detail,
            provenance,
        });

        self.status.overloaded = self.evaluator.exceeds(&self.ctx.thresholds(), percent);
        Ok(())
    }

    fn on_state(&mut self, state: &ConnectionState) {
        self.status.connection = state.clone();
    }
}
