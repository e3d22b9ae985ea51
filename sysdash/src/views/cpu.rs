//! Detailed CPU monitor: usage history plus per-core and load breakdowns.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{time_label, Provenance, Severity, ViewContext, ViewStatus, DETAIL_CAPACITY};
use crate::channel::{ConnectionState, Reader};
use crate::error::ReaderError;
use crate::history::{PerCoreHistory, RollingBuffer};
use crate::threshold::{Resource, ThresholdEvaluator};
use crate::types::Snapshot;

/// Core count assumed when fabricating per-core data.
pub const SYNTHETIC_CORES: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuPoint {
    pub time: String,
    pub at: DateTime<Utc>,
    pub usage: f64,
    pub temperature: Option<f64>,
    pub frequency: Option<f64>,
}

pub struct CpuDetailView {
    history: RollingBuffer<CpuPoint>,
    per_core: PerCoreHistory,
    per_core_source: Provenance,
    load_avg: Option<[f64; 3]>,
    load_source: Provenance,
    evaluator: ThresholdEvaluator,
    ctx: ViewContext,
    status: ViewStatus,
}

impl CpuDetailView {
    pub fn new(ctx: ViewContext) -> Self {
        Self {
            history: RollingBuffer::new(DETAIL_CAPACITY),
            per_core: PerCoreHistory::new(DETAIL_CAPACITY),
            per_core_source: Provenance::Coarse,
            load_avg: None,
            load_source: Provenance::Coarse,
            evaluator: ThresholdEvaluator::new(Resource::Cpu),
            ctx,
            status: ViewStatus::default(),
        }
    }

    pub fn history(&self) -> &RollingBuffer<CpuPoint> {
        &self.history
    }

    pub fn latest(&self) -> Option<&CpuPoint> {
        self.history.latest()
    }

    pub fn per_core(&self) -> &PerCoreHistory {
        &self.per_core
    }

    /// Most recent per-core sample, one entry per core.
    pub fn current_per_core(&self) -> Vec<f64> {
        self.per_core
            .cores
            .iter()
            .filter_map(|c| c.latest().copied())
            .collect()
    }

    pub fn per_core_source(&self) -> Provenance {
        self.per_core_source
    }

    pub fn load_avg(&self) -> Option<([f64; 3], Provenance)> {
        self.load_avg.map(|l| (l, self.load_source))
    }

    pub fn usage_severity(&self) -> Option<Severity> {
        self.latest().map(|p| Severity::for_usage(p.usage))
    }

    pub fn temperature_severity(&self) -> Option<Severity> {
        self.latest()
            .and_then(|p| p.temperature)
            .map(Severity::for_temperature)
    }

    pub fn status(&self) -> &ViewStatus {
        &self.status
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.status.paused = paused;
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        let points: Vec<&CpuPoint> = self.history.to_series().collect();
        serde_json::to_string_pretty(&points)
    }

    fn update_breakdown(&mut self, snapshot: &Snapshot, usage: f64) {
        let detail = snapshot.cpu_detailed.as_ref();
        let synthetic = self.ctx.synthetic.is_on();

        match detail.filter(|d| !d.per_core.is_empty()) {
            Some(d) => {
                self.per_core.push_samples(&d.per_core);
                self.per_core_source = Provenance::Reported;
            }
            None if synthetic => {
                self.per_core.push_samples(&[usage; SYNTHETIC_CORES]);
                self.per_core_source = Provenance::Synthetic;
            }
            None => {
                // nothing per-core to show; drop stale rows
                self.per_core.ensure_cores(0);
                self.per_core_source = Provenance::Coarse;
            }
        }

        match detail.and_then(|d| d.load_avg) {
            Some(l) => {
                self.load_avg = Some(l);
                self.load_source = Provenance::Reported;
            }
            None if synthetic => {
                let u = usage / 100.0;
                self.load_avg = Some([u * 4.0, u * 2.0, u]);
                self.load_source = Provenance::Synthetic;
            }
            None => {
                self.load_avg = None;
                self.load_source = Provenance::Coarse;
            }
        }
    }
}

impl Reader for CpuDetailView {
    fn name(&self) -> &str {
        "cpu-detail"
    }

    fn on_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), ReaderError> {
        if self.status.paused {
            return Ok(());
        }
        let Some(usage) = snapshot.cpu_usage() else {
            return Ok(());
        };
        self.history.push(CpuPoint {
            time: time_label(snapshot.timestamp),
            at: snapshot.timestamp,
            usage,
            temperature: snapshot.cpu_temperature(),
            frequency: snapshot.cpu_frequency(),
        });
        self.update_breakdown(snapshot, usage);

        // alerting belongs to the coarse cpu view; this one only flags the status
        self.status.overloaded = self.evaluator.exceeds(&self.ctx.thresholds(), usage);
        Ok(())
    }

    fn on_state(&mut self, state: &ConnectionState) {
        self.status.connection = state.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CpuDetail;
    use crate::views::testing::ctx;
    use crate::views::SyntheticMode;

    fn coarse(usage: f64) -> Snapshot {
        Snapshot {
            timestamp: Utc::now(),
            cpu: Some(usage),
            ..Default::default()
        }
    }

    #[test]
    fn reported_per_core_and_load() {
        let (ctx, _rec) = ctx(false);
        let mut v = CpuDetailView::new(ctx);
        let s = Snapshot {
            timestamp: Utc::now(),
            cpu_detailed: Some(CpuDetail {
                usage: 40.0,
                temperature: Some(72.0),
                frequency: Some(3.1),
                per_core: vec![10.0, 20.0, 30.0, 100.0],
                load_avg: Some([1.0, 0.5, 0.25]),
            }),
            ..Default::default()
        };
        v.on_snapshot(&s).unwrap();
        assert_eq!(v.current_per_core(), vec![10.0, 20.0, 30.0, 100.0]);
        assert_eq!(v.per_core_source(), Provenance::Reported);
        assert_eq!(v.load_avg(), Some(([1.0, 0.5, 0.25], Provenance::Reported)));
        assert_eq!(v.temperature_severity(), Some(Severity::High));
        assert_eq!(v.latest().unwrap().frequency, Some(3.1));
    }

    #[test]
    fn coarse_only_leaves_breakdown_absent() {
        let (ctx, _rec) = ctx(false);
        let mut v = CpuDetailView::new(ctx);
        v.on_snapshot(&coarse(55.0)).unwrap();
        assert!(v.current_per_core().is_empty());
        assert_eq!(v.per_core_source(), Provenance::Coarse);
        assert_eq!(v.load_avg(), None);
        assert_eq!(v.latest().unwrap().usage, 55.0);
        assert_eq!(v.usage_severity(), Some(Severity::Elevated));
    }

    #[test]
    fn synthetic_mode_fabricates_and_labels() {
        let (ctx, _rec) = ctx(false);
        let mut v = CpuDetailView::new(ctx.with_synthetic(SyntheticMode::On));
        v.on_snapshot(&coarse(50.0)).unwrap();
        assert_eq!(v.current_per_core(), vec![50.0; SYNTHETIC_CORES]);
        assert_eq!(v.per_core_source(), Provenance::Synthetic);
        assert_eq!(v.load_avg(), Some(([2.0, 1.0, 0.5], Provenance::Synthetic)));
    }

    #[test]
    fn detail_history_holds_sixty() {
        let (ctx, _rec) = ctx(false);
        let mut v = CpuDetailView::new(ctx);
        for i in 0..75 {
            v.on_snapshot(&coarse(i as f64)).unwrap();
        }
        assert_eq!(v.history().len(), DETAIL_CAPACITY);
        assert_eq!(v.history().to_series().next().unwrap().usage, 15.0);
    }

    #[test]
    fn strict_comparison_flags_without_alerting() {
        let (ctx, rec) = ctx(true);
        let mut v = CpuDetailView::new(ctx);
        v.on_snapshot(&coarse(80.0)).unwrap();
        assert!(!v.status().overloaded);
        v.on_snapshot(&coarse(80.5)).unwrap();
        assert!(v.status().overloaded);
        assert_eq!(rec.count(), 0);
    }
}
