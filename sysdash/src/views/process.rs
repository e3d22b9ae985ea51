//! Process table monitor with search, sorting, aggregates and the cooldown alert.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{time_label, SortConfig, SortDirection, ViewContext, ViewStatus, DETAIL_CAPACITY};
use crate::channel::{ConnectionState, Reader};
use crate::error::ReaderError;
use crate::history::RollingBuffer;
use crate::threshold::ProcessEvaluator;
use crate::types::{ProcessInfo, Snapshot};

pub const TOP_N: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessKey {
    Pid,
    Name,
    Cpu,
    Memory,
    Status,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessPoint {
    pub time: String,
    pub at: DateTime<Utc>,
    pub count: usize,
    pub cpu_avg: f64,
    pub memory_avg: f64,
}

fn compare(a: &ProcessInfo, b: &ProcessInfo, key: ProcessKey) -> std::cmp::Ordering {
    match key {
        ProcessKey::Pid => a.pid.cmp(&b.pid),
        ProcessKey::Name => a.name.cmp(&b.name),
        ProcessKey::Cpu => a.cpu_percent.total_cmp(&b.cpu_percent),
        ProcessKey::Memory => a.memory_mb.total_cmp(&b.memory_mb),
        ProcessKey::Status => a.status.as_str().cmp(b.status.as_str()),
    }
}

pub struct ProcessView {
    processes: Vec<ProcessInfo>,
    history: RollingBuffer<ProcessPoint>,
    pub sort: SortConfig<ProcessKey>,
    pub search: String,
    evaluator: ProcessEvaluator,
    ctx: ViewContext,
    status: ViewStatus,
}

impl ProcessView {
    pub fn new(ctx: ViewContext) -> Self {
        Self {
            processes: Vec::new(),
            history: RollingBuffer::new(DETAIL_CAPACITY),
            sort: SortConfig::new(ProcessKey::Cpu, SortDirection::Descending),
            search: String::new(),
            evaluator: ProcessEvaluator::default(),
            ctx,
            status: ViewStatus::default(),
        }
    }

    pub fn processes(&self) -> &[ProcessInfo] {
        &self.processes
    }

    pub fn history(&self) -> &RollingBuffer<ProcessPoint> {
        &self.history
    }

    pub fn request_sort(&mut self, key: ProcessKey) {
        self.sort.request(key);
    }

    fn sorted(&self, rows: &mut [&ProcessInfo]) {
        let sort = self.sort;
        rows.sort_by(|a, b| sort.direction.apply(compare(a, b, sort.key)));
    }

    /// Rows in display order: search applied, then sorted.
    pub fn visible(&self) -> Vec<&ProcessInfo> {
        let term = self.search.trim().to_lowercase();
        let mut rows: Vec<&ProcessInfo> = self
            .processes
            .iter()
            .filter(|p| {
                term.is_empty()
                    || p.name.to_lowercase().contains(&term)
                    || p.pid.to_string().contains(&term)
                    || p.status.as_str().to_lowercase().contains(&term)
            })
            .collect();
        self.sorted(&mut rows);
        rows
    }

    /// Process counts per lower-cased status.
    pub fn status_distribution(&self) -> BTreeMap<String, usize> {
        let mut dist = BTreeMap::new();
        for p in &self.processes {
            *dist.entry(p.status.as_str().to_lowercase()).or_insert(0) += 1;
        }
        dist
    }

    pub fn top_by_cpu(&self) -> Vec<&ProcessInfo> {
        let mut rows: Vec<&ProcessInfo> = self.processes.iter().collect();
        rows.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent));
        rows.truncate(TOP_N);
        rows
    }

    pub fn top_by_memory(&self) -> Vec<&ProcessInfo> {
        let mut rows: Vec<&ProcessInfo> = self.processes.iter().collect();
        rows.sort_by(|a, b| b.memory_mb.total_cmp(&a.memory_mb));
        rows.truncate(TOP_N);
        rows
    }

    pub fn status(&self) -> &ViewStatus {
        &self.status
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.status.paused = paused;
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct Export<'a> {
            processes: Vec<&'a ProcessInfo>,
            history: Vec<&'a ProcessPoint>,
        }
        serde_json::to_string_pretty(&Export {
            processes: self.visible(),
            history: self.history.to_series().collect(),
        })
    }
}

impl Reader for ProcessView {
    fn name(&self) -> &str {
        "processes"
    }

    fn on_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), ReaderError> {
        if self.status.paused {
            return Ok(());
        }
        let Some(list) = snapshot.processes.as_ref() else {
            return Ok(());
        };
        self.processes = list.clone();

        let count = list.len();
        let (cpu_avg, memory_avg) = if count == 0 {
            (0.0, 0.0)
        } else {
            let n = count as f64;
            (
                list.iter().map(|p| p.cpu_percent).sum::<f64>() / n,
                list.iter().map(|p| p.memory_mb).sum::<f64>() / n,
            )
        };
        self.history.push(ProcessPoint {
            time: time_label(snapshot.timestamp),
            at: snapshot.timestamp,
            count,
            cpu_avg,
            memory_avg,
        });

        // the scan follows the table's sort order, not the search filter
        let mut ordered: Vec<&ProcessInfo> = self.processes.iter().collect();
        self.sorted(&mut ordered);
        let ordered: Vec<ProcessInfo> = ordered.into_iter().cloned().collect();

        let cfg = self.ctx.thresholds();
        self.status.overloaded = self.evaluator.any_over(&cfg, &ordered);
        if let Some(event) = self.evaluator.scan(&cfg, &ordered, snapshot.timestamp) {
            self.ctx.sink.alert(event);
        }
        Ok(())
    }

    fn on_state(&mut self, state: &ConnectionState) {
        self.status.connection = state.clone();
    }
}
