//! Per-request trace plus process-wide aggregate metrics (C8).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;

/// Per-stage latencies, in milliseconds. Recording is idempotent: setting a
/// stage twice overwrites with the latest value.
#[derive(Debug, Clone, Default)]
pub struct Latencies {
    pub rd_select: Option<f64>,
    pub poi_pool: Option<f64>,
    pub constraints_inject: Option<f64>,
    pub plan_generate: Option<f64>,
    pub neptune_repair: Option<f64>,
}

impl Latencies {
    fn as_pairs(&self) -> [(&'static str, Option<f64>); 5] {
        [
            ("rdSelect", self.rd_select),
            ("poiPool", self.poi_pool),
            ("constraintsInject", self.constraints_inject),
            ("planGenerate", self.plan_generate),
            ("neptuneRepair", self.neptune_repair),
        ]
    }

    /// The stage with the largest recorded latency, if any were recorded.
    fn dominant_stage(&self) -> Option<&'static str> {
        self.as_pairs()
            .into_iter()
            .filter_map(|(name, v)| v.map(|v| (name, v)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(name, _)| name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Quality {
    pub pool_size: Option<usize>,
    pub hard_hits: Option<usize>,
    pub soft_hits: Option<usize>,
    pub repair_actions: Option<usize>,
    pub selected_rd_id: Option<String>,
    pub selected_rd_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    pub corridor_geom_invalid: bool,
    pub poi_query_timeout: bool,
    pub fallback_used: bool,
    pub messages: Vec<String>,
}

/// Pool-size snapshots through the POI generator's filter cascade, with the
/// reason attached to each narrowing step.
#[derive(Debug, Clone, Default)]
pub struct PoolEvolution {
    pub initial: Option<usize>,
    pub after_rd_filter: Option<usize>,
    pub after_constraints: Option<usize>,
    pub final_size: Option<usize>,
    pub filters: Vec<String>,
}

/// Per-request trace, opened at pipeline entry and closed at pipeline exit.
#[derive(Debug, Clone)]
pub struct Trace {
    pub request_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub latencies: Latencies,
    pub quality: Quality,
    pub errors: ErrorLog,
    /// Freeform decision rationale, notably `scoreBreakdown` and
    /// `matchedSignals` for the chosen route direction.
    pub decision_context: Value,
    pub pool_evolution: PoolEvolution,
}

impl Trace {
    pub fn open(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            start_time: Utc::now(),
            end_time: None,
            latencies: Latencies::default(),
            quality: Quality::default(),
            errors: ErrorLog::default(),
            decision_context: Value::Null,
            pool_evolution: PoolEvolution::default(),
        }
    }

    pub fn close(&mut self) {
        self.end_time = Some(Utc::now());
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.messages.push(message.into());
    }

    pub fn wall_clock_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }
}

/// A `generateTraceReport` answer: which stage dominated latency, why the
/// selected direction won, and how the candidate pool shrank.
#[derive(Debug, Clone)]
pub struct TraceReport {
    pub request_id: String,
    pub dominant_stage: Option<String>,
    pub selection_rationale: Value,
    pub pool_shrink: Vec<(String, Option<usize>)>,
}

/// Process-wide, size-capped trace store with oldest-first eviction.
pub struct TraceStore {
    cap: usize,
    traces: DashMap<String, Trace>,
    eviction_order: Mutex<VecDeque<String>>,
}

impl TraceStore {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            traces: DashMap::new(),
            eviction_order: Mutex::new(VecDeque::new()),
        }
    }

    pub fn insert(&self, trace: Trace) {
        let id = trace.request_id.clone();
        let is_new = !self.traces.contains_key(&id);
        self.traces.insert(id.clone(), trace);
        if is_new {
            let mut order = self.eviction_order.lock().unwrap();
            order.push_back(id);
            while order.len() > self.cap {
                if let Some(oldest) = order.pop_front() {
                    self.traces.remove(&oldest);
                }
            }
        }
    }

    pub fn get(&self, request_id: &str) -> Option<Trace> {
        self.traces.get(request_id).map(|t| t.clone())
    }

    pub fn report(&self, request_id: &str) -> Option<TraceReport> {
        let trace = self.get(request_id)?;
        let pool_shrink = vec![
            ("initial".to_string(), trace.pool_evolution.initial),
            (
                "afterRdFilter".to_string(),
                trace.pool_evolution.after_rd_filter,
            ),
            (
                "afterConstraints".to_string(),
                trace.pool_evolution.after_constraints,
            ),
            ("final".to_string(), trace.pool_evolution.final_size),
        ];
        Some(TraceReport {
            request_id: trace.request_id.clone(),
            dominant_stage: trace.latencies.dominant_stage().map(str::to_string),
            selection_rationale: trace.decision_context.clone(),
            pool_shrink,
        })
    }
}

const ROLLING_WINDOW_CAP: usize = 1000;

struct RollingWindow {
    samples: VecDeque<f64>,
}

impl RollingWindow {
    fn new() -> Self {
        Self {
            samples: VecDeque::new(),
        }
    }

    fn push(&mut self, v: f64) {
        self.samples.push_back(v);
        if self.samples.len() > ROLLING_WINDOW_CAP {
            self.samples.pop_front();
        }
    }

    fn avg(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    fn percentile(&self, p: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let rank = ((p / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
        sorted[rank.min(sorted.len() - 1)]
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyStats {
    pub avg: f64,
    pub p95: f64,
    pub p99: f64,
}

impl From<&RollingWindow> for LatencyStats {
    fn from(w: &RollingWindow) -> Self {
        Self {
            avg: w.avg(),
            p95: w.percentile(95.0),
            p99: w.percentile(99.0),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub latency: HashMap<&'static str, LatencyStats>,
    pub pool_size: LatencyStats,
    pub hard_hits_total: u64,
    pub soft_hits_total: u64,
    pub repair_actions_total: u64,
    pub selected_direction_counts: HashMap<String, u64>,
    pub corridor_geom_invalid_count: u64,
    pub poi_query_timeout_count: u64,
    pub fallback_used_count: u64,
}

struct MetricsInner {
    latency: HashMap<&'static str, RollingWindow>,
    pool_size: RollingWindow,
    hard_hits_total: u64,
    soft_hits_total: u64,
    repair_actions_total: u64,
    selected_direction_counts: HashMap<String, u64>,
    corridor_geom_invalid_count: u64,
    poi_query_timeout_count: u64,
    fallback_used_count: u64,
}

/// Rolling aggregate metrics fed by every closed [`Trace`].
pub struct Metrics {
    inner: Mutex<MetricsInner>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsInner {
                latency: HashMap::new(),
                pool_size: RollingWindow::new(),
                hard_hits_total: 0,
                soft_hits_total: 0,
                repair_actions_total: 0,
                selected_direction_counts: HashMap::new(),
                corridor_geom_invalid_count: 0,
                poi_query_timeout_count: 0,
                fallback_used_count: 0,
            }),
        }
    }

    pub fn record(&self, trace: &Trace) {
        let mut inner = self.inner.lock().unwrap();

        for (name, value) in trace.latencies.as_pairs() {
            if let Some(v) = value {
                inner
                    .latency
                    .entry(name)
                    .or_insert_with(RollingWindow::new)
                    .push(v);
            }
        }

        if let Some(pool) = trace.quality.pool_size {
            inner.pool_size.push(pool as f64);
        }
        if let Some(hard) = trace.quality.hard_hits {
            inner.hard_hits_total += hard as u64;
        }
        if let Some(soft) = trace.quality.soft_hits {
            inner.soft_hits_total += soft as u64;
        }
        if let Some(repairs) = trace.quality.repair_actions {
            inner.repair_actions_total += repairs as u64;
        }
        if let Some(id) = &trace.quality.selected_rd_id {
            *inner.selected_direction_counts.entry(id.clone()).or_insert(0) += 1;
        }
        if trace.errors.corridor_geom_invalid {
            inner.corridor_geom_invalid_count += 1;
        }
        if trace.errors.poi_query_timeout {
            inner.poi_query_timeout_count += 1;
        }
        if trace.errors.fallback_used {
            inner.fallback_used_count += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock().unwrap();
        MetricsSnapshot {
            latency: inner
                .latency
                .iter()
                .map(|(k, w)| (*k, LatencyStats::from(w)))
                .collect(),
            pool_size: LatencyStats::from(&inner.pool_size),
            hard_hits_total: inner.hard_hits_total,
            soft_hits_total: inner.soft_hits_total,
            repair_actions_total: inner.repair_actions_total,
            selected_direction_counts: inner.selected_direction_counts.clone(),
            corridor_geom_invalid_count: inner.corridor_geom_invalid_count,
            poi_query_timeout_count: inner.poi_query_timeout_count,
            fallback_used_count: inner.fallback_used_count,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
