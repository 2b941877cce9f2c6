//! Per-stage timing instrumentation for the frame pipeline.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::Instant;

const DEFAULT_WINDOW: usize = 120;

/// Timing summary for one pipeline stage over the recent window.
#[derive(Clone, Debug)]
pub struct StageStats {
    pub name: String,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p95_ms: f64,
    pub calls: u64,
}

#[derive(Debug)]
pub struct PipelineProfiler {
    window: usize,
    timings: HashMap<String, VecDeque<f64>>,
    counts: HashMap<String, u64>,
    enabled: bool,
}

impl Default for PipelineProfiler {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl PipelineProfiler {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            timings: HashMap::new(),
            counts: HashMap::new(),
            enabled: true,
        }
    }

    /// Start timing a stage; the elapsed time is recorded when the guard
    /// drops. A disabled profiler hands out inert guards.
    pub fn stage<'a>(&'a mut self, name: &'a str) -> StageGuard<'a> {
        let started = self.enabled.then(Instant::now);
        StageGuard {
            profiler: self,
            name,
            started,
        }
    }

    pub fn record(&mut self, name: &str, elapsed_ms: f64) {
        if !self.enabled {
            return;
        }
        let window = self.window;
        let ring = self
            .timings
            .entry(name.to_string())
            .or_insert_with(|| VecDeque::with_capacity(window));
        if ring.len() == self.window {
            ring.pop_front();
        }
        ring.push_back(elapsed_ms);
        *self.counts.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn stage_stats(&self, name: &str) -> Option<StageStats> {
        let ring = self.timings.get(name)?;
        if ring.is_empty() {
            return None;
        }

        let mut sorted: Vec<f64> = ring.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        let p95 = if n >= 2 {
            sorted[((n as f64 * 0.95) as usize).min(n - 1)]
        } else {
            sorted[n - 1]
        };

        Some(StageStats {
            name: name.to_string(),
            avg_ms: sorted.iter().sum::<f64>() / n as f64,
            min_ms: sorted[0],
            max_ms: sorted[n - 1],
            p95_ms: p95,
            calls: self.counts.get(name).copied().unwrap_or(0),
        })
    }

    /// Stats for every stage that has recorded at least one timing,
    /// sorted by stage name.
    pub fn summary(&self) -> Vec<StageStats> {
        let mut names: Vec<&String> = self.timings.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| self.stage_stats(name))
            .collect()
    }

    pub fn reset(&mut self) {
        self.timings.clear();
        self.counts.clear();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

pub struct StageGuard<'a> {
    profiler: &'a mut PipelineProfiler,
    name: &'a str,
    started: Option<Instant>,
}

impl Drop for StageGuard<'_> {
    fn drop(&mut self) {
        if let Some(started) = self.started {
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            self.profiler.record(self.name, elapsed_ms);
        }
    }
}
