//! Temporal smoothing, adaptive confidence thresholds, and the per-pose
//! cooldown gate.

use std::collections::{HashMap, VecDeque};

use crate::config::AdaptiveConfig;

/// Per-hand majority vote over the last N classified pose names. A pose is
/// only reported once it holds a strict majority of a sufficiently full
/// window, which filters single-frame classification flicker.
#[derive(Debug)]
pub struct GestureSmoother {
    window: usize,
    histories: HashMap<u32, VecDeque<String>>,
}

impl GestureSmoother {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            histories: HashMap::new(),
        }
    }

    pub fn feed(&mut self, hand_id: u32, gesture: &str) {
        let window = self.window;
        let history = self
            .histories
            .entry(hand_id)
            .or_insert_with(|| VecDeque::with_capacity(window));
        if history.len() == self.window {
            history.pop_front();
        }
        history.push_back(gesture.to_string());
    }

    /// The strict-majority winner, or None when the window is too empty or
    /// no pose dominates.
    pub fn smoothed(&self, hand_id: u32) -> Option<&str> {
        let history = self.histories.get(&hand_id)?;
        if history.len() < (self.window / 2).max(1) {
            return None;
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for name in history {
            *counts.entry(name.as_str()).or_insert(0) += 1;
        }
        let (best, count) = counts.into_iter().max_by_key(|(_, c)| *c)?;
        (count > history.len() / 2).then_some(best)
    }

    pub fn reset(&mut self, hand_id: Option<u32>) {
        match hand_id {
            Some(id) => {
                self.histories.remove(&id);
            }
            None => self.histories.clear(),
        }
    }
}

/// Per-pose confidence thresholds that drift with observed stability.
/// An unstable pose (raw classification disagreeing with the smoothed
/// winner) raises its own bar; sustained stability lowers it again, ten
/// times more slowly. Thresholds are keyed by pose name and deliberately
/// survive hand retirement.
#[derive(Debug)]
pub struct AdaptiveThresholds {
    config: AdaptiveConfig,
    thresholds: HashMap<String, f32>,
}

impl AdaptiveThresholds {
    pub fn new(config: AdaptiveConfig) -> Self {
        Self {
            config,
            thresholds: HashMap::new(),
        }
    }

    pub fn threshold(&self, gesture: &str) -> f32 {
        self.thresholds
            .get(gesture)
            .copied()
            .unwrap_or(self.config.base_threshold)
    }

    pub fn record(&mut self, gesture: &str, _confidence: f32, was_stable: bool) {
        let current = self.threshold(gesture);
        let updated = if was_stable {
            (current - self.config.adjustment_rate * 0.1).max(self.config.min_threshold)
        } else {
            (current + self.config.adjustment_rate).min(self.config.max_threshold)
        };
        self.thresholds.insert(gesture.to_string(), updated);
    }

    pub fn tracked_poses(&self) -> usize {
        self.thresholds.len()
    }
}

/// Suppresses repeat emissions of the same pose on the same hand within a
/// cooldown window. Distinct poses on one hand do not gate each other.
#[derive(Debug)]
pub struct CooldownGate {
    cooldown: f64,
    last_emitted: HashMap<(u32, String), f64>,
}

impl CooldownGate {
    pub fn new(cooldown: f64) -> Self {
        Self {
            cooldown,
            last_emitted: HashMap::new(),
        }
    }

    /// True when the (hand, pose) pair may emit now; records the emission
    /// time when it may.
    pub fn allow(&mut self, hand_id: u32, gesture: &str, now: f64) -> bool {
        let key = (hand_id, gesture.to_string());
        if let Some(&last) = self.last_emitted.get(&key) {
            if now - last < self.cooldown {
                return false;
            }
        }
        self.last_emitted.insert(key, now);
        true
    }

    pub fn reset(&mut self) {
        self.last_emitted.clear();
    }
}
