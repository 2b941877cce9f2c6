//! Ordered pose-sequence detection.
//!
//! Watches the per-hand stream of pose names for registered transition
//! patterns such as fist→open_hand ("release"). Repeats of the current
//! pose never enter the buffer, so patterns match over *distinct*
//! consecutive poses, and the whole pattern must complete within the
//! template's duration bound.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::config::SequenceConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SequenceTemplate {
    pub name: String,
    /// Ordered pose names making up the pattern.
    pub gestures: Vec<String>,
    #[serde(default = "default_max_duration")]
    pub max_duration: f64,
    #[serde(default)]
    pub description: String,
}

fn default_max_duration() -> f64 {
    2.0
}

impl SequenceTemplate {
    pub fn new(name: impl Into<String>, gestures: &[&str], max_duration: f64) -> Self {
        Self {
            name: name.into(),
            gestures: gestures.iter().map(|g| g.to_string()).collect(),
            max_duration,
            description: String::new(),
        }
    }
}

/// Fired when a hand completes a registered pose sequence.
#[derive(Clone, Debug)]
pub struct SequenceEvent {
    pub name: String,
    pub gestures: Vec<String>,
    pub hand_id: u32,
    /// Seconds between the first and last transition of the match.
    pub duration: f64,
    pub timestamp: f64,
}

#[derive(Debug)]
pub struct SequenceDetector {
    config: SequenceConfig,
    templates: Vec<SequenceTemplate>,
    history: HashMap<u32, VecDeque<(String, f64)>>,
    last_triggered: HashMap<(u32, String), f64>,
}

impl SequenceDetector {
    pub fn new(config: SequenceConfig) -> Self {
        Self {
            config,
            templates: Vec::new(),
            history: HashMap::new(),
            last_triggered: HashMap::new(),
        }
    }

    pub fn register(&mut self, template: SequenceTemplate) {
        self.templates.push(template);
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    /// Feed one pose observation for a hand. Emits at most one event; when
    /// several templates complete on the same transition the first
    /// registered wins.
    pub fn feed(&mut self, gesture: &str, hand_id: u32, now: f64) -> Vec<SequenceEvent> {
        let history = self.history.entry(hand_id).or_default();

        // Repeats of the tail pose are not transitions.
        if history.back().is_some_and(|(tail, _)| tail == gesture) {
            return Vec::new();
        }

        if history.len() == self.config.history_max {
            history.pop_front();
        }
        history.push_back((gesture.to_string(), now));

        for template in &self.templates {
            let pattern = &template.gestures;
            if pattern.is_empty() || history.len() < pattern.len() {
                continue;
            }

            let key = (hand_id, template.name.clone());
            if let Some(&last) = self.last_triggered.get(&key) {
                if now - last < self.config.cooldown_seconds {
                    continue;
                }
            }

            let tail_start = history.len() - pattern.len();
            let tail_matches = history
                .iter()
                .skip(tail_start)
                .zip(pattern.iter())
                .all(|((observed, _), expected)| observed == expected);
            if !tail_matches {
                continue;
            }

            let first_time = history[tail_start].1;
            let duration = now - first_time;
            if duration > template.max_duration {
                continue;
            }

            self.last_triggered.insert(key, now);
            log::debug!("sequence {} completed on hand {hand_id}", template.name);
            return vec![SequenceEvent {
                name: template.name.clone(),
                gestures: pattern.clone(),
                hand_id,
                duration,
                timestamp: now,
            }];
        }

        Vec::new()
    }

    /// Clear state for one hand, or for everything (including cooldowns).
    pub fn reset(&mut self, hand_id: Option<u32>) {
        match hand_id {
            Some(id) => {
                self.history.remove(&id);
            }
            None => {
                self.history.clear();
                self.last_triggered.clear();
            }
        }
    }

    /// The built-in sequence set.
    pub fn with_defaults(config: SequenceConfig) -> Self {
        let mut detector = Self::new(config);

        detector.register(SequenceTemplate {
            description: "open hand from fist, a release/drop action".into(),
            ..SequenceTemplate::new("release", &["fist", "open_hand"], 1.5)
        });
        detector.register(SequenceTemplate {
            description: "close the hand, a grab/pick-up action".into(),
            ..SequenceTemplate::new("grab", &["open_hand", "fist"], 1.5)
        });
        detector.register(SequenceTemplate {
            description: "release from a pinch grip".into(),
            ..SequenceTemplate::new("pinch_release", &["ok_sign", "open_hand"], 1.5)
        });
        detector.register(SequenceTemplate {
            description: "peace sign then close, dismiss/exit".into(),
            ..SequenceTemplate::new("peace_out", &["peace", "fist"], 2.0)
        });
        detector.register(SequenceTemplate {
            description: "quick open-close-open".into(),
            ..SequenceTemplate::new("wave", &["open_hand", "fist", "open_hand"], 2.0)
        });
        detector.register(SequenceTemplate {
            description: "point then click, a selection action".into(),
            ..SequenceTemplate::new("point_and_click", &["pointing", "fist"], 1.5)
        });

        detector
    }
}
