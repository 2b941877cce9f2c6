//! Two-hand gesture detection: pinch-zoom, clap, frame, conducting.
//!
//! Requires exactly two hands per update; the pair is ordered left/right
//! by mean x each frame. All distances are image-plane magnitudes, so the
//! detector consumes raw (non wrist-centred) landmarks.

use std::collections::{HashMap, VecDeque};

use crate::config::BimanualConfig;
use crate::landmarks::{self, Landmark, Landmarks};

const ZOOM_COOLDOWN: f64 = 0.1;
const CLAP_COOLDOWN: f64 = 1.0;
const FRAME_COOLDOWN: f64 = 1.0;
const CONDUCT_COOLDOWN: f64 = 0.3;
const CONDUCT_SAMPLES: usize = 8;
const CONDUCT_MIN_VELOCITY: f32 = 0.15;

/// A two-hand gesture with a gesture-specific value (zoom factor,
/// convergence speed, frame width, conducting speed).
#[derive(Clone, Debug)]
pub struct BimanualEvent {
    pub gesture: String,
    pub value: f32,
    pub confidence: f32,
    pub left_centroid: Landmark,
    pub right_centroid: Landmark,
    pub timestamp: f64,
}

#[derive(Clone, Debug)]
struct HandState {
    centroid: Landmark,
    landmarks: Landmarks,
}

pub struct BimanualDetector {
    config: BimanualConfig,
    history: VecDeque<(HandState, HandState, f64)>,
    last_distance: Option<f32>,
    cooldowns: HashMap<&'static str, f64>,
}

impl BimanualDetector {
    pub fn new(config: BimanualConfig) -> Self {
        Self {
            config,
            history: VecDeque::new(),
            last_distance: None,
            cooldowns: HashMap::new(),
        }
    }

    /// Feed the current frame's hands. Fewer than two hands resets the
    /// zoom baseline and yields nothing; extra hands beyond the first two
    /// are ignored.
    pub fn update(&mut self, hands: &[(u32, Landmarks)], now: f64) -> Vec<BimanualEvent> {
        if hands.len() < 2 {
            self.last_distance = None;
            return Vec::new();
        }

        let mut pair = [&hands[0].1, &hands[1].1];
        if landmarks::centroid(pair[0])[0] > landmarks::centroid(pair[1])[0] {
            pair.swap(0, 1);
        }
        let left = HandState {
            centroid: landmarks::centroid(pair[0]),
            landmarks: *pair[0],
        };
        let right = HandState {
            centroid: landmarks::centroid(pair[1]),
            landmarks: *pair[1],
        };
        let (left_c, right_c) = (left.centroid, right.centroid);

        if self.history.len() == self.config.history_size {
            self.history.pop_front();
        }
        self.history.push_back((left, right, now));

        let mut events = Vec::new();
        if let Some(event) = self.detect_zoom(left_c, right_c, now) {
            events.push(event);
        }
        if let Some(event) = self.detect_clap(left_c, right_c, now) {
            events.push(event);
        }
        if let Some(event) = self.detect_frame(left_c, right_c, now) {
            events.push(event);
        }
        if let Some(event) = self.detect_conducting(now) {
            events.push(event);
        }
        events
    }

    fn cooled(&self, gesture: &'static str, now: f64, cooldown: f64) -> bool {
        self.cooldowns
            .get(gesture)
            .is_none_or(|&last| now - last >= cooldown)
    }

    fn arm(&mut self, gesture: &'static str, now: f64) {
        self.cooldowns.insert(gesture, now);
    }

    /// Inter-hand distance change beyond the threshold reads as zooming;
    /// the value is the ratio of current to previous distance.
    fn detect_zoom(&mut self, left_c: Landmark, right_c: Landmark, now: f64) -> Option<BimanualEvent> {
        let distance = landmarks::distance2(left_c, right_c);
        let previous = self.last_distance;
        self.last_distance = Some(distance);

        let previous = previous?;
        let delta = distance - previous;
        if delta.abs() <= self.config.zoom_threshold || !self.cooled("pinch_zoom", now, ZOOM_COOLDOWN)
        {
            return None;
        }

        self.arm("pinch_zoom", now);
        Some(BimanualEvent {
            gesture: "pinch_zoom".to_string(),
            value: distance / previous.max(1e-6),
            confidence: (delta.abs() / 0.1).min(1.0),
            left_centroid: left_c,
            right_centroid: right_c,
            timestamp: now,
        })
    }

    /// Hands close together that converged fast over the last five frames.
    fn detect_clap(&mut self, left_c: Landmark, right_c: Landmark, now: f64) -> Option<BimanualEvent> {
        if !self.cooled("clap", now, CLAP_COOLDOWN) {
            return None;
        }
        let distance = landmarks::distance2(left_c, right_c);
        if distance > self.config.clap_distance || self.history.len() < 5 {
            return None;
        }

        let (prev_left, prev_right, prev_t) = &self.history[self.history.len() - 5];
        let dt = now - prev_t;
        if dt < 1e-6 {
            return None;
        }
        let prev_distance = landmarks::distance2(prev_left.centroid, prev_right.centroid);
        let velocity = (prev_distance - distance) / dt as f32;
        if velocity <= self.config.clap_velocity {
            return None;
        }

        self.arm("clap", now);
        Some(BimanualEvent {
            gesture: "clap".to_string(),
            value: velocity,
            confidence: (velocity / 1.0).min(1.0),
            left_centroid: left_c,
            right_centroid: right_c,
            timestamp: now,
        })
    }

    /// Both hands in an L shape (thumb + index extended, middle + ring
    /// curled) with the thumbs pointing in opposite x directions.
    fn detect_frame(&mut self, left_c: Landmark, right_c: Landmark, now: f64) -> Option<BimanualEvent> {
        if !self.cooled("frame", now, FRAME_COOLDOWN) {
            return None;
        }
        let (left, right, _) = self.history.back()?;

        if !is_l_shape(&left.landmarks) || !is_l_shape(&right.landmarks) {
            return None;
        }
        let left_thumb = landmarks::sub(left.landmarks[4], left.landmarks[2]);
        let right_thumb = landmarks::sub(right.landmarks[4], right.landmarks[2]);
        if left_thumb[0] * right_thumb[0] >= 0.0 {
            return None;
        }

        self.arm("frame", now);
        Some(BimanualEvent {
            gesture: "frame".to_string(),
            value: landmarks::distance2(left_c, right_c),
            confidence: 0.85,
            left_centroid: left_c,
            right_centroid: right_c,
            timestamp: now,
        })
    }

    /// Synchronized vertical motion of both hands. Image y grows downward,
    /// so a shared positive velocity is a downbeat.
    fn detect_conducting(&mut self, now: f64) -> Option<BimanualEvent> {
        if !self.cooled("conduct", now, CONDUCT_COOLDOWN) || self.history.len() < CONDUCT_SAMPLES {
            return None;
        }

        let start = self.history.len() - CONDUCT_SAMPLES;
        let (first_left, first_right, first_t) = &self.history[start];
        let (last_left, last_right, last_t) = self.history.back()?;
        let dt = (last_t - first_t) as f32;
        if dt < 0.05 {
            return None;
        }

        let left_vel = (last_left.centroid[1] - first_left.centroid[1]) / dt;
        let right_vel = (last_right.centroid[1] - first_right.centroid[1]) / dt;
        if left_vel.abs() <= CONDUCT_MIN_VELOCITY
            || right_vel.abs() <= CONDUCT_MIN_VELOCITY
            || left_vel * right_vel <= 0.0
        {
            return None;
        }

        let gesture = if left_vel > 0.0 {
            "conduct_down"
        } else {
            "conduct_up"
        };
        let avg_vel = (left_vel.abs() + right_vel.abs()) / 2.0;
        let (left_c, right_c) = (last_left.centroid, last_right.centroid);
        self.arm("conduct", now);
        Some(BimanualEvent {
            gesture: gesture.to_string(),
            value: avg_vel,
            confidence: (avg_vel / 0.5).min(1.0),
            left_centroid: left_c,
            right_centroid: right_c,
            timestamp: now,
        })
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.last_distance = None;
        self.cooldowns.clear();
    }
}

fn is_l_shape(hand: &Landmarks) -> bool {
    let wrist = hand[0];
    let radius = |i: usize| landmarks::distance3(hand[i], wrist);
    let thumb_extended = radius(4) > radius(3);
    let index_extended = radius(8) > radius(6);
    let middle_curled = radius(12) < radius(10);
    let ring_curled = radius(16) < radius(14);
    thumb_extended && index_extended && middle_curled && ring_curled
}
