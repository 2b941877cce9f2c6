//! Spatial gesture recognition: centroid trajectories matched with
//! band-limited dynamic time warping.
//!
//! Each hand accumulates a rolling window of image-plane centroid samples.
//! When the hand comes to rest the accumulated path is resampled to a
//! fixed count by cumulative arc length, normalized to a unit box, and
//! matched against the registered templates. Templates are resampled and
//! normalized once, at registration.

use std::collections::{HashMap, VecDeque};
use std::f32::consts::PI;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::config::TrajectoryConfig;
use crate::landmarks::{self, Landmarks};

pub type PathPoint = [f32; 2];

const SPAN_EPSILON: f32 = 1e-8;
const MIN_RECORDING_POINTS: usize = 5;

/// Fired when an accumulated path matches a template.
#[derive(Clone, Debug)]
pub struct TrajectoryEvent {
    pub name: String,
    /// Match quality in [0, 1].
    pub score: f32,
    pub hand_id: u32,
    pub duration: f64,
    /// Total arc length of the matched path, image-plane units.
    pub path_length: f32,
    pub timestamp: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrajectoryTemplate {
    pub name: String,
    pub points: Vec<PathPoint>,
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    #[serde(default)]
    pub description: String,
}

fn default_min_score() -> f32 {
    0.65
}

impl TrajectoryTemplate {
    pub fn new(name: impl Into<String>, points: Vec<PathPoint>, min_score: f32) -> Self {
        Self {
            name: name.into(),
            points,
            min_score,
            description: String::new(),
        }
    }
}

/// DTW distance between two point sequences under a Sakoe-Chiba band.
/// Returns the accumulated cost averaged over n + m, or infinity when
/// either sequence is empty (or the band excludes any full alignment).
pub fn dtw_band_cost(s: &[PathPoint], t: &[PathPoint], band: usize) -> f64 {
    let (n, m) = (s.len(), t.len());
    if n == 0 || m == 0 {
        return f64::INFINITY;
    }

    let mut cost = Array2::<f64>::from_elem((n + 1, m + 1), f64::INFINITY);
    cost[[0, 0]] = 0.0;

    for i in 1..=n {
        let j_start = i.saturating_sub(band).max(1);
        let j_end = (i + band).min(m);
        for j in j_start..=j_end {
            let dx = (s[i - 1][0] - t[j - 1][0]) as f64;
            let dy = (s[i - 1][1] - t[j - 1][1]) as f64;
            let d = (dx * dx + dy * dy).sqrt();
            let best = cost[[i - 1, j]].min(cost[[i, j - 1]]).min(cost[[i - 1, j - 1]]);
            cost[[i, j]] = d + best;
        }
    }

    cost[[n, m]] / (n + m) as f64
}

/// Resample a polyline to `count` points evenly spaced by cumulative arc
/// length. Endpoints are preserved. Paths with fewer than two points are
/// returned unchanged; a zero-length path collapses to its first point.
pub fn resample_path(points: &[PathPoint], count: usize) -> Vec<PathPoint> {
    if points.len() < 2 || count == 0 {
        return points.to_vec();
    }

    let mut seg_lengths = Vec::with_capacity(points.len() - 1);
    let mut cumulative = Vec::with_capacity(points.len());
    cumulative.push(0.0f32);
    for pair in points.windows(2) {
        let dx = pair[1][0] - pair[0][0];
        let dy = pair[1][1] - pair[0][1];
        let len = (dx * dx + dy * dy).sqrt();
        seg_lengths.push(len);
        cumulative.push(cumulative.last().unwrap() + len);
    }
    let total = *cumulative.last().unwrap();
    if total < SPAN_EPSILON {
        return vec![points[0]; count];
    }

    let mut resampled = Vec::with_capacity(count);
    for i in 0..count {
        let target = total * i as f32 / (count - 1).max(1) as f32;
        // Last segment whose start lies at or before the target.
        let mut idx = match cumulative.binary_search_by(|c| c.total_cmp(&target)) {
            Ok(exact) => exact,
            Err(insert) => insert.saturating_sub(1),
        };
        idx = idx.min(points.len() - 2);
        let seg_len = seg_lengths[idx].max(SPAN_EPSILON);
        let t = (target - cumulative[idx]) / seg_len;
        resampled.push([
            points[idx][0] + t * (points[idx + 1][0] - points[idx][0]),
            points[idx][1] + t * (points[idx + 1][1] - points[idx][1]),
        ]);
    }
    resampled
}

/// Centre a path at the origin and scale each axis so it spans
/// [-0.5, 0.5]. Axes with no extent are left unscaled.
pub fn normalize_path(points: &mut [PathPoint]) {
    if points.is_empty() {
        return;
    }

    let n = points.len() as f32;
    let mut mean = [0.0f32; 2];
    for p in points.iter() {
        mean[0] += p[0];
        mean[1] += p[1];
    }
    mean[0] /= n;
    mean[1] /= n;
    for p in points.iter_mut() {
        p[0] -= mean[0];
        p[1] -= mean[1];
    }

    let mut min = [f32::MAX; 2];
    let mut max = [f32::MIN; 2];
    for p in points.iter() {
        for axis in 0..2 {
            min[axis] = min[axis].min(p[axis]);
            max[axis] = max[axis].max(p[axis]);
        }
    }
    for axis in 0..2 {
        let span = max[axis] - min[axis];
        if span >= SPAN_EPSILON {
            for p in points.iter_mut() {
                p[axis] /= span;
            }
        }
    }
}

struct PreparedTemplate {
    template: TrajectoryTemplate,
    /// Resampled + normalized match form.
    prepared: Vec<PathPoint>,
}

#[derive(Debug)]
struct HandPath {
    samples: VecDeque<(f64, PathPoint)>,
    still_frames: usize,
}

pub struct TrajectoryTracker {
    config: TrajectoryConfig,
    templates: Vec<PreparedTemplate>,
    paths: HashMap<u32, HandPath>,
    last_match: HashMap<u32, f64>,
    recording: Option<String>,
    recording_points: Vec<PathPoint>,
}

impl TrajectoryTracker {
    pub fn new(config: TrajectoryConfig) -> Self {
        Self {
            config,
            templates: Vec::new(),
            paths: HashMap::new(),
            last_match: HashMap::new(),
            recording: None,
            recording_points: Vec::new(),
        }
    }

    pub fn register_template(&mut self, template: TrajectoryTemplate) {
        let mut prepared = resample_path(&template.points, self.config.resample_points);
        normalize_path(&mut prepared);
        self.templates.push(PreparedTemplate { template, prepared });
    }

    pub fn templates(&self) -> impl Iterator<Item = &TrajectoryTemplate> {
        self.templates.iter().map(|p| &p.template)
    }

    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    /// Begin capturing observed centroids into a new template.
    pub fn start_recording(&mut self, name: impl Into<String>) {
        self.recording = Some(name.into());
        self.recording_points.clear();
    }

    /// Finish recording; registers and returns the new template, or None
    /// when too few points were captured.
    pub fn stop_recording(&mut self) -> Option<TrajectoryTemplate> {
        let name = self.recording.take()?;
        if self.recording_points.len() < MIN_RECORDING_POINTS {
            log::warn!(
                "discarding recording {name:?}: only {} points captured",
                self.recording_points.len()
            );
            self.recording_points.clear();
            return None;
        }
        let template = TrajectoryTemplate::new(
            name,
            std::mem::take(&mut self.recording_points),
            default_min_score(),
        );
        self.register_template(template.clone());
        Some(template)
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Feed one hand observation. Returns the best template match when the
    /// hand has come to rest over a long enough path, at most one event.
    pub fn update(&mut self, hand_id: u32, hand: &Landmarks, now: f64) -> Vec<TrajectoryEvent> {
        let centroid = landmarks::centroid(hand);
        let point = [centroid[0], centroid[1]];

        if self.recording.is_some() {
            self.recording_points.push(point);
        }

        let path = self.paths.entry(hand_id).or_insert_with(|| HandPath {
            samples: VecDeque::new(),
            still_frames: 0,
        });

        while path
            .samples
            .front()
            .is_some_and(|(t, _)| now - t > self.config.window_seconds)
        {
            path.samples.pop_front();
        }
        path.samples.push_back((now, point));

        let velocity = match path.samples.len() {
            0 | 1 => 0.0,
            len => {
                let (t_prev, p_prev) = path.samples[len - 2];
                let dt = now - t_prev;
                if dt > 0.0 {
                    let dx = point[0] - p_prev[0];
                    let dy = point[1] - p_prev[1];
                    (dx * dx + dy * dy).sqrt() / dt as f32
                } else {
                    0.0
                }
            }
        };

        if velocity < self.config.velocity_threshold {
            path.still_frames += 1;
        } else {
            path.still_frames = 0;
        }

        if path.still_frames < self.config.still_frames || path.samples.len() <= 10 {
            return Vec::new();
        }
        let cooled = self
            .last_match
            .get(&hand_id)
            .is_none_or(|&last| now - last > self.config.cooldown_seconds);
        if !cooled {
            return Vec::new();
        }

        let samples: Vec<(f64, PathPoint)> = path.samples.iter().copied().collect();
        let events = self.match_path(hand_id, &samples, now);
        if !events.is_empty() {
            self.last_match.insert(hand_id, now);
            if let Some(path) = self.paths.get_mut(&hand_id) {
                path.samples.clear();
                path.still_frames = 0;
            }
        }
        events
    }

    fn match_path(
        &self,
        hand_id: u32,
        samples: &[(f64, PathPoint)],
        now: f64,
    ) -> Vec<TrajectoryEvent> {
        if self.templates.is_empty() {
            return Vec::new();
        }

        let points: Vec<PathPoint> = samples.iter().map(|(_, p)| *p).collect();
        let total_length: f32 = points
            .windows(2)
            .map(|pair| {
                let dx = pair[1][0] - pair[0][0];
                let dy = pair[1][1] - pair[0][1];
                (dx * dx + dy * dy).sqrt()
            })
            .sum();
        if total_length < self.config.min_path_length {
            return Vec::new();
        }

        let mut resampled = resample_path(&points, self.config.resample_points);
        normalize_path(&mut resampled);

        let duration = samples[samples.len() - 1].0 - samples[0].0;

        let mut best: Option<(&TrajectoryTemplate, f32)> = None;
        for entry in &self.templates {
            let cost = dtw_band_cost(&resampled, &entry.prepared, self.config.dtw_band);
            let score = (1.0 - 2.0 * cost).max(0.0) as f32;
            if score >= entry.template.min_score
                && best.map_or(true, |(_, s)| score > s)
            {
                best = Some((&entry.template, score));
            }
        }

        match best {
            Some((template, score)) => {
                log::debug!(
                    "trajectory {} matched on hand {hand_id} (score {score:.2})",
                    template.name
                );
                vec![TrajectoryEvent {
                    name: template.name.clone(),
                    score,
                    hand_id,
                    duration,
                    path_length: total_length,
                    timestamp: now,
                }]
            }
            None => Vec::new(),
        }
    }

    /// Drop accumulated paths for one hand or for all hands.
    pub fn clear(&mut self, hand_id: Option<u32>) {
        match hand_id {
            Some(id) => {
                self.paths.remove(&id);
            }
            None => self.paths.clear(),
        }
    }

    pub fn has_path(&self, hand_id: u32) -> bool {
        self.paths.contains_key(&hand_id)
    }

    /// The built-in swipe / circle / z / wave template set.
    pub fn with_defaults(config: TrajectoryConfig) -> Self {
        let mut tracker = Self::new(config);

        let line = |f: fn(f32) -> PathPoint| -> Vec<PathPoint> {
            (0..21).map(|i| f(i as f32 / 20.0)).collect()
        };
        tracker.register_template(TrajectoryTemplate {
            description: "horizontal swipe, left to right".into(),
            ..TrajectoryTemplate::new("swipe_right", line(|t| [t, 0.0]), 0.60)
        });
        tracker.register_template(TrajectoryTemplate {
            description: "horizontal swipe, right to left".into(),
            ..TrajectoryTemplate::new("swipe_left", line(|t| [1.0 - t, 0.0]), 0.60)
        });
        tracker.register_template(TrajectoryTemplate {
            description: "vertical swipe upward".into(),
            ..TrajectoryTemplate::new("swipe_up", line(|t| [0.0, 1.0 - t]), 0.60)
        });
        tracker.register_template(TrajectoryTemplate {
            description: "vertical swipe downward".into(),
            ..TrajectoryTemplate::new("swipe_down", line(|t| [0.0, t]), 0.60)
        });

        let circle: Vec<PathPoint> = (0..32)
            .map(|i| {
                let angle = 2.0 * PI * i as f32 / 32.0;
                [angle.cos(), angle.sin()]
            })
            .collect();
        tracker.register_template(TrajectoryTemplate {
            description: "clockwise circle".into(),
            ..TrajectoryTemplate::new("circle_cw", circle.clone(), 0.55)
        });
        let mut reversed = circle;
        reversed.reverse();
        tracker.register_template(TrajectoryTemplate {
            description: "counter-clockwise circle".into(),
            ..TrajectoryTemplate::new("circle_ccw", reversed, 0.55)
        });

        tracker.register_template(TrajectoryTemplate {
            description: "z-shaped pattern".into(),
            ..TrajectoryTemplate::new(
                "z_pattern",
                vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]],
                0.55,
            )
        });

        let mut wave = Vec::new();
        for i in 0..5 {
            let x = i as f32 * 0.25;
            wave.push([x, 0.0]);
            wave.push([x + 0.125, if i % 2 == 0 { 0.3 } else { -0.3 }]);
        }
        wave.push([1.0, 0.0]);
        tracker.register_template(TrajectoryTemplate {
            description: "horizontal wave motion".into(),
            ..TrajectoryTemplate::new("wave", wave, 0.50)
        });

        tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::NUM_LANDMARKS;

    fn hand_at(x: f32, y: f32) -> Landmarks {
        [[x, y, 0.0]; NUM_LANDMARKS]
    }

    #[test]
    fn dtw_of_a_sequence_with_itself_is_zero() {
        let s = vec![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]];
        assert!(dtw_band_cost(&s, &s, 10) < 1e-9);
    }

    #[test]
    fn dtw_is_symmetric() {
        let s = vec![[0.0, 0.0], [1.0, 0.5], [2.0, 0.0], [2.5, 1.0]];
        let t = vec![[0.0, 1.0], [1.0, 1.5], [2.0, 1.0]];
        let a = dtw_band_cost(&s, &t, 10);
        let b = dtw_band_cost(&t, &s, 10);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn dtw_empty_input_is_infinite() {
        let s: Vec<PathPoint> = Vec::new();
        let t = vec![[1.0, 0.0]];
        assert!(dtw_band_cost(&s, &t, 10).is_infinite());
        assert!(dtw_band_cost(&t, &s, 10).is_infinite());
    }

    #[test]
    fn dtw_separated_sequences_cost_more() {
        let s = vec![[0.0, 0.0], [1.0, 0.0]];
        let t = vec![[0.0, 1.0], [1.0, 1.0]];
        assert!(dtw_band_cost(&s, &t, 10) > 0.0);
    }

    #[test]
    fn resample_preserves_endpoints() {
        let pts = vec![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]];
        let resampled = resample_path(&pts, 5);
        assert_eq!(resampled.len(), 5);
        assert!((resampled[0][0] - 0.0).abs() < 1e-4);
        assert!((resampled[4][0] - 2.0).abs() < 1e-4);
    }

    #[test]
    fn resample_single_point_passes_through() {
        let pts = vec![[1.0, 1.0]];
        assert_eq!(resample_path(&pts, 5).len(), 1);
    }

    #[test]
    fn resample_of_coincident_points_collapses() {
        let pts = vec![[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]];
        let resampled = resample_path(&pts, 5);
        assert_eq!(resampled.len(), 5);
        for p in resampled {
            assert!((p[0] - 1.0).abs() < 1e-6);
            assert!((p[1] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn normalize_centers_and_bounds_the_path() {
        let mut pts = vec![[1.0, 1.0], [3.0, 1.0], [2.0, 3.0]];
        normalize_path(&mut pts);
        let mean_x: f32 = pts.iter().map(|p| p[0]).sum::<f32>() / 3.0;
        let mean_y: f32 = pts.iter().map(|p| p[1]).sum::<f32>() / 3.0;
        assert!(mean_x.abs() < 1e-4 && mean_y.abs() < 1e-4);
        for p in &pts {
            assert!(p[0].abs() <= 0.5 + 1e-4);
            assert!(p[1].abs() <= 0.5 + 1e-4);
        }
    }

    #[test]
    fn normalize_flat_axis_is_guarded() {
        let mut pts = vec![[5.0, 5.0], [6.0, 5.0]];
        normalize_path(&mut pts);
        for p in &pts {
            assert!(p[0].is_finite() && p[1].is_finite());
            assert!(p[1].abs() < 1e-6);
        }
    }

    #[test]
    fn default_template_set_is_complete() {
        let tracker = TrajectoryTracker::with_defaults(TrajectoryConfig::default());
        assert!(tracker.template_count() >= 8);
        let names: Vec<_> = tracker.templates().map(|t| t.name.clone()).collect();
        assert!(names.contains(&"swipe_right".to_string()));
        assert!(names.contains(&"circle_cw".to_string()));
    }

    #[test]
    fn swipe_right_is_detected_once_and_path_cleared() {
        let mut tracker = TrajectoryTracker::with_defaults(TrajectoryConfig::default());
        let mut events = Vec::new();

        for i in 0..25 {
            let t = i as f64 * 0.04;
            events.extend(tracker.update(0, &hand_at(i as f32 / 25.0, 0.5), t));
        }
        for i in 0..10 {
            let t = 1.0 + i as f64 * 0.04;
            events.extend(tracker.update(0, &hand_at(1.0, 0.5), t));
        }

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "swipe_right");
        assert!(events[0].score >= 0.6);
        assert_eq!(events[0].hand_id, 0);
    }

    #[test]
    fn short_path_is_rejected() {
        let mut tracker = TrajectoryTracker::with_defaults(TrajectoryConfig::default());
        let mut events = Vec::new();
        // A short drift followed by stillness: total arc length stays well
        // under the minimum, so the matcher rejects the path.
        for i in 0..15 {
            let x = 0.5 + i as f32 * 0.02 / 15.0;
            events.extend(tracker.update(0, &hand_at(x, 0.5), i as f64 * 0.04));
        }
        for i in 0..10 {
            let t = 0.6 + i as f64 * 0.04;
            events.extend(tracker.update(0, &hand_at(0.52, 0.5), t));
        }
        assert!(events.is_empty());
    }

    #[test]
    fn recording_produces_a_registered_template() {
        let mut tracker = TrajectoryTracker::new(TrajectoryConfig::default());
        tracker.start_recording("custom");
        for i in 0..20 {
            tracker.update(0, &hand_at(i as f32 / 20.0, 0.5), i as f64 * 0.05);
        }
        let template = tracker.stop_recording().expect("template");
        assert_eq!(template.name, "custom");
        assert_eq!(tracker.template_count(), 1);
    }

    #[test]
    fn too_short_recording_is_discarded() {
        let mut tracker = TrajectoryTracker::new(TrajectoryConfig::default());
        tracker.start_recording("tiny");
        for i in 0..2 {
            tracker.update(0, &hand_at(0.0, 0.0), i as f64 * 0.1);
        }
        assert!(tracker.stop_recording().is_none());
        assert_eq!(tracker.template_count(), 0);
    }

    #[test]
    fn clear_drops_one_hand_only() {
        let mut tracker = TrajectoryTracker::new(TrajectoryConfig::default());
        tracker.update(0, &hand_at(0.0, 0.0), 0.0);
        tracker.update(1, &hand_at(0.5, 0.5), 0.0);
        tracker.clear(Some(0));
        assert!(!tracker.has_path(0));
        assert!(tracker.has_path(1));
    }

    #[test]
    fn template_json_round_trip() {
        let template = TrajectoryTemplate::new("loop", vec![[0.0, 0.0], [1.0, 1.0]], 0.7);
        let json = serde_json::to_string(&template).unwrap();
        let back: TrajectoryTemplate = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "loop");
        assert_eq!(back.points.len(), 2);
        assert!((back.min_score - 0.7).abs() < 1e-6);
    }
}
