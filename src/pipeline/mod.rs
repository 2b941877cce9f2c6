//! The per-frame orchestrator.
//!
//! One frame flows through normalisation → tracking → classification →
//! smoothing → sequences → trajectories → canvas → bimanual, in order, on
//! one thread. All per-hand state is owned here, so the frame path needs
//! no locks; the only concurrent pieces are the channel boundaries in
//! [`worker`] and the shared metrics collector.

pub mod worker;

pub use worker::{EngineHandle, start_engine};

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use crate::bimanual::BimanualDetector;
use crate::canvas::DrawingCanvas;
use crate::config::{AdaptiveConfig, EngineConfig};
use crate::events::{EngineEvent, GestureEvent, PipelineStats};
use crate::gestures::GestureRegistry;
use crate::landmarks::{self, LandmarkBundle, Landmarks};
use crate::metrics::MetricsCollector;
use crate::profiler::PipelineProfiler;
use crate::sequences::SequenceDetector;
use crate::smoothing::{AdaptiveThresholds, CooldownGate, GestureSmoother};
use crate::tracker::HandTracker;
use crate::trajectory::TrajectoryTracker;

const STATS_WINDOW: usize = 60;

pub struct GesturePipeline {
    config: EngineConfig,
    registry: GestureRegistry,
    tracker: HandTracker,
    smoother: GestureSmoother,
    thresholds: AdaptiveThresholds,
    cooldowns: CooldownGate,
    sequences: SequenceDetector,
    trajectories: TrajectoryTracker,
    bimanual: BimanualDetector,
    canvas: DrawingCanvas,
    profiler: PipelineProfiler,
    metrics: Arc<MetricsCollector>,
    frame_times: VecDeque<f64>,
    total_frames: u64,
    total_gestures: u64,
    last_hands: usize,
}

impl GesturePipeline {
    /// Pipeline with the built-in pose, sequence and trajectory sets.
    pub fn with_defaults(config: EngineConfig) -> Self {
        let registry = GestureRegistry::with_defaults();
        let sequences = SequenceDetector::with_defaults(config.sequences.clone());
        let trajectories = TrajectoryTracker::with_defaults(config.trajectory.clone());
        Self::new(config, registry, sequences, trajectories)
    }

    /// Pipeline over caller-supplied registries. The registries are fixed
    /// for the pipeline's lifetime.
    pub fn new(
        config: EngineConfig,
        registry: GestureRegistry,
        sequences: SequenceDetector,
        trajectories: TrajectoryTracker,
    ) -> Self {
        let metrics = Arc::new(MetricsCollector::new(
            config.metrics_histogram_buckets.clone(),
        ));
        Self {
            tracker: HandTracker::new(config.tracker.clone()),
            smoother: GestureSmoother::new(config.smoothing_window),
            thresholds: AdaptiveThresholds::new(AdaptiveConfig {
                base_threshold: config.min_confidence,
                ..config.adaptive.clone()
            }),
            cooldowns: CooldownGate::new(config.cooldown_seconds),
            bimanual: BimanualDetector::new(config.bimanual.clone()),
            canvas: DrawingCanvas::new(config.canvas.clone()),
            profiler: PipelineProfiler::default(),
            metrics,
            frame_times: VecDeque::with_capacity(STATS_WINDOW),
            total_frames: 0,
            total_gestures: 0,
            last_hands: 0,
            registry,
            sequences,
            trajectories,
            config,
        }
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    pub fn profiler(&self) -> &PipelineProfiler {
        &self.profiler
    }

    pub fn set_profiling(&mut self, enabled: bool) {
        self.profiler.set_enabled(enabled);
    }

    pub fn trajectories_mut(&mut self) -> &mut TrajectoryTracker {
        &mut self.trajectories
    }

    pub fn canvas(&self) -> &DrawingCanvas {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut DrawingCanvas {
        &mut self.canvas
    }

    /// Drive one frame through the pipeline and collect its events, in
    /// emission order.
    pub fn process(&mut self, bundle: &LandmarkBundle) -> Vec<EngineEvent> {
        let frame_start = Instant::now();
        let now = bundle.timestamp;

        // A malformed bundle drops the whole frame before any state moves.
        let mut raw_hands: Vec<Landmarks> = Vec::with_capacity(bundle.hands.len());
        for hand in bundle.hands.iter().take(self.config.max_hands) {
            match landmarks::validate(hand) {
                Ok(valid) => raw_hands.push(valid),
                Err(err) => {
                    log::warn!("dropping frame: {err}");
                    self.metrics.record_malformed();
                    return Vec::new();
                }
            }
        }

        self.total_frames += 1;
        self.last_hands = raw_hands.len();

        let normalized: Vec<Landmarks> = {
            let _stage = self.profiler.stage("normalization");
            raw_hands.iter().map(landmarks::normalize).collect()
        };

        let tracked = {
            let _stage = self.profiler.stage("tracking");
            self.tracker.update(&normalized, now)
        };

        let mut events = Vec::new();
        let mut raw_tracked: Vec<(u32, Landmarks)> = Vec::with_capacity(tracked.len());

        for (index, (hand_id, wrist_centred)) in tracked.iter().enumerate() {
            let hand_id = *hand_id;
            let raw = raw_hands[index];
            raw_tracked.push((hand_id, raw));

            let classified = {
                let _stage = self.profiler.stage("classification");
                self.registry.best_match(wrist_centred)
            };

            // The pose-derived flow runs only on classifications that
            // clear the adaptive bar; spatial flows run regardless.
            let mut smoothed_pose: Option<String> = None;
            if let Some((gesture, confidence)) = classified {
                let name = gesture.name.clone();
                if confidence >= self.thresholds.threshold(&name) {
                    self.smoother.feed(hand_id, &name);
                    smoothed_pose = self.smoother.smoothed(hand_id).map(str::to_string);
                    let was_stable = smoothed_pose.as_deref() == Some(name.as_str());
                    self.thresholds.record(&name, confidence, was_stable);

                    if let Some(smoothed) = smoothed_pose.as_deref() {
                        if self.cooldowns.allow(hand_id, smoothed, now) {
                            self.total_gestures += 1;
                            self.metrics.record_gesture(smoothed);
                            events.push(EngineEvent::Gesture(GestureEvent {
                                gesture: smoothed.to_string(),
                                confidence,
                                hand_id,
                                landmarks: *wrist_centred,
                                timestamp: now,
                            }));
                        }
                    }
                }
            }

            if let Some(smoothed) = smoothed_pose.as_deref() {
                let sequence_events = {
                    let _stage = self.profiler.stage("sequence_detection");
                    self.sequences.feed(smoothed, hand_id, now)
                };
                for event in sequence_events {
                    self.metrics.record_sequence(&event.name);
                    events.push(EngineEvent::Sequence(event));
                }
            }

            let trajectory_events = {
                let _stage = self.profiler.stage("trajectory");
                self.trajectories.update(hand_id, &raw, now)
            };
            for event in trajectory_events {
                self.metrics.record_trajectory(&event.name);
                events.push(EngineEvent::Trajectory(event));
            }

            let commands = {
                let _stage = self.profiler.stage("canvas");
                self.canvas.update(&raw, smoothed_pose.as_deref(), now)
            };
            if !commands.is_empty() {
                events.push(EngineEvent::Canvas(commands));
            }
        }

        if raw_tracked.len() >= 2 {
            let bimanual_events = {
                let _stage = self.profiler.stage("bimanual");
                self.bimanual.update(&raw_tracked, now)
            };
            for event in bimanual_events {
                self.metrics.record_bimanual(&event.gesture);
                events.push(EngineEvent::Bimanual(event));
            }
        }

        let elapsed = frame_start.elapsed().as_secs_f64();
        self.profiler.record("total", elapsed * 1000.0);
        self.metrics.record_frame(elapsed, raw_hands.len());
        if self.frame_times.len() == STATS_WINDOW {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(elapsed);

        events
    }

    pub fn stats(&self) -> PipelineStats {
        let (fps, latency_ms) = if self.frame_times.is_empty() {
            (0.0, 0.0)
        } else {
            let avg = self.frame_times.iter().sum::<f64>() / self.frame_times.len() as f64;
            (if avg > 0.0 { 1.0 / avg } else { 0.0 }, avg * 1000.0)
        };
        PipelineStats {
            fps,
            latency_ms,
            total_frames: self.total_frames,
            total_gestures: self.total_gestures,
            hands_detected: self.last_hands,
        }
    }

    /// Clear all per-hand and rolling state. Registries and metrics are
    /// left intact.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.smoother.reset(None);
        self.cooldowns.reset();
        self.sequences.reset(None);
        self.trajectories.clear(None);
        self.bimanual.reset();
        self.frame_times.clear();
        self.total_frames = 0;
        self.total_gestures = 0;
        self.last_hands = 0;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::landmarks::{FINGER_PIPS, FINGER_TIPS, NUM_LANDMARKS};

    /// Raw-frame hand whose fingers read as extended after wrist-centred
    /// normalisation, positioned around `(x, y)`.
    pub(crate) fn open_hand_at(x: f32, y: f32) -> Landmarks {
        let mut hand = [[x, y, 0.0f32]; NUM_LANDMARKS];
        for (i, &tip) in FINGER_TIPS.iter().enumerate() {
            hand[tip] = [x + 0.02 * i as f32, y - 0.12, 0.0];
        }
        for (i, &pip) in FINGER_PIPS.iter().enumerate() {
            hand[pip] = [x + 0.01 * i as f32, y - 0.06, 0.0];
        }
        hand
    }

    pub(crate) fn fist_at(x: f32, y: f32) -> Landmarks {
        let mut hand = [[x, y, 0.0f32]; NUM_LANDMARKS];
        // Pinky MCP keeps the normalisation scale stable while the tips
        // stay inside their PIP radii.
        hand[17] = [x - 0.02, y - 0.1, 0.0];
        for (i, &tip) in FINGER_TIPS.iter().enumerate() {
            hand[tip] = [x + 0.005 * i as f32, y - 0.02, 0.0];
        }
        for (i, &pip) in FINGER_PIPS.iter().enumerate() {
            hand[pip] = [x + 0.01 * i as f32, y - 0.05, 0.0];
        }
        hand
    }

    fn bundle(hands: Vec<Landmarks>, timestamp: f64) -> LandmarkBundle {
        LandmarkBundle::new(hands, timestamp)
    }

    fn gesture_names(events: &[EngineEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Gesture(g) => Some(g.gesture.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn stable_pose_emits_after_the_smoothing_window_fills() {
        let mut pipeline = GesturePipeline::with_defaults(EngineConfig::default());
        let mut all = Vec::new();
        for i in 0..6 {
            let t = i as f64 * 0.033;
            all.extend(pipeline.process(&bundle(vec![open_hand_at(0.5, 0.5)], t)));
        }
        let names = gesture_names(&all);
        assert!(names.contains(&"open_hand".to_string()));
    }

    #[test]
    fn cooldown_limits_repeat_emissions() {
        let mut pipeline = GesturePipeline::with_defaults(EngineConfig::default());
        let mut all = Vec::new();
        for i in 0..12 {
            let t = i as f64 * 0.033; // 12 frames inside the 0.5 s cooldown
            all.extend(pipeline.process(&bundle(vec![open_hand_at(0.5, 0.5)], t)));
        }
        assert_eq!(gesture_names(&all).len(), 1);
    }

    #[test]
    fn malformed_frame_is_dropped_and_counted() {
        let mut pipeline = GesturePipeline::with_defaults(EngineConfig::default());
        let mut bad = open_hand_at(0.5, 0.5);
        bad[3][0] = f32::NAN;
        let events = pipeline.process(&bundle(vec![bad], 0.0));
        assert!(events.is_empty());
        assert_eq!(pipeline.metrics().malformed_total(), 1);
        assert_eq!(pipeline.metrics().frames_total(), 0);
    }

    #[test]
    fn fist_to_open_hand_completes_the_release_sequence() {
        let mut pipeline = GesturePipeline::with_defaults(EngineConfig::default());
        let mut all = Vec::new();
        for i in 0..8 {
            let t = i as f64 * 0.033;
            all.extend(pipeline.process(&bundle(vec![fist_at(0.5, 0.5)], t)));
        }
        for i in 0..8 {
            let t = 0.3 + i as f64 * 0.033;
            all.extend(pipeline.process(&bundle(vec![open_hand_at(0.5, 0.5)], t)));
        }
        let sequences: Vec<_> = all
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Sequence(s) => Some(s.name.clone()),
                _ => None,
            })
            .collect();
        assert!(sequences.contains(&"release".to_string()));
    }

    #[test]
    fn hand_ids_are_stable_across_frames() {
        let mut pipeline = GesturePipeline::with_defaults(EngineConfig::default());
        let mut ids = Vec::new();
        for i in 0..10 {
            let t = i as f64 * 0.033;
            let x = 0.5 + i as f32 * 0.002;
            for event in pipeline.process(&bundle(vec![open_hand_at(x, 0.5)], t)) {
                if let EngineEvent::Gesture(g) = event {
                    ids.push(g.hand_id);
                }
            }
        }
        assert!(!ids.is_empty());
        assert!(ids.iter().all(|&id| id == ids[0]));
    }

    #[test]
    fn extra_hands_beyond_the_cap_are_ignored() {
        let mut pipeline = GesturePipeline::with_defaults(EngineConfig {
            max_hands: 1,
            ..EngineConfig::default()
        });
        let events = pipeline.process(&bundle(
            vec![open_hand_at(0.2, 0.5), open_hand_at(0.8, 0.5)],
            0.0,
        ));
        assert!(events.iter().all(|e| !matches!(e, EngineEvent::Bimanual(_))));
        assert_eq!(pipeline.stats().hands_detected, 1);
    }

    #[test]
    fn stats_track_frames_and_gestures() {
        let mut pipeline = GesturePipeline::with_defaults(EngineConfig::default());
        for i in 0..6 {
            pipeline.process(&bundle(vec![open_hand_at(0.5, 0.5)], i as f64 * 0.033));
        }
        let stats = pipeline.stats();
        assert_eq!(stats.total_frames, 6);
        assert!(stats.total_gestures >= 1);
        assert_eq!(stats.hands_detected, 1);
        assert!(stats.latency_ms >= 0.0);
    }

    #[test]
    fn reset_clears_rolling_state() {
        let mut pipeline = GesturePipeline::with_defaults(EngineConfig::default());
        for i in 0..6 {
            pipeline.process(&bundle(vec![open_hand_at(0.5, 0.5)], i as f64 * 0.033));
        }
        pipeline.reset();
        assert_eq!(pipeline.stats().total_frames, 0);
        // The first post-reset emission proves smoothing state restarted.
        let mut all = Vec::new();
        for i in 0..6 {
            let t = 100.0 + i as f64 * 0.033;
            all.extend(pipeline.process(&bundle(vec![open_hand_at(0.5, 0.5)], t)));
        }
        assert_eq!(gesture_names(&all).len(), 1);
    }

    #[test]
    fn profiler_sees_the_frame_stages() {
        let mut pipeline = GesturePipeline::with_defaults(EngineConfig::default());
        pipeline.process(&bundle(vec![open_hand_at(0.5, 0.5)], 0.0));
        let stages: Vec<_> = pipeline
            .profiler()
            .summary()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert!(stages.contains(&"classification".to_string()));
        assert!(stages.contains(&"total".to_string()));
    }
}
