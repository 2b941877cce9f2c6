//! Typed engine events and their wire form.
//!
//! Every emission serializes to a single JSON record with a `type` tag.
//! Floats are rounded to three decimals on the wire (canvas coordinates to
//! one, handled by the canvas commands themselves).

use serde_json::{Value, json};

use crate::bimanual::BimanualEvent;
use crate::canvas::DrawCommand;
use crate::landmarks::Landmarks;
use crate::sequences::SequenceEvent;
use crate::trajectory::TrajectoryEvent;

/// A stable pose detection for one hand.
#[derive(Clone, Debug)]
pub struct GestureEvent {
    pub gesture: String,
    pub confidence: f32,
    pub hand_id: u32,
    pub landmarks: Landmarks,
    pub timestamp: f64,
}

/// Rolling pipeline statistics, broadcast periodically.
#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineStats {
    pub fps: f64,
    pub latency_ms: f64,
    pub total_frames: u64,
    pub total_gestures: u64,
    pub hands_detected: usize,
}

/// Everything the engine can emit for a frame.
#[derive(Clone, Debug)]
pub enum EngineEvent {
    Gesture(GestureEvent),
    Sequence(SequenceEvent),
    Trajectory(TrajectoryEvent),
    Bimanual(BimanualEvent),
    /// Canvas commands produced this frame, batched.
    Canvas(Vec<DrawCommand>),
    Stats(PipelineStats),
}

pub fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

impl EngineEvent {
    /// The JSON record sent to subscribers.
    pub fn to_message(&self) -> Value {
        match self {
            EngineEvent::Gesture(event) => json!({
                "type": "gesture",
                "gesture": &event.gesture,
                "confidence": round3(event.confidence as f64),
                "hand_id": event.hand_id,
                "timestamp": round3(event.timestamp),
            }),
            EngineEvent::Sequence(event) => json!({
                "type": "sequence",
                "sequence": &event.name,
                "gestures": &event.gestures,
                "duration": round3(event.duration),
                "timestamp": round3(event.timestamp),
            }),
            EngineEvent::Trajectory(event) => json!({
                "type": "trajectory",
                "name": &event.name,
                "score": round3(event.score as f64),
                "hand_id": event.hand_id,
                "duration": round3(event.duration),
                "timestamp": round3(event.timestamp),
            }),
            EngineEvent::Bimanual(event) => json!({
                "type": "bimanual",
                "gesture": &event.gesture,
                "value": round3(event.value as f64),
                "confidence": round3(event.confidence as f64),
                "timestamp": round3(event.timestamp),
            }),
            EngineEvent::Canvas(commands) => json!({
                "type": "canvas_commands",
                "commands": commands.iter().map(DrawCommand::to_message).collect::<Vec<_>>(),
            }),
            EngineEvent::Stats(stats) => json!({
                "type": "stats",
                "fps": round1(stats.fps),
                "latency_ms": round1(stats.latency_ms),
                "hands_detected": stats.hands_detected,
            }),
        }
    }
}
