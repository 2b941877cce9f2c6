//! Real-time hand-gesture event engine.
//!
//! Feed the engine one [`LandmarkBundle`] per video frame (21 three-
//! dimensional landmarks per detected hand, from any hand-landmark model)
//! and it emits a typed event stream: stable static poses, ordered pose
//! sequences, DTW-matched spatial trajectories, two-hand gestures, and
//! virtual-canvas drawing commands, with per-hand identity, temporal
//! smoothing, adaptive thresholds and cooldowns.
//!
//! The per-frame path is synchronous and single-threaded; concurrency
//! lives at the channel boundaries (`pipeline::worker`): a bounded
//! capture queue in front of the engine, a non-blocking event channel
//! behind it.
//!
//! ```no_run
//! use gesture_engine::{EngineConfig, GesturePipeline, LandmarkBundle};
//!
//! let mut pipeline = GesturePipeline::with_defaults(EngineConfig::default());
//! let bundle = LandmarkBundle::new(vec![[[0.0f32; 3]; 21]], 0.0);
//! for event in pipeline.process(&bundle) {
//!     println!("{}", event.to_message());
//! }
//! ```

pub mod bimanual;
pub mod canvas;
pub mod config;
pub mod error;
pub mod events;
pub mod gestures;
pub mod landmarks;
pub mod metrics;
pub mod pipeline;
pub mod profiler;
pub mod recording;
pub mod sequences;
pub mod smoothing;
pub mod tracker;
pub mod trajectory;

pub use bimanual::{BimanualDetector, BimanualEvent};
pub use canvas::{DrawCommand, DrawingCanvas};
pub use config::EngineConfig;
pub use error::EngineError;
pub use events::{EngineEvent, GestureEvent, PipelineStats};
pub use gestures::{FingerState, GestureDefinition, GestureRegistry};
pub use landmarks::{LandmarkBundle, Landmarks, NUM_LANDMARKS};
pub use metrics::MetricsCollector;
pub use pipeline::{EngineHandle, GesturePipeline, start_engine};
pub use profiler::PipelineProfiler;
pub use recording::{GesturePlayer, GestureRecorder};
pub use sequences::{SequenceDetector, SequenceEvent, SequenceTemplate};
pub use tracker::HandTracker;
pub use trajectory::{TrajectoryEvent, TrajectoryTemplate, TrajectoryTracker};
