//! Engine configuration. One closed struct per component; every knob has a
//! named field and a default matching the shipped tuning.

#[derive(Clone, Debug)]
pub struct TrackerConfig {
    /// Maximum centroid distance for matching a detection to an existing
    /// track (image-plane units).
    pub max_distance: f32,
    /// Seconds without a detection before a track is retired.
    pub timeout: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_distance: 0.3,
            timeout: 0.5,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AdaptiveConfig {
    pub base_threshold: f32,
    pub adjustment_rate: f32,
    pub min_threshold: f32,
    pub max_threshold: f32,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            base_threshold: 0.6,
            adjustment_rate: 0.05,
            min_threshold: 0.4,
            max_threshold: 0.95,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SequenceConfig {
    /// Bound on the per-hand transition buffer.
    pub history_max: usize,
    /// Seconds before the same (hand, sequence) pair may fire again.
    pub cooldown_seconds: f64,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            history_max: 20,
            cooldown_seconds: 1.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TrajectoryConfig {
    /// Rolling window of centroid samples, in seconds.
    pub window_seconds: f64,
    /// Paths shorter than this total arc length are discarded unmatched.
    pub min_path_length: f32,
    /// Inter-frame speed below which a frame counts as "still".
    pub velocity_threshold: f32,
    /// Consecutive still frames required before matching triggers.
    pub still_frames: usize,
    /// Fixed sample count paths and templates are resampled to.
    pub resample_points: usize,
    /// Sakoe-Chiba band half-width for DTW.
    pub dtw_band: usize,
    /// Seconds before the same hand may match again.
    pub cooldown_seconds: f64,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            window_seconds: 2.0,
            min_path_length: 0.08,
            velocity_threshold: 0.005,
            still_frames: 5,
            resample_points: 32,
            dtw_band: 10,
            cooldown_seconds: 1.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BimanualConfig {
    /// Ring size of recent (left, right, time) states.
    pub history_size: usize,
    /// Minimum inter-hand distance change to register a zoom step.
    pub zoom_threshold: f32,
    /// Inter-hand distance at or below which a clap can register.
    pub clap_distance: f32,
    /// Minimum convergence speed for a clap.
    pub clap_velocity: f32,
}

impl Default for BimanualConfig {
    fn default() -> Self {
        Self {
            history_size: 30,
            zoom_threshold: 0.03,
            clap_distance: 0.12,
            clap_velocity: 0.3,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CanvasConfig {
    pub line_width: f32,
    pub erase_radius: f32,
    /// Fingertip smoothing window, in frames.
    pub smoothing: usize,
    /// Command-history cap; trimming keeps replay semantics via a
    /// synthetic leading clear.
    pub max_history: usize,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            line_width: 3.0,
            erase_radius: 25.0,
            smoothing: 3,
            max_history: 10_000,
        }
    }
}

/// Top-level engine configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Cap on hands processed per frame.
    pub max_hands: usize,
    /// Majority-vote window for pose smoothing, in frames.
    pub smoothing_window: usize,
    /// Seconds before the same (hand, pose) pair may emit again.
    pub cooldown_seconds: f64,
    /// Base classification confidence floor; adaptive thresholds start here.
    pub min_confidence: f32,
    pub tracker: TrackerConfig,
    pub adaptive: AdaptiveConfig,
    pub sequences: SequenceConfig,
    pub trajectory: TrajectoryConfig,
    pub bimanual: BimanualConfig,
    pub canvas: CanvasConfig,
    /// Upper bounds (seconds) of the frame-latency histogram buckets.
    pub metrics_histogram_buckets: Vec<f64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_hands: 2,
            smoothing_window: 5,
            cooldown_seconds: 0.5,
            min_confidence: 0.6,
            tracker: TrackerConfig::default(),
            adaptive: AdaptiveConfig::default(),
            sequences: SequenceConfig::default(),
            trajectory: TrajectoryConfig::default(),
            bimanual: BimanualConfig::default(),
            canvas: CanvasConfig::default(),
            metrics_histogram_buckets: vec![
                0.001, 0.002, 0.005, 0.010, 0.020, 0.033, 0.050, 0.100,
            ],
        }
    }
}
