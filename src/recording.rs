//! Landmark session recording and replay.
//!
//! Captures per-frame landmark bundles (and the gestures detected on them)
//! to a JSON file so sessions can be replayed deterministically without a
//! camera: reproducible tests, headless CI, demo playback.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::landmarks::Landmarks;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordedGesture {
    pub name: String,
    pub confidence: f32,
    pub hand_id: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordedFrame {
    /// Seconds from the start of the recording.
    pub timestamp: f64,
    pub hands: Vec<Landmarks>,
    #[serde(default)]
    pub gestures: Vec<RecordedGesture>,
}

#[derive(Serialize, Deserialize)]
struct RecordingFile {
    version: u32,
    frame_count: usize,
    duration: f64,
    frames: Vec<RecordedFrame>,
}

#[derive(Debug, Default)]
pub struct GestureRecorder {
    frames: Vec<RecordedFrame>,
    start_time: Option<f64>,
    recording: bool,
}

impl GestureRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new session; `now` anchors the relative timestamps.
    pub fn start(&mut self, now: f64) {
        self.frames.clear();
        self.start_time = Some(now);
        self.recording = true;
    }

    /// Stop recording. Returns the number of captured frames.
    pub fn stop(&mut self) -> usize {
        self.recording = false;
        self.frames.len()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn duration(&self) -> f64 {
        self.frames.last().map_or(0.0, |f| f.timestamp)
    }

    pub fn add_frame(&mut self, hands: &[Landmarks], gestures: Vec<RecordedGesture>, now: f64) {
        if !self.recording {
            return;
        }
        let start = self.start_time.unwrap_or(now);
        self.frames.push(RecordedFrame {
            timestamp: now - start,
            hands: hands.to_vec(),
            gestures,
        });
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let file = RecordingFile {
            version: 1,
            frame_count: self.frames.len(),
            duration: self.duration(),
            frames: self.frames.clone(),
        };
        fs::write(path, serde_json::to_string(&file)?)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct GesturePlayer {
    frames: Vec<RecordedFrame>,
}

impl GesturePlayer {
    pub fn new(frames: Vec<RecordedFrame>) -> Self {
        Self { frames }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let file: RecordingFile = serde_json::from_str(&fs::read_to_string(path)?)?;
        Ok(Self {
            frames: file.frames,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn duration(&self) -> f64 {
        self.frames.last().map_or(0.0, |f| f.timestamp)
    }

    pub fn get_frame(&self, index: usize) -> Option<&RecordedFrame> {
        self.frames.get(index)
    }

    pub fn frames(&self) -> impl Iterator<Item = &RecordedFrame> {
        self.frames.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::NUM_LANDMARKS;

    fn hand() -> Landmarks {
        [[0.5f32, 0.5, 0.0]; NUM_LANDMARKS]
    }

    #[test]
    fn timestamps_are_relative_to_start() {
        let mut recorder = GestureRecorder::new();
        recorder.start(100.0);
        recorder.add_frame(&[hand()], Vec::new(), 100.0);
        recorder.add_frame(&[hand()], Vec::new(), 100.5);
        assert_eq!(recorder.frame_count(), 2);
        assert!((recorder.duration() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn frames_are_ignored_when_not_recording() {
        let mut recorder = GestureRecorder::new();
        recorder.add_frame(&[hand()], Vec::new(), 0.0);
        assert_eq!(recorder.frame_count(), 0);
        recorder.start(0.0);
        recorder.stop();
        recorder.add_frame(&[hand()], Vec::new(), 1.0);
        assert_eq!(recorder.frame_count(), 0);
    }

    #[test]
    fn save_and_load_round_trip() {
        let mut recorder = GestureRecorder::new();
        recorder.start(0.0);
        recorder.add_frame(
            &[hand()],
            vec![RecordedGesture {
                name: "fist".to_string(),
                confidence: 0.95,
                hand_id: 0,
            }],
            0.0,
        );
        recorder.add_frame(&[hand(), hand()], Vec::new(), 0.1);
        recorder.stop();

        let path = std::env::temp_dir().join("gesture_engine_recording_test.json");
        recorder.save(&path).unwrap();
        let player = GesturePlayer::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(player.frame_count(), 2);
        assert_eq!(player.get_frame(0).unwrap().gestures[0].name, "fist");
        assert_eq!(player.get_frame(1).unwrap().hands.len(), 2);
    }

    #[test]
    fn empty_recording_has_zero_duration() {
        let recorder = GestureRecorder::new();
        assert_eq!(recorder.duration(), 0.0);
        let player = GesturePlayer::new(Vec::new());
        assert_eq!(player.duration(), 0.0);
        assert!(player.get_frame(0).is_none());
    }
}
