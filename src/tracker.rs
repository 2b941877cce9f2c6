//! Multi-hand identity tracking.
//!
//! Assigns a stable integer id to each hand across frames by greedy
//! centroid nearest-neighbour matching. With at most a handful of hands the
//! greedy pairing and the optimal assignment almost always agree, and a
//! rare misassignment costs one frame of wrong identity.

use crate::config::TrackerConfig;
use crate::landmarks::{self, Landmark, Landmarks};

#[derive(Clone, Debug)]
pub struct TrackedHand {
    pub id: u32,
    pub landmarks: Landmarks,
    pub last_seen: f64,
    pub frames_tracked: u64,
}

#[derive(Debug, Default)]
pub struct HandTracker {
    config: TrackerConfig,
    tracks: Vec<TrackedHand>,
    next_id: u32,
}

impl HandTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 0,
        }
    }

    /// Match detections to existing tracks and assign fresh ids to the
    /// rest. The output preserves detection order.
    pub fn update(&mut self, hands: &[Landmarks], now: f64) -> Vec<(u32, Landmarks)> {
        self.tracks
            .retain(|t| now - t.last_seen <= self.config.timeout);

        let centroids: Vec<Landmark> = hands.iter().map(landmarks::centroid).collect();

        // All candidate (detection, track) pairs within range, closest first.
        let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
        for (di, dc) in centroids.iter().enumerate() {
            for (ti, track) in self.tracks.iter().enumerate() {
                let dist = landmarks::distance2(*dc, landmarks::centroid(&track.landmarks));
                if dist <= self.config.max_distance {
                    pairs.push((dist, di, ti));
                }
            }
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut detection_id: Vec<Option<u32>> = vec![None; hands.len()];
        let mut track_taken = vec![false; self.tracks.len()];
        for (_, di, ti) in pairs {
            if detection_id[di].is_some() || track_taken[ti] {
                continue;
            }
            let track = &mut self.tracks[ti];
            track.landmarks = hands[di];
            track.last_seen = now;
            track.frames_tracked += 1;
            detection_id[di] = Some(track.id);
            track_taken[ti] = true;
        }

        let mut result = Vec::with_capacity(hands.len());
        for (di, hand) in hands.iter().enumerate() {
            let id = match detection_id[di] {
                Some(id) => id,
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.tracks.push(TrackedHand {
                        id,
                        landmarks: *hand,
                        last_seen: now,
                        frames_tracked: 1,
                    });
                    log::debug!("new hand track {id}");
                    id
                }
            };
            result.push((id, *hand));
        }
        result
    }

    pub fn active_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn get_track(&self, id: u32) -> Option<&TrackedHand> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn reset(&mut self) {
        self.tracks.clear();
    }
}
