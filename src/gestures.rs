//! Static pose definitions and the rule-based matcher.
//!
//! A pose is a set of per-finger extension requirements plus optional
//! geometric constraints. Matching runs on wrist-centred landmarks: a
//! finger counts as extended when its tip sits farther from the wrist than
//! its PIP joint. Definitions round-trip through JSON so registries can be
//! shared with the serving layer.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::landmarks::{self, Landmarks, FINGER_PIPS, FINGER_TIPS, NUM_LANDMARKS, WRIST};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerState {
    Extended,
    Curled,
    #[default]
    Any,
}

/// A geometric constraint evaluated on wrist-centred landmarks. Each
/// constraint scores 1.0 when satisfied, 0.0 otherwise.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Constraint {
    /// Distance between two landmarks within [min, max].
    Distance {
        landmarks: [usize; 2],
        #[serde(default)]
        min: f32,
        #[serde(default = "unbounded")]
        max: f32,
    },
    /// Angle in degrees at the middle landmark of a triple, within
    /// [min_angle, max_angle].
    Angle {
        landmarks: [usize; 3],
        #[serde(default)]
        min_angle: f32,
        #[serde(default = "full_angle")]
        max_angle: f32,
    },
}

fn unbounded() -> f32 {
    f32::INFINITY
}

fn full_angle() -> f32 {
    180.0
}

impl Constraint {
    fn landmark_indices(&self) -> &[usize] {
        match self {
            Constraint::Distance { landmarks, .. } => landmarks,
            Constraint::Angle { landmarks, .. } => landmarks,
        }
    }

    fn score(&self, hand: &Landmarks) -> f32 {
        match self {
            Constraint::Distance {
                landmarks: [a, b],
                min,
                max,
            } => {
                let (Some(pa), Some(pb)) = (hand.get(*a), hand.get(*b)) else {
                    return 0.0;
                };
                let dist = landmarks::distance3(*pa, *pb);
                if *min <= dist && dist <= *max { 1.0 } else { 0.0 }
            }
            Constraint::Angle {
                landmarks: [a, b, c],
                min_angle,
                max_angle,
            } => {
                let (Some(pa), Some(pb), Some(pc)) = (hand.get(*a), hand.get(*b), hand.get(*c))
                else {
                    return 0.0;
                };
                let ba = landmarks::sub(*pa, *pb);
                let bc = landmarks::sub(*pc, *pb);
                let denom = landmarks::norm(ba) * landmarks::norm(bc) + 1e-8;
                let cos_angle = (landmarks::dot(ba, bc) / denom).clamp(-1.0, 1.0);
                let angle = cos_angle.acos().to_degrees();
                if *min_angle <= angle && angle <= *max_angle {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Per-finger extension requirements, thumb through pinky. Unlisted fingers
/// default to `any`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct FingerSpec {
    #[serde(default)]
    pub thumb: FingerState,
    #[serde(default)]
    pub index: FingerState,
    #[serde(default)]
    pub middle: FingerState,
    #[serde(default)]
    pub ring: FingerState,
    #[serde(default)]
    pub pinky: FingerState,
}

impl FingerSpec {
    fn as_array(&self) -> [FingerState; 5] {
        [self.thumb, self.index, self.middle, self.ring, self.pinky]
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GestureDefinition {
    pub name: String,
    #[serde(default)]
    pub fingers: FingerSpec,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

fn default_min_confidence() -> f32 {
    0.6
}

impl GestureDefinition {
    pub fn new(name: impl Into<String>, fingers: FingerSpec) -> Self {
        Self {
            name: name.into(),
            fingers,
            min_confidence: default_min_confidence(),
            constraints: Vec::new(),
        }
    }

    /// Evaluate this definition against wrist-centred landmarks.
    /// Returns (matched, confidence).
    pub fn matches(&self, hand: &Landmarks) -> (bool, f32) {
        let actual = finger_states(hand);
        let expected = self.fingers.as_array();

        let mut checked = 0u32;
        let mut matched = 0u32;
        for (a, e) in actual.iter().zip(expected.iter()) {
            if *e == FingerState::Any {
                continue;
            }
            checked += 1;
            if a == e {
                matched += 1;
            }
        }

        let finger_confidence = if checked == 0 {
            1.0
        } else {
            matched as f32 / checked as f32
        };

        let confidence = if self.constraints.is_empty() {
            finger_confidence
        } else {
            let constraint_score = self
                .constraints
                .iter()
                .map(|c| c.score(hand))
                .sum::<f32>()
                / self.constraints.len() as f32;
            0.7 * finger_confidence + 0.3 * constraint_score
        };

        (confidence >= self.min_confidence, confidence)
    }

    fn check_indices(&self) -> Result<(), EngineError> {
        for constraint in &self.constraints {
            for &idx in constraint.landmark_indices() {
                if idx >= NUM_LANDMARKS {
                    return Err(EngineError::Definition(format!(
                        "pose {:?}: constraint landmark index {idx} out of range",
                        self.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Extension state of each finger, thumb through pinky.
pub fn finger_states(hand: &Landmarks) -> [FingerState; 5] {
    let wrist = hand[WRIST];
    let mut states = [FingerState::Curled; 5];
    for (i, (&tip, &pip)) in FINGER_TIPS.iter().zip(FINGER_PIPS.iter()).enumerate() {
        let tip_dist = landmarks::distance3(hand[tip], wrist);
        let pip_dist = landmarks::distance3(hand[pip], wrist);
        states[i] = if tip_dist > pip_dist {
            FingerState::Extended
        } else {
            FingerState::Curled
        };
    }
    states
}

#[derive(Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    gestures: Vec<GestureDefinition>,
}

/// Ordered collection of pose definitions. Order matters: when two poses
/// match with equal confidence, the first registered wins.
#[derive(Clone, Debug, Default)]
pub struct GestureRegistry {
    gestures: Vec<GestureDefinition>,
}

impl GestureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, gesture: GestureDefinition) {
        self.gestures.push(gesture);
    }

    /// Best matching pose for wrist-centred landmarks, or None when no pose
    /// clears its own confidence floor.
    pub fn best_match(&self, hand: &Landmarks) -> Option<(&GestureDefinition, f32)> {
        let mut best: Option<(&GestureDefinition, f32)> = None;
        for gesture in &self.gestures {
            let (matched, confidence) = gesture.matches(hand);
            if matched && best.map_or(true, |(_, c)| confidence > c) {
                best = Some((gesture, confidence));
            }
        }
        best
    }

    pub fn len(&self) -> usize {
        self.gestures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gestures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GestureDefinition> {
        self.gestures.iter()
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let file: RegistryFile = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for gesture in file.gestures {
            gesture.check_indices()?;
            registry.register(gesture);
        }
        Ok(registry)
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        let file = RegistryFile {
            gestures: self.gestures.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// The built-in pose set.
    pub fn with_defaults() -> Self {
        use FingerState::{Curled, Extended};

        let mut registry = Self::new();

        registry.register(GestureDefinition::new(
            "open_hand",
            FingerSpec {
                thumb: Extended,
                index: Extended,
                middle: Extended,
                ring: Extended,
                pinky: Extended,
            },
        ));

        registry.register(GestureDefinition::new(
            "fist",
            FingerSpec {
                thumb: Curled,
                index: Curled,
                middle: Curled,
                ring: Curled,
                pinky: Curled,
            },
        ));

        registry.register(GestureDefinition::new(
            "thumbs_up",
            FingerSpec {
                thumb: Extended,
                index: Curled,
                middle: Curled,
                ring: Curled,
                pinky: Curled,
            },
        ));

        registry.register(GestureDefinition::new(
            "peace",
            FingerSpec {
                thumb: Curled,
                index: Extended,
                middle: Extended,
                ring: Curled,
                pinky: Curled,
            },
        ));

        registry.register(GestureDefinition::new(
            "pointing",
            FingerSpec {
                thumb: Curled,
                index: Extended,
                middle: Curled,
                ring: Curled,
                pinky: Curled,
            },
        ));

        registry.register(GestureDefinition::new(
            "rock_on",
            FingerSpec {
                thumb: Curled,
                index: Extended,
                middle: Curled,
                ring: Curled,
                pinky: Extended,
            },
        ));

        // Pinch grip: all fingers up but thumb and index tips touching.
        registry.register(GestureDefinition {
            name: "ok_sign".to_string(),
            fingers: FingerSpec {
                thumb: Extended,
                index: Extended,
                middle: Extended,
                ring: Extended,
                pinky: Extended,
            },
            min_confidence: 0.5,
            constraints: vec![Constraint::Distance {
                landmarks: [4, 8],
                min: 0.0,
                max: 0.15,
            }],
        });

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::NUM_LANDMARKS;

    /// Hand with all five tips at `tip_radius` from the wrist and all five
    /// PIPs at `pip_radius`.
    pub(crate) fn radial_hand(tip_radius: f32, pip_radius: f32) -> Landmarks {
        let mut hand = [[0.0f32; 3]; NUM_LANDMARKS];
        for (i, &tip) in FINGER_TIPS.iter().enumerate() {
            let angle = 0.3 + i as f32 * 0.2;
            hand[tip] = [tip_radius * angle.cos(), -tip_radius * angle.sin(), 0.0];
        }
        for (i, &pip) in FINGER_PIPS.iter().enumerate() {
            let angle = 0.3 + i as f32 * 0.2;
            hand[pip] = [pip_radius * angle.cos(), -pip_radius * angle.sin(), 0.0];
        }
        hand
    }

    #[test]
    fn open_hand_matches_extended_tips() {
        let registry = GestureRegistry::with_defaults();
        let hand = radial_hand(0.6, 0.3);
        let (gesture, confidence) = registry.best_match(&hand).expect("expected a match");
        assert_eq!(gesture.name, "open_hand");
        assert!(confidence >= 0.8);
    }

    #[test]
    fn fist_matches_curled_tips() {
        let registry = GestureRegistry::with_defaults();
        let hand = radial_hand(0.1, 0.25);
        let (gesture, confidence) = registry.best_match(&hand).expect("expected a match");
        assert_eq!(gesture.name, "fist");
        assert!(confidence >= 0.8);
    }

    #[test]
    fn empty_registry_matches_nothing() {
        let registry = GestureRegistry::new();
        assert!(registry.best_match(&radial_hand(0.6, 0.3)).is_none());
    }

    #[test]
    fn tie_break_prefers_first_registered() {
        use FingerState::Extended;
        let mut registry = GestureRegistry::new();
        let fingers = FingerSpec {
            index: Extended,
            ..FingerSpec::default()
        };
        registry.register(GestureDefinition::new("first", fingers));
        registry.register(GestureDefinition::new("second", fingers));
        let hand = radial_hand(0.6, 0.3);
        let (gesture, confidence) = registry.best_match(&hand).unwrap();
        assert_eq!(gesture.name, "first");
        assert!((confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn all_any_pose_matches_with_full_confidence() {
        let pose = GestureDefinition::new("anything", FingerSpec::default());
        let (matched, confidence) = pose.matches(&[[0.0; 3]; NUM_LANDMARKS]);
        assert!(matched);
        assert!((confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn constraints_blend_into_confidence() {
        use FingerState::Extended;
        let mut pose = GestureDefinition::new(
            "pinch",
            FingerSpec {
                thumb: Extended,
                index: Extended,
                ..FingerSpec::default()
            },
        );
        pose.constraints.push(Constraint::Distance {
            landmarks: [4, 8],
            min: 0.0,
            max: 0.05,
        });

        // Tips far apart: constraint fails, confidence = 0.7 * 1.0.
        let hand = radial_hand(0.6, 0.3);
        let (_, confidence) = pose.matches(&hand);
        assert!((confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn angle_constraint_scores_within_range() {
        let mut hand = [[0.0f32; 3]; NUM_LANDMARKS];
        hand[4] = [1.0, 0.0, 0.0];
        hand[8] = [0.0, 1.0, 0.0];
        let constraint = Constraint::Angle {
            landmarks: [4, 0, 8],
            min_angle: 80.0,
            max_angle: 100.0,
        };
        assert!((constraint.score(&hand) - 1.0).abs() < 1e-6);

        let narrow = Constraint::Angle {
            landmarks: [4, 0, 8],
            min_angle: 0.0,
            max_angle: 45.0,
        };
        assert!(narrow.score(&hand) < 1e-6);
    }

    #[test]
    fn json_round_trip_preserves_definitions() {
        let registry = GestureRegistry::with_defaults();
        let json = registry.to_json().unwrap();
        let loaded = GestureRegistry::from_json(&json).unwrap();
        assert_eq!(loaded.len(), registry.len());
        let names: Vec<_> = loaded.iter().map(|g| g.name.clone()).collect();
        assert!(names.contains(&"ok_sign".to_string()));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let json = r#"{
            "gestures": [
                { "name": "wavey", "fingers": { "index": "extended" },
                  "min_confidence": 0.5, "some_future_field": true }
            ]
        }"#;
        let registry = GestureRegistry::from_json(json).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_finger_state_is_an_error() {
        let json = r#"{
            "gestures": [
                { "name": "bad", "fingers": { "index": "wiggly" } }
            ]
        }"#;
        assert!(GestureRegistry::from_json(json).is_err());
    }

    #[test]
    fn unknown_constraint_type_is_an_error() {
        let json = r#"{
            "gestures": [
                { "name": "bad",
                  "constraints": [ { "type": "twist", "landmarks": [0, 4] } ] }
            ]
        }"#;
        assert!(GestureRegistry::from_json(json).is_err());
    }

    #[test]
    fn out_of_range_constraint_index_is_an_error() {
        let json = r#"{
            "gestures": [
                { "name": "bad",
                  "constraints": [ { "type": "distance", "landmarks": [0, 25] } ] }
            ]
        }"#;
        assert!(GestureRegistry::from_json(json).is_err());
    }
}
