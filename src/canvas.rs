//! Finger-painting command generation.
//!
//! The canvas is virtual: it never rasterizes anything, it emits drawing
//! commands keyed off the index fingertip and the current pose. Clients
//! replay the command history to reconstruct the picture, so the history
//! is the source of truth and trimming must preserve replay semantics.

use std::collections::VecDeque;

use serde_json::{Value, json};

use crate::config::CanvasConfig;
use crate::landmarks::{INDEX_TIP, Landmarks};

const SHAKE_WINDOW: usize = 15;
const SHAKE_MIN_SAMPLES: usize = 8;
const SHAKE_MIN_REVERSALS: usize = 4;
const SHAKE_MAX_SPAN: f64 = 1.5;
const CLEAR_COOLDOWN: f64 = 2.0;
const MIN_DRAW_DISTANCE: f32 = 0.003;

/// One drawing command for clients.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        color: &'static str,
        width: f32,
    },
    Erase {
        x: f32,
        y: f32,
        radius: f32,
    },
    Clear,
    Color {
        color: &'static str,
    },
}

impl DrawCommand {
    /// Wire form. Coordinates are rounded to one decimal.
    pub fn to_message(&self) -> Value {
        match self {
            DrawCommand::Line {
                x1,
                y1,
                x2,
                y2,
                color,
                width,
            } => json!({
                "type": "line",
                "x1": round1(*x1),
                "y1": round1(*y1),
                "x2": round1(*x2),
                "y2": round1(*y2),
                "color": color,
                "width": width,
            }),
            DrawCommand::Erase { x, y, radius } => json!({
                "type": "erase",
                "x": round1(*x),
                "y": round1(*y),
                "radius": radius,
            }),
            DrawCommand::Clear => json!({ "type": "clear" }),
            DrawCommand::Color { color } => json!({ "type": "color", "color": color }),
        }
    }
}

fn round1(v: f32) -> f64 {
    (v as f64 * 10.0).round() / 10.0
}

/// Drawing colour for a pose, or None for poses that do not draw.
fn gesture_color(gesture: &str) -> Option<&'static str> {
    match gesture {
        "pointing" => Some("#ffffff"),
        "peace" => Some("#22c55e"),
        "rock_on" => Some("#ef4444"),
        "ok_sign" => Some("#3b82f6"),
        "thumbs_up" => Some("#eab308"),
        _ => None,
    }
}

pub struct DrawingCanvas {
    config: CanvasConfig,
    history: Vec<DrawCommand>,
    current_color: &'static str,
    last_point: Option<(f32, f32)>,
    drawing: bool,
    point_buffer: VecDeque<(f32, f32)>,
    shake_positions: VecDeque<(f32, f64)>,
    shake_cooldown_until: f64,
}

impl DrawingCanvas {
    pub fn new(config: CanvasConfig) -> Self {
        Self {
            config,
            history: Vec::new(),
            current_color: "#ffffff",
            last_point: None,
            drawing: false,
            point_buffer: VecDeque::new(),
            shake_positions: VecDeque::new(),
            shake_cooldown_until: 0.0,
        }
    }

    /// Process one frame. `hand` is raw landmarks (image coordinates);
    /// `gesture` is the current smoothed pose, if any.
    pub fn update(
        &mut self,
        hand: &Landmarks,
        gesture: Option<&str>,
        now: f64,
    ) -> Vec<DrawCommand> {
        let tip = hand[INDEX_TIP];
        let (tip_x, tip_y) = (tip[0], tip[1]);
        let mut commands = Vec::new();

        match gesture {
            Some("fist") => {
                self.end_stroke();
                let command = DrawCommand::Erase {
                    x: tip_x,
                    y: tip_y,
                    radius: self.config.erase_radius,
                };
                commands.push(command.clone());
                self.history.push(command);
            }
            Some("open_hand") => {
                self.end_stroke();
                if self.shake_positions.len() == SHAKE_WINDOW {
                    self.shake_positions.pop_front();
                }
                self.shake_positions.push_back((tip_x, now));

                if self.shake_detected(now) {
                    commands.push(DrawCommand::Clear);
                    self.history = vec![DrawCommand::Clear];
                    self.shake_positions.clear();
                    self.shake_cooldown_until = now + CLEAR_COOLDOWN;
                    log::info!("canvas cleared by shake");
                }
            }
            other => {
                let Some(color) = other.and_then(gesture_color) else {
                    self.end_stroke();
                    self.point_buffer.clear();
                    return commands;
                };
                if color != self.current_color {
                    self.current_color = color;
                    commands.push(DrawCommand::Color { color });
                }

                if self.point_buffer.len() == self.config.smoothing.max(1) {
                    self.point_buffer.pop_front();
                }
                self.point_buffer.push_back((tip_x, tip_y));
                let (smooth_x, smooth_y) = if self.point_buffer.len() >= 2 {
                    let n = self.point_buffer.len() as f32;
                    let sum = self
                        .point_buffer
                        .iter()
                        .fold((0.0f32, 0.0f32), |acc, p| (acc.0 + p.0, acc.1 + p.1));
                    (sum.0 / n, sum.1 / n)
                } else {
                    (tip_x, tip_y)
                };

                match self.last_point {
                    Some((lx, ly)) => {
                        let dist = ((smooth_x - lx).powi(2) + (smooth_y - ly).powi(2)).sqrt();
                        if dist > MIN_DRAW_DISTANCE {
                            let command = DrawCommand::Line {
                                x1: lx,
                                y1: ly,
                                x2: smooth_x,
                                y2: smooth_y,
                                color: self.current_color,
                                width: self.config.line_width,
                            };
                            commands.push(command.clone());
                            self.history.push(command);
                            self.last_point = Some((smooth_x, smooth_y));
                        }
                    }
                    None => {
                        self.last_point = Some((smooth_x, smooth_y));
                    }
                }
                self.drawing = true;
            }
        }

        // Keep memory bounded while keeping replay faithful: drop the
        // older half behind a synthetic clear.
        if self.history.len() > self.config.max_history {
            let keep_from = self.history.len() - self.config.max_history / 2;
            let mut trimmed = Vec::with_capacity(self.config.max_history / 2 + 1);
            trimmed.push(DrawCommand::Clear);
            trimmed.extend_from_slice(&self.history[keep_from..]);
            self.history = trimmed;
        }

        commands
    }

    fn end_stroke(&mut self) {
        self.drawing = false;
        self.last_point = None;
    }

    fn shake_detected(&self, now: f64) -> bool {
        if now < self.shake_cooldown_until || self.shake_positions.len() < SHAKE_MIN_SAMPLES {
            return false;
        }

        let positions: Vec<(f32, f64)> = self.shake_positions.iter().copied().collect();
        let mut reversals = 0usize;
        for window in positions.windows(3) {
            let dx1 = window[1].0 - window[0].0;
            let dx2 = window[2].0 - window[1].0;
            if dx1 * dx2 < 0.0 {
                reversals += 1;
            }
        }

        let span = positions[positions.len() - 1].1 - positions[0].1;
        reversals >= SHAKE_MIN_REVERSALS && span < SHAKE_MAX_SPAN
    }

    /// Full command history for syncing a new client.
    pub fn full_state(&self) -> Vec<Value> {
        self.history.iter().map(DrawCommand::to_message).collect()
    }

    /// Programmatic clear: the history becomes a single clear command.
    pub fn clear(&mut self) {
        self.history = vec![DrawCommand::Clear];
        self.last_point = None;
        self.point_buffer.clear();
    }

    pub fn command_count(&self) -> usize {
        self.history.len()
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    pub fn current_color(&self) -> &'static str {
        self.current_color
    }
}
