//! Hand gesture to object control mapping
//!
//! Pinching shrinks the object, spreading thumb and index finger grows it,
//! and moving the hand between two consecutive ticks sets its spin.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::config::GestureConfig;
use crate::tracking::observation::HandObservation;

/// Control signal for the rendered object
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GestureControlState {
    pub scale: f32,
    /// Per-frame rotation increments around the (x, y) axes
    pub rotation_velocity: Vec2,
}

impl GestureControlState {
    pub fn initial(config: &GestureConfig) -> Self {
        Self {
            scale: config.initial_scale.clamp(config.min_scale, config.max_scale),
            rotation_velocity: Vec2::from(config.initial_rotation),
        }
    }
}

impl Default for GestureControlState {
    fn default() -> Self {
        Self::initial(&GestureConfig::default())
    }
}

/// State carried between ticks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GestureMemory {
    control: GestureControlState,
    /// Hand centroid from the previous tick, if a hand was seen there
    baseline: Option<Vec2>,
}

impl GestureMemory {
    pub fn new(config: &GestureConfig) -> Self {
        Self {
            control: GestureControlState::initial(config),
            baseline: None,
        }
    }

    pub fn control(&self) -> GestureControlState {
        self.control
    }

    pub fn baseline(&self) -> Option<Vec2> {
        self.baseline
    }
}

/// Applies one hand observation per tick to the gesture memory
#[derive(Debug, Clone, Default)]
pub struct GestureController {
    config: GestureConfig,
}

impl GestureController {
    pub fn new(config: &GestureConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn update(&self, memory: &mut GestureMemory, hand: Option<&HandObservation>) {
        let Some(hand) = hand else {
            // Losing the hand keeps scale and spin; only the motion baseline resets
            if memory.baseline.take().is_some() {
                tracing::debug!("Hand lost, clearing gesture baseline");
            }
            return;
        };

        let cfg = &self.config;
        let control = &mut memory.control;

        if hand.pinch_distance < cfg.pinch_close_threshold {
            control.scale = (control.scale - cfg.scale_step).max(cfg.min_scale);
        } else if hand.pinch_distance > cfg.pinch_open_threshold {
            control.scale = (control.scale + cfg.scale_step).min(cfg.max_scale);
        }

        if let Some(previous) = memory.baseline {
            let delta = hand.centroid - previous;
            control.rotation_velocity =
                Vec2::new(delta.y * cfg.rotation_gain, delta.x * cfg.rotation_gain);
        }
        memory.baseline = Some(hand.centroid);
    }
}
