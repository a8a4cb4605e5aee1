use crate::types::HandSide;
use serde::{Deserialize, Serialize};

/// Renderer-facing arm posture, all components normalized.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ArmPose {
    /// 0.0 = leftmost key, 1.0 = rightmost key
    pub lateral: f32,
    /// How far the fingertip is pushed into the surface, 0.0–1.0
    pub reach: f32,
}

impl ArmPose {
    fn distance(&self, other: &ArmPose) -> f32 {
        (self.lateral - other.lateral)
            .abs()
            .max((self.reach - other.reach).abs())
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    current: ArmPose,
    target: ArmPose,
    /// Last pose handed to the renderer
    published: Option<ArmPose>,
}

/// Interpolation state per hand side, advanced once per frame toward the
/// target set by the latest note.
///
/// Smoothing is expressed per 60 Hz frame and rescaled by the real frame
/// interval, so the blend speed doesn't depend on camera rate.
pub struct ArmPoseArena {
    slots: [Slot; 2],
    smoothing: f32,
    publish_epsilon: f32,
}

const REFERENCE_FRAME_MS: f32 = 1000.0 / 60.0;

impl ArmPoseArena {
    pub fn new(smoothing: f32) -> Self {
        let rest = |lateral| Slot {
            current: ArmPose { lateral, reach: 0.0 },
            target: ArmPose { lateral, reach: 0.0 },
            published: None,
        };
        Self {
            slots: [rest(0.25), rest(0.75)],
            smoothing: smoothing.clamp(0.001, 1.0),
            publish_epsilon: 0.002,
        }
    }

    /// Aim `side` at a key. `reach` is the normalized press depth.
    pub fn set_target(&mut self, side: HandSide, key_index: usize, key_count: usize, reach: f32) {
        let lateral = if key_count > 1 {
            key_index.min(key_count - 1) as f32 / (key_count - 1) as f32
        } else {
            0.5
        };
        self.slots[side.index()].target = ArmPose {
            lateral,
            reach: reach.clamp(0.0, 1.0),
        };
    }

    /// Let `side` come back up off the keys, staying where it is laterally.
    pub fn lift(&mut self, side: HandSide) {
        let slot = &mut self.slots[side.index()];
        slot.target.reach = 0.0;
    }

    /// Advance by `dt_ms`; returns the sides whose pose moved enough to publish.
    pub fn advance(&mut self, dt_ms: u64) -> Vec<(HandSide, ArmPose)> {
        let frames = dt_ms as f32 / REFERENCE_FRAME_MS;
        let alpha = 1.0 - (1.0 - self.smoothing).powf(frames);
        let mut moved = Vec::new();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            slot.current.lateral += (slot.target.lateral - slot.current.lateral) * alpha;
            slot.current.reach += (slot.target.reach - slot.current.reach) * alpha;
            let changed = match slot.published {
                Some(p) => p.distance(&slot.current) > self.publish_epsilon,
                None => true,
            };
            if changed {
                slot.published = Some(slot.current);
                let side = if i == 0 { HandSide::Left } else { HandSide::Right };
                moved.push((side, slot.current));
            }
        }
        moved
    }

    pub fn pose(&self, side: HandSide) -> ArmPose {
        self.slots[side.index()].current
    }

    pub fn target(&self, side: HandSide) -> ArmPose {
        self.slots[side.index()].target
    }
}
