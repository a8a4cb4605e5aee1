use crate::types::{PointId, PressEvent, TrackedPoint};
use log::trace;
use std::collections::{HashMap, HashSet};

/// Absorbs float representation error at the inclusive press boundary
/// (e.g. `0.47 - 0.50` is not exactly `-0.03` in binary).
const BOUNDARY_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressConfig {
    pub press_threshold: f32,
    pub cooldown_ms: u64,
    pub stale_window_ms: u64,
}

impl Default for PressConfig {
    fn default() -> Self {
        Self {
            press_threshold: 0.035,
            cooldown_ms: 150,
            stale_window_ms: 150,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressState {
    Released,
    Pressed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PressTransition {
    Pressed(PressEvent),
    Released(PointId),
}

/// Latest keyboard-position sample for a fingertip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LateralSample {
    pub x: f32,
    pub y: f32,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone)]
struct PointTrack {
    state: PressState,
    last_press_ms: Option<u64>,
    lateral: Option<LateralSample>,
    /// Depth past the start of the press band on the last evaluation.
    depth: f32,
}

impl PointTrack {
    fn new() -> Self {
        Self {
            state: PressState::Released,
            last_press_ms: None,
            lateral: None,
            depth: 0.0,
        }
    }
}

/// A fingertip that is currently down, with what the mapper needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeldPoint {
    pub id: PointId,
    pub lateral: LateralSample,
    pub depth: f32,
}

/// Per-fingertip press/release state machine.
///
/// # Transitions
///
///   - `Released → Pressed` when the point has a reference value, its signal
///     has reached the reference plane within `press_threshold`
///     (`signal - reference >= -press_threshold`), `cooldown_ms` has passed
///     since its previous press, and a lateral sample no older than
///     `stale_window_ms` exists. Without a fresh lateral sample the press is
///     dropped as occlusion noise.
///   - `Pressed → Released` as soon as the plane condition fails. Releases
///     never wait for a cooldown, so notes can't get stuck.
///
/// The cooldown on presses only (none on releases) is what keeps jittery
/// landmark signals from chattering near the plane.
pub struct PressDetector {
    config: PressConfig,
    points: HashMap<PointId, PointTrack>,
}

impl PressDetector {
    pub fn new(config: PressConfig) -> Self {
        Self {
            config,
            points: HashMap::new(),
        }
    }

    pub fn config(&self) -> &PressConfig {
        &self.config
    }

    /// Remember where along the keyboard a fingertip is.
    pub fn record_lateral(&mut self, id: PointId, x: f32, y: f32, timestamp_ms: u64) {
        let track = self.points.entry(id).or_insert_with(PointTrack::new);
        track.lateral = Some(LateralSample { x, y, timestamp_ms });
    }

    /// Whether a signal is at or past the reference plane.
    pub fn reached_plane(&self, signal: f32, reference: f32) -> bool {
        signal - reference >= -self.config.press_threshold - BOUNDARY_EPSILON
    }

    /// Evaluate one fingertip sample. `reference` is `None` for uncalibrated points.
    pub fn update(&mut self, point: &TrackedPoint, reference: Option<f32>) -> Option<PressTransition> {
        let TrackedPoint {
            id,
            signal,
            timestamp_ms: now_ms,
            ..
        } = *point;
        let threshold = self.config.press_threshold;
        let reached = match reference {
            Some(r) => signal.is_finite() && self.reached_plane(signal, r),
            None => false,
        };
        let cooldown_ms = self.config.cooldown_ms;
        let stale_window_ms = self.config.stale_window_ms;

        let track = self.points.entry(id).or_insert_with(PointTrack::new);
        if let Some(r) = reference {
            track.depth = (signal - r + threshold).max(0.0);
        }

        match track.state {
            PressState::Pressed => {
                if reached {
                    None
                } else {
                    track.state = PressState::Released;
                    trace!("press_det: {} released (signal={:.4})", id, signal);
                    Some(PressTransition::Released(id))
                }
            }
            PressState::Released => {
                if !reached {
                    return None;
                }
                let cooled = match track.last_press_ms {
                    Some(last) => now_ms.saturating_sub(last) >= cooldown_ms,
                    None => true,
                };
                if !cooled {
                    trace!("press_det: {} press suppressed by cooldown", id);
                    return None;
                }
                let lateral = match track.lateral {
                    Some(l) if l.timestamp_ms.abs_diff(now_ms) <= stale_window_ms => l,
                    _ => {
                        trace!("press_det: {} press dropped, no fresh lateral sample", id);
                        return None;
                    }
                };
                track.state = PressState::Pressed;
                track.last_press_ms = Some(now_ms);
                trace!(
                    "press_det: {} pressed at x={:.3} (signal={:.4})",
                    id,
                    lateral.x,
                    signal
                );
                Some(PressTransition::Pressed(PressEvent {
                    point: id,
                    x: lateral.x,
                    y: lateral.y,
                    timestamp_ms: now_ms,
                }))
            }
        }
    }

    /// Release every pressed point that is not in `seen` (hand left the frame).
    pub fn release_missing(&mut self, seen: &HashSet<PointId>) -> Vec<PointId> {
        let mut released = Vec::new();
        for (id, track) in self.points.iter_mut() {
            if track.state == PressState::Pressed && !seen.contains(id) {
                track.state = PressState::Released;
                released.push(*id);
            }
        }
        released.sort();
        released
    }

    /// Force every point to `Released`, keeping cooldown history.
    pub fn release_all(&mut self) -> Vec<PointId> {
        let all: HashSet<PointId> = HashSet::new();
        self.release_missing(&all)
    }

    pub fn state(&self, id: PointId) -> PressState {
        self.points
            .get(&id)
            .map(|t| t.state)
            .unwrap_or(PressState::Released)
    }

    pub fn is_pressed(&self, id: PointId) -> bool {
        self.state(id) == PressState::Pressed
    }

    pub fn lateral(&self, id: PointId) -> Option<LateralSample> {
        self.points.get(&id).and_then(|t| t.lateral)
    }

    /// Every pressed fingertip with a lateral sample, in stable id order.
    pub fn held(&self) -> Vec<HeldPoint> {
        let mut held: Vec<HeldPoint> = self
            .points
            .iter()
            .filter(|(_, t)| t.state == PressState::Pressed)
            .filter_map(|(id, t)| {
                t.lateral.map(|lateral| HeldPoint {
                    id: *id,
                    lateral,
                    depth: t.depth,
                })
            })
            .collect();
        held.sort_by_key(|h| h.id);
        held
    }

    /// Forget all points (new session).
    pub fn reset(&mut self) {
        self.points.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: PointId = PointId { hand: 0, finger: 1 };

    fn detector(threshold: f32, cooldown_ms: u64) -> PressDetector {
        PressDetector::new(PressConfig {
            press_threshold: threshold,
            cooldown_ms,
            stale_window_ms: 150,
        })
    }

    fn sample(id: PointId, signal: f32, t: u64) -> TrackedPoint {
        TrackedPoint::new(id, 0.5, 0.5, signal, t)
    }

    /// Feed a signal with a fresh lateral sample at the same instant.
    fn feed(det: &mut PressDetector, signal: f32, reference: f32, t: u64) -> Option<PressTransition> {
        det.record_lateral(ID, 0.5, 0.5, t);
        det.update(&sample(ID, signal, t), Some(reference))
    }

    #[test]
    fn test_scenario_boundary_press_then_release() {
        // reference 0.50, threshold 0.03: 0.47 - 0.50 = -0.03 >= -0.03 → press
        let mut det = detector(0.03, 150);
        let samples = [0.40, 0.47, 0.49, 0.52, 0.30];
        let mut out = Vec::new();
        for (i, &s) in samples.iter().enumerate() {
            out.push(feed(&mut det, s, 0.50, i as u64 * 33));
        }
        assert_eq!(out[0], None);
        assert!(matches!(out[1], Some(PressTransition::Pressed(_))), "press at 0.47");
        assert_eq!(out[2], None, "still pressed at 0.49");
        assert_eq!(out[3], None, "still pressed at 0.52");
        assert_eq!(out[4], Some(PressTransition::Released(ID)), "release at 0.30");
    }

    #[test]
    fn test_signal_equal_to_reference_is_pressed() {
        let mut det = detector(0.0, 0);
        assert!(matches!(
            feed(&mut det, 0.5, 0.5, 0),
            Some(PressTransition::Pressed(_))
        ));
    }

    #[test]
    fn test_uncalibrated_never_presses() {
        let mut det = detector(0.03, 0);
        det.record_lateral(ID, 0.5, 0.5, 0);
        for t in 0..10 {
            assert_eq!(det.update(&sample(ID, 0.9, t), None), None);
        }
        assert!(!det.is_pressed(ID));
    }

    #[test]
    fn test_cooldown_suppresses_quick_repress() {
        let mut det = detector(0.03, 150);
        assert!(matches!(feed(&mut det, 0.5, 0.5, 0), Some(PressTransition::Pressed(_))));
        assert_eq!(feed(&mut det, 0.3, 0.5, 33), Some(PressTransition::Released(ID)));
        // Back down at 66ms: within cooldown → no press
        assert_eq!(feed(&mut det, 0.5, 0.5, 66), None);
        assert_eq!(feed(&mut det, 0.5, 0.5, 100), None);
        // Still down at 150ms: cooldown over → press
        assert!(matches!(feed(&mut det, 0.5, 0.5, 150), Some(PressTransition::Pressed(_))));
    }

    #[test]
    fn test_release_ignores_cooldown() {
        let mut det = detector(0.03, 10_000);
        assert!(matches!(feed(&mut det, 0.5, 0.5, 0), Some(PressTransition::Pressed(_))));
        // Release 1ms later, far inside the cooldown
        assert_eq!(feed(&mut det, 0.1, 0.5, 1), Some(PressTransition::Released(ID)));
    }

    #[test]
    fn test_stale_lateral_drops_press_without_consuming_cooldown() {
        let mut det = detector(0.03, 150);
        det.record_lateral(ID, 0.5, 0.5, 0);
        // Lateral sample is 200ms old → dropped
        assert_eq!(det.update(&sample(ID, 0.5, 200), Some(0.5)), None);
        assert!(!det.is_pressed(ID));
        // Fresh sample arrives → press goes through immediately
        det.record_lateral(ID, 0.6, 0.5, 210);
        match det.update(&sample(ID, 0.5, 220), Some(0.5)) {
            Some(PressTransition::Pressed(ev)) => assert!((ev.x - 0.6).abs() < 1e-6),
            other => panic!("expected press, got {:?}", other),
        }
    }

    #[test]
    fn test_no_lateral_at_all_drops_press() {
        let mut det = detector(0.03, 0);
        assert_eq!(det.update(&sample(ID, 0.5, 0), Some(0.5)), None);
    }

    #[test]
    fn test_release_missing_only_pressed_unseen() {
        let mut det = detector(0.03, 0);
        let other = PointId::new(1, 2);
        feed(&mut det, 0.5, 0.5, 0);
        det.record_lateral(other, 0.2, 0.5, 0);
        det.update(&sample(other, 0.5, 0), Some(0.5));
        let mut seen = HashSet::new();
        seen.insert(other);
        assert_eq!(det.release_missing(&seen), vec![ID]);
        assert!(det.is_pressed(other));
        assert_eq!(det.release_all(), vec![other]);
    }

    #[test]
    fn test_held_reports_depth() {
        let mut det = detector(0.03, 0);
        feed(&mut det, 0.52, 0.5, 0);
        let held = det.held();
        assert_eq!(held.len(), 1);
        assert!((held[0].depth - 0.05).abs() < 1e-5);
    }
}
