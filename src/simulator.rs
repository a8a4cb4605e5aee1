use crate::coordinator::InputEvent;
use crate::pipeline::ControlCommand;
use crate::region::RegionRect;
use crate::types::*;
use crossbeam_channel::Sender;
use log::info;
use std::f32::consts::PI;
use std::thread;
use std::time::Duration;

/// Image-space y of a fingertip resting on the desk (side camera).
const SURFACE_Y: f32 = 0.62;
/// Image-space y of a fingertip hovering above the keys.
const HOVER_Y: f32 = 0.45;
/// Landmark jitter amplitude, well inside the press threshold.
const JITTER: f32 = 0.002;

/// Playing region the demo draws.
pub const DEMO_REGION: RegionRect = RegionRect {
    x_min: 0.15,
    y_min: 0.20,
    x_max: 0.85,
    y_max: 0.90,
};

/// Generates synthetic side-camera landmark frames (and the user's control
/// commands) that exercise the full pipeline without a camera or detector.
pub struct Simulator {
    clock: SessionClock,
    tx: Sender<InputEvent>,
    fps: u32,
    key_count: usize,
    octave_base: u8,
    frame_counter: u64,
}

/// One simulated right hand: fingertip positions, thumb → pinky.
#[derive(Clone)]
struct SimHand {
    tips: [(f32, f32); 5],
}

impl Default for SimHand {
    fn default() -> Self {
        let mut tips = [(0.0, HOVER_Y); 5];
        for (i, tip) in tips.iter_mut().enumerate() {
            tip.0 = 0.35 + 0.06 * i as f32;
        }
        Self { tips }
    }
}

impl Simulator {
    pub fn new(clock: SessionClock, tx: Sender<InputEvent>, fps: u32, key_count: usize) -> Self {
        Self {
            clock,
            tx,
            fps: fps.max(1),
            key_count: key_count.max(1),
            octave_base: 60,
            frame_counter: 0,
        }
    }

    /// Note of the leftmost key, used to build the demo exercise.
    pub fn with_octave_base(mut self, octave_base: u8) -> Self {
        self.octave_base = octave_base;
        self
    }

    /// Run the demo sequence. Blocks the calling thread.
    pub fn run(&mut self) {
        info!("Simulator starting demo sequence...");
        let gestures = demo_sequence(self.key_count, self.octave_base);
        self.run_script(&gestures);
        info!("Demo sequence complete.");
    }

    /// Play a gesture script; returns early if the coordinator went away.
    pub fn run_script(&mut self, gestures: &[Gesture]) -> bool {
        let mut hand = SimHand::default();
        for gesture in gestures {
            if !self.execute(gesture, &mut hand) {
                return false;
            }
        }
        true
    }

    fn execute(&mut self, gesture: &Gesture, hand: &mut SimHand) -> bool {
        match gesture {
            Gesture::Hold { ms } => {
                info!("  hold {}ms", ms);
                self.emit_for(hand, *ms)
            }

            Gesture::Send(cmd) => {
                info!("  command {:?}", cmd);
                self.tx.send(InputEvent::Command(cmd.clone())).is_ok()
            }

            Gesture::RestAll { ms } => {
                info!("  all fingertips down for {}ms", ms);
                for tip in hand.tips.iter_mut() {
                    tip.1 = SURFACE_Y;
                }
                self.emit_for(hand, *ms)
            }

            Gesture::HoverAll => {
                for tip in hand.tips.iter_mut() {
                    tip.1 = HOVER_Y;
                }
                true
            }

            Gesture::Strike { finger, key, ms } => {
                let x = self.key_x(*key);
                info!("  finger {} strikes key {} for {}ms", FINGER_NAMES[*finger], key, ms);
                hand.tips[*finger] = (x, HOVER_Y);
                // Move over the key first so the lateral sample is fresh
                if !self.emit_for(hand, 40) {
                    return false;
                }
                hand.tips[*finger].1 = SURFACE_Y;
                if !self.emit_for(hand, *ms) {
                    return false;
                }
                hand.tips[*finger].1 = HOVER_Y;
                true
            }

            Gesture::Glide { finger, from_key, to_key, ms } => {
                let (from, to) = (self.key_x(*from_key), self.key_x(*to_key));
                info!("  finger {} glides key {} → {} over {}ms", FINGER_NAMES[*finger], from_key, to_key, ms);
                let ticks = self.ticks(*ms);
                for i in 0..ticks {
                    let t = i as f32 / ticks as f32;
                    hand.tips[*finger] = (lerp(from, to, smoothstep(t)), SURFACE_Y);
                    if !self.emit_tick(hand) {
                        return false;
                    }
                }
                hand.tips[*finger].1 = HOVER_Y;
                true
            }
        }
    }

    fn key_x(&self, key: usize) -> f32 {
        let key = key.min(self.key_count - 1);
        let w = (DEMO_REGION.x_max - DEMO_REGION.x_min) / self.key_count as f32;
        DEMO_REGION.x_min + w * (key as f32 + 0.5)
    }

    fn ticks(&self, ms: u32) -> u64 {
        (ms as u64 * self.fps as u64 / 1000).max(1)
    }

    fn emit_for(&mut self, hand: &SimHand, ms: u32) -> bool {
        for _ in 0..self.ticks(ms) {
            if !self.emit_tick(hand) {
                return false;
            }
        }
        true
    }

    /// Send one side-camera frame of the current hand.
    fn emit_tick(&mut self, hand: &SimHand) -> bool {
        let ts = self.clock.now_ms();
        let phase = self.frame_counter as f32 * 0.37;
        self.frame_counter += 1;

        let mut landmarks = vec![Landmark::new(0.5, 0.3, 0.0); LANDMARKS_PER_HAND];
        for (finger, &(x, y)) in hand.tips.iter().enumerate() {
            let wobble = JITTER * (2.0 * PI * (phase + finger as f32 * 0.21)).sin();
            landmarks[FINGERTIP_LANDMARKS[finger]] = Landmark::new(x + wobble, y + wobble, 0.0);
        }
        let frame = LandmarkFrame {
            timestamp_ms: ts,
            view: CameraView::Side,
            hands: vec![DetectedHand {
                side: Some(HandSide::Right),
                landmarks,
            }],
        };
        if self.tx.send(InputEvent::Frame(frame)).is_err() {
            return false;
        }
        thread::sleep(Duration::from_micros(1_000_000 / self.fps as u64));
        true
    }
}

// ─── Gesture types ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Gesture {
    Hold { ms: u32 },
    /// Issue a control command as the user would
    Send(ControlCommand),
    /// Put every fingertip on the desk and keep it there
    RestAll { ms: u32 },
    HoverAll,
    /// Move a fingertip over a key, press for `ms`, lift
    Strike { finger: usize, key: usize, ms: u32 },
    /// Slide a pressed fingertip across keys
    Glide { finger: usize, from_key: usize, to_key: usize, ms: u32 },
}

/// Calibrate, draw the region, then record and replay a C major scale
/// while the exercise validator follows along.
pub fn demo_sequence(key_count: usize, octave_base: u8) -> Vec<Gesture> {
    let major = [0usize, 2, 4, 5, 7, 9, 11, 12];
    let mut g = vec![
        Gesture::Hold { ms: 300 },
        // Calibration: fingertips rest on the desk through the countdown
        Gesture::Send(ControlCommand::Calibrate { duration_ms: Some(2000) }),
        Gesture::RestAll { ms: 2300 },
        Gesture::HoverAll,
        Gesture::Hold { ms: 300 },
        // Drag the playing region out corner to corner
        Gesture::Send(ControlCommand::BeginRegionDrag {
            x: DEMO_REGION.x_min,
            y: DEMO_REGION.y_min,
        }),
        Gesture::Send(ControlCommand::UpdateRegionDrag {
            x: (DEMO_REGION.x_min + DEMO_REGION.x_max) / 2.0,
            y: (DEMO_REGION.y_min + DEMO_REGION.y_max) / 2.0,
        }),
        Gesture::Send(ControlCommand::UpdateRegionDrag {
            x: DEMO_REGION.x_max,
            y: DEMO_REGION.y_max,
        }),
        Gesture::Send(ControlCommand::FinishRegionDrag),
        Gesture::Send(ControlCommand::LoadExercise(
            major
                .iter()
                .map(|&k| octave_base.saturating_add(k.min(key_count.saturating_sub(1)) as u8))
                .collect(),
        )),
        Gesture::Send(ControlCommand::StartRecording),
    ];
    for (i, &key) in major.iter().enumerate() {
        // Alternate index and middle finger like a real run
        let finger = 1 + i % 2;
        g.push(Gesture::Strike { finger, key, ms: 220 });
        g.push(Gesture::Hold { ms: 80 });
    }
    // A wrong note, then a glissando
    g.push(Gesture::Strike { finger: 1, key: 1, ms: 200 });
    g.push(Gesture::Glide { finger: 2, from_key: 0, to_key: key_count.saturating_sub(1), ms: 900 });
    g.extend([
        Gesture::Hold { ms: 300 },
        Gesture::Send(ControlCommand::StopRecording),
        Gesture::Send(ControlCommand::ResetExercise),
        Gesture::Send(ControlCommand::StartPlayback),
        Gesture::Hold { ms: 5000 },
    ]);
    g
}

// ─── Math helpers ───────────────────────────────────────────────────────────

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Smooth interpolation (ease in/out)
fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strike_emits_hover_then_press_frames() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut sim = Simulator::new(SessionClock::new(), tx, 200, 12);
        assert!(sim.run_script(&[Gesture::Strike { finger: 1, key: 0, ms: 20 }]));

        let ys: Vec<f32> = rx
            .try_iter()
            .filter_map(|ev| match ev {
                InputEvent::Frame(f) => Some(f.hands[0].landmarks[FINGERTIP_LANDMARKS[1]].y),
                _ => None,
            })
            .collect();
        // 40ms hover + 20ms press at 200 fps
        assert_eq!(ys.len(), 12);
        assert!(ys[..8].iter().all(|y| (y - HOVER_Y).abs() <= JITTER + 1e-6));
        assert!(ys[8..].iter().all(|y| (y - SURFACE_Y).abs() <= JITTER + 1e-6));
    }

    #[test]
    fn test_key_x_lands_inside_key() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let sim = Simulator::new(SessionClock::new(), tx, 30, 14);
        let region = crate::region::PlayingRegion::new(
            DEMO_REGION,
            14,
            60,
            crate::config::KeyLayout::Single,
            0.05,
        )
        .unwrap();
        for key in 0..14 {
            let hit = region.map(sim.key_x(key), 0.5).unwrap();
            assert_eq!(hit.key_index, key);
        }
    }

    #[test]
    fn test_stops_when_coordinator_gone() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        let mut sim = Simulator::new(SessionClock::new(), tx, 100, 12);
        assert!(!sim.run_script(&[Gesture::Hold { ms: 1000 }]));
    }

    #[test]
    fn test_demo_sequence_shape() {
        let demo = demo_sequence(14, 60);
        assert!(matches!(demo[1], Gesture::Send(ControlCommand::Calibrate { .. })));
        let strikes = demo.iter().filter(|g| matches!(g, Gesture::Strike { .. })).count();
        assert_eq!(strikes, 9);
        assert!(matches!(demo.last(), Some(Gesture::Hold { .. })));
        assert!(demo
            .iter()
            .any(|g| matches!(g, Gesture::Send(ControlCommand::FinishRegionDrag))));
    }
}
