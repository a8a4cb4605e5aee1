use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

// ─── Detector input ─────────────────────────────────────────────────────────

/// One normalized landmark from the hand-pose detector.
/// `x`/`y` are in [0, 1] image space; `z` is the detector's optional depth proxy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Which hand the detector believes it saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandSide {
    Left,
    Right,
}

impl HandSide {
    pub fn index(self) -> usize {
        match self {
            HandSide::Left => 0,
            HandSide::Right => 1,
        }
    }
}

/// Which camera a frame came from.
///
/// The side camera sees fingertips come down onto the desk (the press signal);
/// the optional top camera sees where along the keyboard they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraView {
    #[default]
    Side,
    Top,
}

/// A single detected hand: 21 landmarks in MediaPipe order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedHand {
    #[serde(default)]
    pub side: Option<HandSide>,
    pub landmarks: Vec<Landmark>,
}

/// Everything the detector reported for one camera frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    /// Milliseconds since session start
    pub timestamp_ms: u64,
    #[serde(default)]
    pub view: CameraView,
    pub hands: Vec<DetectedHand>,
}

impl LandmarkFrame {
    pub fn empty(timestamp_ms: u64, view: CameraView) -> Self {
        Self {
            timestamp_ms,
            view,
            hands: Vec::new(),
        }
    }

    /// Fingertips of every hand, tagged with a stable per-slot identity.
    pub fn fingertips(&self) -> impl Iterator<Item = (PointId, Landmark)> + '_ {
        self.hands.iter().enumerate().flat_map(|(hand_idx, hand)| {
            FINGERTIP_LANDMARKS
                .iter()
                .enumerate()
                .filter_map(move |(finger, &lm)| {
                    hand.landmarks
                        .get(lm)
                        .map(|p| (PointId::new(hand_idx as u8, finger as u8), *p))
                })
        })
    }
}

// ─── Tracked points ─────────────────────────────────────────────────────────

/// Identity of a tracked fingertip: detector hand slot + finger (0 = thumb).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointId {
    pub hand: u8,
    pub finger: u8,
}

impl PointId {
    pub fn new(hand: u8, finger: u8) -> Self {
        Self { hand, finger }
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let finger = FINGER_NAMES.get(self.finger as usize).copied().unwrap_or("?");
        write!(f, "h{}:{}", self.hand, finger)
    }
}

/// A fingertip as seen in the current frame. Rebuilt every frame; `id`
/// stays stable while the detector keeps the same hand/finger slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedPoint {
    pub id: PointId,
    pub x: f32,
    pub y: f32,
    /// Depth/offset signal; grows as the fingertip approaches the surface.
    pub signal: f32,
    pub timestamp_ms: u64,
}

impl TrackedPoint {
    pub fn new(id: PointId, x: f32, y: f32, signal: f32, timestamp_ms: u64) -> Self {
        Self {
            id,
            x,
            y,
            signal,
            timestamp_ms,
        }
    }
}

/// A released→pressed transition. Transient: consumed by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressEvent {
    pub point: PointId,
    pub x: f32,
    pub y: f32,
    pub timestamp_ms: u64,
}

// ─── Note events ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteKind {
    On,
    Off,
}

/// Who is holding a note down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteOwner {
    Point(PointId),
    Playback,
}

/// The contract object handed to every downstream consumer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub note: u8,
    pub velocity: u8,
    pub kind: NoteKind,
    pub timestamp_ms: u64,
    /// Key index on the playing region, when the note came from one.
    pub key_index: Option<usize>,
    pub owner: NoteOwner,
}

impl NoteEvent {
    pub fn is_on(&self) -> bool {
        self.kind == NoteKind::On
    }
}

impl fmt::Display for NoteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            NoteKind::On => "ON ",
            NoteKind::Off => "OFF",
        };
        let owner = match self.owner {
            NoteOwner::Point(p) => p.to_string(),
            NoteOwner::Playback => "playback".to_string(),
        };
        write!(
            f,
            "t={:>8}ms  {} {:<4} ({:>3}) vel={:>3}  {}",
            self.timestamp_ms,
            kind,
            midi_note_name(self.note),
            self.note,
            self.velocity,
            owner,
        )
    }
}

// ─── Session clock ──────────────────────────────────────────────────────────

/// Monotonic clock for the session. All pipeline timestamps are in its ms.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Constants ──────────────────────────────────────────────────────────────

/// Landmarks per detected hand.
pub const LANDMARKS_PER_HAND: usize = 21;

/// Landmark indices of the five fingertips (thumb → pinky).
pub const FINGERTIP_LANDMARKS: [usize; 5] = [4, 8, 12, 16, 20];

pub const FINGER_NAMES: [&str; 5] = ["thumb", "index", "middle", "ring", "pinky"];

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// "C4" style name for a MIDI note number (middle C = 60 = C4).
pub fn midi_note_name(note: u8) -> String {
    let name = NOTE_NAMES[(note % 12) as usize];
    let octave = (note as i32 / 12) - 1;
    format!("{}{}", name, octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand_with_tips(tip_y: f32) -> DetectedHand {
        let mut landmarks = vec![Landmark::default(); LANDMARKS_PER_HAND];
        for (i, &lm) in FINGERTIP_LANDMARKS.iter().enumerate() {
            landmarks[lm] = Landmark::new(0.1 * (i + 1) as f32, tip_y, 0.0);
        }
        DetectedHand {
            side: Some(HandSide::Right),
            landmarks,
        }
    }

    #[test]
    fn test_fingertips_identity_per_slot() {
        let frame = LandmarkFrame {
            timestamp_ms: 10,
            view: CameraView::Side,
            hands: vec![hand_with_tips(0.4), hand_with_tips(0.6)],
        };
        let tips: Vec<_> = frame.fingertips().collect();
        assert_eq!(tips.len(), 10);
        assert_eq!(tips[0].0, PointId::new(0, 0));
        assert_eq!(tips[6].0, PointId::new(1, 1));
        assert!((tips[6].1.y - 0.6).abs() < 1e-6);
        assert!((tips[1].1.x - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_fingertips_short_hand_skips_missing() {
        let frame = LandmarkFrame {
            timestamp_ms: 0,
            view: CameraView::Top,
            hands: vec![DetectedHand {
                side: None,
                landmarks: vec![Landmark::default(); 10],
            }],
        };
        // Only landmarks 4 and 8 exist
        assert_eq!(frame.fingertips().count(), 2);
    }

    #[test]
    fn test_midi_note_name() {
        assert_eq!(midi_note_name(60), "C4");
        assert_eq!(midi_note_name(69), "A4");
        assert_eq!(midi_note_name(61), "C#4");
        assert_eq!(midi_note_name(0), "C-1");
    }

    #[test]
    fn test_point_id_display() {
        assert_eq!(PointId::new(1, 1).to_string(), "h1:index");
    }
}
