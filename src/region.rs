//! Playing region: the user-drawn rectangle that turns lateral fingertip
//! position into key indices and note numbers.

use crate::config::KeyLayout;
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in normalized detector space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionRect {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl RegionRect {
    /// Build from two opposite corners given in any order, clamped to [0, 1].
    pub fn from_corners(a: (f32, f32), b: (f32, f32)) -> Self {
        let clamp = |v: f32| v.clamp(0.0, 1.0);
        Self {
            x_min: clamp(a.0.min(b.0)),
            y_min: clamp(a.1.min(b.1)),
            x_max: clamp(a.0.max(b.0)),
            y_max: clamp(a.1.max(b.1)),
        }
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    pub fn contains(&self, x: f32, y: f32, margin: f32) -> bool {
        x >= self.x_min - margin
            && x <= self.x_max + margin
            && y >= self.y_min - margin
            && y <= self.y_max + margin
    }
}

/// A key hit on the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyHit {
    /// Global key index across the whole region, left to right.
    pub key_index: usize,
    pub note: u8,
}

/// The playing region plus its keyboard layout. Immutable until redrawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayingRegion {
    pub rect: RegionRect,
    pub key_count: usize,
    pub octave_base: u8,
    pub layout: KeyLayout,
}

impl PlayingRegion {
    pub fn new(
        rect: RegionRect,
        key_count: usize,
        octave_base: u8,
        layout: KeyLayout,
        min_size: f32,
    ) -> Result<Self, PipelineError> {
        let vals = [rect.x_min, rect.y_min, rect.x_max, rect.y_max];
        if vals.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::InvalidRegion("non-finite corner".into()));
        }
        if rect.width() < min_size || rect.height() < min_size {
            return Err(PipelineError::InvalidRegion(format!(
                "{:.3}×{:.3} is smaller than {:.3}",
                rect.width(),
                rect.height(),
                min_size
            )));
        }
        let total = match layout {
            KeyLayout::Single => key_count,
            KeyLayout::Dual { keys_per_hand, .. } => keys_per_hand * 2,
        };
        if total == 0 {
            return Err(PipelineError::InvalidRegion("no keys".into()));
        }
        Ok(Self {
            rect,
            key_count: total,
            octave_base,
            layout,
        })
    }

    /// Map a fingertip position to a key, or `None` outside the region.
    pub fn map(&self, x: f32, y: f32) -> Option<KeyHit> {
        self.map_with_margin(x, y, 0.0)
    }

    /// Like [`map`](Self::map) with the bounds grown by `margin`; positions in
    /// the margin snap onto the nearest edge key. For overlay hit zones only:
    /// note mapping always uses the bare region. A negative or non-finite
    /// margin matches nothing.
    pub fn map_with_margin(&self, x: f32, y: f32, margin: f32) -> Option<KeyHit> {
        if !(margin >= 0.0 && margin.is_finite()) {
            return None;
        }
        if !x.is_finite() || !y.is_finite() || !self.rect.contains(x, y, margin) {
            return None;
        }
        let x = x.clamp(self.rect.x_min, self.rect.x_max);
        let t = (x - self.rect.x_min) / self.rect.width();

        let hit = match self.layout {
            KeyLayout::Single => {
                let key = key_in_span(t, self.key_count)?;
                KeyHit {
                    key_index: key,
                    note: note_for(self.octave_base, key)?,
                }
            }
            KeyLayout::Dual {
                keys_per_hand,
                lower_base,
                upper_base,
            } => {
                let (half, local_t, base) = if t < 0.5 {
                    (0, t * 2.0, lower_base)
                } else {
                    (1, (t - 0.5) * 2.0, upper_base)
                };
                let key = key_in_span(local_t, keys_per_hand)?;
                KeyHit {
                    key_index: half * keys_per_hand + key,
                    note: note_for(base, key)?,
                }
            }
        };
        Some(hit)
    }

    /// Inverse of the note mapping: which key plays `note`, if any.
    pub fn key_for_note(&self, note: u8) -> Option<usize> {
        let offset = |base: u8, span: usize| {
            note.checked_sub(base)
                .map(|d| d as usize)
                .filter(|&d| d < span)
        };
        match self.layout {
            KeyLayout::Single => offset(self.octave_base, self.key_count),
            KeyLayout::Dual {
                keys_per_hand,
                lower_base,
                upper_base,
            } => offset(lower_base, keys_per_hand)
                .or_else(|| offset(upper_base, keys_per_hand).map(|k| keys_per_hand + k)),
        }
    }
}

/// `floor(t * count)` with the right edge clamped onto the last key.
/// Anything still outside `[0, count)` is discarded.
fn key_in_span(t: f32, count: usize) -> Option<usize> {
    let raw = (t * count as f32).floor();
    if raw < 0.0 {
        return None;
    }
    let mut key = raw as usize;
    if key == count && t >= 1.0 {
        key = count - 1;
    }
    if key >= count {
        return None;
    }
    Some(key)
}

fn note_for(base: u8, key: usize) -> Option<u8> {
    let n = base as usize + key;
    if n > 127 {
        None
    } else {
        Some(n as u8)
    }
}

/// Rectangle drag gesture in progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionDraft {
    anchor: Option<(f32, f32)>,
    current: Option<(f32, f32)>,
}

impl RegionDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, x: f32, y: f32) {
        self.anchor = Some((x, y));
        self.current = Some((x, y));
    }

    pub fn update(&mut self, x: f32, y: f32) {
        if self.anchor.is_some() {
            self.current = Some((x, y));
        }
    }

    pub fn is_active(&self) -> bool {
        self.anchor.is_some()
    }

    /// Rectangle drawn so far, for a live overlay.
    pub fn preview(&self) -> Option<RegionRect> {
        Some(RegionRect::from_corners(self.anchor?, self.current?))
    }

    /// End the drag and return the rectangle, resetting the draft.
    pub fn finish(&mut self) -> Option<RegionRect> {
        let rect = self.preview();
        *self = Self::default();
        rect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect() -> RegionRect {
        RegionRect::from_corners((0.2, 0.3), (0.8, 0.7))
    }

    fn single(keys: usize) -> PlayingRegion {
        PlayingRegion::new(rect(), keys, 60, KeyLayout::Single, 0.05).unwrap()
    }

    #[test]
    fn test_outside_region_no_key() {
        let r = single(12);
        assert_eq!(r.map(0.1, 0.5), None);
        assert_eq!(r.map(0.5, 0.9), None);
        assert_eq!(r.map(f32::NAN, 0.5), None);
    }

    #[test]
    fn test_left_edge_first_key_right_edge_last_key() {
        let r = single(12);
        assert_eq!(r.map(0.2, 0.5), Some(KeyHit { key_index: 0, note: 60 }));
        assert_eq!(r.map(0.8, 0.5), Some(KeyHit { key_index: 11, note: 71 }));
    }

    #[test]
    fn test_interpolates_linearly() {
        let r = single(6); // each key 0.1 wide
        assert_eq!(r.map(0.25, 0.5).unwrap().key_index, 0);
        assert_eq!(r.map(0.35, 0.5).unwrap().key_index, 1);
        assert_eq!(r.map(0.75, 0.5).unwrap().key_index, 5);
        assert_eq!(r.map(0.35, 0.5).unwrap().note, 61);
    }

    #[test]
    fn test_monotonic_in_x() {
        let r = single(14);
        let mut prev = 0;
        for i in 0..=600 {
            let x = 0.2 + i as f32 * 0.001;
            if let Some(hit) = r.map(x, 0.5) {
                assert!(hit.key_index >= prev, "key decreased at x={}", x);
                prev = hit.key_index;
            }
        }
        assert_eq!(prev, 13);
    }

    #[test]
    fn test_dual_layout_halves() {
        let layout = KeyLayout::Dual {
            keys_per_hand: 7,
            lower_base: 48,
            upper_base: 72,
        };
        let r = PlayingRegion::new(rect(), 0, 0, layout, 0.05).unwrap();
        assert_eq!(r.key_count, 14);
        assert_eq!(r.map(0.2, 0.5), Some(KeyHit { key_index: 0, note: 48 }));
        assert_eq!(r.map(0.49, 0.5).unwrap().note, 54);
        assert_eq!(r.map(0.5, 0.5), Some(KeyHit { key_index: 7, note: 72 }));
        assert_eq!(r.map(0.8, 0.5), Some(KeyHit { key_index: 13, note: 78 }));
    }

    #[test]
    fn test_margin_snaps_to_edge_key() {
        let r = single(12);
        assert_eq!(r.map(0.19, 0.5), None);
        assert_eq!(r.map_with_margin(0.19, 0.5, 0.02).unwrap().key_index, 0);
        assert_eq!(r.map_with_margin(0.81, 0.5, 0.02).unwrap().key_index, 11);
        assert_eq!(r.map_with_margin(0.5, 0.5, -0.01), None);
        assert_eq!(r.map_with_margin(0.5, 0.5, f32::NAN), None);
    }

    #[test]
    fn test_notes_above_midi_range_discarded() {
        let r = PlayingRegion::new(rect(), 12, 120, KeyLayout::Single, 0.05).unwrap();
        assert_eq!(r.map(0.2, 0.5).unwrap().note, 120);
        assert_eq!(r.map(0.8, 0.5), None);
    }

    #[test]
    fn test_too_small_region_rejected() {
        let tiny = RegionRect::from_corners((0.5, 0.5), (0.52, 0.9));
        let result = PlayingRegion::new(tiny, 12, 60, KeyLayout::Single, 0.05);
        assert!(matches!(result, Err(PipelineError::InvalidRegion(_))));
    }

    #[test]
    fn test_draft_normalizes_corners() {
        let mut d = RegionDraft::new();
        assert_eq!(d.finish(), None);
        d.begin(0.9, 0.8);
        d.update(0.1, 1.4);
        let r = d.finish().unwrap();
        assert_eq!(r, RegionRect { x_min: 0.1, y_min: 0.8, x_max: 0.9, y_max: 1.0 });
        assert!(!d.is_active());
    }

    #[test]
    fn test_key_for_note_inverts_mapping() {
        let r = single(12);
        assert_eq!(r.key_for_note(60), Some(0));
        assert_eq!(r.key_for_note(71), Some(11));
        assert_eq!(r.key_for_note(72), None);
        assert_eq!(r.key_for_note(59), None);

        let layout = KeyLayout::Dual {
            keys_per_hand: 5,
            lower_base: 48,
            upper_base: 72,
        };
        let d = PlayingRegion::new(rect(), 0, 0, layout, 0.05).unwrap();
        assert_eq!(d.key_for_note(50), Some(2));
        assert_eq!(d.key_for_note(73), Some(6));
        assert_eq!(d.key_for_note(60), None);
    }
}
