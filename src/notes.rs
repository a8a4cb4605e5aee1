use crate::types::{NoteEvent, NoteKind, NoteOwner, PointId};
use log::debug;
use std::collections::{BTreeMap, HashSet};

/// A pressed fingertip that maps onto a valid key this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteCandidate {
    pub note: u8,
    pub owner: PointId,
    pub velocity: u8,
    pub key_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveNote {
    pub owner: NoteOwner,
    pub velocity: u8,
    pub key_index: Option<usize>,
    pub started_ms: u64,
}

/// Owns the set of sounding notes.
///
/// Invariants:
///   - a note is active iff it is in the map, with exactly one owner
///   - the owner never changes while the note is active; another fingertip
///     landing on the same key is ignored until the owner lets go
///   - every note-on is matched by exactly one note-off, including at
///     teardown ([`release_all`](Self::release_all))
pub struct NoteLifecycle {
    active: BTreeMap<u8, ActiveNote>,
}

impl NoteLifecycle {
    pub fn new() -> Self {
        Self {
            active: BTreeMap::new(),
        }
    }

    /// Bring live (fingertip-owned) notes in line with this frame's candidates.
    ///
    /// Note-offs come first, so a key handed from one finger to another in
    /// the same frame is released before it is pressed again. Playback-owned
    /// notes are left alone.
    pub fn reconcile(&mut self, candidates: &[NoteCandidate], now_ms: u64) -> Vec<NoteEvent> {
        let sustained: HashSet<(u8, PointId)> =
            candidates.iter().map(|c| (c.note, c.owner)).collect();

        let ended: Vec<u8> = self
            .active
            .iter()
            .filter(|(note, a)| match a.owner {
                NoteOwner::Point(p) => !sustained.contains(&(**note, p)),
                NoteOwner::Playback => false,
            })
            .map(|(note, _)| *note)
            .collect();

        let mut events = Vec::new();
        for note in ended {
            if let Some(a) = self.active.remove(&note) {
                events.push(off_event(note, &a, now_ms));
            }
        }

        for c in candidates {
            if let Some(ev) = self.press(
                c.note,
                NoteOwner::Point(c.owner),
                c.velocity,
                Some(c.key_index),
                now_ms,
            ) {
                events.push(ev);
            }
        }
        events
    }

    /// Start a note unless it is already sounding.
    pub fn press(
        &mut self,
        note: u8,
        owner: NoteOwner,
        velocity: u8,
        key_index: Option<usize>,
        now_ms: u64,
    ) -> Option<NoteEvent> {
        if self.active.contains_key(&note) {
            return None;
        }
        self.active.insert(
            note,
            ActiveNote {
                owner,
                velocity,
                key_index,
                started_ms: now_ms,
            },
        );
        Some(NoteEvent {
            note,
            velocity,
            kind: NoteKind::On,
            timestamp_ms: now_ms,
            key_index,
            owner,
        })
    }

    /// End a note, but only on behalf of its owner.
    pub fn release(&mut self, note: u8, owner: NoteOwner, now_ms: u64) -> Option<NoteEvent> {
        match self.active.get(&note) {
            Some(a) if a.owner == owner => {}
            _ => return None,
        }
        let a = self.active.remove(&note)?;
        Some(off_event(note, &a, now_ms))
    }

    /// End every note whose owner matches `pred`, lowest note first.
    pub fn release_where(
        &mut self,
        mut pred: impl FnMut(NoteOwner) -> bool,
        now_ms: u64,
    ) -> Vec<NoteEvent> {
        let doomed: Vec<u8> = self
            .active
            .iter()
            .filter(|(_, a)| pred(a.owner))
            .map(|(n, _)| *n)
            .collect();
        doomed
            .into_iter()
            .filter_map(|n| self.active.remove(&n).map(|a| off_event(n, &a, now_ms)))
            .collect()
    }

    /// Teardown: one note-off per active note, then empty.
    pub fn release_all(&mut self, now_ms: u64) -> Vec<NoteEvent> {
        let events = self.release_where(|_| true, now_ms);
        if !events.is_empty() {
            debug!("Released {} active notes", events.len());
        }
        events
    }

    pub fn is_active(&self, note: u8) -> bool {
        self.active.contains_key(&note)
    }

    pub fn owner(&self, note: u8) -> Option<NoteOwner> {
        self.active.get(&note).map(|a| a.owner)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn active(&self) -> impl Iterator<Item = (u8, &ActiveNote)> {
        self.active.iter().map(|(n, a)| (*n, a))
    }
}

impl Default for NoteLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

fn off_event(note: u8, a: &ActiveNote, now_ms: u64) -> NoteEvent {
    NoteEvent {
        note,
        velocity: 0,
        kind: NoteKind::Off,
        timestamp_ms: now_ms,
        key_index: a.key_index,
        owner: a.owner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(note: u8, hand: u8, finger: u8) -> NoteCandidate {
        NoteCandidate {
            note,
            owner: PointId::new(hand, finger),
            velocity: 100,
            key_index: (note - 60) as usize,
        }
    }

    fn kinds(events: &[NoteEvent]) -> Vec<(NoteKind, u8)> {
        events.iter().map(|e| (e.kind, e.note)).collect()
    }

    #[test]
    fn test_new_press_emits_on_once() {
        let mut nl = NoteLifecycle::new();
        let ev = nl.reconcile(&[cand(60, 0, 1)], 0);
        assert_eq!(kinds(&ev), vec![(NoteKind::On, 60)]);
        // Same candidate next frame: nothing new
        assert!(nl.reconcile(&[cand(60, 0, 1)], 33).is_empty());
        assert!(nl.is_active(60));
    }

    #[test]
    fn test_owner_gone_emits_off() {
        let mut nl = NoteLifecycle::new();
        nl.reconcile(&[cand(60, 0, 1), cand(62, 0, 2)], 0);
        let ev = nl.reconcile(&[cand(62, 0, 2)], 33);
        assert_eq!(kinds(&ev), vec![(NoteKind::Off, 60)]);
        assert_eq!(ev[0].timestamp_ms, 33);
        assert_eq!(nl.active_count(), 1);
    }

    #[test]
    fn test_second_point_cannot_steal_note() {
        let mut nl = NoteLifecycle::new();
        nl.reconcile(&[cand(60, 0, 1)], 0);
        // Another finger lands on the same key: ignored
        let ev = nl.reconcile(&[cand(60, 0, 1), cand(60, 1, 1)], 33);
        assert!(ev.is_empty());
        assert_eq!(nl.owner(60), Some(NoteOwner::Point(PointId::new(0, 1))));
        // Owner lifts while the other stays: off, then on for the new owner
        let ev = nl.reconcile(&[cand(60, 1, 1)], 66);
        assert_eq!(kinds(&ev), vec![(NoteKind::Off, 60), (NoteKind::On, 60)]);
        assert_eq!(nl.owner(60), Some(NoteOwner::Point(PointId::new(1, 1))));
    }

    #[test]
    fn test_slide_to_new_key_swaps_notes() {
        let mut nl = NoteLifecycle::new();
        nl.reconcile(&[cand(60, 0, 1)], 0);
        let ev = nl.reconcile(&[cand(61, 0, 1)], 33);
        assert_eq!(kinds(&ev), vec![(NoteKind::Off, 60), (NoteKind::On, 61)]);
    }

    #[test]
    fn test_reconcile_leaves_playback_notes() {
        let mut nl = NoteLifecycle::new();
        nl.press(64, NoteOwner::Playback, 90, None, 0).unwrap();
        assert!(nl.reconcile(&[], 10).is_empty());
        assert!(nl.is_active(64));
        assert!(nl.release(64, NoteOwner::Point(PointId::new(0, 0)), 20).is_none());
        let off = nl.release(64, NoteOwner::Playback, 20).unwrap();
        assert_eq!(off.kind, NoteKind::Off);
    }

    #[test]
    fn test_release_all_emits_one_off_per_note() {
        let mut nl = NoteLifecycle::new();
        nl.reconcile(&[cand(60, 0, 1), cand(64, 0, 2), cand(67, 0, 3)], 0);
        nl.press(72, NoteOwner::Playback, 80, None, 0);
        let ev = nl.release_all(100);
        assert_eq!(ev.len(), 4);
        assert!(ev.iter().all(|e| e.kind == NoteKind::Off));
        assert_eq!(nl.active_count(), 0);
        assert!(nl.release_all(200).is_empty());
    }

    #[test]
    fn test_on_off_alternate_per_note() {
        // Random-ish press patterns never produce two ons without an off between
        let mut nl = NoteLifecycle::new();
        let mut open: std::collections::HashMap<u8, bool> = Default::default();
        for frame in 0..200u64 {
            let mut cs = Vec::new();
            for finger in 0..5u8 {
                if (frame * 7 + finger as u64 * 13) % 11 < 5 {
                    let note = 60 + ((frame / 5 + finger as u64) % 4) as u8;
                    cs.push(cand(note, 0, finger));
                }
            }
            for ev in nl.reconcile(&cs, frame * 16) {
                let was_on = open.insert(ev.note, ev.is_on()).unwrap_or(false);
                assert_ne!(was_on, ev.is_on(), "note {} repeated {:?}", ev.note, ev.kind);
            }
        }
        for ev in nl.release_all(10_000) {
            assert_eq!(open.insert(ev.note, false), Some(true));
        }
    }
}
