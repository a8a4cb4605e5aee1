//! In-memory recorder and playback scheduler.
//!
//! Recording pairs note-ons with their note-offs into [`RecordedEvent`]s
//! relative to the recording start. Playback turns each event back into a
//! pair of deferred cues relative to the playback start; the owner polls
//! [`Recorder::poll`] once per frame and routes the cues through the same
//! note sink as live play.

use crate::error::PipelineError;
use crate::scheduler::Scheduler;
use crate::types::{NoteEvent, NoteKind, NoteOwner};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub note: u8,
    pub velocity: u8,
    pub start_offset_ms: u64,
    pub duration_ms: u64,
}

impl RecordedEvent {
    pub fn end_offset_ms(&self) -> u64 {
        self.start_offset_ms + self.duration_ms
    }
}

/// A deferred playback action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackCue {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Playing,
}

pub struct Recorder {
    state: RecorderState,
    recording_start_ms: u64,
    /// Open note-ons: note → (start offset, velocity)
    pending: HashMap<u8, (u64, u8)>,
    events: Vec<RecordedEvent>,
    cues: Scheduler<PlaybackCue>,
    tail_ms: u64,
}

impl Recorder {
    pub fn new(tail_ms: u64) -> Self {
        Self {
            state: RecorderState::Idle,
            recording_start_ms: 0,
            pending: HashMap::new(),
            events: Vec::new(),
            cues: Scheduler::new(),
            tail_ms,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    pub fn is_playing(&self) -> bool {
        self.state == RecorderState::Playing
    }

    /// Start a new take, replacing the previous one.
    pub fn start_recording(&mut self, now_ms: u64) -> Result<(), PipelineError> {
        match self.state {
            RecorderState::Playing => return Err(PipelineError::RecorderBusy("playing")),
            RecorderState::Recording => return Err(PipelineError::RecorderBusy("recording")),
            RecorderState::Idle => {}
        }
        self.recording_start_ms = now_ms;
        self.pending.clear();
        self.events.clear();
        self.state = RecorderState::Recording;
        info!("Recording started");
        Ok(())
    }

    /// Stop recording. Notes still held are dropped from the take, and the
    /// rest are put in onset order. Returns the number of captured events.
    pub fn stop_recording(&mut self) -> Result<usize, PipelineError> {
        if self.state != RecorderState::Recording {
            return Err(PipelineError::NotRecording);
        }
        if !self.pending.is_empty() {
            debug!("Discarding {} unfinished notes", self.pending.len());
            self.pending.clear();
        }
        self.events.sort_by_key(|e| e.start_offset_ms);
        self.state = RecorderState::Idle;
        info!("Recording stopped: {} events", self.events.len());
        Ok(self.events.len())
    }

    /// Capture a live note event. Ignored unless recording.
    pub fn capture(&mut self, event: &NoteEvent) {
        if self.state != RecorderState::Recording || event.owner == NoteOwner::Playback {
            return;
        }
        let offset = event.timestamp_ms.saturating_sub(self.recording_start_ms);
        match event.kind {
            NoteKind::On => {
                self.pending.insert(event.note, (offset, event.velocity));
            }
            NoteKind::Off => {
                if let Some((start, velocity)) = self.pending.remove(&event.note) {
                    self.events.push(RecordedEvent {
                        note: event.note,
                        velocity,
                        start_offset_ms: start,
                        duration_ms: offset.saturating_sub(start).max(1),
                    });
                }
            }
        }
    }

    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    /// Schedule the take for playback starting at `now_ms`.
    pub fn start_playback(&mut self, now_ms: u64) -> Result<u64, PipelineError> {
        match self.state {
            RecorderState::Recording => return Err(PipelineError::RecorderBusy("recording")),
            RecorderState::Playing => return Err(PipelineError::RecorderBusy("playing")),
            RecorderState::Idle => {}
        }
        if self.events.is_empty() {
            return Err(PipelineError::NothingRecorded);
        }

        self.cues.cancel_all();
        // Offs are queued before ons so that at equal times a note is
        // released before it is struck again.
        for ev in &self.events {
            self.cues
                .schedule_at(now_ms + ev.end_offset_ms(), PlaybackCue::NoteOff { note: ev.note });
        }
        for ev in &self.events {
            self.cues.schedule_at(
                now_ms + ev.start_offset_ms,
                PlaybackCue::NoteOn {
                    note: ev.note,
                    velocity: ev.velocity,
                },
            );
        }
        let last_end = self
            .events
            .iter()
            .map(|e| e.end_offset_ms())
            .max()
            .unwrap_or(0);
        let done_at = now_ms + last_end + self.tail_ms;
        self.cues.schedule_at(done_at, PlaybackCue::Complete);

        self.state = RecorderState::Playing;
        info!(
            "Playback started: {} events, ends at +{}ms",
            self.events.len(),
            last_end + self.tail_ms
        );
        Ok(done_at)
    }

    /// Cues due by `now_ms`. Flips back to idle when the completion cue fires.
    pub fn poll(&mut self, now_ms: u64) -> Vec<PlaybackCue> {
        if self.state != RecorderState::Playing {
            return Vec::new();
        }
        let due = self.cues.poll(now_ms);
        if due.contains(&PlaybackCue::Complete) {
            self.cues.cancel_all();
            self.state = RecorderState::Idle;
            info!("Playback complete");
        }
        due
    }

    /// Cancel every pending cue. Returns how many were dropped.
    pub fn cancel_playback(&mut self) -> usize {
        let dropped = self.cues.cancel_all();
        if self.state == RecorderState::Playing {
            self.state = RecorderState::Idle;
            info!("Playback cancelled ({} cues dropped)", dropped);
        }
        dropped
    }

    /// Abandon whatever is in progress (pipeline stop). The take is kept.
    pub fn halt(&mut self) {
        self.cancel_playback();
        if self.state == RecorderState::Recording {
            self.pending.clear();
            self.state = RecorderState::Idle;
        }
    }

    pub fn pending_cues(&self) -> usize {
        self.cues.pending()
    }
}
