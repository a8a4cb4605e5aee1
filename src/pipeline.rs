use crate::arm_pose::{ArmPose, ArmPoseArena};
use crate::calibration::CalibrationManager;
use crate::config::{LateralSource, PipelineConfig, SignalAxis, VelocityMode};
use crate::error::PipelineError;
use crate::exercise::{ExerciseProgress, ExerciseValidator, Feedback};
use crate::notes::{NoteCandidate, NoteLifecycle};
use crate::press_detector::{PressConfig, PressDetector, PressTransition};
use crate::recorder::{PlaybackCue, Recorder};
use crate::region::{PlayingRegion, RegionDraft, RegionRect};
use crate::scheduler::{Scheduler, TimerId};
use crate::types::*;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

// ─── Outbound events ────────────────────────────────────────────────────────

/// Commands for the 3D instrument renderer. No logic lives on that side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RendererCommand {
    SetKeyVisualState {
        key_index: usize,
        pressed: bool,
        track: Option<PointId>,
    },
    ArmTarget { side: HandSide, pose: ArmPose },
    FlashKey { key_index: usize, correct: bool },
    ClearFlash { key_index: usize },
    RegionChanged(Option<RegionRect>),
    /// Rectangle under the user's drag, before it becomes the region.
    RegionPreview(RegionRect),
}

/// User-facing status lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatusMessage {
    CalibrationCountdown { seconds: u64 },
    Calibrated { points: usize, plane: f32 },
    CalibrationFailed(String),
    RegionSet(RegionRect),
    RecordingStarted,
    RecordingStopped { events: usize },
    PlaybackStarted { events: usize },
    PlaybackFinished,
    PlaybackCancelled,
    ExerciseLoaded { notes: usize },
    ExerciseReset,
    DetectorUnavailable(String),
    Rejected(String),
    Stopped,
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusMessage::CalibrationCountdown { seconds } => {
                write!(f, "Calibrating in {}… keep fingertips on the surface", seconds)
            }
            StatusMessage::Calibrated { points, plane } => {
                write!(f, "Calibrated {} fingertips (plane {:.3})", points, plane)
            }
            StatusMessage::CalibrationFailed(why) => write!(f, "Calibration failed: {}", why),
            StatusMessage::RegionSet(r) => write!(
                f,
                "Playing region ({:.2},{:.2})–({:.2},{:.2})",
                r.x_min, r.y_min, r.x_max, r.y_max
            ),
            StatusMessage::RecordingStarted => write!(f, "Recording…"),
            StatusMessage::RecordingStopped { events } => {
                write!(f, "Recording stopped: {} notes", events)
            }
            StatusMessage::PlaybackStarted { events } => write!(f, "Playing {} notes", events),
            StatusMessage::PlaybackFinished => write!(f, "Playback finished"),
            StatusMessage::PlaybackCancelled => write!(f, "Playback cancelled"),
            StatusMessage::ExerciseLoaded { notes } => write!(f, "Exercise loaded: {} notes", notes),
            StatusMessage::ExerciseReset => write!(f, "Exercise reset"),
            StatusMessage::DetectorUnavailable(why) => write!(f, "Hand detector unavailable: {}", why),
            StatusMessage::Rejected(why) => write!(f, "Rejected: {}", why),
            StatusMessage::Stopped => write!(f, "Stopped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineEvent {
    Note(NoteEvent),
    Renderer(RendererCommand),
    Feedback(Feedback),
    /// Exercise progress after each judged note, and on load/reset.
    Progress(ExerciseProgress),
    Status(StatusMessage),
}

/// User actions from the configuration surface.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Start a calibration countdown (config default when `None`).
    Calibrate { duration_ms: Option<u64> },
    DrawRegion(RegionRect),
    /// Drag gesture: press at one corner, move, release to draw the region.
    BeginRegionDrag { x: f32, y: f32 },
    UpdateRegionDrag { x: f32, y: f32 },
    FinishRegionDrag,
    StartRecording,
    StopRecording,
    StartPlayback,
    CancelPlayback,
    LoadExercise(Vec<u8>),
    ResetExercise,
    Stop,
}

/// Pipeline-internal deferred work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    CalibrationCapture,
    CountdownTick { seconds: u64 },
    FlashEnd { key_index: usize },
}

// ─── Pipeline ───────────────────────────────────────────────────────────────

/// The synchronous gesture-to-note core.
///
/// Every call runs to completion on the caller's thread and returns the
/// events it produced, in order:
///
///   detector frame → press detector → region mapper → note lifecycle
///     → {renderer, audio, recorder, exercise validator}
///
/// Playback cues re-enter at the note lifecycle, so consumers can't tell
/// recorded notes from live ones.
pub struct Pipeline {
    config: PipelineConfig,
    calibration: CalibrationManager,
    detector: PressDetector,
    region: Option<PlayingRegion>,
    draft: RegionDraft,
    notes: NoteLifecycle,
    recorder: Recorder,
    exercise: Option<ExerciseValidator>,
    arms: ArmPoseArena,
    deferred: Scheduler<Deferred>,
    flashes: HashMap<usize, TimerId>,
    /// Press signal of every fingertip visible in the latest side frame
    latest_signals: HashMap<PointId, f32>,
    hand_sides: HashMap<u8, HandSide>,
    now_ms: u64,
    last_advance_ms: Option<u64>,
    frame_count: u64,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let detector = PressDetector::new(PressConfig {
            press_threshold: config.press_threshold,
            cooldown_ms: config.cooldown_ms,
            stale_window_ms: config.stale_window_ms,
        });
        Self {
            recorder: Recorder::new(config.playback_tail_ms),
            arms: ArmPoseArena::new(config.arm_smoothing),
            config,
            calibration: CalibrationManager::new(),
            detector,
            region: None,
            draft: RegionDraft::new(),
            notes: NoteLifecycle::new(),
            exercise: None,
            deferred: Scheduler::new(),
            flashes: HashMap::new(),
            latest_signals: HashMap::new(),
            hand_sides: HashMap::new(),
            now_ms: 0,
            last_advance_ms: None,
            frame_count: 0,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn calibration(&self) -> &CalibrationManager {
        &self.calibration
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_calibrated()
    }

    pub fn region(&self) -> Option<&PlayingRegion> {
        self.region.as_ref()
    }

    pub fn notes(&self) -> &NoteLifecycle {
        &self.notes
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn exercise(&self) -> Option<&ExerciseValidator> {
        self.exercise.as_ref()
    }

    pub fn arms(&self) -> &ArmPoseArena {
        &self.arms
    }

    pub fn pending_deferred(&self) -> usize {
        self.deferred.pending() + self.recorder.pending_cues()
    }

    /// Process one detector frame.
    pub fn process_frame(&mut self, frame: &LandmarkFrame) -> Vec<PipelineEvent> {
        let now = self.advance_clock(frame.timestamp_ms);
        let mut events = Vec::new();
        self.run_due(now, &mut events);

        self.frame_count += 1;
        match (frame.view, self.config.lateral_source) {
            (CameraView::Top, LateralSource::TopView) => {
                for (id, lm) in frame.fingertips() {
                    self.detector.record_lateral(id, lm.x, lm.y, now);
                }
            }
            (CameraView::Top, LateralSource::SameView) => {
                trace!("Ignoring top-view frame in same-view mode");
            }
            (CameraView::Side, _) => self.process_side_frame(frame, now, &mut events),
        }

        self.advance_arms(now, &mut events);
        if self.frame_count % 300 == 0 {
            debug!(
                "Pipeline: {} frames, {} notes active",
                self.frame_count,
                self.notes.active_count()
            );
        }
        events
    }

    /// Advance time without a frame: fires due deferred callbacks and cues.
    pub fn tick(&mut self, now_ms: u64) -> Vec<PipelineEvent> {
        let now = self.advance_clock(now_ms);
        let mut events = Vec::new();
        self.run_due(now, &mut events);
        self.advance_arms(now, &mut events);
        events
    }

    /// Apply a user action. Rejected actions come back as a status message.
    pub fn handle(&mut self, command: ControlCommand, now_ms: u64) -> Vec<PipelineEvent> {
        let now = self.advance_clock(now_ms);
        let mut events = Vec::new();
        self.run_due(now, &mut events);
        if let Err(e) = self.apply(command, now, &mut events) {
            warn!("Action rejected: {}", e);
            events.push(PipelineEvent::Status(StatusMessage::Rejected(e.to_string())));
        }
        events
    }

    /// Tear down: cancel deferred work, release every note, forget the
    /// reference plane and region. A restart needs fresh calibration.
    pub fn stop(&mut self, now_ms: u64) -> Vec<PipelineEvent> {
        let now = self.advance_clock(now_ms);
        let mut events = Vec::new();

        let cancelled = self.deferred.cancel_all();
        self.flashes.clear();
        self.recorder.halt();
        for ev in self.notes.release_all(now) {
            self.dispatch(ev, &mut events);
        }
        self.detector.release_all();
        self.detector.reset();
        self.calibration.clear();
        self.latest_signals.clear();
        self.draft = RegionDraft::new();
        if self.region.take().is_some() {
            events.push(PipelineEvent::Renderer(RendererCommand::RegionChanged(None)));
        }
        info!("Pipeline stopped ({} deferred callbacks cancelled)", cancelled);
        events.push(PipelineEvent::Status(StatusMessage::Stopped));
        events
    }

    /// The detector failed or went quiet: nothing can be played, so release
    /// held notes and tell the user.
    pub fn detector_unavailable(&mut self, reason: &str, now_ms: u64) -> Vec<PipelineEvent> {
        let now = self.advance_clock(now_ms);
        let mut events = Vec::new();
        self.detector.release_all();
        let live = self
            .notes
            .release_where(|o| matches!(o, NoteOwner::Point(_)), now);
        for ev in live {
            self.dispatch(ev, &mut events);
        }
        self.latest_signals.clear();
        events.push(PipelineEvent::Status(StatusMessage::DetectorUnavailable(
            reason.to_string(),
        )));
        events
    }

    // ─── Frame processing ───────────────────────────────────────────────

    fn process_side_frame(&mut self, frame: &LandmarkFrame, now: u64, events: &mut Vec<PipelineEvent>) {
        for (idx, hand) in frame.hands.iter().enumerate() {
            if let Some(side) = hand.side {
                self.hand_sides.insert(idx as u8, side);
            }
        }

        let same_view = self.config.lateral_source == LateralSource::SameView;
        let mut seen = HashSet::new();
        self.latest_signals.clear();

        for point in self.tracked_points(frame, now) {
            let id = point.id;
            seen.insert(id);
            self.latest_signals.insert(id, point.signal);
            if same_view {
                self.detector.record_lateral(id, point.x, point.y, now);
            }
            let reference = self.calibration.reference(id);
            match self.detector.update(&point, reference) {
                Some(PressTransition::Pressed(p)) => {
                    trace!("{} down at ({:.3}, {:.3})", p.point, p.x, p.y)
                }
                Some(PressTransition::Released(id)) => trace!("{} up", id),
                None => {}
            }
        }

        for id in self.detector.release_missing(&seen) {
            trace!("{} lost by detector, released", id);
        }

        self.reconcile_live(now, events);
    }

    /// Fingertips of a side frame with their press signal. Points whose
    /// signal isn't finite count as not seen.
    fn tracked_points(&self, frame: &LandmarkFrame, now: u64) -> Vec<TrackedPoint> {
        frame
            .fingertips()
            .filter_map(|(id, lm)| {
                let signal = match self.config.signal_axis {
                    SignalAxis::Y => lm.y,
                    SignalAxis::Z => -lm.z,
                };
                signal
                    .is_finite()
                    .then(|| TrackedPoint::new(id, lm.x, lm.y, signal, now))
            })
            .collect()
    }

    /// Turn held fingertips into note candidates and reconcile.
    fn reconcile_live(&mut self, now: u64, events: &mut Vec<PipelineEvent>) {
        let candidates: Vec<NoteCandidate> = match self.region {
            Some(region) if self.calibration.is_calibrated() => self
                .detector
                .held()
                .into_iter()
                .filter_map(|h| {
                    let hit = region.map(h.lateral.x, h.lateral.y)?;
                    Some(NoteCandidate {
                        note: hit.note,
                        owner: h.id,
                        velocity: self.config.velocity.velocity(h.depth),
                        key_index: hit.key_index,
                    })
                })
                .collect(),
            _ => Vec::new(),
        };

        for ev in self.notes.reconcile(&candidates, now) {
            self.dispatch(ev, events);
        }
    }

    // ─── Deferred work ──────────────────────────────────────────────────

    fn run_due(&mut self, now: u64, events: &mut Vec<PipelineEvent>) {
        for action in self.deferred.poll(now) {
            match action {
                Deferred::CountdownTick { seconds } => {
                    events.push(PipelineEvent::Status(StatusMessage::CalibrationCountdown {
                        seconds,
                    }));
                }
                Deferred::CalibrationCapture => self.capture_calibration(events),
                Deferred::FlashEnd { key_index } => {
                    self.flashes.remove(&key_index);
                    events.push(PipelineEvent::Renderer(RendererCommand::ClearFlash { key_index }));
                }
            }
        }

        for cue in self.recorder.poll(now) {
            match cue {
                PlaybackCue::NoteOn { note, velocity } => {
                    let key = self.region.and_then(|r| r.key_for_note(note));
                    if let Some(ev) = self.notes.press(note, NoteOwner::Playback, velocity, key, now) {
                        self.dispatch(ev, events);
                    }
                }
                PlaybackCue::NoteOff { note } => {
                    if let Some(ev) = self.notes.release(note, NoteOwner::Playback, now) {
                        self.dispatch(ev, events);
                    }
                }
                PlaybackCue::Complete => {
                    let leftovers = self
                        .notes
                        .release_where(|o| o == NoteOwner::Playback, now);
                    for ev in leftovers {
                        self.dispatch(ev, events);
                    }
                    events.push(PipelineEvent::Status(StatusMessage::PlaybackFinished));
                }
            }
        }
    }

    fn capture_calibration(&mut self, events: &mut Vec<PipelineEvent>) {
        let samples: Vec<(PointId, f32)> =
            self.latest_signals.iter().map(|(id, s)| (*id, *s)).collect();
        let status = match self.calibration.capture(samples) {
            Ok(plane) => StatusMessage::Calibrated {
                points: self.calibration.point_count(),
                plane,
            },
            Err(e) => StatusMessage::CalibrationFailed(e.to_string()),
        };
        events.push(PipelineEvent::Status(status));
    }

    // ─── Commands ───────────────────────────────────────────────────────

    fn apply(
        &mut self,
        command: ControlCommand,
        now: u64,
        events: &mut Vec<PipelineEvent>,
    ) -> Result<(), PipelineError> {
        match command {
            ControlCommand::Calibrate { duration_ms } => {
                let duration = duration_ms.unwrap_or(self.config.calibration_ms);
                self.begin_calibration(duration, now, events);
            }
            ControlCommand::DrawRegion(rect) => self.draw_region(rect, now, events)?,
            ControlCommand::BeginRegionDrag { x, y } => {
                if !self.calibration.is_calibrated() {
                    return Err(PipelineError::CalibrationIncomplete);
                }
                self.draft.begin(x, y);
                self.push_preview(events);
            }
            ControlCommand::UpdateRegionDrag { x, y } => {
                if !self.draft.is_active() {
                    return Err(PipelineError::InvalidRegion("no drag in progress".into()));
                }
                self.draft.update(x, y);
                self.push_preview(events);
            }
            ControlCommand::FinishRegionDrag => {
                let rect = self
                    .draft
                    .finish()
                    .ok_or_else(|| PipelineError::InvalidRegion("no drag in progress".into()))?;
                self.draw_region(rect, now, events)?;
            }
            ControlCommand::StartRecording => {
                self.recorder.start_recording(now)?;
                events.push(PipelineEvent::Status(StatusMessage::RecordingStarted));
            }
            ControlCommand::StopRecording => {
                let n = self.recorder.stop_recording()?;
                events.push(PipelineEvent::Status(StatusMessage::RecordingStopped { events: n }));
            }
            ControlCommand::StartPlayback => {
                self.recorder.start_playback(now)?;
                events.push(PipelineEvent::Status(StatusMessage::PlaybackStarted {
                    events: self.recorder.events().len(),
                }));
                // Cues at offset 0 fire right away
                self.run_due(now, events);
            }
            ControlCommand::CancelPlayback => {
                if !self.recorder.is_playing() {
                    return Err(PipelineError::RecorderBusy("not playing"));
                }
                self.recorder.cancel_playback();
                let sounding = self
                    .notes
                    .release_where(|o| o == NoteOwner::Playback, now);
                for ev in sounding {
                    self.dispatch(ev, events);
                }
                events.push(PipelineEvent::Status(StatusMessage::PlaybackCancelled));
            }
            ControlCommand::LoadExercise(notes) => {
                let n = notes.len();
                self.clear_flashes(events);
                let ex = ExerciseValidator::new(notes);
                events.push(PipelineEvent::Status(StatusMessage::ExerciseLoaded { notes: n }));
                events.push(PipelineEvent::Progress(ex.report()));
                self.exercise = Some(ex);
            }
            ControlCommand::ResetExercise => {
                self.clear_flashes(events);
                events.push(PipelineEvent::Status(StatusMessage::ExerciseReset));
                if let Some(ex) = self.exercise.as_mut() {
                    ex.reset();
                    events.push(PipelineEvent::Progress(ex.report()));
                }
            }
            ControlCommand::Stop => {
                let stopped = self.stop(now);
                events.extend(stopped);
            }
        }
        Ok(())
    }

    fn draw_region(
        &mut self,
        rect: RegionRect,
        now: u64,
        events: &mut Vec<PipelineEvent>,
    ) -> Result<(), PipelineError> {
        if !self.calibration.is_calibrated() {
            return Err(PipelineError::CalibrationIncomplete);
        }
        let region = PlayingRegion::new(
            rect,
            self.config.key_count,
            self.config.octave_base,
            self.config.layout,
            self.config.min_region_size,
        )?;
        // Key mapping changes under held fingers: let them go first.
        self.release_live(now, events);
        self.region = Some(region);
        info!(
            "Playing region set: {} keys from note {}",
            region.key_count, region.octave_base
        );
        events.push(PipelineEvent::Renderer(RendererCommand::RegionChanged(Some(rect))));
        events.push(PipelineEvent::Status(StatusMessage::RegionSet(rect)));
        Ok(())
    }

    fn push_preview(&self, events: &mut Vec<PipelineEvent>) {
        if let Some(rect) = self.draft.preview() {
            events.push(PipelineEvent::Renderer(RendererCommand::RegionPreview(rect)));
        }
    }

    fn begin_calibration(&mut self, duration_ms: u64, now: u64, events: &mut Vec<PipelineEvent>) {
        self.deferred.cancel_where(|d| {
            matches!(d, Deferred::CalibrationCapture | Deferred::CountdownTick { .. })
        });
        // References are about to vanish; nothing live may stay held.
        self.release_live(now, events);
        self.detector.release_all();

        let due = self.calibration.begin(duration_ms, now);
        let seconds = duration_ms.div_ceil(1000);
        events.push(PipelineEvent::Status(StatusMessage::CalibrationCountdown { seconds }));
        for s in 1..seconds {
            self.deferred
                .schedule_at(due - s * 1000, Deferred::CountdownTick { seconds: s });
        }
        self.deferred.schedule_at(due, Deferred::CalibrationCapture);
    }

    // ─── Fan-out ────────────────────────────────────────────────────────

    /// Route one note event to every consumer.
    fn dispatch(&mut self, ev: NoteEvent, events: &mut Vec<PipelineEvent>) {
        trace!("{}", ev);
        events.push(PipelineEvent::Note(ev));

        if let Some(key_index) = ev.key_index {
            let track = match ev.owner {
                NoteOwner::Point(p) => Some(p),
                NoteOwner::Playback => None,
            };
            events.push(PipelineEvent::Renderer(RendererCommand::SetKeyVisualState {
                key_index,
                pressed: ev.is_on(),
                track,
            }));
        }

        self.recorder.capture(&ev);
        self.update_arm(&ev);

        if ev.is_on() {
            if let Some(ex) = self.exercise.as_mut() {
                let feedback = ex.on_note_on(ev.note);
                if feedback != Feedback::Ignored {
                    events.push(PipelineEvent::Feedback(feedback));
                    events.push(PipelineEvent::Progress(ex.report()));
                }
                let correct = match feedback {
                    Feedback::Correct { .. } => Some(true),
                    Feedback::Incorrect { .. } => Some(false),
                    _ => None,
                };
                if let (Some(correct), Some(key_index)) = (correct, ev.key_index) {
                    self.flash(key_index, correct, ev.timestamp_ms, events);
                }
            }
        }
    }

    fn flash(&mut self, key_index: usize, correct: bool, now: u64, events: &mut Vec<PipelineEvent>) {
        if let Some(prev) = self.flashes.remove(&key_index) {
            self.deferred.cancel(prev);
        }
        let id = self
            .deferred
            .schedule_in(now, self.config.flash_ms, Deferred::FlashEnd { key_index });
        self.flashes.insert(key_index, id);
        events.push(PipelineEvent::Renderer(RendererCommand::FlashKey { key_index, correct }));
    }

    fn clear_flashes(&mut self, events: &mut Vec<PipelineEvent>) {
        let mut keys: Vec<usize> = self.flashes.keys().copied().collect();
        keys.sort_unstable();
        for key_index in keys {
            if let Some(id) = self.flashes.remove(&key_index) {
                self.deferred.cancel(id);
            }
            events.push(PipelineEvent::Renderer(RendererCommand::ClearFlash { key_index }));
        }
    }

    fn release_live(&mut self, now: u64, events: &mut Vec<PipelineEvent>) {
        let live = self
            .notes
            .release_where(|o| matches!(o, NoteOwner::Point(_)), now);
        for ev in live {
            self.dispatch(ev, events);
        }
    }

    // ─── Arms ───────────────────────────────────────────────────────────

    fn hand_side(&self, hand: u8) -> HandSide {
        self.hand_sides.get(&hand).copied().unwrap_or(if hand == 0 {
            HandSide::Left
        } else {
            HandSide::Right
        })
    }

    fn update_arm(&mut self, ev: &NoteEvent) {
        let NoteOwner::Point(point) = ev.owner else {
            return;
        };
        let Some(key_index) = ev.key_index else {
            return;
        };
        let side = self.hand_side(point.hand);
        if ev.is_on() {
            let key_count = self.region.map(|r| r.key_count).unwrap_or(1);
            let full_depth = match self.config.velocity {
                VelocityMode::Depth { full_depth, .. } => full_depth,
                VelocityMode::Fixed { .. } => self.config.press_threshold * 2.0,
            };
            let depth = self
                .detector
                .held()
                .into_iter()
                .find(|h| h.id == point)
                .map(|h| h.depth)
                .unwrap_or(0.0);
            let reach = if full_depth > 0.0 { depth / full_depth } else { 1.0 };
            self.arms.set_target(side, key_index, key_count, reach);
        } else {
            let hand_still_down = self.notes.active().any(|(_, a)| match a.owner {
                NoteOwner::Point(p) => self.hand_side(p.hand) == side,
                NoteOwner::Playback => false,
            });
            if !hand_still_down {
                self.arms.lift(side);
            }
        }
    }

    fn advance_arms(&mut self, now: u64, events: &mut Vec<PipelineEvent>) {
        let dt = match self.last_advance_ms {
            Some(last) => now.saturating_sub(last),
            None => 0,
        };
        self.last_advance_ms = Some(now);
        if dt == 0 {
            return;
        }
        for (side, pose) in self.arms.advance(dt) {
            events.push(PipelineEvent::Renderer(RendererCommand::ArmTarget { side, pose }));
        }
    }

    /// Time never runs backwards inside the pipeline.
    fn advance_clock(&mut self, ts: u64) -> u64 {
        self.now_ms = self.now_ms.max(ts);
        self.now_ms
    }
}
