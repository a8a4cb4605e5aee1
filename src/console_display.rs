use crate::exercise::Feedback;
use crate::pipeline::{PipelineEvent, RendererCommand};
use crate::types::*;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::time::{Duration, Instant};

const NOTE_LOG_LINES: usize = 8;

/// What the monitor knows, folded from the event stream.
#[derive(Debug, Default)]
pub struct MonitorState {
    pub key_count: usize,
    pub pressed: Vec<bool>,
    /// Per key: Some(true) correct flash, Some(false) wrong flash
    pub flashes: Vec<Option<bool>>,
    pub status: String,
    pub feedback: String,
    pub progress: String,
    pub notes: VecDeque<String>,
    pub region_set: bool,
}

impl MonitorState {
    pub fn new(key_count: usize) -> Self {
        Self {
            key_count,
            pressed: vec![false; key_count],
            flashes: vec![None; key_count],
            ..Default::default()
        }
    }

    pub fn apply(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Note(n) => {
                self.notes.push_back(n.to_string());
                while self.notes.len() > NOTE_LOG_LINES {
                    self.notes.pop_front();
                }
            }
            PipelineEvent::Renderer(RendererCommand::SetKeyVisualState {
                key_index,
                pressed,
                ..
            }) => {
                if let Some(slot) = self.pressed.get_mut(*key_index) {
                    *slot = *pressed;
                }
            }
            PipelineEvent::Renderer(RendererCommand::FlashKey { key_index, correct }) => {
                if let Some(slot) = self.flashes.get_mut(*key_index) {
                    *slot = Some(*correct);
                }
            }
            PipelineEvent::Renderer(RendererCommand::ClearFlash { key_index }) => {
                if let Some(slot) = self.flashes.get_mut(*key_index) {
                    *slot = None;
                }
            }
            PipelineEvent::Renderer(RendererCommand::RegionChanged(rect)) => {
                self.region_set = rect.is_some();
                self.pressed.iter_mut().for_each(|p| *p = false);
            }
            PipelineEvent::Renderer(RendererCommand::ArmTarget { .. })
            | PipelineEvent::Renderer(RendererCommand::RegionPreview(_)) => {}
            PipelineEvent::Feedback(fb) => {
                self.feedback = match fb {
                    Feedback::Correct { position, note } => {
                        format!("#{} {} ✓", position + 1, midi_note_name(*note))
                    }
                    Feedback::Incorrect {
                        position,
                        expected,
                        played,
                    } => format!(
                        "#{} {} ✗ (expected {})",
                        position + 1,
                        midi_note_name(*played),
                        midi_note_name(*expected)
                    ),
                    Feedback::Complete { mistakes } => {
                        format!("exercise complete, {} mistakes", mistakes)
                    }
                    Feedback::Ignored => return,
                };
            }
            PipelineEvent::Progress(p) => {
                self.progress = format!(
                    "{}/{} ({:.0}%), {} mistakes, accuracy {:.0}%",
                    p.completed,
                    p.total,
                    p.progress * 100.0,
                    p.mistakes,
                    p.accuracy * 100.0
                );
            }
            PipelineEvent::Status(s) => self.status = s.to_string(),
        }
    }

    /// One row of key cells: `█` held, `+`/`x` flash, `░` idle.
    pub fn keyboard_row(&self) -> String {
        (0..self.key_count)
            .map(|i| match (self.pressed[i], self.flashes[i]) {
                (true, _) => '█',
                (false, Some(true)) => '+',
                (false, Some(false)) => 'x',
                (false, None) => '░',
            })
            .collect()
    }
}

/// Renders a live ASCII keyboard monitor of the pipeline.
pub struct ConsoleDisplay {
    rx: Receiver<PipelineEvent>,
    update_hz: u32,
    state: MonitorState,
}

impl ConsoleDisplay {
    pub fn new(rx: Receiver<PipelineEvent>, update_hz: u32, key_count: usize) -> Self {
        Self {
            rx,
            update_hz,
            state: MonitorState::new(key_count),
        }
    }

    pub fn run(&mut self) {
        let period = Duration::from_millis(if self.update_hz == 0 {
            50
        } else {
            (1000 / self.update_hz).max(1) as u64
        });
        let mut last_draw = Instant::now();
        let mut dirty = true;
        let mut stdout = io::stdout();

        loop {
            match self.rx.recv_timeout(period) {
                Ok(ev) => {
                    self.state.apply(&ev);
                    dirty = true;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if !dirty || last_draw.elapsed() < period {
                continue;
            }
            last_draw = Instant::now();
            dirty = false;

            // Clear screen and move cursor home
            print!("\x1b[2J\x1b[H");
            println!("╔══════════════════════════════════════════════════════════╗");
            println!("║  HANDKEYS · Live Monitor                                 ║");
            println!("╠══════════════════════════════════════════════════════════╣");
            println!("║  {:<56}║", truncate(&self.state.status, 56));
            println!("║                                                          ║");
            if self.state.region_set {
                println!("║  Keys: {:<50}║", truncate(&self.state.keyboard_row(), 50));
            } else {
                println!("║  Keys: (no playing region)                               ║");
            }
            println!("║  Exercise: {:<46}║", truncate(&self.state.feedback, 46));
            println!("║  Progress: {:<46}║", truncate(&self.state.progress, 46));
            println!("║                                                          ║");
            println!("║  Recent notes:                                           ║");
            for line in &self.state.notes {
                println!("║    {:<54}║", truncate(line, 54));
            }
            println!("╚══════════════════════════════════════════════════════════╝");
            let _ = stdout.flush();
        }
    }
}

/// Truncate by char count to avoid splitting multi-byte chars.
fn truncate(s: &str, width: usize) -> String {
    s.chars().take(width).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercise::ExerciseProgress;
    use crate::pipeline::StatusMessage;
    use crate::region::RegionRect;

    #[test]
    fn test_keyboard_row_tracks_events() {
        let mut st = MonitorState::new(4);
        st.apply(&PipelineEvent::Renderer(RendererCommand::RegionChanged(Some(
            RegionRect::from_corners((0.1, 0.1), (0.9, 0.9)),
        ))));
        st.apply(&PipelineEvent::Renderer(RendererCommand::SetKeyVisualState {
            key_index: 1,
            pressed: true,
            track: None,
        }));
        st.apply(&PipelineEvent::Renderer(RendererCommand::FlashKey { key_index: 3, correct: false }));
        // Out-of-range keys are ignored
        st.apply(&PipelineEvent::Renderer(RendererCommand::FlashKey { key_index: 9, correct: true }));
        assert_eq!(st.keyboard_row(), "░█░x");

        st.apply(&PipelineEvent::Renderer(RendererCommand::ClearFlash { key_index: 3 }));
        assert_eq!(st.keyboard_row(), "░█░░");
        assert!(st.region_set);
    }

    #[test]
    fn test_note_log_is_bounded() {
        let mut st = MonitorState::new(1);
        for t in 0..20 {
            st.apply(&PipelineEvent::Note(NoteEvent {
                note: 60,
                velocity: 100,
                kind: NoteKind::On,
                timestamp_ms: t,
                key_index: None,
                owner: NoteOwner::Playback,
            }));
        }
        assert_eq!(st.notes.len(), NOTE_LOG_LINES);
        assert!(st.notes.back().unwrap().contains("C4"));
    }

    #[test]
    fn test_status_and_feedback_text() {
        let mut st = MonitorState::new(1);
        st.apply(&PipelineEvent::Status(StatusMessage::RecordingStarted));
        assert_eq!(st.status, "Recording…");
        st.apply(&PipelineEvent::Feedback(Feedback::Incorrect { position: 0, expected: 60, played: 61 }));
        assert!(st.feedback.contains("C#4"));
        st.apply(&PipelineEvent::Feedback(Feedback::Ignored));
        assert!(st.feedback.contains("C#4"), "ignored feedback leaves the line alone");
    }

    #[test]
    fn test_progress_line() {
        let mut st = MonitorState::new(1);
        st.apply(&PipelineEvent::Progress(ExerciseProgress {
            completed: 3,
            total: 8,
            mistakes: 1,
            progress: 0.375,
            accuracy: 0.75,
        }));
        assert_eq!(st.progress, "3/8 (38%), 1 mistakes, accuracy 75%");
    }
}
