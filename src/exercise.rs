//! Scale-practice validator: compares played note-ons against an expected
//! sequence and reports correct/incorrect feedback.

use crate::error::PipelineError;
use log::info;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleKind {
    Major,
    NaturalMinor,
    MajorPentatonic,
    Chromatic,
}

impl ScaleKind {
    fn intervals(self) -> &'static [u8] {
        match self {
            ScaleKind::Major => &[0, 2, 4, 5, 7, 9, 11],
            ScaleKind::NaturalMinor => &[0, 2, 3, 5, 7, 8, 10],
            ScaleKind::MajorPentatonic => &[0, 2, 4, 7, 9],
            ScaleKind::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }
}

impl FromStr for ScaleKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "major" => Ok(ScaleKind::Major),
            "minor" | "natural_minor" => Ok(ScaleKind::NaturalMinor),
            "pentatonic" | "major_pentatonic" => Ok(ScaleKind::MajorPentatonic),
            "chromatic" => Ok(ScaleKind::Chromatic),
            other => Err(PipelineError::Parse(format!("unknown scale: {}", other))),
        }
    }
}

/// Notes of a scale from `root` over `octaves`, ending on the top tonic.
/// With `descend`, the run comes back down to the root.
pub fn scale_notes(kind: ScaleKind, root: u8, octaves: u8, descend: bool) -> Vec<u8> {
    let mut notes = Vec::new();
    for octave in 0..octaves.max(1) {
        for &step in kind.intervals() {
            let n = root as u32 + octave as u32 * 12 + step as u32;
            if n <= 127 {
                notes.push(n as u8);
            }
        }
    }
    let top = root as u32 + octaves.max(1) as u32 * 12;
    if top <= 127 {
        notes.push(top as u8);
    }
    if descend && notes.len() > 1 {
        let back: Vec<u8> = notes.iter().rev().skip(1).copied().collect();
        notes.extend(back);
    }
    notes
}

/// Outcome of one note-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feedback {
    Correct { position: usize, note: u8 },
    Incorrect { position: usize, expected: u8, played: u8 },
    /// First note-on after the sequence was finished.
    Complete { mistakes: usize },
    /// Exercise already reported complete, or none loaded.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mistake {
    pub position: usize,
    pub expected: u8,
    pub played: u8,
}

/// Snapshot of how far along the exercise is, sent after every judged note.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExerciseProgress {
    /// Notes played correctly so far.
    pub completed: usize,
    pub total: usize,
    pub mistakes: usize,
    pub progress: f32,
    pub accuracy: f32,
}

pub struct ExerciseValidator {
    expected: Vec<u8>,
    cursor: usize,
    mistakes: Vec<Mistake>,
    /// Every note-on received, in order.
    history: Vec<u8>,
    completion_reported: bool,
}

impl ExerciseValidator {
    pub fn new(expected: Vec<u8>) -> Self {
        Self {
            expected,
            cursor: 0,
            mistakes: Vec::new(),
            history: Vec::new(),
            completion_reported: false,
        }
    }

    pub fn scale(kind: ScaleKind, root: u8, octaves: u8, descend: bool) -> Self {
        Self::new(scale_notes(kind, root, octaves, descend))
    }

    /// Judge one note-on. Wrong notes never advance the cursor.
    pub fn on_note_on(&mut self, note: u8) -> Feedback {
        if self.expected.is_empty() {
            return Feedback::Ignored;
        }
        if self.cursor >= self.expected.len() {
            if self.completion_reported {
                return Feedback::Ignored;
            }
            self.completion_reported = true;
            info!(
                "Exercise complete: {} notes, {} mistakes",
                self.expected.len(),
                self.mistakes.len()
            );
            return Feedback::Complete {
                mistakes: self.mistakes.len(),
            };
        }

        self.history.push(note);
        let position = self.cursor;
        let expected = self.expected[position];
        if note == expected {
            self.cursor += 1;
            Feedback::Correct { position, note }
        } else {
            self.mistakes.push(Mistake {
                position,
                expected,
                played: note,
            });
            Feedback::Incorrect {
                position,
                expected,
                played: note,
            }
        }
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
        self.mistakes.clear();
        self.history.clear();
        self.completion_reported = false;
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn expected(&self) -> &[u8] {
        &self.expected
    }

    pub fn next_expected(&self) -> Option<u8> {
        self.expected.get(self.cursor).copied()
    }

    pub fn mistakes(&self) -> &[Mistake] {
        &self.mistakes
    }

    pub fn history(&self) -> &[u8] {
        &self.history
    }

    pub fn is_complete(&self) -> bool {
        !self.expected.is_empty() && self.cursor >= self.expected.len()
    }

    /// Fraction of the sequence played correctly so far.
    pub fn progress(&self) -> f32 {
        if self.expected.is_empty() {
            return 0.0;
        }
        self.cursor as f32 / self.expected.len() as f32
    }

    /// Correct notes over all judged notes.
    pub fn accuracy(&self) -> f32 {
        let judged = self.cursor + self.mistakes.len();
        if judged == 0 {
            return 1.0;
        }
        self.cursor as f32 / judged as f32
    }

    pub fn report(&self) -> ExerciseProgress {
        ExerciseProgress {
            completed: self.cursor,
            total: self.expected.len(),
            mistakes: self.mistakes.len(),
            progress: self.progress(),
            accuracy: self.accuracy(),
        }
    }
}
