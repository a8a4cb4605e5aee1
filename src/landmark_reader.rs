//! JSONL landmark stream reader: parses recorded detector output back into
//! [`LandmarkFrame`]s, and a player that streams them at real-time pace.
//!
//! The first line is a header (`{"format":"handkeys-landmarks", ...}`), then
//! one frame per line. Works with any `BufRead`: files, in-memory buffers,
//! stdin (a live detector process piping its output in).

use crate::coordinator::InputEvent;
use crate::error::PipelineError;
use crate::types::{LandmarkFrame, SessionClock};
use crossbeam_channel::Sender;
use log::{error, info, warn};
use std::io::BufRead;
use std::thread;
use std::time::{Duration, Instant};

pub const FORMAT_TAG: &str = "handkeys-landmarks";

/// Parsed header line.
#[derive(Debug)]
pub struct StreamHeader {
    pub format: String,
    /// Nominal camera rate, informational only
    pub fps: u32,
    /// Free-form detector name
    pub source: String,
    pub raw: serde_json::Value,
}

/// Line-by-line landmark stream reader.
pub struct LandmarkReader<R: BufRead> {
    reader: R,
    pub header: StreamHeader,
    line_buf: String,
}

impl<R: BufRead> LandmarkReader<R> {
    /// Read and validate the header line.
    pub fn open(mut reader: R) -> Result<Self, PipelineError> {
        let mut first_line = String::new();
        reader.read_line(&mut first_line)?;

        let first_line = first_line.trim();
        if first_line.is_empty() {
            return Err(PipelineError::Parse("empty stream".into()));
        }

        let raw: serde_json::Value = serde_json::from_str(first_line)?;
        let format = raw["format"]
            .as_str()
            .ok_or_else(|| PipelineError::Parse("missing \"format\" field".into()))?
            .to_string();
        if format != FORMAT_TAG {
            return Err(PipelineError::Parse(format!("unknown format: {}", format)));
        }

        let fps = raw["fps"].as_u64().unwrap_or(30) as u32;
        let source = raw["source"].as_str().unwrap_or("").to_string();

        Ok(Self {
            reader,
            header: StreamHeader {
                format,
                fps,
                source,
                raw,
            },
            line_buf: String::new(),
        })
    }

    /// Next frame; `None` at EOF, `Err` for an unparseable line.
    pub fn next_frame(&mut self) -> Option<Result<LandmarkFrame, PipelineError>> {
        loop {
            self.line_buf.clear();
            match self.reader.read_line(&mut self.line_buf) {
                Ok(0) => return None,
                Ok(_) => {
                    let trimmed = self.line_buf.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    return Some(serde_json::from_str(trimmed).map_err(PipelineError::from));
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    /// All remaining frames, skipping malformed lines.
    pub fn read_all(mut self) -> Vec<LandmarkFrame> {
        let mut frames = Vec::new();
        while let Some(result) = self.next_frame() {
            if let Ok(frame) = result {
                frames.push(frame);
            }
        }
        frames
    }
}

/// Streams a landmark file into the coordinator as if the detector were live.
///
/// Frames are re-stamped onto the session clock, keeping their original
/// spacing, so replayed input shares a time base with control commands.
pub struct LandmarkPlayer<R: BufRead> {
    reader: LandmarkReader<R>,
    tx: Sender<InputEvent>,
    clock: SessionClock,
}

impl<R: BufRead> LandmarkPlayer<R> {
    pub fn new(reader: LandmarkReader<R>, tx: Sender<InputEvent>, clock: SessionClock) -> Self {
        Self { reader, tx, clock }
    }

    pub fn run(mut self) {
        info!(
            "Landmark stream: source={:?} nominal {} fps",
            self.reader.header.source, self.reader.header.fps
        );

        let start = Instant::now();
        let base_now = self.clock.now_ms();
        let mut first_ts: Option<u64> = None;
        let mut sent: u64 = 0;
        let mut skipped: u64 = 0;

        while let Some(result) = self.reader.next_frame() {
            let mut frame = match result {
                Ok(f) => f,
                Err(e) => {
                    skipped += 1;
                    warn!("Skipping landmark line: {}", e);
                    continue;
                }
            };

            let origin = *first_ts.get_or_insert(frame.timestamp_ms);
            let offset = frame.timestamp_ms.saturating_sub(origin);

            // Pace to real time: wait until this frame's expected send time
            let target = Duration::from_millis(offset);
            let elapsed = start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }

            frame.timestamp_ms = base_now + offset;
            if self.tx.send(InputEvent::Frame(frame)).is_err() {
                // Coordinator shut down
                break;
            }
            sent += 1;
        }

        if sent == 0 {
            error!("Landmark stream ended without a single frame");
            let _ = self
                .tx
                .send(InputEvent::DetectorFailed("landmark stream was empty".into()));
        }
        info!("Landmark stream complete: {} frames, {} skipped", sent, skipped);
    }
}
