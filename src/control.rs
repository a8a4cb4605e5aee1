//! Text control surface: one command per line (stdin, or anything `BufRead`).
//!
//! ```text
//! calibrate [ms]              start the calibration countdown
//! region x0 y0 x1 y1          set the playing region (normalized corners)
//! drag-begin x y | drag-move x y | drag-end
//!                             draw the playing region by dragging
//! record | stop-record        start / stop recording
//! play | cancel               start / cancel playback
//! scale <kind> <root> [octaves] [updown]
//! notes <n> <n> ...           load an explicit exercise
//! reset                       reset the exercise
//! stop                        tear the pipeline down
//! quit                        close the control surface
//! ```

use crate::coordinator::InputEvent;
use crate::error::PipelineError;
use crate::exercise::{scale_notes, ScaleKind};
use crate::pipeline::ControlCommand;
use crate::region::RegionRect;
use crossbeam_channel::Sender;
use log::{info, warn};
use std::io::BufRead;

/// One parsed control line.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlLine {
    Command(ControlCommand),
    Help,
    Quit,
}

pub const HELP: &str = "commands: calibrate [ms] | region x0 y0 x1 y1 | \
drag-begin x y | drag-move x y | drag-end | record | stop-record | \
play | cancel | scale <major|minor|pentatonic|chromatic> <root> [octaves] [updown] | \
notes <n>... | reset | stop | quit";

/// Parse a single line. Blank lines and `#` comments yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ControlLine>, PipelineError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let cmd = match head.to_ascii_lowercase().as_str() {
        "calibrate" | "cal" => {
            let duration_ms = match args.first() {
                Some(a) => Some(parse_num::<u64>(a, "duration")?),
                None => None,
            };
            ControlCommand::Calibrate { duration_ms }
        }
        "region" => {
            if args.len() != 4 {
                return Err(PipelineError::Parse("region needs x0 y0 x1 y1".into()));
            }
            let mut v = [0.0f32; 4];
            for (slot, a) in v.iter_mut().zip(&args) {
                *slot = parse_num::<f32>(a, "coordinate")?;
            }
            ControlCommand::DrawRegion(RegionRect::from_corners((v[0], v[1]), (v[2], v[3])))
        }
        "drag-begin" => {
            let (x, y) = parse_point(&args)?;
            ControlCommand::BeginRegionDrag { x, y }
        }
        "drag-move" => {
            let (x, y) = parse_point(&args)?;
            ControlCommand::UpdateRegionDrag { x, y }
        }
        "drag-end" => ControlCommand::FinishRegionDrag,
        "record" => ControlCommand::StartRecording,
        "stop-record" | "stoprecord" => ControlCommand::StopRecording,
        "play" => ControlCommand::StartPlayback,
        "cancel" => ControlCommand::CancelPlayback,
        "scale" => {
            let kind: ScaleKind = args
                .first()
                .ok_or_else(|| PipelineError::Parse("scale needs a kind".into()))?
                .parse()?;
            let root = match args.get(1) {
                Some(a) => parse_num::<u8>(a, "root")?,
                None => 60,
            };
            let octaves = match args.get(2) {
                Some(a) => parse_num::<u8>(a, "octaves")?,
                None => 1,
            };
            let descend = matches!(args.get(3), Some(&"updown") | Some(&"down"));
            ControlCommand::LoadExercise(scale_notes(kind, root, octaves, descend))
        }
        "notes" => {
            if args.is_empty() {
                return Err(PipelineError::Parse("notes needs at least one note".into()));
            }
            let notes = args
                .iter()
                .map(|a| parse_num::<u8>(a, "note"))
                .collect::<Result<Vec<u8>, _>>()?;
            if let Some(bad) = notes.iter().find(|&&n| n > 127) {
                return Err(PipelineError::Parse(format!("note {} out of MIDI range", bad)));
            }
            ControlCommand::LoadExercise(notes)
        }
        "reset" => ControlCommand::ResetExercise,
        "stop" => ControlCommand::Stop,
        "help" | "?" => return Ok(Some(ControlLine::Help)),
        "quit" | "exit" => return Ok(Some(ControlLine::Quit)),
        other => return Err(PipelineError::Parse(format!("unknown command: {}", other))),
    };
    Ok(Some(ControlLine::Command(cmd)))
}

fn parse_point(args: &[&str]) -> Result<(f32, f32), PipelineError> {
    match args {
        [x, y] => Ok((parse_num(x, "x")?, parse_num(y, "y")?)),
        _ => Err(PipelineError::Parse("expected x y".into())),
    }
}

fn parse_num<T: std::str::FromStr>(s: &str, what: &str) -> Result<T, PipelineError> {
    s.parse()
        .map_err(|_| PipelineError::Parse(format!("bad {}: {}", what, s)))
}

/// Reads control lines and forwards commands to the coordinator.
pub struct ControlReader<R: BufRead> {
    reader: R,
    tx: Sender<InputEvent>,
}

impl<R: BufRead> ControlReader<R> {
    pub fn new(reader: R, tx: Sender<InputEvent>) -> Self {
        Self { reader, tx }
    }

    /// Blocks until EOF, `quit`, or the coordinator going away.
    pub fn run(mut self) {
        info!("Control surface ready ({})", HELP);
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("Control input error: {}", e);
                    break;
                }
            }
            match parse_line(&line) {
                Ok(None) => {}
                Ok(Some(ControlLine::Help)) => info!("{}", HELP),
                Ok(Some(ControlLine::Quit)) => break,
                Ok(Some(ControlLine::Command(cmd))) => {
                    if self.tx.send(InputEvent::Command(cmd)).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("{}", e),
            }
        }
        info!("Control surface closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn cmd(line: &str) -> ControlCommand {
        match parse_line(line) {
            Ok(Some(ControlLine::Command(c))) => c,
            other => panic!("{:?} → {:?}", line, other),
        }
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(cmd("record"), ControlCommand::StartRecording);
        assert_eq!(cmd("  stop-record "), ControlCommand::StopRecording);
        assert_eq!(cmd("PLAY"), ControlCommand::StartPlayback);
        assert_eq!(cmd("cancel"), ControlCommand::CancelPlayback);
        assert_eq!(cmd("reset"), ControlCommand::ResetExercise);
        assert_eq!(cmd("stop"), ControlCommand::Stop);
        assert_eq!(parse_line("quit").unwrap(), Some(ControlLine::Quit));
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("# comment").unwrap(), None);
    }

    #[test]
    fn test_parse_calibrate() {
        assert_eq!(cmd("calibrate"), ControlCommand::Calibrate { duration_ms: None });
        assert_eq!(
            cmd("calibrate 1500"),
            ControlCommand::Calibrate { duration_ms: Some(1500) }
        );
        assert!(parse_line("calibrate soon").is_err());
    }

    #[test]
    fn test_parse_region_normalizes() {
        assert_eq!(
            cmd("region 0.8 0.9 0.2 0.1"),
            ControlCommand::DrawRegion(RegionRect {
                x_min: 0.2,
                y_min: 0.1,
                x_max: 0.8,
                y_max: 0.9
            })
        );
        assert!(parse_line("region 0.1 0.2 0.3").is_err());
        assert!(parse_line("region a b c d").is_err());
    }

    #[test]
    fn test_parse_region_drag() {
        assert_eq!(
            cmd("drag-begin 0.7 0.8"),
            ControlCommand::BeginRegionDrag { x: 0.7, y: 0.8 }
        );
        assert_eq!(
            cmd("drag-move 0.1 0.2"),
            ControlCommand::UpdateRegionDrag { x: 0.1, y: 0.2 }
        );
        assert_eq!(cmd("drag-end"), ControlCommand::FinishRegionDrag);
        assert!(parse_line("drag-begin 0.5").is_err());
        assert!(parse_line("drag-move x 0.5").is_err());
    }

    #[test]
    fn test_parse_exercises() {
        assert_eq!(
            cmd("scale major 60"),
            ControlCommand::LoadExercise(vec![60, 62, 64, 65, 67, 69, 71, 72])
        );
        match cmd("scale minor 57 1 updown") {
            ControlCommand::LoadExercise(n) => {
                assert_eq!(n.len(), 15);
                assert_eq!(n.first(), Some(&57));
                assert_eq!(n.last(), Some(&57));
            }
            other => panic!("{:?}", other),
        }
        assert_eq!(cmd("notes 60 64 67"), ControlCommand::LoadExercise(vec![60, 64, 67]));
        assert!(parse_line("notes 60 200").is_err());
        assert!(parse_line("notes").is_err());
        assert!(parse_line("scale lydian 60").is_err());
    }

    #[test]
    fn test_unknown_command_rejected() {
        match parse_line("dance") {
            Err(PipelineError::Parse(m)) => assert!(m.contains("dance")),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_reader_forwards_until_quit() {
        let input = "calibrate 100\nbogus\nrecord\nquit\nplay\n";
        let (tx, rx) = crossbeam_channel::unbounded();
        ControlReader::new(Cursor::new(input), tx).run();
        let cmds: Vec<ControlCommand> = rx
            .try_iter()
            .filter_map(|ev| match ev {
                InputEvent::Command(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(
            cmds,
            vec![
                ControlCommand::Calibrate { duration_ms: Some(100) },
                ControlCommand::StartRecording,
            ]
        );
    }
}
