use crate::exercise::Feedback;
use crate::pipeline::{PipelineEvent, RendererCommand};
use crate::region::RegionRect;
use crate::types::*;
use crossbeam_channel::Receiver;
use log::{debug, error, info};
use rosc::{OscMessage, OscPacket, OscType};
use std::net::UdpSocket;

/// Forwards pipeline events as OSC over UDP: notes for the synth, renderer
/// commands for the 3D view, feedback and status for any UI listening.
pub struct OscSender {
    rx: Receiver<PipelineEvent>,
    target: String,
    midi_channel: u8,
}

impl OscSender {
    pub fn new(rx: Receiver<PipelineEvent>, target: String, midi_channel: u8) -> Self {
        Self {
            rx,
            target,
            midi_channel,
        }
    }

    /// Run the OSC sender loop. Blocks the calling thread.
    pub fn run(&self) {
        let socket = match UdpSocket::bind("0.0.0.0:0") {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to bind UDP socket: {}", e);
                return;
            }
        };
        info!("OSC sender → {} (MIDI channel {})", self.target, self.midi_channel);

        for event in self.rx.iter() {
            for msg in encode_event(&event, self.midi_channel) {
                if let Err(e) = self.send(&socket, msg) {
                    debug!("OSC send error: {}", e);
                }
            }
        }
        info!("OSC sender shutting down");
    }

    fn send(&self, socket: &UdpSocket, msg: OscMessage) -> Result<(), Box<dyn std::error::Error>> {
        let buf = rosc::encoder::encode(&OscPacket::Message(msg))?;
        socket.send_to(&buf, &self.target)?;
        Ok(())
    }
}

/// OSC messages for one pipeline event.
///
/// | address                       | args                              |
/// |-------------------------------|-----------------------------------|
/// | `/handkeys/note/on`           | channel, note, velocity           |
/// | `/handkeys/note/off`          | channel, note                     |
/// | `/handkeys/key`               | key, pressed (0/1), track ("" = playback) |
/// | `/handkeys/arm/{left,right}`  | lateral, reach                    |
/// | `/handkeys/flash`             | key, correct (0/1)                |
/// | `/handkeys/flash/clear`       | key                               |
/// | `/handkeys/region`            | x0, y0, x1, y1 (none when cleared)|
/// | `/handkeys/region/preview`    | x0, y0, x1, y1 while dragging     |
/// | `/handkeys/exercise/*`        | correct / incorrect / complete    |
/// | `/handkeys/exercise/progress` | completed, total, mistakes, progress, accuracy |
/// | `/handkeys/status`            | text                              |
pub fn encode_event(event: &PipelineEvent, channel: u8) -> Vec<OscMessage> {
    let ch = OscType::Int(channel as i32);
    let int = |v: usize| OscType::Int(v as i32);
    match event {
        PipelineEvent::Note(n) => match n.kind {
            NoteKind::On => vec![msg(
                "/handkeys/note/on",
                vec![ch, int(n.note as usize), int(n.velocity as usize)],
            )],
            NoteKind::Off => vec![msg("/handkeys/note/off", vec![ch, int(n.note as usize)])],
        },
        PipelineEvent::Renderer(cmd) => vec![match cmd {
            RendererCommand::SetKeyVisualState {
                key_index,
                pressed,
                track,
            } => msg(
                "/handkeys/key",
                vec![
                    int(*key_index),
                    int(*pressed as usize),
                    OscType::String(track.map(|p| p.to_string()).unwrap_or_default()),
                ],
            ),
            RendererCommand::ArmTarget { side, pose } => {
                let addr = match side {
                    HandSide::Left => "/handkeys/arm/left",
                    HandSide::Right => "/handkeys/arm/right",
                };
                msg(
                    addr,
                    vec![OscType::Float(pose.lateral), OscType::Float(pose.reach)],
                )
            }
            RendererCommand::FlashKey { key_index, correct } => msg(
                "/handkeys/flash",
                vec![int(*key_index), int(*correct as usize)],
            ),
            RendererCommand::ClearFlash { key_index } => {
                msg("/handkeys/flash/clear", vec![int(*key_index)])
            }
            RendererCommand::RegionChanged(rect) => msg(
                "/handkeys/region",
                rect.as_ref().map(rect_args).unwrap_or_default(),
            ),
            RendererCommand::RegionPreview(rect) => {
                msg("/handkeys/region/preview", rect_args(rect))
            }
        }],
        PipelineEvent::Feedback(fb) => match fb {
            Feedback::Correct { position, note } => vec![msg(
                "/handkeys/exercise/correct",
                vec![int(*position), int(*note as usize)],
            )],
            Feedback::Incorrect {
                position,
                expected,
                played,
            } => vec![msg(
                "/handkeys/exercise/incorrect",
                vec![int(*position), int(*expected as usize), int(*played as usize)],
            )],
            Feedback::Complete { mistakes } => {
                vec![msg("/handkeys/exercise/complete", vec![int(*mistakes)])]
            }
            Feedback::Ignored => Vec::new(),
        },
        PipelineEvent::Progress(p) => vec![msg(
            "/handkeys/exercise/progress",
            vec![
                int(p.completed),
                int(p.total),
                int(p.mistakes),
                OscType::Float(p.progress),
                OscType::Float(p.accuracy),
            ],
        )],
        PipelineEvent::Status(status) => vec![msg(
            "/handkeys/status",
            vec![OscType::String(status.to_string())],
        )],
    }
}

fn rect_args(r: &RegionRect) -> Vec<OscType> {
    [r.x_min, r.y_min, r.x_max, r.y_max]
        .iter()
        .map(|&v| OscType::Float(v))
        .collect()
}

fn msg(addr: &str, args: Vec<OscType>) -> OscMessage {
    OscMessage {
        addr: addr.to_string(),
        args,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arm_pose::ArmPose;
    use crate::exercise::ExerciseProgress;
    use crate::pipeline::StatusMessage;

    fn note(kind: NoteKind) -> PipelineEvent {
        PipelineEvent::Note(NoteEvent {
            note: 64,
            velocity: 90,
            kind,
            timestamp_ms: 0,
            key_index: Some(4),
            owner: NoteOwner::Playback,
        })
    }

    #[test]
    fn test_note_messages() {
        let on = encode_event(&note(NoteKind::On), 2);
        assert_eq!(on.len(), 1);
        assert_eq!(on[0].addr, "/handkeys/note/on");
        assert_eq!(
            on[0].args,
            vec![OscType::Int(2), OscType::Int(64), OscType::Int(90)]
        );
        let off = encode_event(&note(NoteKind::Off), 2);
        assert_eq!(off[0].addr, "/handkeys/note/off");
        assert_eq!(off[0].args, vec![OscType::Int(2), OscType::Int(64)]);
    }

    #[test]
    fn test_renderer_messages() {
        let key = encode_event(
            &PipelineEvent::Renderer(RendererCommand::SetKeyVisualState {
                key_index: 3,
                pressed: true,
                track: Some(PointId::new(0, 1)),
            }),
            0,
        );
        assert_eq!(
            key[0].args,
            vec![
                OscType::Int(3),
                OscType::Int(1),
                OscType::String("h0:index".into())
            ]
        );

        let arm = encode_event(
            &PipelineEvent::Renderer(RendererCommand::ArmTarget {
                side: HandSide::Right,
                pose: ArmPose { lateral: 0.5, reach: 0.25 },
            }),
            0,
        );
        assert_eq!(arm[0].addr, "/handkeys/arm/right");

        let cleared = encode_event(&PipelineEvent::Renderer(RendererCommand::RegionChanged(None)), 0);
        assert_eq!(cleared[0].addr, "/handkeys/region");
        assert!(cleared[0].args.is_empty());

        let preview = encode_event(
            &PipelineEvent::Renderer(RendererCommand::RegionPreview(RegionRect::from_corners(
                (0.5, 0.5),
                (0.25, 0.75),
            ))),
            0,
        );
        assert_eq!(preview[0].addr, "/handkeys/region/preview");
        assert_eq!(preview[0].args[0], OscType::Float(0.25));
    }

    #[test]
    fn test_feedback_and_status() {
        assert!(encode_event(&PipelineEvent::Feedback(Feedback::Ignored), 0).is_empty());
        let wrong = encode_event(
            &PipelineEvent::Feedback(Feedback::Incorrect { position: 2, expected: 64, played: 65 }),
            0,
        );
        assert_eq!(wrong[0].addr, "/handkeys/exercise/incorrect");
        assert_eq!(wrong[0].args.len(), 3);

        let progress = encode_event(
            &PipelineEvent::Progress(ExerciseProgress {
                completed: 3,
                total: 8,
                mistakes: 1,
                progress: 0.375,
                accuracy: 0.75,
            }),
            0,
        );
        assert_eq!(progress[0].addr, "/handkeys/exercise/progress");
        assert_eq!(
            progress[0].args,
            vec![
                OscType::Int(3),
                OscType::Int(8),
                OscType::Int(1),
                OscType::Float(0.375),
                OscType::Float(0.75)
            ]
        );

        let status = encode_event(&PipelineEvent::Status(StatusMessage::Stopped), 0);
        assert_eq!(status[0].args, vec![OscType::String("Stopped".into())]);
    }
}
