use crate::config::PipelineConfig;
use crate::pipeline::{ControlCommand, Pipeline, PipelineEvent};
use crate::types::*;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, info, trace, warn};
use std::time::Duration;

/// Everything that can arrive at the coordinator.
#[derive(Debug, Clone)]
pub enum InputEvent {
    /// One frame from the hand-pose detector (or a replay / the simulator)
    Frame(LandmarkFrame),
    /// A user action from the configuration surface
    Command(ControlCommand),
    /// The detector could not start or has died
    DetectorFailed(String),
}

/// Owns the [`Pipeline`] and drives it from a single input channel.
///
/// Frames and commands are applied in arrival order. Between inputs the
/// loop wakes every `tick_interval` so deferred work (calibration
/// countdown, playback cues, key flashes) fires on time even when no
/// frames are flowing. Every produced event is fanned out to all
/// consumer channels; a consumer that hung up is skipped.
pub struct Coordinator {
    input_rx: Receiver<InputEvent>,
    event_txs: Vec<Sender<PipelineEvent>>,
    pipeline: Pipeline,
    clock: SessionClock,
    tick_interval: Duration,
    /// Declare the detector unavailable after this long without a frame
    stall_timeout_ms: Option<u64>,
}

impl Coordinator {
    pub fn new(
        input_rx: Receiver<InputEvent>,
        event_txs: Vec<Sender<PipelineEvent>>,
        config: PipelineConfig,
        clock: SessionClock,
    ) -> Self {
        Self {
            input_rx,
            event_txs,
            pipeline: Pipeline::new(config),
            clock,
            tick_interval: Duration::from_millis(10),
            stall_timeout_ms: None,
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Report the detector as unavailable when frames stop for `timeout_ms`.
    pub fn with_stall_timeout(mut self, timeout_ms: u64) -> Self {
        self.stall_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Run until every input sender is dropped, then tear the pipeline down
    /// so no note is left hanging.
    pub fn run(&mut self) {
        info!(
            "Coordinator running (tick {}ms, stall watchdog {})",
            self.tick_interval.as_millis(),
            match self.stall_timeout_ms {
                Some(ms) => format!("{}ms", ms),
                None => "off".to_string(),
            }
        );

        let mut frame_count: u64 = 0;
        let mut last_frame_ms: Option<u64> = None;
        let mut stalled = false;

        loop {
            let events = match self.input_rx.recv_timeout(self.tick_interval) {
                Ok(InputEvent::Frame(frame)) => {
                    frame_count += 1;
                    last_frame_ms = Some(self.clock.now_ms());
                    stalled = false;
                    if frame_count % 1000 == 0 {
                        debug!("Coordinator: {} frames processed", frame_count);
                    }
                    self.pipeline.process_frame(&frame)
                }
                Ok(InputEvent::Command(cmd)) => {
                    debug!("Command: {:?}", cmd);
                    let now = self.clock.now_ms();
                    self.pipeline.handle(cmd, now)
                }
                Ok(InputEvent::DetectorFailed(reason)) => {
                    warn!("Hand detector failed: {}", reason);
                    stalled = true;
                    let now = self.clock.now_ms();
                    self.pipeline.detector_unavailable(&reason, now)
                }
                Err(RecvTimeoutError::Timeout) => {
                    let now = self.clock.now_ms();
                    let mut events = self.pipeline.tick(now);
                    if let (Some(limit), Some(last)) = (self.stall_timeout_ms, last_frame_ms) {
                        if !stalled && now.saturating_sub(last) >= limit {
                            stalled = true;
                            warn!("No detector frames for {}ms", now - last);
                            events.extend(self.pipeline.detector_unavailable(
                                &format!("no frames for {}ms", now - last),
                                now,
                            ));
                        }
                    }
                    events
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };
            self.fan_out(events);
        }

        let now = self.clock.now_ms();
        let events = self.pipeline.stop(now);
        self.fan_out(events);
        info!("Coordinator shutting down after {} frames", frame_count);
    }

    fn fan_out(&self, events: Vec<PipelineEvent>) {
        for ev in events {
            trace!("→ {:?}", ev);
            for tx in &self.event_txs {
                let _ = tx.send(ev.clone());
            }
        }
    }
}
