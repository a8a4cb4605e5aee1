use handkeys::config::{PipelineConfig, VelocityMode};
use handkeys::console_display;
use handkeys::control;
use handkeys::coordinator::{self, InputEvent};
use handkeys::landmark_reader::{LandmarkPlayer, LandmarkReader};
use handkeys::osc_sender;
use handkeys::pipeline::PipelineEvent;
use handkeys::simulator;
use handkeys::types::*;

use clap::Parser;
use crossbeam_channel::bounded;
use log::{error, info};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "handkeys")]
#[command(about = "Play a keyboard on any desk: hand landmarks in, note events out")]
struct Cli {
    /// Pipeline configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    write_config: Option<PathBuf>,

    /// Landmark stream to play (JSONL, "-" for stdin). Simulator when absent.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Simulator frame rate (Hz)
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Read control commands from stdin
    #[arg(long)]
    control: bool,

    /// OSC target address
    #[arg(long, default_value = "127.0.0.1:9000")]
    osc_target: String,

    /// Enable OSC output
    #[arg(long)]
    osc: bool,

    /// Enable console display (terminal TUI, for headless/debug)
    #[arg(long)]
    console: bool,

    /// Console display refresh rate (Hz)
    #[arg(long, default_value_t = 20)]
    display_hz: u32,

    /// Override press threshold
    #[arg(long)]
    threshold: Option<f32>,

    /// Override press cooldown (ms)
    #[arg(long)]
    cooldown_ms: Option<u64>,

    /// Override number of keys on the region
    #[arg(long)]
    keys: Option<usize>,

    /// Override MIDI note of the leftmost key
    #[arg(long)]
    octave_base: Option<u8>,

    /// Fixed note-on velocity (disables depth velocity)
    #[arg(long)]
    velocity: Option<u8>,

    /// Report the detector unavailable after this long without frames (ms)
    #[arg(long, default_value_t = 2000)]
    detector_timeout_ms: u64,
}

impl Cli {
    fn reads_landmarks_from_stdin(&self) -> bool {
        self.input.as_deref().is_some_and(|p| p.as_os_str() == "-")
    }

    fn pipeline_config(&self) -> Result<PipelineConfig, handkeys::error::PipelineError> {
        if self.control && self.reads_landmarks_from_stdin() {
            return Err(handkeys::error::PipelineError::InvalidConfig(
                "--control and --input - both read stdin".into(),
            ));
        }
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(t) = self.threshold {
            config.press_threshold = t;
        }
        if let Some(c) = self.cooldown_ms {
            config.cooldown_ms = c;
        }
        if let Some(k) = self.keys {
            config.key_count = k;
        }
        if let Some(b) = self.octave_base {
            config.octave_base = b;
        }
        if let Some(v) = self.velocity {
            config.velocity = VelocityMode::Fixed { velocity: v };
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let cli = Cli::parse();
    let config = match cli.pipeline_config() {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };

    if let Some(path) = &cli.write_config {
        if let Err(e) = config.save(path) {
            error!("{}", e);
            std::process::exit(1);
        }
        return;
    }

    let clock = SessionClock::new();

    info!("═══════════════════════════════════════════════");
    info!("  HANDKEYS v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "  Keys: {} from {} ({:?})",
        config.total_keys(),
        midi_note_name(config.octave_base),
        config.layout
    );
    info!(
        "  Press: threshold {:.3}, cooldown {}ms",
        config.press_threshold, config.cooldown_ms
    );
    match &cli.input {
        Some(p) => info!("  Input: landmark stream {:?}", p),
        None => info!("  Input: SIMULATOR @ {} fps", cli.fps),
    }
    if cli.osc { info!("  Output: OSC → {}", cli.osc_target); }
    if cli.console { info!("  UI: Console TUI"); }
    info!("═══════════════════════════════════════════════");

    // Channel: inputs → coordinator
    let (input_tx, input_rx) = bounded::<InputEvent>(4096);

    // Channels: coordinator → consumers
    let mut event_txs: Vec<crossbeam_channel::Sender<PipelineEvent>> = Vec::new();

    let mut handles = Vec::new();

    // ─── Console display (opt-in, for headless/debug) ───────────────
    if cli.console {
        let (tx, rx) = bounded::<PipelineEvent>(1024);
        event_txs.push(tx);
        let hz = cli.display_hz;
        let keys = config.total_keys();
        spawn(&mut handles, "display", move || {
            console_display::ConsoleDisplay::new(rx, hz, keys).run();
        });
    }

    // ─── OSC sender ─────────────────────────────────────────────────
    if cli.osc {
        let (tx, rx) = bounded::<PipelineEvent>(4096);
        event_txs.push(tx);
        let target = cli.osc_target.clone();
        let channel = config.midi_channel;
        spawn(&mut handles, "osc", move || {
            osc_sender::OscSender::new(rx, target, channel).run();
        });
    }

    // ─── Coordinator ────────────────────────────────────────────────
    let coord_clock = clock.clone();
    let coord_config = config.clone();
    let stall = cli.detector_timeout_ms;
    spawn(&mut handles, "coordinator", move || {
        coordinator::Coordinator::new(input_rx, event_txs, coord_config, coord_clock)
            .with_tick_interval(Duration::from_millis(10))
            .with_stall_timeout(stall)
            .run();
    });

    // ─── Control surface ────────────────────────────────────────────
    if cli.control {
        let tx = input_tx.clone();
        spawn(&mut handles, "control", move || {
            control::ControlReader::new(io::stdin().lock(), tx).run();
        });
    }

    // ─── Input source ───────────────────────────────────────────────
    match cli.input.clone() {
        Some(path) => {
            let tx = input_tx.clone();
            let in_clock = clock.clone();
            spawn(&mut handles, "landmarks", move || {
                let opened = if path.as_os_str() == "-" {
                    LandmarkReader::open(Box::new(io::stdin().lock()) as Box<dyn io::BufRead>)
                } else {
                    match File::open(&path) {
                        Ok(f) => LandmarkReader::open(Box::new(BufReader::new(f)) as Box<dyn io::BufRead>),
                        Err(e) => Err(e.into()),
                    }
                };
                match opened {
                    Ok(reader) => LandmarkPlayer::new(reader, tx, in_clock).run(),
                    Err(e) => {
                        error!("Failed to open landmark stream {:?}: {}", path, e);
                        let _ = tx.send(InputEvent::DetectorFailed(e.to_string()));
                    }
                }
            });
        }
        None => {
            info!("Starting simulator...");
            let tx = input_tx.clone();
            let sim_clock = clock.clone();
            let fps = cli.fps;
            let keys = config.total_keys();
            let base = config.octave_base;
            spawn(&mut handles, "simulator", move || {
                simulator::Simulator::new(sim_clock, tx, fps, keys)
                    .with_octave_base(base)
                    .run();
            });
        }
    }

    // The coordinator stops once every producer has hung up.
    drop(input_tx);

    info!("Running headless. Press Ctrl+C to stop.");
    for h in handles {
        let _ = h.join();
    }
}

fn spawn<F>(handles: &mut Vec<thread::JoinHandle<()>>, name: &str, f: F)
where
    F: FnOnce() + Send + 'static,
{
    match thread::Builder::new().name(name.into()).spawn(f) {
        Ok(h) => handles.push(h),
        Err(e) => error!("Failed to spawn {} thread: {}", name, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_and_stdin_landmarks_conflict() {
        let cli = Cli::parse_from(["handkeys", "--control", "--input", "-"]);
        assert!(cli.pipeline_config().is_err());

        let cli = Cli::parse_from(["handkeys", "--input", "-"]);
        assert!(cli.pipeline_config().is_ok());
        let cli = Cli::parse_from(["handkeys", "--control", "--input", "take.jsonl"]);
        assert!(cli.pipeline_config().is_ok());
    }

    #[test]
    fn test_overrides_applied_and_validated() {
        let cli = Cli::parse_from(["handkeys", "--keys", "12", "--cooldown-ms", "90"]);
        let config = cli.pipeline_config().unwrap();
        assert_eq!(config.key_count, 12);
        assert_eq!(config.cooldown_ms, 90);

        let cli = Cli::parse_from(["handkeys", "--octave-base", "125"]);
        assert!(cli.pipeline_config().is_err());
    }
}
