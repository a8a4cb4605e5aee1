use thiserror::Error;

/// Errors surfaced by the pipeline and its surrounding plumbing.
///
/// Per-frame noise, uncalibrated points and out-of-region positions are not
/// errors: those are silent no-ops inside the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("calibration has not completed yet")]
    CalibrationIncomplete,

    #[error("no fingertips visible at calibration time")]
    NoVisiblePoints,

    #[error("invalid playing region: {0}")]
    InvalidRegion(String),

    #[error("recorder is busy ({0})")]
    RecorderBusy(&'static str),

    #[error("nothing has been recorded")]
    NothingRecorded,

    #[error("recorder is not recording")]
    NotRecording,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("hand detector unavailable: {0}")]
    DetectorUnavailable(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
