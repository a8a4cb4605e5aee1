//! Reference contact plane: per-fingertip signal values captured at the
//! end of a timed countdown while the hands rest on the playing surface.

use crate::error::PipelineError;
use crate::types::PointId;
use log::{info, warn};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationState {
    /// Never calibrated, or cleared by a stop.
    Idle,
    /// Countdown running; the sample is taken at `due_ms`.
    CountingDown { started_ms: u64, due_ms: u64 },
    Calibrated,
}

/// Owns the reference plane.
///
/// Written once per calibration run and read by the press detector for the
/// rest of the session. Starting a new run clears everything first: there is
/// no merging across runs.
pub struct CalibrationManager {
    state: CalibrationState,
    references: HashMap<PointId, f32>,
    plane: Option<f32>,
}

impl CalibrationManager {
    pub fn new() -> Self {
        Self {
            state: CalibrationState::Idle,
            references: HashMap::new(),
            plane: None,
        }
    }

    /// Start the countdown. Returns the time at which the sample is due.
    pub fn begin(&mut self, duration_ms: u64, now_ms: u64) -> u64 {
        self.references.clear();
        self.plane = None;
        let due_ms = now_ms.saturating_add(duration_ms);
        self.state = CalibrationState::CountingDown {
            started_ms: now_ms,
            due_ms,
        };
        info!("Calibration started: sampling in {}ms", duration_ms);
        due_ms
    }

    /// Store the current signal of every visible fingertip as its reference.
    ///
    /// Returns the mean reference value. With no visible points the run
    /// fails and the manager stays uncalibrated.
    pub fn capture<I>(&mut self, samples: I) -> Result<f32, PipelineError>
    where
        I: IntoIterator<Item = (PointId, f32)>,
    {
        self.references = samples
            .into_iter()
            .filter(|(_, s)| s.is_finite())
            .collect();

        if self.references.is_empty() {
            self.plane = None;
            self.state = CalibrationState::Idle;
            warn!("Calibration failed: no fingertips visible");
            return Err(PipelineError::NoVisiblePoints);
        }

        let sum: f32 = self.references.values().sum();
        let mean = sum / self.references.len() as f32;
        self.plane = Some(mean);
        self.state = CalibrationState::Calibrated;
        info!(
            "Calibrated {} fingertips, reference plane = {:.4}",
            self.references.len(),
            mean
        );
        Ok(mean)
    }

    pub fn reference(&self, id: PointId) -> Option<f32> {
        self.references.get(&id).copied()
    }

    /// Mean of all stored references, for display. `None` until calibrated.
    pub fn reference_plane(&self) -> Option<f32> {
        self.plane
    }

    pub fn is_calibrated(&self) -> bool {
        self.state == CalibrationState::Calibrated
    }

    pub fn is_counting_down(&self) -> bool {
        matches!(self.state, CalibrationState::CountingDown { .. })
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// Whole seconds left on the countdown (rounded up), if one is running.
    pub fn seconds_remaining(&self, now_ms: u64) -> Option<u64> {
        match self.state {
            CalibrationState::CountingDown { due_ms, .. } => {
                Some(due_ms.saturating_sub(now_ms).div_ceil(1000))
            }
            _ => None,
        }
    }

    pub fn point_count(&self) -> usize {
        self.references.len()
    }

    pub fn clear(&mut self) {
        self.references.clear();
        self.plane = None;
        self.state = CalibrationState::Idle;
    }
}

impl Default for CalibrationManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(hand: u8, finger: u8) -> PointId {
        PointId::new(hand, finger)
    }

    #[test]
    fn test_uncalibrated_has_no_plane() {
        let cal = CalibrationManager::new();
        assert!(!cal.is_calibrated());
        assert_eq!(cal.reference_plane(), None);
        assert_eq!(cal.reference(p(0, 1)), None);
    }

    #[test]
    fn test_capture_stores_per_point_and_mean() {
        let mut cal = CalibrationManager::new();
        let due = cal.begin(3000, 1000);
        assert_eq!(due, 4000);
        assert!(cal.is_counting_down());
        let mean = cal
            .capture(vec![(p(0, 1), 0.50), (p(0, 2), 0.54), (p(1, 1), 0.46)])
            .unwrap();
        assert!((mean - 0.50).abs() < 1e-6);
        assert!(cal.is_calibrated());
        assert_eq!(cal.reference(p(0, 2)), Some(0.54));
        assert_eq!(cal.point_count(), 3);
    }

    #[test]
    fn test_recalibration_replaces_not_merges() {
        let mut cal = CalibrationManager::new();
        cal.begin(0, 0);
        cal.capture(vec![(p(0, 1), 0.5), (p(0, 2), 0.6)]).unwrap();

        cal.begin(1000, 10);
        assert!(!cal.is_calibrated(), "countdown clears calibrated flag");
        assert_eq!(cal.reference(p(0, 1)), None, "begin clears old references");

        cal.capture(vec![(p(0, 1), 0.7)]).unwrap();
        assert_eq!(cal.reference(p(0, 1)), Some(0.7));
        assert_eq!(cal.reference(p(0, 2)), None, "no carry-over from old run");
        assert_eq!(cal.reference_plane(), Some(0.7));
    }

    #[test]
    fn test_capture_without_points_fails() {
        let mut cal = CalibrationManager::new();
        cal.begin(100, 0);
        let result = cal.capture(Vec::new());
        assert!(matches!(result, Err(PipelineError::NoVisiblePoints)));
        assert!(!cal.is_calibrated());
        assert_eq!(cal.reference_plane(), None);
    }

    #[test]
    fn test_seconds_remaining_rounds_up() {
        let mut cal = CalibrationManager::new();
        cal.begin(3000, 0);
        assert_eq!(cal.seconds_remaining(0), Some(3));
        assert_eq!(cal.seconds_remaining(1), Some(3));
        assert_eq!(cal.seconds_remaining(2001), Some(1));
        assert_eq!(cal.seconds_remaining(3000), Some(0));
        cal.clear();
        assert_eq!(cal.seconds_remaining(0), None);
    }
}
