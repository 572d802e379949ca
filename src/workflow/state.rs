//! The workflow state record and its read-only snapshot.

use crate::error::Step;
use crate::model::{CandidateFile, ConversionResult, DetectedType, FileSummary};
use serde::{Deserialize, Serialize};

/// The user-visible error, tied to the step that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    pub step: Step,
    pub message: String,
}

impl StepError {
    pub fn new(step: Step, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
        }
    }
}

/// Coarse position in the workflow, for presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No file staged.
    Empty,
    /// Waiting for the Type Detection Service.
    Detecting,
    /// File classified; no output format chosen yet.
    AwaitingFormat,
    /// File and format chosen; conversion may be submitted.
    Ready,
    /// Conversion request in flight.
    Converting,
    /// A conversion result is available; only download and reset apply.
    Completed,
}

/// Mutable state owned by the controller. Only the controller's operations
/// touch it, always under its lock.
#[derive(Debug, Default)]
pub(crate) struct WorkflowState {
    /// Bumped by every file selection and reset; async completions carry the
    /// value they were issued under and are dropped on mismatch.
    pub cycle: u64,
    pub file: Option<CandidateFile>,
    pub detected: DetectedType,
    pub detecting: bool,
    pub selected_format: Option<String>,
    pub converting: bool,
    pub downloading: bool,
    pub result: Option<ConversionResult>,
    /// Set once cleanup has been issued for the current result's handle.
    pub handle_spent: bool,
    pub error: Option<StepError>,
}

impl WorkflowState {
    /// Start a new cycle: everything from the previous one is discarded.
    pub fn begin_cycle(&mut self) -> u64 {
        let next = self.cycle + 1;
        *self = WorkflowState {
            cycle: next,
            ..WorkflowState::default()
        };
        next
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            cycle: self.cycle,
            file: self.file.as_ref().map(CandidateFile::summary),
            detected: self.detected,
            detecting: self.detecting,
            selected_format: self.selected_format.clone(),
            converting: self.converting,
            downloading: self.downloading,
            result: self.result.clone(),
            artifact_released: self.handle_spent,
            error: self.error.clone(),
        }
    }
}

/// Read-only view of the workflow at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub cycle: u64,
    pub file: Option<FileSummary>,
    pub detected: DetectedType,
    pub detecting: bool,
    pub selected_format: Option<String>,
    pub converting: bool,
    pub downloading: bool,
    pub result: Option<ConversionResult>,
    /// The result's artifact was downloaded and cleanup has been issued.
    pub artifact_released: bool,
    pub error: Option<StepError>,
}

impl WorkflowSnapshot {
    pub fn phase(&self) -> Phase {
        if self.result.is_some() {
            Phase::Completed
        } else if self.converting {
            Phase::Converting
        } else if self.detecting {
            Phase::Detecting
        } else if self.file.is_none() {
            Phase::Empty
        } else if self.selected_format.is_none() {
            Phase::AwaitingFormat
        } else {
            Phase::Ready
        }
    }

    /// Whether a convert action should be offered.
    pub fn can_convert(&self) -> bool {
        !self.converting
            && self.result.is_none()
            && self.file.is_some()
            && self.selected_format.is_some()
    }

    /// The initial state: nothing staged, nothing detected, no error.
    pub fn is_initial(&self) -> bool {
        self.file.is_none()
            && self.detected == DetectedType::Unknown
            && self.selected_format.is_none()
            && self.result.is_none()
            && self.error.is_none()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file.as_ref().map(|f| f.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DownloadHandle;

    fn staged() -> WorkflowState {
        WorkflowState {
            cycle: 4,
            file: Some(CandidateFile::new("parcels.shp", vec![0u8; 10])),
            detected: DetectedType::Vector,
            selected_format: Some("geojson".into()),
            error: Some(StepError::new(Step::Conversion, "boom")),
            ..WorkflowState::default()
        }
    }

    #[test]
    fn begin_cycle_clears_everything_and_bumps() {
        let mut s = staged();
        s.result = Some(ConversionResult {
            filename: "parcels.geojson".into(),
            message: String::new(),
            input_type: DetectedType::Vector,
            output_format: "geojson".into(),
            download_handle: DownloadHandle::new("/api/download/1_parcels.geojson"),
        });
        s.handle_spent = true;
        let next = s.begin_cycle();
        assert_eq!(next, 5);
        let snap = s.snapshot();
        assert!(snap.is_initial());
        assert!(!snap.artifact_released);
        assert_eq!(snap.cycle, 5);
    }

    #[test]
    fn phase_progression() {
        let mut s = WorkflowState::default();
        assert_eq!(s.snapshot().phase(), Phase::Empty);

        s.file = Some(CandidateFile::new("dem.tif", vec![1u8]));
        s.detecting = true;
        assert_eq!(s.snapshot().phase(), Phase::Detecting);

        s.detecting = false;
        s.detected = DetectedType::Raster;
        assert_eq!(s.snapshot().phase(), Phase::AwaitingFormat);
        assert!(!s.snapshot().can_convert());

        s.selected_format = Some("png".into());
        assert_eq!(s.snapshot().phase(), Phase::Ready);
        assert!(s.snapshot().can_convert());

        s.converting = true;
        assert_eq!(s.snapshot().phase(), Phase::Converting);
        assert!(!s.snapshot().can_convert());
    }

    #[test]
    fn snapshot_carries_file_summary_only() {
        let snap = staged().snapshot();
        assert_eq!(snap.file_name(), Some("parcels.shp"));
        assert_eq!(snap.file.as_ref().unwrap().size, 10);
        assert!(!snap.is_initial());
    }
}
