//! Selection Guard and Detector.
//!
//! Staging a file starts a new cycle and triggers exactly one detection
//! call. A rejected file is dropped entirely rather than left undetected,
//! so the user always sees either a classified file or an empty picker.

use super::state::StepError;
use super::WorkflowController;
use crate::error::{Step, WorkflowError};
use crate::i18n::Message;
use crate::model::{CandidateFile, DetectedType};
use tracing::{info, warn};

impl WorkflowController {
    /// Stage a file (or clear the staged one with `None`).
    ///
    /// With a file: all downstream state is cleared, the file is stored and
    /// the Type Detection Service is called. Resolves to the detected type
    /// once detection has been applied, or to
    /// [`WorkflowError::Superseded`] if another selection or a reset
    /// happened in the meantime.
    ///
    /// With `None`: behaves like [`reset`](Self::reset).
    ///
    /// While a conversion result is pending only `None` is accepted.
    pub async fn select_file(
        &self,
        file: Option<CandidateFile>,
    ) -> Result<DetectedType, WorkflowError> {
        let Some(file) = file else {
            self.reset().await;
            return Ok(DetectedType::Unknown);
        };

        let snapshot = {
            let mut state = self.lock();
            if state.result.is_some() {
                return Err(WorkflowError::ResultPending);
            }
            state.begin_cycle();
            state.file = Some(file.clone());
            state.detecting = true;
            self.publish(&state)
        };
        let cycle = snapshot.cycle;
        info!(
            "Selected {} ({} bytes), detecting type",
            file.name(),
            file.size()
        );
        self.notify(&snapshot);

        self.detect(cycle, &file).await
    }

    /// Remove the staged file. Same as `select_file(None)`.
    pub async fn clear_file(&self) {
        self.reset().await;
    }

    async fn detect(&self, cycle: u64, file: &CandidateFile) -> Result<DetectedType, WorkflowError> {
        let outcome = self.backend().detect_type(file, self.locale()).await;

        let failure = match outcome {
            Ok(kind) if kind.is_known() => {
                return match self.mutate_if_current(cycle, Step::Detection, |s| {
                    s.detected = kind;
                    s.detecting = false;
                }) {
                    Some(()) => {
                        info!("Detected {} as {}", file.name(), kind);
                        Ok(kind)
                    }
                    None => Err(WorkflowError::Superseded),
                };
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Type detection failed for {}: {}", file.name(), e);
                e.detail().map(str::to_string)
            }
        };

        let message =
            failure.unwrap_or_else(|| Message::DetectionFailed.text(self.locale()).to_string());
        let error = WorkflowError::Detection {
            message: message.clone(),
        };
        self.mutate_if_current(cycle, Step::Detection, |s| {
            s.file = None;
            s.detected = DetectedType::Unknown;
            s.detecting = false;
            s.error = Some(StepError::new(Step::Detection, message));
        })
        .map_or(Err(WorkflowError::Superseded), |()| Err(error))
    }
}
