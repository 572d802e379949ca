//! Conversion Orchestrator: convert, download, cleanup and reset.
//!
//! A successful conversion is terminal for its cycle. The artifact it names
//! can be downloaded once; cleanup is issued right after the bytes arrive
//! and from then on the handle is spent.
//!
//! A convert or download future that is dropped before it completes clears
//! its in-flight flag on the way out, so the step can be issued again.

use super::state::StepError;
use super::WorkflowController;
use crate::error::{Step, ValidationError, WorkflowError};
use crate::i18n::Message;
use crate::model::{Artifact, ConversionResult, DownloadHandle, SavedArtifact};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A download in progress: the cycle it was issued under and what it fetches.
struct Claim {
    cycle: u64,
    handle: DownloadHandle,
    filename: String,
}

/// Clears the in-flight flag of `step` for `cycle` when dropped, unless the
/// call already settled it.
struct InFlight<'a> {
    controller: &'a WorkflowController,
    cycle: u64,
    step: Step,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let snapshot = {
            let mut state = self.controller.lock();
            if state.cycle != self.cycle {
                return;
            }
            let flag = match self.step {
                Step::Conversion => &mut state.converting,
                Step::Download => &mut state.downloading,
                Step::Selection | Step::Detection | Step::FormatSelection => return,
            };
            if !*flag {
                return;
            }
            *flag = false;
            self.controller.publish(&state)
        };
        debug!("{} abandoned by its caller in cycle {}", self.step, self.cycle);
        self.controller.notify(&snapshot);
    }
}

impl WorkflowController {
    /// Submit the staged file for conversion to the selected format.
    ///
    /// Missing inputs fail locally with a [`WorkflowError::Validation`] and
    /// never reach the network. A remote failure keeps the file, type and
    /// format so the call can simply be repeated.
    pub async fn convert(&self) -> Result<ConversionResult, WorkflowError> {
        let (cycle, file, format, snapshot) = {
            let mut state = self.lock();
            if state.result.is_some() {
                return Err(WorkflowError::ResultPending);
            }
            if state.converting {
                return Err(WorkflowError::Busy {
                    step: Step::Conversion,
                });
            }
            let (file, format) = match (state.file.clone(), state.selected_format.clone()) {
                (Some(file), Some(format)) => (file, format),
                (file, _) => {
                    let (kind, key) = if file.is_none() {
                        (ValidationError::NoFile, Message::SelectFileFirst)
                    } else {
                        (ValidationError::NoFormat, Message::SelectFormatFirst)
                    };
                    let message = key.text(self.locale()).to_string();
                    state.error = Some(StepError::new(Step::Conversion, message.clone()));
                    let snapshot = self.publish(&state);
                    drop(state);
                    self.notify(&snapshot);
                    debug!("Conversion refused: {}", kind);
                    return Err(WorkflowError::Validation { kind, message });
                }
            };
            state.converting = true;
            state.error = None;
            state.result = None;
            (state.cycle, file, format, self.publish(&state))
        };
        self.notify(&snapshot);
        let _in_flight = InFlight {
            controller: self,
            cycle,
            step: Step::Conversion,
        };
        info!("Converting {} to {}", file.name(), format);

        match self.backend().convert(&file, &format, self.locale()).await {
            Ok(result) => {
                let stored = self.mutate_if_current(cycle, Step::Conversion, |s| {
                    s.result = Some(result.clone());
                    s.handle_spent = false;
                    s.converting = false;
                });
                match stored {
                    Some(()) => {
                        info!(
                            "Converted {} -> {} ({})",
                            file.name(),
                            result.filename,
                            result.download_handle
                        );
                        Ok(result)
                    }
                    None => {
                        if self.inner.cleanup_on_reset {
                            self.cleanup(&result.download_handle).await;
                        }
                        Err(WorkflowError::Superseded)
                    }
                }
            }
            Err(e) => {
                warn!("Conversion of {} failed: {}", file.name(), e);
                let message = e
                    .detail()
                    .map(str::to_string)
                    .unwrap_or_else(|| Message::ConversionError.text(self.locale()).to_string());
                let error = WorkflowError::Conversion {
                    message: message.clone(),
                };
                self.mutate_if_current(cycle, Step::Conversion, |s| {
                    s.converting = false;
                    s.error = Some(StepError::new(Step::Conversion, message));
                })
                .map_or(Err(WorkflowError::Superseded), |()| Err(error))
            }
        }
    }

    /// Retrieve the converted artifact, then release it on the server.
    ///
    /// A failed retrieval leaves the workflow untouched and may be retried.
    /// Cleanup failures are logged and reported to the observer only.
    pub async fn download(&self) -> Result<Artifact, WorkflowError> {
        let claim = self.claim_download()?;
        let _in_flight = self.in_flight(&claim);
        let bytes = self.fetch(&claim).await?;
        self.release(&claim).await;
        Ok(Artifact {
            filename: claim.filename,
            bytes,
        })
    }

    /// Like [`download`](Self::download), writing the artifact into `dir`
    /// under the server-suggested file name.
    ///
    /// The file appears atomically. If it cannot be written the artifact is
    /// not released, so the call can be repeated with another directory.
    pub async fn download_to(&self, dir: impl AsRef<Path>) -> Result<SavedArtifact, WorkflowError> {
        let claim = self.claim_download()?;
        let _in_flight = self.in_flight(&claim);
        let bytes = self.fetch(&claim).await?;

        let target = dir.as_ref().join(save_name(&claim));
        if let Err(reason) = write_atomic(&target, &bytes).await {
            warn!("Failed to save {}: {}", target.display(), reason);
            self.mutate_if_current(claim.cycle, Step::Download, |s| s.downloading = false);
            return Err(WorkflowError::SaveFailed {
                path: target,
                reason,
            });
        }
        info!("Saved {} ({} bytes)", target.display(), bytes.len());

        self.release(&claim).await;
        Ok(SavedArtifact {
            path: target,
            size: bytes.len() as u64,
        })
    }

    /// Return to the initial state.
    ///
    /// Any outstanding remote call becomes stale. With cleanup on reset
    /// enabled, a converted artifact whose handle is not yet spent is
    /// released, including one a download is still fetching; that download
    /// then completes as superseded and issues no cleanup of its own.
    pub async fn reset(&self) {
        let orphan = self.mutate(|s| {
            let orphan = s
                .result
                .as_ref()
                .filter(|_| !s.handle_spent)
                .map(|r| r.download_handle.clone());
            s.begin_cycle();
            orphan
        });
        info!("Workflow reset");

        if let Some(handle) = orphan {
            if self.inner.cleanup_on_reset {
                debug!("Releasing undownloaded artifact {}", handle);
                self.cleanup(&handle).await;
            } else {
                debug!("Leaving undownloaded artifact {} to server expiry", handle);
            }
        }
    }

    fn claim_download(&self) -> Result<Claim, WorkflowError> {
        let (claim, snapshot) = {
            let mut state = self.lock();
            if state.downloading {
                return Err(WorkflowError::Busy {
                    step: Step::Download,
                });
            }
            let Some(result) = state.result.as_ref() else {
                return Err(WorkflowError::NoResult);
            };
            if state.handle_spent {
                return Err(WorkflowError::HandleSpent {
                    handle: result.download_handle.to_string(),
                });
            }
            let claim = Claim {
                cycle: state.cycle,
                handle: result.download_handle.clone(),
                filename: result.filename.clone(),
            };
            state.downloading = true;
            (claim, self.publish(&state))
        };
        self.notify(&snapshot);
        Ok(claim)
    }

    fn in_flight(&self, claim: &Claim) -> InFlight<'_> {
        InFlight {
            controller: self,
            cycle: claim.cycle,
            step: Step::Download,
        }
    }

    async fn fetch(&self, claim: &Claim) -> Result<Vec<u8>, WorkflowError> {
        debug!("Downloading {}", claim.handle);
        let outcome = self.backend().download_artifact(&claim.handle).await;

        let current = match &outcome {
            Ok(_) => {
                let current = self.is_current(claim.cycle);
                if !current {
                    debug!("Discarding stale download from cycle {}", claim.cycle);
                    self.inner
                        .observer
                        .on_stale_completion(Step::Download, claim.cycle);
                }
                current
            }
            Err(_) => self
                .mutate_if_current(claim.cycle, Step::Download, |s| s.downloading = false)
                .is_some(),
        };
        if !current {
            return Err(WorkflowError::Superseded);
        }

        outcome.map_err(|e| {
            warn!("Download of {} failed: {}", claim.handle, e);
            WorkflowError::Download {
                message: Message::DownloadFailed.text(self.locale()).to_string(),
            }
        })
    }

    /// Mark the handle spent and issue its cleanup. If a reset ended the
    /// cycle meanwhile, the cleanup is left to that reset unless cleanup on
    /// reset is disabled.
    async fn release(&self, claim: &Claim) {
        let current = self
            .mutate_if_current(claim.cycle, Step::Download, |s| {
                s.handle_spent = true;
                s.downloading = false;
            })
            .is_some();
        if current || !self.inner.cleanup_on_reset {
            self.cleanup(&claim.handle).await;
        }
    }

    fn is_current(&self, cycle: u64) -> bool {
        self.lock().cycle == cycle
    }

    /// Best-effort deletion of a server-held artifact. Never fails.
    async fn cleanup(&self, handle: &DownloadHandle) {
        let Some(id) = handle.artifact_id() else {
            warn!("Cannot derive an artifact id from '{}', skipping cleanup", handle);
            return;
        };
        match self.backend().cleanup_artifact(&id).await {
            Ok(()) => debug!("Released artifact {}", id),
            Err(e) => {
                warn!("Cleanup of artifact {} failed: {}", id, e);
                self.inner.observer.on_cleanup_failed(&id, &e);
            }
        }
    }
}

/// File name to save under: the last component of the server's name, or the
/// artifact id if that is unusable.
fn save_name(claim: &Claim) -> String {
    Path::new(&claim.filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .map(str::to_string)
        .or_else(|| claim.handle.artifact_id().map(|id| id.as_str().to_string()))
        .unwrap_or_else(|| "converted".to_string())
}

/// Write through a sibling temp file and rename, so `target` is never partial.
async fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), String> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }
    let tmp: PathBuf = match target.file_name() {
        Some(name) => target.with_file_name(format!(".{}.part", name.to_string_lossy())),
        None => return Err("target has no file name".to_string()),
    };
    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.to_string());
    }
    tokio::fs::rename(&tmp, target)
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(filename: &str, handle: &str) -> Claim {
        Claim {
            cycle: 1,
            handle: DownloadHandle::new(handle),
            filename: filename.into(),
        }
    }

    #[test]
    fn save_name_strips_directories() {
        let c = claim("../../etc/parcels.geojson", "/api/download/7_parcels.geojson");
        assert_eq!(save_name(&c), "parcels.geojson");
    }

    #[test]
    fn save_name_falls_back_to_artifact_id() {
        let c = claim("..", "/api/download/7_parcels.geojson");
        assert_eq!(save_name(&c), "7_parcels.geojson");
        let c = claim("", "/");
        assert_eq!(save_name(&c), "converted");
    }

    #[tokio::test]
    async fn write_atomic_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("out.tif");
        write_atomic(&target, b"II*\0").await.unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"II*\0");
        let leftovers: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
