//! Pick, upload, then index.
//!
//! One attempt moves `Idle -> Picking -> Picked -> Uploading -> Saved | Failed`.
//! `Failed` settles back to `Picked` with the selection kept for a retry;
//! `Saved` settles back to `Idle` with the selection cleared. The outcome
//! stays readable through [`UploadPipeline::last_outcome`]. The index record
//! is written only after the media endpoint accepted the binary and
//! returned its URL.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::auth::SessionFeed;
use crate::collections::MediaLibrary;
use crate::error::{Error, Result};
use crate::media::{mime_type_for, upload_file_name, MediaEndpoint, UploadRequest};
use crate::models::MediaItem;
use crate::picker::{MediaPicker, Permission, PickedFile};
use crate::store::DocumentStore;

const PERMISSION_MESSAGE: &str = "Media library access is required to pick files.";
const NO_SELECTION_MESSAGE: &str = "No media selected";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Idle,
    Picking,
    Picked,
    Uploading,
    Saved,
    Failed,
}

#[derive(Debug)]
struct PipelineState {
    phase: UploadPhase,
    selection: Option<PickedFile>,
    /// `Saved` or `Failed` for the most recent finished upload.
    last_outcome: Option<UploadPhase>,
}

impl PipelineState {
    /// Where the pipeline rests once nothing is in progress.
    const fn resting_phase(&self) -> UploadPhase {
        if self.selection.is_some() {
            UploadPhase::Picked
        } else {
            UploadPhase::Idle
        }
    }
}

pub struct UploadPipeline<P: MediaPicker, S: DocumentStore + ?Sized + 'static> {
    picker: P,
    endpoint: Arc<dyn MediaEndpoint>,
    library: Arc<MediaLibrary<S>>,
    feed: SessionFeed,
    state: Arc<Mutex<PipelineState>>,
}

impl<P: MediaPicker, S: DocumentStore + ?Sized + 'static> UploadPipeline<P, S> {
    pub fn new(
        picker: P,
        endpoint: Arc<dyn MediaEndpoint>,
        library: Arc<MediaLibrary<S>>,
        feed: SessionFeed,
    ) -> Self {
        Self {
            picker,
            endpoint,
            library,
            feed,
            state: Arc::new(Mutex::new(PipelineState {
                phase: UploadPhase::Idle,
                selection: None,
                last_outcome: None,
            })),
        }
    }

    pub fn phase(&self) -> UploadPhase {
        self.lock().phase
    }

    pub fn selection(&self) -> Option<PickedFile> {
        self.lock().selection.clone()
    }

    /// How the last finished upload ended, until the next pick or clear.
    pub fn last_outcome(&self) -> Option<UploadPhase> {
        self.lock().last_outcome
    }

    /// Drops the selection. Not allowed while an upload is running.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.lock();
        if state.phase == UploadPhase::Uploading {
            return Err(Error::Busy("upload".to_string()));
        }
        state.selection = None;
        state.last_outcome = None;
        state.phase = UploadPhase::Idle;
        Ok(())
    }

    /// Asks for media-library access, then lets the user choose a file.
    ///
    /// Returns `Ok(None)` when the user cancelled; any earlier selection is
    /// kept in that case.
    pub async fn pick(&self) -> Result<Option<PickedFile>> {
        {
            let mut state = self.lock();
            if matches!(state.phase, UploadPhase::Picking | UploadPhase::Uploading) {
                return Err(Error::Busy("pick".to_string()));
            }
            state.phase = UploadPhase::Picking;
            state.last_outcome = None;
        }
        let reset = PhaseReset::arm(&self.state);
        let picked = self.select_with_permission().await;
        reset.disarm();

        let mut state = self.lock();
        match picked {
            Ok(Some(file)) => {
                tracing::info!("Media picked successfully: {}", file.path.display());
                state.selection = Some(file.clone());
                state.phase = UploadPhase::Picked;
                Ok(Some(file))
            }
            Ok(None) => {
                tracing::info!("Media selection canceled");
                state.phase = state.resting_phase();
                Ok(None)
            }
            Err(error) => {
                tracing::error!("Error picking media: {}", error);
                state.phase = state.resting_phase();
                Err(error)
            }
        }
    }

    /// Uploads the selection and indexes it for the signed-in user.
    pub async fn upload(&self) -> Result<MediaItem> {
        let (file, owner) = {
            let mut state = self.lock();
            if matches!(state.phase, UploadPhase::Picking | UploadPhase::Uploading) {
                return Err(Error::Busy("upload".to_string()));
            }
            let owner = self.feed.current_user_id().ok_or(Error::NotSignedIn)?;
            let file = state
                .selection
                .clone()
                .ok_or_else(|| Error::InvalidInput(NO_SELECTION_MESSAGE.to_string()))?;
            state.phase = UploadPhase::Uploading;
            (file, owner)
        };
        let reset = PhaseReset::arm(&self.state);
        let result = self.upload_and_index(&file, &owner).await;
        reset.disarm();

        let mut state = self.lock();
        let outcome = match &result {
            Ok(item) => {
                tracing::info!("Media uploaded and saved: {}", item.url);
                state.selection = None;
                UploadPhase::Saved
            }
            Err(error) => {
                tracing::error!("Error uploading media: {}", error);
                UploadPhase::Failed
            }
        };
        state.last_outcome = Some(outcome);
        state.phase = state.resting_phase();
        result
    }

    async fn select_with_permission(&self) -> Result<Option<PickedFile>> {
        if self.picker.request_permission().await? == Permission::Denied {
            return Err(Error::PermissionDenied(PERMISSION_MESSAGE.to_string()));
        }
        self.picker.select().await
    }

    async fn upload_and_index(&self, file: &PickedFile, owner: &str) -> Result<MediaItem> {
        let bytes = file.read().await?;
        let request = UploadRequest {
            bytes,
            file_name: upload_file_name(file.extension()),
            mime_type: mime_type_for(&file.path).to_string(),
            folder: owner.to_string(),
        };
        let uploaded = self.endpoint.upload(request).await?;

        self.library
            .record_upload(owner, &uploaded.secure_url, &file.name)
            .await
            .map_err(|error| {
                tracing::warn!(
                    "Binary stored at {} but its index record was not written: {}",
                    uploaded.secure_url,
                    error
                );
                error
            })
    }

    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        lock_state(&self.state)
    }
}

/// Puts the pipeline back at rest if an attempt is dropped mid-flight.
struct PhaseReset {
    state: Arc<Mutex<PipelineState>>,
    armed: bool,
}

impl PhaseReset {
    fn arm(state: &Arc<Mutex<PipelineState>>) -> Self {
        Self {
            state: Arc::clone(state),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PhaseReset {
    fn drop(&mut self) {
        if self.armed {
            let mut state = lock_state(&self.state);
            state.phase = state.resting_phase();
        }
    }
}

fn lock_state(state: &Mutex<PipelineState>) -> MutexGuard<'_, PipelineState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
