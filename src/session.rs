use std::time::Duration;

use log::{debug, warn};

use crate::client::JobClient;
use crate::error::{Result, SessionError};
use crate::estimator::{DurationLog, ProgressEstimator, ResolutionBucket};
use crate::limits::{CapabilityCheck, PlanLimits};
use crate::settings::{GenerationSettings, LoraMode, LoraStrength, SettingsUpdate};
use crate::state::GenerationUiState;
use crate::store::{SessionStore, SETTINGS_KEY, UI_STATE_KEY};
use crate::tracker::{Applied, JobKind, JobTracker, TrackedJob};
use crate::types::{JobOutcome, Media, ProgressEvent, VideoRequest, WorkflowNode};
use crate::workflow::{sorted_workflow_nodes, WorkflowRequest};

/// Owns the whole generation session: settings, transient UI state, the
/// in-flight job tracker, and their persistence.
///
/// All state mutation goes through this controller so every change is
/// followed by an explicit save to the store. I/O-bearing operations
/// (submit, stop, watch, poll) live here too; pure state transitions are
/// synchronous and fully testable without a backend.
pub struct GenerationSession {
    settings: GenerationSettings,
    state: GenerationUiState,
    tracker: JobTracker,
    store: SessionStore,
    limits: PlanLimits,
    client: JobClient,
    estimator: Option<ProgressEstimator>,
    durations: DurationLog,
}

impl GenerationSession {
    /// Create a session, rehydrating settings and UI state from the store
    /// (missing or corrupt entries fall back to defaults).
    pub fn new(client: JobClient, store: SessionStore, limits: PlanLimits) -> Self {
        let settings = store.load(SETTINGS_KEY).unwrap_or_default();
        let mut state: GenerationUiState = store.load(UI_STATE_KEY).unwrap_or_default();
        // A persisted progress card belongs to a job that no longer exists.
        state.show_progress_card = false;
        Self {
            settings,
            state,
            tracker: JobTracker::new(),
            store,
            limits,
            client,
            estimator: None,
            durations: DurationLog::new(),
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn state(&self) -> &GenerationUiState {
        &self.state
    }

    pub fn job(&self) -> Option<&TrackedJob> {
        self.tracker.job()
    }

    pub fn is_generating(&self) -> bool {
        self.tracker.is_generating()
    }

    pub fn limits(&self) -> &PlanLimits {
        &self.limits
    }

    fn persist(&self) {
        self.store.save(SETTINGS_KEY, &self.settings);
        self.store.save(UI_STATE_KEY, &self.state);
    }

    // ── Settings ────────────────────────────────────────────────────

    /// Apply a single-field settings update. Editing the prompt clears the
    /// prompt-optimization cache so the "revert" state never refers to text
    /// the user has since changed.
    pub fn update_settings(&mut self, update: SettingsUpdate) {
        let prompt_changed = self.settings.apply(update);
        if prompt_changed {
            self.state.clear_optimization_cache();
        }
        self.persist();
    }

    /// Restore settings to the fixed default record.
    pub fn reset_settings(&mut self) {
        self.settings.reset();
        self.persist();
    }

    // ── LoRA selection ──────────────────────────────────────────────

    /// Toggle a LoRA in or out of the selection. No-op in auto mode. The
    /// selection list and the strength map change together, keeping them
    /// equal as sets.
    pub fn toggle_lora(&mut self, lora_id: &str) {
        if self.settings.lora_selection_mode == LoraMode::Auto {
            debug!("ignoring toggle of {lora_id} while LoRA selection is automatic");
            return;
        }
        if let Some(pos) = self
            .settings
            .selected_loras
            .iter()
            .position(|id| id == lora_id)
        {
            self.settings.selected_loras.remove(pos);
            self.settings.lora_strengths.remove(lora_id);
        } else {
            self.settings.selected_loras.push(lora_id.to_string());
            self.settings
                .lora_strengths
                .insert(lora_id.to_string(), LoraStrength::default());
        }
        self.persist();
    }

    /// Set a selected LoRA's strength mode, and optionally its value. With
    /// no value the previous one is retained, so mode can change alone.
    /// Ignored for LoRAs that are not currently selected.
    pub fn update_lora_strength(&mut self, lora_id: &str, mode: LoraMode, value: Option<f64>) {
        let Some(entry) = self.settings.lora_strengths.get_mut(lora_id) else {
            debug!("ignoring strength update for unselected LoRA {lora_id}");
            return;
        };
        entry.mode = mode;
        if let Some(value) = value {
            entry.value = value.clamp(0.0, crate::settings::LORA_STRENGTH_MAX);
        }
        self.persist();
    }

    /// Escape hatch for picking a LoRA while selection is automatic: flips
    /// the mode to manual and replaces the entire selection with just this
    /// id at default strength. Any other pending selection is discarded.
    pub fn select_lora_in_auto_mode(&mut self, lora_id: &str) {
        self.settings.lora_selection_mode = LoraMode::Manual;
        self.settings.selected_loras = vec![lora_id.to_string()];
        self.settings.lora_strengths.clear();
        self.settings
            .lora_strengths
            .insert(lora_id.to_string(), LoraStrength::default());
        self.persist();
    }

    // ── Media & lightbox ────────────────────────────────────────────

    /// Optimistically delete a recent media item: the overlay hides it
    /// immediately, then the server request is fired. A server-side failure
    /// is logged and not reflected back into local state.
    pub async fn delete_recent_media(&mut self, media_id: &str) {
        self.state.delete_media(media_id);
        self.persist();

        if let Err(e) = self.client.delete_media(media_id).await {
            warn!("server delete of media {media_id} failed (keeping local delete): {e}");
        }
    }

    /// Append media obtained outside the push channel, e.g. an album fetch
    /// when restoring a session.
    pub fn append_generated_media(&mut self, media: Vec<Media>) {
        self.state.append_media(media);
        self.persist();
    }

    pub fn open_lightbox(&mut self, index: usize) {
        self.state.open_lightbox(index);
        self.persist();
    }

    pub fn close_lightbox(&mut self) {
        self.state.close_lightbox();
        self.persist();
    }

    pub fn lightbox_next(&mut self) {
        self.state.lightbox_next();
        self.persist();
    }

    pub fn lightbox_previous(&mut self) {
        self.state.lightbox_previous();
        self.persist();
    }

    // ── Prompt optimization ─────────────────────────────────────────

    /// Undo a displayed prompt rewrite, restoring the user's original text.
    pub fn revert_prompt_optimization(&mut self) {
        if self.state.original_prompt_before_optimization.is_empty() {
            return;
        }
        self.settings.prompt = self.state.original_prompt_before_optimization.clone();
        self.state.clear_optimization_cache();
        self.persist();
    }

    // ── Submission ──────────────────────────────────────────────────

    /// Submit an image generation job.
    ///
    /// Consults the capability service, optimizes the prompt when enabled,
    /// builds the workflow, and debits the usage counter optimistically
    /// before the request goes out. Returns the server-assigned queue id.
    pub async fn submit_image(&mut self, checkpoint: &str) -> Result<String> {
        let batch = self.settings.batch_count;
        if batch > 1 && !self.limits.can_use_bulk_generation() {
            return Err(SessionError::BulkNotAllowed);
        }
        let check = self.limits.check_generation_limits(batch);
        if !check.allowed {
            return Err(SessionError::LimitExceeded {
                requested: batch,
                remaining: check.remaining.unwrap_or(0),
            });
        }

        self.tracker.start_preparing(JobKind::Image);
        self.state.show_progress_card = true;
        self.persist();

        if self.settings.optimize_prompt && !self.settings.prompt.is_empty() {
            match self.client.optimize_prompt(&self.settings.prompt).await {
                Ok(optimized) => {
                    let original = std::mem::replace(&mut self.settings.prompt, optimized.clone());
                    self.state.note_optimization(&original, &optimized);
                    self.persist();
                }
                Err(e) => {
                    // Optimization is best-effort; the original prompt is
                    // still valid input.
                    warn!("prompt optimization failed, submitting original: {e}");
                }
            }
        }

        let (workflow, _seed) =
            WorkflowRequest::from_settings(&self.settings, checkpoint).build();
        let nodes: Vec<WorkflowNode> = sorted_workflow_nodes(&workflow);

        // Optimistic debit, never rolled back (see note_unreconciled).
        self.limits.debit(batch);

        match self
            .client
            .submit_image(&workflow, self.settings.is_public)
            .await
        {
            Ok(receipt) => {
                self.tracker.mark_queued(&receipt.queue_id, JobKind::Image);
                if let Some(position) = receipt.queue_position {
                    self.tracker.set_queue_position(position);
                }
                self.tracker.set_workflow_nodes(nodes);
                self.persist();
                Ok(receipt.queue_id)
            }
            Err(e) => {
                self.limits.note_unreconciled(batch);
                self.tracker.clear();
                self.state.show_progress_card = false;
                self.persist();
                Err(e)
            }
        }
    }

    /// Submit an image-to-video conversion and start the heuristic progress
    /// estimator. Returns the server-assigned job id.
    pub async fn submit_video(&mut self, request: VideoRequest) -> Result<String> {
        let check = self.limits.check_generation_limits(1);
        if !check.allowed {
            return Err(SessionError::LimitExceeded {
                requested: 1,
                remaining: check.remaining.unwrap_or(0),
            });
        }

        let bucket = self
            .state
            .all_generated_media
            .iter()
            .find(|m| m.id == request.source_media_id)
            .map(|m| ResolutionBucket::from_dimensions(m.width, m.height))
            .unwrap_or(ResolutionBucket::Unknown);

        self.tracker.start_preparing(JobKind::Video);
        self.state.show_progress_card = true;
        self.persist();

        self.limits.debit(1);
        match self.client.submit_video(&request).await {
            Ok(receipt) => {
                let estimated = receipt
                    .estimated_seconds
                    .or_else(|| self.durations.estimate_secs(bucket))
                    .unwrap_or(60);
                self.estimator = Some(ProgressEstimator::new(estimated));
                self.tracker.mark_queued(&receipt.job_id, JobKind::Video);
                self.persist();
                Ok(receipt.job_id)
            }
            Err(e) => {
                self.limits.note_unreconciled(1);
                self.tracker.clear();
                self.state.show_progress_card = false;
                self.persist();
                Err(e)
            }
        }
    }

    // ── Progress reconciliation ─────────────────────────────────────

    /// Feed one push-channel event into the session. Stale events (wrong or
    /// cleared job id) are discarded; a media payload appends to the
    /// generated list and hides the progress card.
    pub fn apply_progress_event(&mut self, event: ProgressEvent) -> Applied {
        let applied = self.tracker.apply(event);
        match &applied {
            Applied::Completed(media) => {
                if !media.is_empty() {
                    self.state.append_media(media.clone());
                }
                self.state.show_progress_card = false;
                if let Some(est) = self.estimator.as_mut() {
                    est.confirm_complete();
                }
                self.persist();
            }
            Applied::Failed(_) => {
                // The card stays up to display the inline error; the
                // generating flag is already off via the tracker phase.
                self.persist();
            }
            Applied::Updated => {
                if let (Some(est), Some(job)) = (self.estimator.as_mut(), self.tracker.job()) {
                    est.observe_real(job.snapshot.percent());
                }
                self.persist();
            }
            Applied::Ignored => {}
        }
        applied
    }

    /// Watch the current job over the push channel until it finishes,
    /// routing every event through [`Self::apply_progress_event`].
    pub async fn watch_current_job(&mut self, timeout: Duration) -> Result<JobOutcome> {
        let job_id = self
            .tracker
            .job_id()
            .ok_or(SessionError::NoActiveJob)?
            .to_string();

        let client = self.client.clone();
        let outcome = {
            // The tracker/state borrow lives inside the callback; the client
            // clone keeps `self` free for it.
            let session = &mut *self;
            client
                .watch_job(&job_id, timeout, |event| {
                    session.apply_progress_event(event);
                })
                .await?
        };

        if let JobOutcome::TimedOut = outcome {
            self.tracker.fail("Timed out waiting for generation");
            self.persist();
        }
        Ok(outcome)
    }

    /// Heuristic progress for the image-to-video flow, if one is running.
    /// Call on a fixed interval (see [`crate::estimator::TICK_INTERVAL`]).
    pub fn heuristic_percent(&mut self) -> Option<u8> {
        self.estimator.as_mut().map(|e| e.percent())
    }

    /// Whether the delayed image-to-video poll window has opened.
    pub fn video_poll_due(&self) -> bool {
        self.estimator.as_ref().map(|e| e.poll_due()).unwrap_or(false)
    }

    /// Run the delayed poll for the tracked video job. Returns generated
    /// media on completion, `None` while the job is still running or the
    /// poll window has not opened yet.
    pub async fn poll_video_if_due(&mut self) -> Result<Option<Vec<Media>>> {
        if !self.video_poll_due() {
            return Ok(None);
        }
        let job_id = self
            .tracker
            .job_id()
            .ok_or(SessionError::NoActiveJob)?
            .to_string();

        let outcome = self.client.poll(&job_id).await?;
        match outcome.status {
            crate::types::JobState::Completed => {
                let bucket = outcome
                    .media
                    .first()
                    .map(|m| ResolutionBucket::from_dimensions(m.width, m.height))
                    .unwrap_or(ResolutionBucket::Unknown);
                if let Some(est) = self.estimator.as_mut() {
                    est.confirm_complete();
                    self.durations.record(bucket, est.elapsed_ms() / 1000);
                }
                self.tracker.complete();
                if !outcome.media.is_empty() {
                    self.state.append_media(outcome.media.clone());
                }
                self.state.show_progress_card = false;
                self.persist();
                Ok(Some(outcome.media))
            }
            crate::types::JobState::Failed => {
                let error = outcome
                    .error
                    .unwrap_or_else(|| "Video conversion failed".to_string());
                self.tracker.fail(error);
                self.estimator = None;
                self.persist();
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    // ── Cancellation ────────────────────────────────────────────────

    /// User-initiated stop. Local state resets to Idle immediately; the
    /// backend is signalled cooperatively and may still emit late events,
    /// which the stale-id guard discards.
    pub async fn stop(&mut self) {
        let job_id = self.tracker.cancel();
        self.estimator = None;
        self.state.show_progress_card = false;
        self.persist();

        if let Some(job_id) = job_id {
            if let Err(e) = self.client.cancel(&job_id).await {
                warn!("cancel signal for job {job_id} failed: {e}");
            }
        }
    }
}
