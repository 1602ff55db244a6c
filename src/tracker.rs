use log::debug;

use crate::types::{JobState, Media, ProgressEvent, WorkflowNode};

/// What kind of job is being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Image,
    Video,
}

/// Lifecycle phase of the tracked job.
///
/// Idle is represented by the tracker holding no job at all. Cancellation
/// also clears the tracker, so Completed and Failed are the only terminal
/// phases that remain visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    /// Submission accepted locally; prompt optimization may be running.
    /// No job id exists yet, so push events cannot apply.
    Preparing,
    /// The server acknowledged the job and assigned an id.
    Queued,
    /// Node-by-node workflow progress is arriving.
    Processing,
    Completed,
    Failed,
}

/// Merged, display-ready view of everything the server has told us about
/// the current job. Fields update last-write-wins as events carry them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobSnapshot {
    pub queue_position: Option<u32>,
    pub estimated_wait_secs: Option<u64>,
    pub progress: u32,
    pub max_progress: u32,
    pub current_node: Option<String>,
    pub current_node_index: Option<u32>,
    pub node_state: Option<String>,
    pub workflow_nodes: Vec<WorkflowNode>,
    /// Server-driven retries, reflected for display only.
    pub retry_count: u32,
    pub is_retrying: bool,
    pub error: Option<String>,
}

impl JobSnapshot {
    /// Progress percentage derived from the step counters.
    pub fn percent(&self) -> u8 {
        if self.max_progress == 0 {
            return 0;
        }
        ((self.progress as u64 * 100) / self.max_progress as u64).min(100) as u8
    }
}

/// The job currently reflected in the UI.
#[derive(Debug, Clone)]
pub struct TrackedJob {
    /// Assigned by the server once queued; `None` while preparing.
    pub job_id: Option<String>,
    pub kind: JobKind,
    pub phase: JobPhase,
    pub snapshot: JobSnapshot,
}

/// What applying a push event did to the tracked job.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// No active job, or the event was keyed to a stale/foreign job id.
    Ignored,
    /// Snapshot fields merged; job still in flight.
    Updated,
    /// The event carried the generated media payload; the job is done.
    Completed(Vec<Media>),
    /// The server reported a terminal failure.
    Failed(String),
}

/// Reconciles push-channel events and poll results into one job view.
///
/// The tracker is the single authority on which job the session currently
/// cares about: events for any other id are discarded, which is what makes
/// cooperative cancellation safe against late-arriving messages.
#[derive(Debug, Default)]
pub struct JobTracker {
    current: Option<TrackedJob>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a job is being tracked (any phase, including terminal).
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Whether the tracked job is still in flight.
    pub fn is_generating(&self) -> bool {
        matches!(
            self.current.as_ref().map(|j| j.phase),
            Some(JobPhase::Preparing | JobPhase::Queued | JobPhase::Processing)
        )
    }

    pub fn job(&self) -> Option<&TrackedJob> {
        self.current.as_ref()
    }

    pub fn job_id(&self) -> Option<&str> {
        self.current.as_ref().and_then(|j| j.job_id.as_deref())
    }

    pub fn phase(&self) -> Option<JobPhase> {
        self.current.as_ref().map(|j| j.phase)
    }

    /// Begin tracking a submission before the server has assigned an id.
    /// Replaces any previously tracked job.
    pub fn start_preparing(&mut self, kind: JobKind) {
        self.current = Some(TrackedJob {
            job_id: None,
            kind,
            phase: JobPhase::Preparing,
            snapshot: JobSnapshot::default(),
        });
    }

    /// Record the server acknowledgement: assign the job id and move to
    /// Queued. Starts tracking if `start_preparing` was skipped.
    pub fn mark_queued(&mut self, job_id: impl Into<String>, kind: JobKind) {
        let job_id = job_id.into();
        match self.current.as_mut() {
            Some(job) if job.phase == JobPhase::Preparing && job.kind == kind => {
                job.job_id = Some(job_id);
                job.phase = JobPhase::Queued;
            }
            _ => {
                self.current = Some(TrackedJob {
                    job_id: Some(job_id),
                    kind,
                    phase: JobPhase::Queued,
                    snapshot: JobSnapshot::default(),
                });
            }
        }
    }

    /// Seed the snapshot with the queue position reported at submission.
    pub fn set_queue_position(&mut self, position: u32) {
        if let Some(job) = self.current.as_mut() {
            job.snapshot.queue_position = Some(position);
        }
    }

    /// Seed the ordered pipeline-step list derived from the workflow.
    pub fn set_workflow_nodes(&mut self, nodes: Vec<WorkflowNode>) {
        if let Some(job) = self.current.as_mut() {
            job.snapshot.workflow_nodes = nodes;
        }
    }

    /// Merge one push event into the tracked job.
    ///
    /// Events carrying a job id different from the tracked one are stale
    /// (or foreign) and ignored. An event without an id applies to the
    /// tracked job, matching the push channel's implicit keying.
    pub fn apply(&mut self, event: ProgressEvent) -> Applied {
        let Some(job) = self.current.as_mut() else {
            debug!("discarding push event with no active job");
            return Applied::Ignored;
        };

        match (&event.job_id, &job.job_id) {
            (Some(event_id), Some(current_id)) if event_id != current_id => {
                debug!("discarding push event for stale job {event_id}");
                return Applied::Ignored;
            }
            (Some(_), None) => {
                // Still preparing: no id has been assigned, so this event
                // cannot belong to us.
                debug!("discarding push event received before queue acknowledgement");
                return Applied::Ignored;
            }
            _ => {}
        }

        // Last-write-wins per field: absent fields keep their prior value.
        let snapshot = &mut job.snapshot;
        if let Some(v) = event.queue_position {
            snapshot.queue_position = Some(v);
        }
        if let Some(v) = event.estimated_wait_time {
            snapshot.estimated_wait_secs = Some(v);
        }
        if let Some(v) = event.progress {
            snapshot.progress = v;
        }
        if let Some(v) = event.max_progress {
            snapshot.max_progress = v;
        }
        if let Some(v) = event.current_node {
            snapshot.current_node = Some(v);
        }
        if let Some(v) = event.current_node_index {
            snapshot.current_node_index = Some(v);
        }
        if let Some(v) = event.node_state {
            snapshot.node_state = Some(v);
        }
        if let Some(v) = event.workflow_nodes {
            snapshot.workflow_nodes = v;
        }
        if let Some(v) = event.retry_count {
            snapshot.retry_count = v;
        }
        if let Some(v) = event.is_retrying {
            snapshot.is_retrying = v;
        }
        if let Some(v) = event.error {
            snapshot.error = Some(v);
        }

        // A media payload completes the job regardless of the status field.
        if let Some(media) = event.media {
            if !media.is_empty() {
                job.phase = JobPhase::Completed;
                return Applied::Completed(media);
            }
        }

        match event.status {
            Some(JobState::Failed) => {
                job.phase = JobPhase::Failed;
                let error = job
                    .snapshot
                    .error
                    .clone()
                    .unwrap_or_else(|| "Generation failed".to_string());
                Applied::Failed(error)
            }
            Some(JobState::Completed) => {
                job.phase = JobPhase::Completed;
                Applied::Completed(Vec::new())
            }
            Some(JobState::Processing) => {
                job.phase = JobPhase::Processing;
                Applied::Updated
            }
            Some(JobState::Pending) => {
                job.phase = JobPhase::Queued;
                Applied::Updated
            }
            None => {
                // Progress fields arriving without an explicit status imply
                // the workflow is running.
                if job.phase == JobPhase::Queued
                    && (event.progress.is_some() || snapshot.current_node.is_some())
                {
                    job.phase = JobPhase::Processing;
                }
                Applied::Updated
            }
        }
    }

    /// Record a terminal failure from a non-push source (submission error,
    /// poll result).
    pub fn fail(&mut self, error: impl Into<String>) {
        if let Some(job) = self.current.as_mut() {
            job.snapshot.error = Some(error.into());
            job.phase = JobPhase::Failed;
        }
    }

    /// Record completion from a non-push source (the delayed poll).
    pub fn complete(&mut self) {
        if let Some(job) = self.current.as_mut() {
            job.phase = JobPhase::Completed;
        }
    }

    /// User-initiated stop: clear to Idle and return the job id so the
    /// caller can signal the backend. Late events for this id will be
    /// discarded by the stale-id guard.
    pub fn cancel(&mut self) -> Option<String> {
        self.current.take().and_then(|j| j.job_id)
    }

    /// Drop the tracked job (after its terminal state has been consumed).
    pub fn clear(&mut self) {
        self.current = None;
    }
}
