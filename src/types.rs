use serde::{Deserialize, Serialize};

/// One generated media item (image or video) as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// RFC 3339 timestamp. Filled in locally if the backend omits it.
    #[serde(default)]
    pub created_at: Option<String>,
}

/// One step of the server-side generation pipeline, shown to the user for
/// progress transparency only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
    pub node_id: String,
    pub class_type: String,
    pub node_title: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Wire-level job status as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A push-channel progress message.
///
/// Every field is optional: a message only carries the fields that changed,
/// and the reconciler merges them last-write-wins per field. Messages are
/// keyed to a job via `job_id`; a missing id applies to the tracked job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProgressEvent {
    pub job_id: Option<String>,
    pub status: Option<JobState>,
    pub queue_position: Option<u32>,
    /// Estimated wait time in seconds while queued.
    pub estimated_wait_time: Option<u64>,
    pub progress: Option<u32>,
    pub max_progress: Option<u32>,
    pub current_node: Option<String>,
    pub current_node_index: Option<u32>,
    pub node_state: Option<String>,
    pub workflow_nodes: Option<Vec<WorkflowNode>>,
    pub retry_count: Option<u32>,
    pub is_retrying: Option<bool>,
    pub error: Option<String>,
    pub media: Option<Vec<Media>>,
}

impl ProgressEvent {
    /// Build an event addressed to a specific job.
    pub fn for_job(job_id: impl Into<String>) -> Self {
        Self {
            job_id: Some(job_id.into()),
            ..Self::default()
        }
    }
}

/// Server acknowledgement for an image generation submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageReceipt {
    pub queue_id: String,
    #[serde(default)]
    pub queue_position: Option<u32>,
}

/// Server acknowledgement for an image-to-video submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoReceipt {
    pub job_id: String,
    /// Expected processing duration; drives the heuristic progress estimator.
    #[serde(default)]
    pub estimated_seconds: Option<u64>,
}

/// An image-to-video conversion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRequest {
    pub source_media_id: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub seed: Option<i64>,
}

impl VideoRequest {
    pub fn new(source_media_id: impl Into<String>) -> Self {
        Self {
            source_media_id: source_media_id.into(),
            prompt: None,
            negative_prompt: None,
            seed: None,
        }
    }
}

/// Result of polling a job's status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOutcome {
    pub status: JobState,
    #[serde(default)]
    pub media: Vec<Media>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Snapshot of the backend's queue (running + pending counts).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub running: u32,
    pub pending: u32,
}

impl QueueSnapshot {
    /// Position a newly queued job would occupy, counting the running slot.
    pub fn next_position(&self) -> u32 {
        self.running + self.pending
    }
}

/// Outcome of waiting for a job to finish.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// The job completed with generated media.
    Completed { media: Vec<Media> },
    /// The backend reported a terminal failure.
    Failed { error: String },
    /// Timed out before completion.
    TimedOut,
}
