//! # gen-session
//!
//! Client-side session state machine for an AI image/video generation
//! backend. Tracks an in-flight job from submission through completion,
//! reconciling push-channel progress events and a poll fallback into one
//! coherent progress signal, alongside persistent user settings and
//! optimistic media state.
//!
//! The crate is split the way the session is:
//! - [`GenerationSettings`] + [`SettingsUpdate`]: user-adjustable
//!   parameters, persisted on every change.
//! - [`GenerationUiState`]: transient view state (generated media,
//!   soft-delete overlay, lightbox, prompt-optimization cache).
//! - [`JobTracker`]: the per-job state machine merging push events
//!   last-write-wins per field, with a stale-id guard for cancellation.
//! - [`ProgressEstimator`]: non-authoritative timer-based progress for
//!   the image-to-video flow (capped at 99% until confirmed).
//! - [`JobClient`]: REST submission/poll plus the WebSocket push channel
//!   with automatic polling fallback.
//! - [`GenerationSession`]: the controller owning all of the above.
//!
//! ## Quick Start
//!
//! ```no_run
//! use gen_session::{
//!     GenerationSession, JobClient, PlanLimits, SessionStore, SettingsUpdate,
//! };
//! use std::time::Duration;
//!
//! # async fn example() -> gen_session::Result<()> {
//! let client = JobClient::new("https://api.example.com");
//! let store = SessionStore::new("/tmp/gen-session");
//! let mut session = GenerationSession::new(client, store, PlanLimits::unlimited());
//!
//! session.update_settings(SettingsUpdate::Prompt("a lighthouse at dusk".into()));
//!
//! let queue_id = session.submit_image("base_v1.safetensors").await?;
//! println!("queued as {queue_id}");
//!
//! session.watch_current_job(Duration::from_secs(300)).await?;
//! for item in session.state().visible_media() {
//!     println!("generated: {}", item.url);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod estimator;
pub mod limits;
pub mod session;
pub mod settings;
pub mod state;
pub mod store;
pub mod tracker;
pub mod types;
pub mod workflow;

pub use client::JobClient;
pub use error::{Result, SessionError};
pub use estimator::{DurationLog, ProgressEstimator, ResolutionBucket, TICK_INTERVAL};
pub use limits::{CapabilityCheck, LimitCheck, PlanLimits};
pub use session::GenerationSession;
pub use settings::{
    GenerationSettings, ImageSize, LoraMode, LoraStrength, SettingsUpdate,
    DEFAULT_NEGATIVE_PROMPT,
};
pub use state::GenerationUiState;
pub use store::{SessionStore, SETTINGS_KEY, UI_STATE_KEY};
pub use tracker::{Applied, JobKind, JobPhase, JobSnapshot, JobTracker, TrackedJob};
pub use types::{
    ImageReceipt, JobOutcome, JobState, Media, PollOutcome, ProgressEvent, QueueSnapshot,
    VideoReceipt, VideoRequest, WorkflowNode,
};
pub use workflow::{sorted_workflow_nodes, WorkflowRequest};
