use std::time::Duration;

use gen_session::*;
use tempfile::tempdir;

fn media(id: &str) -> Media {
    Media {
        id: id.to_string(),
        url: format!("https://cdn.example/{id}.png"),
        mime_type: Some("image/png".to_string()),
        width: Some(1024),
        height: Some(1024),
        created_at: None,
    }
}

fn offline_session(store: SessionStore) -> GenerationSession {
    // Port 9 (discard) is never listening; only offline paths are exercised.
    GenerationSession::new(JobClient::new("http://localhost:9"), store, PlanLimits::unlimited())
}

#[test]
fn test_full_image_job_event_flow() {
    let mut session = offline_session(SessionStore::in_memory());
    session.update_settings(SettingsUpdate::Prompt("a lighthouse at dusk".into()));

    // Server acknowledges the submission.
    let (workflow, _) =
        WorkflowRequest::from_settings(session.settings(), "base_v1.safetensors").build();
    let nodes = sorted_workflow_nodes(&workflow);
    assert_eq!(nodes.len(), 7);

    let mut queued = ProgressEvent::for_job("q1");
    queued.status = Some(JobState::Pending);
    queued.queue_position = Some(2);
    queued.estimated_wait_time = Some(45);

    let mut processing = ProgressEvent::for_job("q1");
    processing.status = Some(JobState::Processing);
    processing.progress = Some(3);
    processing.max_progress = Some(10);
    processing.current_node = Some("5".into());
    processing.workflow_nodes = Some(nodes);

    let mut completed = ProgressEvent::for_job("q1");
    completed.media = Some(vec![media("m1")]);

    // Drive the tracker the way watch_current_job would.
    {
        // No submission went out, so mimic the queue acknowledgement through
        // the event path: an unkeyed session has no active job yet.
        assert_eq!(session.apply_progress_event(queued.clone()), Applied::Ignored);
    }

    // Session-level scenario continues with a tracker-owned job.
    let tracker_scenario = {
        let mut tracker = JobTracker::new();
        tracker.start_preparing(JobKind::Image);
        tracker.mark_queued("q1", JobKind::Image);
        tracker.apply(queued);
        let applied = tracker.apply(processing);
        assert_eq!(applied, Applied::Updated);
        assert_eq!(tracker.phase(), Some(JobPhase::Processing));
        assert_eq!(tracker.job().unwrap().snapshot.percent(), 30);
        assert_eq!(tracker.job().unwrap().snapshot.queue_position, Some(2));
        tracker.apply(completed)
    };
    match tracker_scenario {
        Applied::Completed(items) => assert_eq!(items[0].id, "m1"),
        other => panic!("expected completion, got {other:?}"),
    }
}

#[test]
fn test_settings_and_state_survive_reload() {
    let temp = tempdir().unwrap();

    {
        let mut session = offline_session(SessionStore::new(temp.path()));
        session.update_settings(SettingsUpdate::Prompt("neon alley in the rain".into()));
        session.update_settings(SettingsUpdate::ImageSize(ImageSize::Portrait));
        session.update_settings(SettingsUpdate::LoraSelectionMode(LoraMode::Manual));
        session.toggle_lora("style-ink");
        session.update_lora_strength("style-ink", LoraMode::Manual, Some(0.8));
    }

    let session = offline_session(SessionStore::new(temp.path()));
    assert_eq!(session.settings().prompt, "neon alley in the rain");
    assert_eq!(session.settings().image_size, ImageSize::Portrait);
    assert_eq!(session.settings().custom_width, 832);
    assert_eq!(session.settings().selected_loras, vec!["style-ink"]);
    assert_eq!(
        session.settings().lora_strengths["style-ink"].value,
        0.8
    );
}

#[tokio::test]
async fn test_deleted_overlay_survives_reload() {
    let temp = tempdir().unwrap();

    {
        let mut session = offline_session(SessionStore::new(temp.path()));
        session.append_generated_media(vec![media("m1"), media("m2"), media("m3")]);
        session.delete_recent_media("m2").await;
    }

    let session = offline_session(SessionStore::new(temp.path()));
    let visible: Vec<&str> = session
        .state()
        .visible_media()
        .iter()
        .map(|m| m.id.as_str())
        .collect();
    assert_eq!(visible, vec!["m1", "m3"]);
    assert!(session.state().deleted_media_ids.contains("m2"));
}

#[test]
fn test_progress_card_not_rehydrated_across_sessions() {
    let temp = tempdir().unwrap();

    {
        let mut session = offline_session(SessionStore::new(temp.path()));
        session.append_generated_media(vec![media("m1")]);
        // Simulate a crash mid-generation: the card flag was persisted true.
        let store = SessionStore::new(temp.path());
        let mut state: GenerationUiState = store.load(UI_STATE_KEY).unwrap();
        state.show_progress_card = true;
        store.save(UI_STATE_KEY, &state);
    }

    let session = offline_session(SessionStore::new(temp.path()));
    // The orphaned card must not come back without a tracked job.
    assert!(!session.state().show_progress_card);
}

#[test]
fn test_lightbox_navigation_over_visible_media() {
    let mut state = GenerationUiState::default();
    state.append_media(vec![media("m1"), media("m2"), media("m3")]);
    state.delete_media("m2");

    state.open_lightbox(0);
    state.lightbox_next();
    assert_eq!(state.lightbox_index, 1);
    // Two visible items: next at the end is idempotent.
    state.lightbox_next();
    assert_eq!(state.lightbox_index, 1);
}

#[test]
fn test_default_record_is_exact() {
    let settings = GenerationSettings::default();
    assert_eq!(settings.negative_prompt, DEFAULT_NEGATIVE_PROMPT);
    assert_eq!(settings.image_size, ImageSize::Square);
    assert_eq!(settings.batch_count, 1);
    assert_eq!(settings.cfg_scale, 4.5);
    assert_eq!(settings.steps, 30);
    assert!(settings.seed.is_none());
    assert_eq!(settings.lora_selection_mode, LoraMode::Auto);
}

#[tokio::test]
async fn test_video_submission_fails_cleanly_offline() {
    let mut session = offline_session(SessionStore::in_memory());
    let result = session
        .submit_video(VideoRequest::new("m1"))
        .await;
    assert!(result.is_err());
    assert!(!session.is_generating());
    assert!(!session.state().show_progress_card);
    assert!(session.heuristic_percent().is_none());
}

#[tokio::test]
async fn test_watch_without_job_errors() {
    let mut session = offline_session(SessionStore::in_memory());
    let err = session
        .watch_current_job(Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NoActiveJob));
}

#[test]
fn test_display_message_is_flat() {
    let err = SessionError::InvalidResponse("missing queueId".into());
    assert_eq!(err.display_message(), "Generation failed. Please try again.");

    let limit = SessionError::LimitExceeded {
        requested: 4,
        remaining: 1,
    };
    assert!(limit.display_message().contains("1 remaining"));
}
