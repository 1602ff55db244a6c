//! Offline walkthrough of the progress reconciler and the image-to-video
//! heuristic estimator. No backend required.

use std::time::Duration;

use gen_session::{
    Applied, JobKind, JobState, JobTracker, Media, ProgressEstimator, ProgressEvent,
    TICK_INTERVAL,
};

#[tokio::main]
async fn main() {
    env_logger::init();

    // Push-channel reconciliation: queued -> processing -> media payload.
    let mut tracker = JobTracker::new();
    tracker.start_preparing(JobKind::Image);
    tracker.mark_queued("demo-job", JobKind::Image);

    let mut queued = ProgressEvent::for_job("demo-job");
    queued.status = Some(JobState::Pending);
    queued.queue_position = Some(1);
    tracker.apply(queued);
    println!("queued at position 1");

    for step in 1..=10u32 {
        let mut event = ProgressEvent::for_job("demo-job");
        event.status = Some(JobState::Processing);
        event.progress = Some(step);
        event.max_progress = Some(10);
        tracker.apply(event);
        println!("processing: {}%", tracker.job().unwrap().snapshot.percent());
    }

    let mut done = ProgressEvent::for_job("demo-job");
    done.media = Some(vec![Media {
        id: "m1".into(),
        url: "https://cdn.example/m1.png".into(),
        mime_type: Some("image/png".into()),
        width: Some(1024),
        height: Some(1024),
        created_at: None,
    }]);
    if let Applied::Completed(media) = tracker.apply(done) {
        println!("completed with {} item(s)", media.len());
    }

    // Heuristic estimator: a 3-second "video job" ticked every 500ms.
    println!("\nsimulating i2v heuristic progress (3s estimate):");
    let mut estimator = ProgressEstimator::new(3);
    loop {
        tokio::time::sleep(TICK_INTERVAL).await;
        let percent = estimator.percent();
        println!("  heuristic: {percent}%");
        if estimator.poll_due() {
            break;
        }
    }
    // The poll confirms completion; only now may 100% be shown.
    tokio::time::sleep(Duration::from_millis(300)).await;
    estimator.confirm_complete();
    println!("  confirmed: {}%", estimator.percent());
}
