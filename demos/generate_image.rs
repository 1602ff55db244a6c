//! End-to-end image generation against a running backend.
//!
//! Usage: cargo run --example generate_image -- <endpoint> "<prompt>"

use std::time::Duration;

use gen_session::{
    GenerationSession, JobClient, JobOutcome, PlanLimits, SessionStore, SettingsUpdate,
};

#[tokio::main]
async fn main() -> gen_session::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let endpoint = args
        .next()
        .unwrap_or_else(|| "http://127.0.0.1:8080".to_string());
    let prompt = args
        .next()
        .unwrap_or_else(|| "a lighthouse at dusk, volumetric light".to_string());

    let client = JobClient::new(&endpoint);
    let store = SessionStore::new(std::env::temp_dir().join("gen-session-demo"));
    let mut session = GenerationSession::new(client, store, PlanLimits::unlimited());

    session.update_settings(SettingsUpdate::Prompt(prompt));
    session.update_settings(SettingsUpdate::OptimizePrompt(false));

    let queue_id = session.submit_image("base_v1.safetensors").await?;
    println!("Queued as {queue_id}");

    let outcome = session.watch_current_job(Duration::from_secs(300)).await?;
    match outcome {
        JobOutcome::Completed { media } => {
            println!("Done! {} item(s):", media.len());
            for item in &media {
                println!("  {}", item.url);
            }
        }
        JobOutcome::Failed { error } => println!("Failed: {error}"),
        JobOutcome::TimedOut => println!("Timed out waiting for the job"),
    }

    Ok(())
}
