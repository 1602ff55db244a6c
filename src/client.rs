use futures_util::StreamExt;
use log::warn;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::error::{Result, SessionError};
use crate::types::*;

fn normalize(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_string()
}

/// Async client for the generation backend.
///
/// Covers the four collaborator surfaces the session consumes: job
/// submission (image and image-to-video), the push channel for real-time
/// progress, the delayed poll endpoint, and fire-and-forget mutations
/// (cancel, delete). Push watching falls back to polling automatically if
/// the WebSocket connection fails.
#[derive(Debug, Clone)]
pub struct JobClient {
    http: Client,
    endpoint: String,
    client_id: String,
}

impl JobClient {
    /// Create a new client pointing at the given backend endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: normalize(endpoint.into()),
            client_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Use a custom `reqwest::Client` (for connection pooling, timeouts, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Set the client ID used for push-channel association.
    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn network_err(&self, context: impl Into<String>) -> impl FnOnce(reqwest::Error) -> SessionError {
        let context = context.into();
        move |e| SessionError::Network { context, source: e }
    }

    // ── Submission ──────────────────────────────────────────────────

    /// Submit an image generation workflow. Returns the queue acknowledgement.
    pub async fn submit_image(&self, workflow: &Value, is_public: bool) -> Result<ImageReceipt> {
        let url = format!("{}/generate", self.endpoint);
        let body = serde_json::json!({
            "workflow": workflow,
            "clientId": self.client_id,
            "isPublic": is_public,
        });

        let resp = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(30))
            .json(&body)
            .send()
            .await
            .map_err(self.network_err(format!(
                "Cannot reach generation backend at {}",
                self.endpoint
            )))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body_text = resp.text().await.unwrap_or_default();
            return Err(SessionError::Http {
                status,
                body: body_text,
            });
        }

        let receipt: ImageReceipt = resp
            .json()
            .await
            .map_err(self.network_err("Failed to parse submission response"))?;
        if receipt.queue_id.is_empty() {
            return Err(SessionError::InvalidResponse(
                "Submission response missing queueId".into(),
            ));
        }
        Ok(receipt)
    }

    /// Submit an image-to-video conversion. Returns the job id and the
    /// server's processing-time estimate, which drives the local heuristic.
    pub async fn submit_video(&self, request: &VideoRequest) -> Result<VideoReceipt> {
        let url = format!("{}/i2v", self.endpoint);
        let resp = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(30))
            .json(request)
            .send()
            .await
            .map_err(self.network_err(format!(
                "Cannot reach generation backend at {}",
                self.endpoint
            )))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body_text = resp.text().await.unwrap_or_default();
            return Err(SessionError::Http {
                status,
                body: body_text,
            });
        }

        let receipt: VideoReceipt = resp
            .json()
            .await
            .map_err(self.network_err("Failed to parse i2v submission response"))?;
        if receipt.job_id.is_empty() {
            return Err(SessionError::InvalidResponse(
                "i2v response missing jobId".into(),
            ));
        }
        Ok(receipt)
    }

    /// Ask the backend to rewrite a prompt. Returns the optimized text.
    pub async fn optimize_prompt(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/optimize-prompt", self.endpoint);
        let body = serde_json::json!({ "prompt": prompt });
        let resp = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(30))
            .json(&body)
            .send()
            .await
            .map_err(self.network_err("Failed to request prompt optimization"))?;

        if !resp.status().is_success() {
            return Err(SessionError::Http {
                status: resp.status().as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let json: Value = resp
            .json()
            .await
            .map_err(self.network_err("Failed to parse prompt optimization response"))?;
        json.get("optimizedPrompt")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| {
                SessionError::InvalidResponse("Response missing optimizedPrompt".into())
            })
    }

    // ── Polling ─────────────────────────────────────────────────────

    /// Poll a job's status. Used both by the delayed image-to-video poll
    /// and as the push-channel fallback.
    pub async fn poll(&self, job_id: &str) -> Result<PollOutcome> {
        let url = format!("{}/jobs/{}", self.endpoint, job_id);
        let resp = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(self.network_err("Failed to poll job status"))?;

        if !resp.status().is_success() {
            return Err(SessionError::Http {
                status: resp.status().as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        resp.json()
            .await
            .map_err(self.network_err("Failed to parse job status response"))
    }

    /// Get the backend's queue state (running + pending counts).
    pub async fn queue_status(&self) -> Result<QueueSnapshot> {
        let url = format!("{}/queue", self.endpoint);
        let resp = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(self.network_err("Failed to fetch queue status"))?;

        let json: Value = resp
            .json()
            .await
            .map_err(self.network_err("Failed to parse queue response"))?;

        let running = json
            .get("running")
            .and_then(|v| v.as_u64())
            .or_else(|| {
                json.get("queue_running")
                    .and_then(|v| v.as_array())
                    .map(|a| a.len() as u64)
            })
            .unwrap_or(0) as u32;
        let pending = json
            .get("pending")
            .and_then(|v| v.as_u64())
            .or_else(|| {
                json.get("queue_pending")
                    .and_then(|v| v.as_array())
                    .map(|a| a.len() as u64)
            })
            .unwrap_or(0) as u32;

        Ok(QueueSnapshot { running, pending })
    }

    // ── Fire-and-forget mutations ───────────────────────────────────

    /// Signal the backend to abort a queued or running job. The job may
    /// still emit a few late push messages afterwards.
    pub async fn cancel(&self, job_id: &str) -> Result<()> {
        let url = format!("{}/jobs/{}", self.endpoint, job_id);
        self.http
            .delete(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(self.network_err("Failed to send cancel request"))?;
        Ok(())
    }

    /// Request deletion of a media item. Callers treat this as
    /// fire-and-forget: the optimistic overlay has already hidden the item.
    pub async fn delete_media(&self, media_id: &str) -> Result<()> {
        let url = format!("{}/media/{}", self.endpoint, media_id);
        let resp = self
            .http
            .delete(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(self.network_err("Failed to send media delete request"))?;
        if !resp.status().is_success() {
            return Err(SessionError::Http {
                status: resp.status().as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    // ── Push channel ────────────────────────────────────────────────

    /// Watch a job over the push channel until it reaches a terminal state
    /// or `timeout` elapses. Every received event for the job is handed to
    /// `on_event` in arrival order. Falls back to polling automatically if
    /// the WebSocket connection fails or closes early.
    pub async fn watch_job<F>(
        &self,
        job_id: &str,
        timeout: Duration,
        mut on_event: F,
    ) -> Result<JobOutcome>
    where
        F: FnMut(ProgressEvent),
    {
        let ws_url = format!(
            "{}/ws?clientId={}",
            self.endpoint
                .replace("http://", "ws://")
                .replace("https://", "wss://"),
            self.client_id
        );

        let (mut ws, _) = match tokio_tungstenite::connect_async(&ws_url).await {
            Ok(c) => c,
            Err(e) => {
                warn!("push channel connect failed ({e}), falling back to polling");
                return self
                    .watch_job_poll(job_id, Duration::from_secs(2), timeout, &mut on_event)
                    .await;
            }
        };

        let start = std::time::Instant::now();
        let mut total_msg_count: usize = 0;
        const MAX_TOTAL_MESSAGES: usize = 50_000;

        while let Ok(Some(msg)) = tokio::time::timeout(Duration::from_secs(30), ws.next()).await {
            total_msg_count += 1;
            if total_msg_count > MAX_TOTAL_MESSAGES {
                warn!("push channel exceeded {MAX_TOTAL_MESSAGES} messages, falling back to polling");
                break;
            }
            if start.elapsed() > timeout {
                return Ok(JobOutcome::TimedOut);
            }

            let text = match msg {
                Ok(m) if m.is_text() => m.into_text().unwrap_or_default(),
                Ok(_) => continue,
                Err(_) => break,
            };

            let event: ProgressEvent = match serde_json::from_str(&text) {
                Ok(e) => e,
                Err(_) => continue,
            };

            // Skip messages for other jobs; unkeyed messages belong to the
            // job this watch is tracking.
            if let Some(id) = event.job_id.as_deref() {
                if id != job_id {
                    continue;
                }
            }

            let media = event.media.clone();
            let status = event.status;
            let error = event.error.clone();
            on_event(event);

            if let Some(media) = media {
                if !media.is_empty() {
                    return Ok(JobOutcome::Completed { media });
                }
            }
            match status {
                Some(JobState::Completed) => {
                    return Ok(JobOutcome::Completed { media: Vec::new() })
                }
                Some(JobState::Failed) => {
                    return Ok(JobOutcome::Failed {
                        error: error.unwrap_or_else(|| "Generation failed".to_string()),
                    });
                }
                _ => {}
            }
        }

        // Push channel closed or idled out without a terminal event.
        self.watch_job_poll(job_id, Duration::from_secs(2), timeout, &mut on_event)
            .await
    }

    async fn watch_job_poll<F>(
        &self,
        job_id: &str,
        poll_interval: Duration,
        timeout: Duration,
        on_event: &mut F,
    ) -> Result<JobOutcome>
    where
        F: FnMut(ProgressEvent),
    {
        let start = std::time::Instant::now();
        loop {
            if start.elapsed() > timeout {
                return Ok(JobOutcome::TimedOut);
            }
            let outcome = self.poll(job_id).await?;
            // Surface the poll result through the same event path so the
            // reconciler sees one progress signal regardless of source.
            let mut event = ProgressEvent::for_job(job_id);
            event.status = Some(outcome.status);
            event.error = outcome.error.clone();
            if !outcome.media.is_empty() {
                event.media = Some(outcome.media.clone());
            }
            on_event(event);

            match outcome.status {
                JobState::Completed => {
                    return Ok(JobOutcome::Completed {
                        media: outcome.media,
                    })
                }
                JobState::Failed => {
                    return Ok(JobOutcome::Failed {
                        error: outcome
                            .error
                            .unwrap_or_else(|| "Generation failed".to_string()),
                    });
                }
                JobState::Pending | JobState::Processing => {}
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
