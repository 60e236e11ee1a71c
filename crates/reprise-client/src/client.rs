// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Reprise gateway.
//!
//! Besides the plain request wrappers, [`GenerationClient::follow`] keeps a
//! viewer attached across timeouts and transport failures: every interrupted
//! read is followed by an out-of-band status check that decides between
//! reattaching live and replaying the stored final state.

use std::time::Duration;

use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use reprise_config::model::ClientConfig;
use reprise_core::{
    ConversationId, EndReason, Event, GenerationRecord, MessageId, RepriseError, RunId,
    SequencedEvent, StatusView,
};

use crate::sse::{FrameStream, StreamFrame, parse_sse_stream};

/// What a follow loop reports to its viewer.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Event(SequencedEvent),
    /// The record was reclaimed; the reply lives in the conversation history.
    Archived,
}

/// Result of `POST /v1/generations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedGeneration {
    pub message_id: MessageId,
    pub run_id: RunId,
}

#[derive(Serialize)]
struct StartBody<'a> {
    conversation_id: &'a ConversationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<&'a MessageId>,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct StopBody {
    stopped: bool,
}

#[derive(Deserialize)]
struct ConversationBody {
    conversation_id: ConversationId,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// How one attached read ended.
enum ReadEnd {
    /// A terminal event was delivered, or the viewer went away.
    Finished,
    /// The stream ended early; the generation may still be running.
    Interrupted(EndReason),
}

/// Gateway client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct GenerationClient {
    http: reqwest::Client,
    base_url: String,
    read_timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

fn transport(message: String, e: reqwest::Error) -> RepriseError {
    RepriseError::Transport {
        message,
        source: Some(Box::new(e)),
    }
}

impl GenerationClient {
    /// Build a client from the `[client]` config section.
    pub fn from_config(config: &ClientConfig) -> Result<Self, RepriseError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| RepriseError::Config(format!("invalid client token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| transport(format!("failed to build HTTP client: {e}"), e))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        message_id: Option<&MessageId>,
    ) -> Result<reqwest::Response, RepriseError> {
        let response = request
            .send()
            .await
            .map_err(|e| transport(format!("HTTP request failed: {e}"), e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or(body);
        match (status, message_id) {
            (StatusCode::NOT_FOUND, Some(id)) => Err(RepriseError::NotFound {
                message_id: id.clone(),
            }),
            (StatusCode::GATEWAY_TIMEOUT, _) => Err(RepriseError::StreamTimeout {
                duration: self.read_timeout,
            }),
            (StatusCode::CONFLICT, Some(id)) if detail.contains("already exists") => {
                Err(RepriseError::AlreadyExists {
                    message_id: id.clone(),
                })
            }
            (s, _) if s.is_server_error() => Err(RepriseError::Transport {
                message: format!("gateway returned {s}: {detail}"),
                source: None,
            }),
            (s, _) => Err(RepriseError::Internal(format!(
                "gateway returned {s}: {detail}"
            ))),
        }
    }

    async fn json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RepriseError> {
        response
            .json()
            .await
            .map_err(|e| transport(format!("failed to decode response: {e}"), e))
    }

    /// Open an SSE attach stream.
    pub async fn attach_stream(&self, message_id: &MessageId) -> Result<FrameStream, RepriseError> {
        let request = self
            .http
            .get(self.url(&format!("/v1/generations/{message_id}/stream")))
            .header("accept", "text/event-stream");
        let response = self.send(request, Some(message_id)).await?;
        Ok(parse_sse_stream(response))
    }

    pub async fn get_status(&self, message_id: &MessageId) -> Result<StatusView, RepriseError> {
        let request = self
            .http
            .get(self.url(&format!("/v1/generations/{message_id}/status")));
        Self::json(self.send(request, Some(message_id)).await?).await
    }

    /// Fetch the stored record, typically after the generation finished.
    pub async fn get_snapshot(
        &self,
        message_id: &MessageId,
    ) -> Result<GenerationRecord, RepriseError> {
        let request = self
            .http
            .get(self.url(&format!("/v1/generations/{message_id}")));
        Self::json(self.send(request, Some(message_id)).await?).await
    }

    pub async fn start(
        &self,
        conversation_id: &ConversationId,
        prompt: &str,
        message_id: Option<&MessageId>,
    ) -> Result<StartedGeneration, RepriseError> {
        let request = self.http.post(self.url("/v1/generations")).json(&StartBody {
            conversation_id,
            message_id,
            prompt,
        });
        Self::json(self.send(request, message_id).await?).await
    }

    /// Stop production. Returns `false` if nothing was running.
    pub async fn stop(&self, message_id: &MessageId) -> Result<bool, RepriseError> {
        let request = self
            .http
            .post(self.url(&format!("/v1/generations/{message_id}/stop")));
        let body: StopBody = Self::json(self.send(request, Some(message_id)).await?).await?;
        Ok(body.stopped)
    }

    pub async fn create_conversation(&self) -> Result<ConversationId, RepriseError> {
        let request = self.http.post(self.url("/v1/conversations"));
        let body: ConversationBody = Self::json(self.send(request, None).await?).await?;
        Ok(body.conversation_id)
    }

    /// Follow a generation until it finishes, `cancel` fires, or retries run out.
    ///
    /// Every event is forwarded to `updates` in order. Events may repeat
    /// across reattaches; consumers dedup on the sequence number. A read
    /// timeout falls back to a status check and reattaches while the
    /// generation is active; only transport failures count against
    /// `max_retries`, and any delivered event resets that count.
    pub async fn follow(
        &self,
        message_id: &MessageId,
        updates: mpsc::Sender<Update>,
        cancel: CancellationToken,
    ) -> Result<(), RepriseError> {
        tokio::select! {
            _ = cancel.cancelled() => Ok(()),
            result = self.follow_inner(message_id, &updates) => result,
        }
    }

    async fn follow_inner(
        &self,
        message_id: &MessageId,
        updates: &mpsc::Sender<Update>,
    ) -> Result<(), RepriseError> {
        let mut failures: u32 = 0;
        loop {
            let mut delivered = false;
            let read = self.read_once(message_id, updates, &mut delivered).await;
            if delivered {
                failures = 0;
            }
            match read {
                Ok(ReadEnd::Finished) => return Ok(()),
                Ok(ReadEnd::Interrupted(reason)) => {
                    debug!(message_id = %message_id, ?reason, "stream interrupted");
                }
                Err(RepriseError::NotFound { .. }) => {
                    let _ = updates.send(Update::Archived).await;
                    return Ok(());
                }
                // Silence is not a failure while the generation is still active.
                Err(RepriseError::StreamTimeout { duration }) => {
                    debug!(message_id = %message_id, ?duration, "stream quiet, checking status");
                }
                Err(e) if e.is_recoverable() => {
                    failures += 1;
                    if failures > self.max_retries {
                        return Err(e);
                    }
                    warn!(message_id = %message_id, attempt = failures, error = %e, "stream read failed, will retry");
                    tokio::time::sleep(self.backoff(failures)).await;
                    continue;
                }
                Err(e) => return Err(e),
            }

            match self.get_status(message_id).await {
                Ok(status) if status.active => continue,
                Ok(_) => return self.replay_final(message_id, updates).await,
                Err(RepriseError::NotFound { .. }) => {
                    let _ = updates.send(Update::Archived).await;
                    return Ok(());
                }
                Err(e) if e.is_recoverable() => {
                    failures += 1;
                    if failures > self.max_retries {
                        return Err(e);
                    }
                    tokio::time::sleep(self.backoff(failures)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff(&self, failures: u32) -> Duration {
        self.retry_backoff
            .saturating_mul(1 << failures.saturating_sub(1).min(6))
    }

    /// Attach once and forward frames until the stream ends. Sets `delivered`
    /// once any event has been forwarded.
    async fn read_once(
        &self,
        message_id: &MessageId,
        updates: &mpsc::Sender<Update>,
        delivered: &mut bool,
    ) -> Result<ReadEnd, RepriseError> {
        let mut frames = self.attach_stream(message_id).await?;
        let mut saw_terminal = false;
        loop {
            let next = tokio::time::timeout(self.read_timeout, frames.next())
                .await
                .map_err(|_| RepriseError::StreamTimeout {
                    duration: self.read_timeout,
                })?;
            match next {
                Some(Ok(StreamFrame::Event(event))) => {
                    *delivered = true;
                    saw_terminal |= event.event.is_terminal();
                    if updates.send(Update::Event(event)).await.is_err() {
                        return Ok(ReadEnd::Finished);
                    }
                }
                Some(Ok(StreamFrame::End(EndReason::Complete))) => return Ok(ReadEnd::Finished),
                Some(Ok(StreamFrame::End(reason))) => return Ok(ReadEnd::Interrupted(reason)),
                Some(Err(e)) => return Err(e),
                None if saw_terminal => return Ok(ReadEnd::Finished),
                None => return Ok(ReadEnd::Interrupted(EndReason::Closed)),
            }
        }
    }

    /// Deliver the stored final state exactly as a live viewer would see it.
    async fn replay_final(
        &self,
        message_id: &MessageId,
        updates: &mpsc::Sender<Update>,
    ) -> Result<(), RepriseError> {
        let record = match self.get_snapshot(message_id).await {
            Ok(record) => record,
            Err(RepriseError::NotFound { .. }) => {
                let _ = updates.send(Update::Archived).await;
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        for event in final_events(&record) {
            if updates.send(Update::Event(event)).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// `init` plus the terminal event (if any) for a stored record.
pub fn final_events(record: &GenerationRecord) -> Vec<SequencedEvent> {
    let snapshot = record.snapshot();
    let mut events = vec![SequencedEvent::new(snapshot.cursor, Event::Init(snapshot))];
    events.extend(record.terminal_event());
    events
}
