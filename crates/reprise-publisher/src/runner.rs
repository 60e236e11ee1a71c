// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Production runs: one spawned task per generation.
//!
//! A run waits briefly for the first viewer, drives the engine through an
//! [`EventPublisher`], then finalises the record and archives completed
//! replies. Stopping a run cancels the engine and completes the generation
//! with `{"stopped": true}`. Cancelling a viewer never reaches here.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, info, info_span, warn};

use reprise_core::{
    ConversationStore, GenerationEngine, GenerationRequest, MessageId, Metadata, RepriseError,
    RunId, StatusView,
};
use reprise_store::{EventHub, GenerationStateMachine};

use crate::publisher::EventPublisher;
use crate::recording;

/// Runner tuning.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// How long a run waits for a viewer before producing anyway.
    pub stream_ready_timeout: Duration,
    /// How long `shutdown` waits for runs to finalise.
    pub drain_timeout: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            stream_ready_timeout: Duration::from_secs(2),
            drain_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone)]
struct RunHandle {
    run_id: RunId,
    cancel: CancellationToken,
}

/// Starts, stops and reports on production runs.
#[derive(Clone)]
pub struct GenerationRunner {
    machine: GenerationStateMachine,
    hub: EventHub,
    engine: Arc<dyn GenerationEngine>,
    conversations: Arc<dyn ConversationStore>,
    runs: Arc<DashMap<MessageId, RunHandle>>,
    settings: RunnerSettings,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl GenerationRunner {
    pub fn new(
        machine: GenerationStateMachine,
        hub: EventHub,
        engine: Arc<dyn GenerationEngine>,
        conversations: Arc<dyn ConversationStore>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            machine,
            hub,
            engine,
            conversations,
            runs: Arc::new(DashMap::new()),
            settings,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn machine(&self) -> &GenerationStateMachine {
        &self.machine
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    pub fn conversations(&self) -> &Arc<dyn ConversationStore> {
        &self.conversations
    }

    /// Number of runs currently producing.
    pub fn active_runs(&self) -> usize {
        self.runs.len()
    }

    /// Create the record and spawn its production run.
    ///
    /// Fails with [`RepriseError::AlreadyExists`] if a live record holds the id.
    pub async fn start(&self, request: GenerationRequest) -> Result<RunId, RepriseError> {
        if self.shutdown.is_cancelled() {
            return Err(RepriseError::Internal("runner is shutting down".into()));
        }
        self.machine
            .create(&request.message_id, &request.conversation_id)
            .await?;

        let run_id = RunId::generate();
        let cancel = self.shutdown.child_token();
        self.runs.insert(
            request.message_id.clone(),
            RunHandle {
                run_id: run_id.clone(),
                cancel: cancel.clone(),
            },
        );
        recording::set_active_generations(self.runs.len());

        let span = info_span!("generation", message_id = %request.message_id, run_id = %run_id);
        let runner = self.clone();
        let task_run_id = run_id.clone();
        self.tracker.spawn(
            async move {
                runner.run(request, task_run_id, cancel).await;
            }
            .instrument(span),
        );

        Ok(run_id)
    }

    async fn run(&self, request: GenerationRequest, run_id: RunId, cancel: CancellationToken) {
        let message_id = request.message_id.clone();
        let attached = self
            .machine
            .wait_stream_ready(&message_id, self.settings.stream_ready_timeout)
            .await;
        debug!(attached, "starting engine");

        let publisher = EventPublisher::new(self.machine.clone(), self.hub.clone(), message_id.clone());
        let result = tokio::select! {
            result = self.engine.generate(&request, &publisher, cancel.clone()) => result,
            // Engines that ignore the token are abandoned at shutdown.
            _ = self.shutdown.cancelled() => Err(RepriseError::Engine {
                message: "engine abandoned at shutdown".into(),
            }),
        };

        let outcome = if self.shutdown.is_cancelled() {
            publisher
                .fail("generation interrupted: server shutting down")
                .await
                .map(|done| done.then_some("interrupted"))
        } else if cancel.is_cancelled() {
            publisher
                .complete(stopped_metadata(result.unwrap_or_default()))
                .await
                .map(|done| done.then_some("stopped"))
        } else {
            match result {
                Ok(metadata) => publisher
                    .complete(metadata)
                    .await
                    .map(|done| done.then_some("completed")),
                Err(e) => {
                    warn!(error = %e, "engine failed");
                    publisher
                        .fail(&e.to_string())
                        .await
                        .map(|done| done.then_some("error"))
                }
            }
        };

        match outcome {
            Ok(Some(outcome)) => {
                recording::record_outcome(outcome);
                info!(outcome, "generation finished");
                if matches!(outcome, "completed" | "stopped") {
                    self.archive(&message_id).await;
                }
            }
            // Already terminal: the engine tripped an invariant and the
            // publisher failed the generation.
            Ok(None) => recording::record_outcome("error"),
            Err(e) => warn!(error = %e, "could not finalise generation"),
        }

        self.runs.remove_if(&message_id, |_, handle| handle.run_id == run_id);
        recording::set_active_generations(self.runs.len());
    }

    async fn archive(&self, message_id: &MessageId) {
        let record = match self.machine.get(message_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "could not load record for archival");
                return;
            }
        };
        if let Err(e) = self
            .conversations
            .persist_final_message(record.to_final_message())
            .await
        {
            warn!(error = %e, "archival failed (record stays replayable until reclaimed)");
        }
    }

    /// Stop production of a generation.
    ///
    /// Returns `false` when no run is active for the id.
    pub fn stop(&self, message_id: &MessageId) -> bool {
        match self.runs.get(message_id) {
            Some(handle) => {
                info!(message_id = %message_id, run_id = %handle.run_id, "stopping generation");
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cheap status view for reconnecting clients.
    pub async fn status(&self, message_id: &MessageId) -> Result<StatusView, RepriseError> {
        let record = self.machine.get(message_id).await?;
        Ok(StatusView {
            active: !record.is_terminal(),
            run_id: self.runs.get(message_id).map(|h| h.run_id.clone()),
            status: record.status(),
        })
    }

    /// Cancel every run and wait for them to finalise.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        if tokio::time::timeout(self.settings.drain_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(remaining = self.runs.len(), "runs still finalising after drain timeout");
        }
    }
}

/// Stopped runs keep whatever metadata the engine returned before the stop.
fn stopped_metadata(mut metadata: Metadata) -> Metadata {
    metadata.insert("stopped".into(), serde_json::Value::Bool(true));
    metadata
}
