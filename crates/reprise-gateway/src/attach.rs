// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The attach algorithm shared by first views and reconnects.
//!
//! 1. Authorize against the conversation owner.
//! 2. Subscribe to the topic, then snapshot the record and send `init`.
//! 3. A finished record gets its terminal event and the stream ends.
//! 4. Otherwise mark the stream ready and relay live events past the
//!    snapshot cursor until a terminal event, disconnect, or the deadline.
//!
//! Subscribing before snapshotting means every event persisted after the
//! snapshot is also in the receiver; anything at or below the cursor is a
//! duplicate and is dropped.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, debug, info_span, warn};

use reprise_core::{
    EndReason, Event, GenerationRecord, MessageId, RepriseError, SequencedEvent, UserId,
};
use reprise_publisher::GenerationRunner;

use crate::recording;

/// One frame on an attached stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A sequenced event, including the synthetic `init`.
    Event(SequencedEvent),
    /// The explicit end-of-stream marker.
    End(EndReason),
}

/// Relay tuning.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// How long one relay stays open.
    pub timeout: Duration,
    /// Interval between keep-alive comments.
    pub keepalive: Duration,
    /// Frames buffered between the relay task and the HTTP body.
    pub buffer: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            keepalive: Duration::from_secs(15),
            buffer: 64,
        }
    }
}

/// Load the record and check that `caller` owns its conversation.
///
/// A foreign or ownerless conversation yields [`RepriseError::Forbidden`].
pub async fn authorize(
    runner: &GenerationRunner,
    caller: &UserId,
    message_id: &MessageId,
) -> Result<GenerationRecord, RepriseError> {
    let record = runner.machine().get(message_id).await?;
    let owner = runner
        .conversations()
        .get_conversation_owner(record.conversation_id())
        .await?;
    if owner.as_ref() != Some(caller) {
        debug!(message_id = %message_id, caller = %caller, "attach denied");
        return Err(RepriseError::Forbidden {
            message_id: message_id.clone(),
        });
    }
    Ok(record)
}

/// Attach `caller` to a generation.
///
/// Errors surface before any frame is produced, so HTTP callers get a plain
/// status code. Dropping the returned stream stops the relay only; the
/// production run is unaffected.
pub async fn attach(
    runner: &GenerationRunner,
    caller: &UserId,
    message_id: &MessageId,
    settings: &RelaySettings,
) -> Result<ReceiverStream<Frame>, RepriseError> {
    if let Err(e) = authorize(runner, caller, message_id).await {
        recording::record_attach("rejected");
        return Err(e);
    }

    let live = runner.hub().subscribe(message_id);
    let record = match runner.machine().get(message_id).await {
        Ok(record) => record,
        Err(e) => {
            drop(live);
            runner.hub().cleanup();
            return Err(e);
        }
    };

    let (tx, rx) = mpsc::channel(settings.buffer.max(2));
    let relay = Relay {
        runner: runner.clone(),
        message_id: message_id.clone(),
        tx,
        timeout: settings.timeout,
    };
    recording::record_attach("ok");
    let span = info_span!("relay", message_id = %message_id);
    tokio::spawn(relay.run(record, live).instrument(span));

    Ok(ReceiverStream::new(rx))
}

struct Relay {
    runner: GenerationRunner,
    message_id: MessageId,
    tx: mpsc::Sender<Frame>,
    timeout: Duration,
}

/// Why a relay loop step stopped.
enum Step {
    Continue,
    Done(EndReason),
    Disconnected,
}

impl Relay {
    async fn run(self, record: GenerationRecord, mut live: broadcast::Receiver<SequencedEvent>) {
        recording::relay_opened();
        let outcome = self.relay(record, &mut live).await;
        drop(live);
        match outcome {
            Some(reason) => {
                recording::record_end(end_label(reason));
                let _ = self.tx.send(Frame::End(reason)).await;
                debug!(?reason, "relay ended");
            }
            None => {
                recording::record_end("disconnected");
                debug!("viewer disconnected");
            }
        }
        recording::relay_closed();
    }

    /// Drive the relay. `None` means the viewer went away.
    async fn relay(
        &self,
        record: GenerationRecord,
        live: &mut broadcast::Receiver<SequencedEvent>,
    ) -> Option<EndReason> {
        let mut cursor = match self.send_snapshot(&record).await {
            Step::Continue => record.snapshot().cursor,
            Step::Done(reason) => return Some(reason),
            Step::Disconnected => return None,
        };

        if let Err(e) = self.runner.machine().mark_stream_ready(&self.message_id).await {
            warn!(error = %e, "failed to persist stream readiness");
        }

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            let received = tokio::select! {
                _ = self.tx.closed() => return None,
                _ = &mut deadline => return Some(EndReason::Timeout),
                received = live.recv() => received,
            };

            match received {
                Ok(event) if event.seq <= cursor => continue,
                Ok(event) => {
                    cursor = event.seq;
                    let terminal = event.event.is_terminal();
                    if self.tx.send(Frame::Event(event)).await.is_err() {
                        return None;
                    }
                    if terminal {
                        return Some(EndReason::Complete);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "relay lagged, re-snapshotting");
                    recording::record_resnapshot();
                    let record = match self.runner.machine().get(&self.message_id).await {
                        Ok(record) => record,
                        Err(e) => {
                            warn!(error = %e, "re-snapshot failed");
                            return Some(EndReason::Closed);
                        }
                    };
                    match self.send_snapshot(&record).await {
                        Step::Continue => cursor = record.snapshot().cursor,
                        Step::Done(reason) => return Some(reason),
                        Step::Disconnected => return None,
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return self.finish_after_close(cursor).await;
                }
            }
        }
    }

    /// Send `init` for `record`, followed by its terminal event if it has one.
    async fn send_snapshot(&self, record: &GenerationRecord) -> Step {
        let snapshot = record.snapshot();
        let init = SequencedEvent::new(snapshot.cursor, Event::Init(snapshot));
        if self.tx.send(Frame::Event(init)).await.is_err() {
            return Step::Disconnected;
        }
        match record.terminal_event() {
            Some(terminal) => {
                if self.tx.send(Frame::Event(terminal)).await.is_err() {
                    return Step::Disconnected;
                }
                Step::Done(EndReason::Complete)
            }
            None => Step::Continue,
        }
    }

    /// The topic closed without a terminal event reaching this relay.
    ///
    /// Happens when the record was finished by a path that does not publish,
    /// such as orphan recovery. The persisted terminal event is replayed if
    /// the record has one.
    async fn finish_after_close(&self, cursor: u64) -> Option<EndReason> {
        let terminal = match self.runner.machine().get(&self.message_id).await {
            Ok(record) => record.terminal_event(),
            Err(e) => {
                warn!(error = %e, "record vanished after topic closed");
                None
            }
        };
        match terminal {
            Some(event) if event.seq > cursor => {
                if self.tx.send(Frame::Event(event)).await.is_err() {
                    return None;
                }
                Some(EndReason::Complete)
            }
            _ => Some(EndReason::Closed),
        }
    }
}

fn end_label(reason: EndReason) -> &'static str {
    match reason {
        EndReason::Complete => "complete",
        EndReason::Timeout => "timeout",
        EndReason::Closed => "closed",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio_stream::StreamExt;

    use reprise_core::{
        Adapter, AdapterType, ConversationId, EngineSink, GenerationEngine, GenerationRequest,
        GenerationStatus, HealthStatus, Metadata,
    };
    use reprise_publisher::{EventPublisher, RunnerSettings};
    use reprise_store::{EventHub, GenerationStateMachine, MemoryConversations, MemoryStore};
    use tokio_util::sync::CancellationToken;

    use super::*;

    struct IdleEngine;

    #[async_trait]
    impl Adapter for IdleEngine {
        fn name(&self) -> &str {
            "idle"
        }
        fn version(&self) -> semver::Version {
            semver::Version::new(0, 1, 0)
        }
        fn adapter_type(&self) -> AdapterType {
            AdapterType::Engine
        }
        async fn health_check(&self) -> Result<HealthStatus, RepriseError> {
            Ok(HealthStatus::Healthy)
        }
        async fn shutdown(&self) -> Result<(), RepriseError> {
            Ok(())
        }
    }

    #[async_trait]
    impl GenerationEngine for IdleEngine {
        async fn generate(
            &self,
            _request: &GenerationRequest,
            _sink: &dyn EngineSink,
            cancel: CancellationToken,
        ) -> Result<Metadata, RepriseError> {
            cancel.cancelled().await;
            Ok(Metadata::new())
        }
    }

    struct Fixture {
        runner: GenerationRunner,
        alice: UserId,
        conversation: ConversationId,
    }

    fn fixture(hub: EventHub) -> Fixture {
        let machine = GenerationStateMachine::new(Arc::new(MemoryStore::new()));
        let conversations = Arc::new(MemoryConversations::new());
        let conversation = ConversationId::from("c1");
        let alice = UserId::from("alice");
        conversations.insert(conversation.clone(), alice.clone());
        let runner = GenerationRunner::new(
            machine,
            hub,
            Arc::new(IdleEngine),
            conversations,
            RunnerSettings::default(),
        );
        Fixture {
            runner,
            alice,
            conversation,
        }
    }

    async fn seeded(f: &Fixture, id: &MessageId) -> EventPublisher {
        f.runner
            .machine()
            .create(id, &f.conversation)
            .await
            .unwrap();
        EventPublisher::new(f.runner.machine().clone(), f.runner.hub().clone(), id.clone())
    }

    fn settings() -> RelaySettings {
        RelaySettings {
            timeout: Duration::from_secs(5),
            ..RelaySettings::default()
        }
    }

    #[tokio::test]
    async fn foreign_caller_is_forbidden() {
        let f = fixture(EventHub::default());
        let id = MessageId::from("m1");
        seeded(&f, &id).await;
        let err = attach(&f.runner, &UserId::from("mallory"), &id, &settings())
            .await
            .unwrap_err();
        assert!(matches!(err, RepriseError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let f = fixture(EventHub::default());
        let err = attach(&f.runner, &f.alice, &MessageId::from("nope"), &settings())
            .await
            .unwrap_err();
        assert!(matches!(err, RepriseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn finished_generation_replays_snapshot_and_terminal() {
        let f = fixture(EventHub::default());
        let id = MessageId::from("m1");
        let publisher = seeded(&f, &id).await;
        publisher.content_delta("Hello").await.unwrap();
        publisher.content_delta(" world").await.unwrap();
        publisher.complete(Metadata::new()).await.unwrap();

        let frames: Vec<Frame> = attach(&f.runner, &f.alice, &id, &settings())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(frames.len(), 3);
        let Frame::Event(SequencedEvent {
            seq: 2,
            event: Event::Init(snapshot),
        }) = &frames[0]
        else {
            panic!("expected init, got {:?}", frames[0]);
        };
        assert_eq!(snapshot.content, "Hello world");
        assert_eq!(snapshot.status, GenerationStatus::Completed);
        assert!(matches!(
            &frames[1],
            Frame::Event(SequencedEvent {
                seq: 3,
                event: Event::Complete { .. }
            })
        ));
        assert_eq!(frames[2], Frame::End(EndReason::Complete));
    }

    #[tokio::test]
    async fn live_attach_relays_past_cursor_and_marks_ready() {
        let f = fixture(EventHub::default());
        let id = MessageId::from("m1");
        let publisher = seeded(&f, &id).await;
        publisher.content_delta("Hel").await.unwrap();

        let mut stream = attach(&f.runner, &f.alice, &id, &settings())
            .await
            .unwrap();
        let Some(Frame::Event(init)) = stream.next().await else {
            panic!("expected init");
        };
        assert_eq!(init.seq, 1);

        assert!(
            f.runner
                .machine()
                .wait_stream_ready(&id, Duration::from_secs(1))
                .await
        );

        publisher.content_delta("lo").await.unwrap();
        publisher.fail("boom").await.unwrap();

        let rest: Vec<Frame> = stream.collect().await;
        assert_eq!(
            rest,
            vec![
                Frame::Event(SequencedEvent::new(
                    2,
                    Event::Chunk {
                        text: "lo".into(),
                        thinking: false
                    }
                )),
                Frame::Event(SequencedEvent::new(
                    3,
                    Event::Error {
                        message: "boom".into()
                    }
                )),
                Frame::End(EndReason::Complete),
            ]
        );
    }

    #[tokio::test]
    async fn lagged_relay_resnapshots() {
        let f = fixture(EventHub::with_capacity(2));
        let id = MessageId::from("m1");
        let publisher = seeded(&f, &id).await;

        let settings = RelaySettings {
            buffer: 2,
            ..settings()
        };
        let mut stream = attach(&f.runner, &f.alice, &id, &settings).await.unwrap();
        let Some(Frame::Event(init)) = stream.next().await else {
            panic!("expected init");
        };
        assert_eq!(init.seq, 0);

        for word in ["a", "b", "c", "d", "e", "f", "g", "h"] {
            publisher.content_delta(word).await.unwrap();
        }
        publisher.complete(Metadata::new()).await.unwrap();

        let frames: Vec<Frame> = stream.collect().await;
        let mut content = String::new();
        for frame in &frames {
            match frame {
                Frame::Event(SequencedEvent {
                    event: Event::Init(snapshot),
                    ..
                }) => content = snapshot.content.clone(),
                Frame::Event(SequencedEvent {
                    event: Event::Chunk { text, .. },
                    ..
                }) => content.push_str(text),
                _ => {}
            }
        }
        assert_eq!(content, "abcdefgh");
        assert_eq!(frames.last(), Some(&Frame::End(EndReason::Complete)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_ends_with_timeout() {
        let f = fixture(EventHub::default());
        let id = MessageId::from("m1");
        seeded(&f, &id).await;
        let settings = RelaySettings {
            timeout: Duration::from_secs(1),
            ..RelaySettings::default()
        };
        let frames: Vec<Frame> = attach(&f.runner, &f.alice, &id, &settings)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], Frame::End(EndReason::Timeout));
        let record = f.runner.machine().get(&id).await.unwrap();
        assert!(!record.is_terminal());
    }

    #[tokio::test]
    async fn dropping_the_stream_leaves_generation_running() {
        let f = fixture(EventHub::default());
        let id = MessageId::from("m1");
        let publisher = seeded(&f, &id).await;
        let mut stream = attach(&f.runner, &f.alice, &id, &settings())
            .await
            .unwrap();
        stream.next().await;
        drop(stream);

        publisher.content_delta("still going").await.unwrap();
        let record = f.runner.machine().get(&id).await.unwrap();
        assert_eq!(record.status(), GenerationStatus::Streaming);
        assert_eq!(record.content(), "still going");
    }
}
