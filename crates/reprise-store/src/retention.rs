// SPDX-FileCopyrightText: 2026 Reprise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background reclamation of finished generations.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::hub::EventHub;
use crate::machine::GenerationStateMachine;

/// Run one sweep: purge expired records and drop idle hub topics.
pub async fn sweep_once(
    machine: &GenerationStateMachine,
    hub: &EventHub,
    retention: Duration,
) -> usize {
    let purged = match machine.purge_expired(retention).await {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "retention sweep failed (non-fatal)");
            0
        }
    };
    let topics = hub.cleanup();
    if purged > 0 || topics > 0 {
        debug!(purged, topics, "retention sweep");
    }
    purged
}

/// Spawn the periodic sweeper. Stops when `cancel` fires.
pub fn spawn_sweeper(
    machine: GenerationStateMachine,
    hub: EventHub,
    retention: Duration,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // Skip the first immediate tick.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    sweep_once(&machine, &hub, retention).await;
                }
                _ = cancel.cancelled() => {
                    info!("retention sweeper shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use reprise_core::{ConversationId, MessageId, Metadata};

    use crate::memory::MemoryStore;

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_and_stops_on_cancel() {
        let store = Arc::new(MemoryStore::new());
        let machine = GenerationStateMachine::new(store.clone());
        let hub = EventHub::default();
        let id = MessageId::from("m1");
        machine
            .create(&id, &ConversationId::from("c1"))
            .await
            .unwrap();
        machine.complete(&id, Metadata::new()).await.unwrap();
        drop(hub.subscribe(&id));

        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(
            machine.clone(),
            hub.clone(),
            Duration::ZERO,
            Duration::from_secs(60),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        assert!(store.is_empty());
        assert_eq!(hub.topic_count(), 0);

        cancel.cancel();
        handle.await.unwrap();
    }
}
