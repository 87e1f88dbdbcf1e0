//! Outbound action queue: the only path from handlers to the transport.
//!
//! Handlers get an [`OutboundClient`] that enqueues [`OutboundAction`]s into a
//! bounded channel. A single [`OutboundWorker`] drains it and executes each
//! action against the transport, one at a time, in enqueue order.
//!
//! ```text
//! handler ─┐
//! handler ─┼─► mpsc (bounded) ─► OutboundWorker ─► Transport::execute
//! reminder ┘                       ├── timeout per action
//!                                  └── RateLimited → back off, drop action
//! ```

use std::sync::Arc;
use std::time::Duration;

use herald_core::config::OutboundConfig;
use herald_core::error::HeraldError;
use herald_core::shutdown::Shutdown;
use herald_core::traits::Transport;
use herald_core::types::{EventId, OutboundAction, Presence, RoomId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Create a linked client/worker pair.
pub fn queue(transport: Arc<dyn Transport>, config: &OutboundConfig) -> (OutboundClient, OutboundWorker) {
    let (tx, rx) = mpsc::channel(config.capacity.max(1));
    let client = OutboundClient { tx };
    let worker = OutboundWorker {
        rx,
        transport,
        action_timeout: config.action_timeout(),
        backoff: config.rate_limit_backoff(),
        stats: WorkerStats::default(),
    };
    (client, worker)
}

/// Handler-facing capability set. Every call enqueues and returns; delivery
/// failures are only visible in the worker's logs.
///
/// Enqueueing waits while the queue is full.
#[derive(Debug, Clone)]
pub struct OutboundClient {
    tx: mpsc::Sender<OutboundAction>,
}

impl OutboundClient {
    pub async fn enqueue(&self, action: OutboundAction) {
        tracing::debug!(action = action.name(), room = ?action.room(), "enqueue");
        if let Err(e) = self.tx.send(action).await {
            tracing::warn!(action = e.0.name(), "outbound queue closed, dropping action");
        }
    }

    pub async fn send_text(&self, room: &RoomId, body: impl Into<String>) {
        self.enqueue(OutboundAction::SendText {
            room: room.clone(),
            body: body.into(),
        })
        .await;
    }

    pub async fn send_html(&self, room: &RoomId, html: impl Into<String>) {
        self.enqueue(OutboundAction::SendHtml {
            room: room.clone(),
            html: html.into(),
        })
        .await;
    }

    pub async fn send_notice(&self, room: &RoomId, body: impl Into<String>) {
        self.enqueue(OutboundAction::SendNotice {
            room: room.clone(),
            body: body.into(),
        })
        .await;
    }

    pub async fn send_reaction(&self, room: &RoomId, event: &EventId, key: impl Into<String>) {
        self.enqueue(OutboundAction::SendReaction {
            room: room.clone(),
            event: event.clone(),
            key: key.into(),
        })
        .await;
    }

    pub async fn join_room(&self, room: &RoomId) {
        self.enqueue(OutboundAction::JoinRoom { room: room.clone() }).await;
    }

    pub async fn set_presence(&self, presence: Presence) {
        self.enqueue(OutboundAction::SetPresence { presence }).await;
    }

    pub(crate) async fn mark_read(&self, room: &RoomId, event: &EventId) {
        self.enqueue(OutboundAction::MarkRead {
            room: room.clone(),
            event: event.clone(),
        })
        .await;
    }

    /// Actions currently waiting in the queue.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Counters reported when the worker exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub executed: u64,
    pub failed: u64,
    pub rate_limited: u64,
    /// Actions still queued at shutdown.
    pub discarded: u64,
}

/// Single consumer of the outbound queue.
pub struct OutboundWorker {
    rx: mpsc::Receiver<OutboundAction>,
    transport: Arc<dyn Transport>,
    action_timeout: Duration,
    backoff: Duration,
    stats: WorkerStats,
}

impl OutboundWorker {
    pub fn spawn(self, shutdown: Shutdown) -> JoinHandle<WorkerStats> {
        tokio::spawn(self.run(shutdown))
    }

    /// Like [`spawn`](Self::spawn), but once `drain` fires the queue stops
    /// accepting actions and the worker exits after executing what is left.
    pub fn spawn_draining(self, shutdown: Shutdown, drain: Shutdown) -> JoinHandle<WorkerStats> {
        tokio::spawn(self.run_draining(shutdown, drain))
    }

    /// Drain the queue until shutdown fires or every client is dropped.
    pub async fn run(self, shutdown: Shutdown) -> WorkerStats {
        // A dropped trigger never fires.
        let (_, never) = herald_core::shutdown::channel();
        self.run_draining(shutdown, never).await
    }

    pub async fn run_draining(mut self, mut shutdown: Shutdown, mut drain: Shutdown) -> WorkerStats {
        tracing::info!(transport = self.transport.name(), "outbound worker started");
        let mut draining = false;

        loop {
            let action = tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    self.discard_pending();
                    break;
                }
                _ = drain.wait(), if !draining => {
                    tracing::info!(pending = self.rx.len(), "draining outbound queue");
                    self.rx.close();
                    draining = true;
                    continue;
                }
                next = self.rx.recv() => match next {
                    Some(action) => action,
                    None => break,
                },
            };

            let rate_limited = self.execute(action).await;
            if rate_limited {
                tokio::select! {
                    biased;
                    _ = shutdown.wait() => {
                        self.discard_pending();
                        break;
                    }
                    _ = tokio::time::sleep(self.backoff) => {}
                }
            }
        }

        tracing::info!(
            executed = self.stats.executed,
            failed = self.stats.failed,
            rate_limited = self.stats.rate_limited,
            discarded = self.stats.discarded,
            "outbound worker stopped"
        );
        self.stats
    }

    /// Run one action. Returns true when the transport asked us to back off;
    /// the action itself is not retried.
    async fn execute(&mut self, action: OutboundAction) -> bool {
        let result = tokio::time::timeout(self.action_timeout, self.transport.execute(&action))
            .await
            .unwrap_or_else(|_| Err(HeraldError::Timeout(format!("no answer within {:?}", self.action_timeout))));
        match result {
            Ok(()) => {
                self.stats.executed += 1;
                false
            }
            Err(e) if e.is_rate_limited() => {
                tracing::warn!(action = action.name(), backoff = ?self.backoff, "limit exceeded, sleeping");
                self.stats.rate_limited += 1;
                true
            }
            Err(e) => {
                tracing::error!(action = action.name(), error = %e, "outbound action failed");
                self.stats.failed += 1;
                false
            }
        }
    }

    fn discard_pending(&mut self) {
        self.rx.close();
        while self.rx.try_recv().is_ok() {
            self.stats.discarded += 1;
        }
        if self.stats.discarded > 0 {
            tracing::warn!(count = self.stats.discarded, "discarding queued outbound actions");
        }
    }
}
