//! Bot: owns the handler registry and drives the dispatch loop.
//!
//! Events arrive from the transport one at a time. Each one is offered to the
//! registered handlers in registration order; a handler runs only when every
//! predicate it was registered with holds. Handlers run sequentially, each
//! under its own deadline, and a failure in one never stops the others.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use herald_core::config::HeraldConfig;
use herald_core::error::{HeraldError, Result};
use herald_core::shutdown::Shutdown;
use herald_core::traits::{BotStorage, Credentials, Session, Transport};
use herald_core::types::{Event, EventSource, OutboundAction, Presence, SyncItem, UserId};
use tokio::time::Instant;

use crate::handler::{EventHandler, Handler, HandlerContext};
use crate::outbound::{self, OutboundClient, OutboundWorker};
use crate::predicates::{Predicate, matches_all};

/// What happened to a single dispatched event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Ephemeral or self-authored events are dropped before any handler sees them.
    pub skipped: bool,
    pub matched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
}

pub struct Bot {
    transport: Arc<dyn Transport>,
    storage: Arc<dyn BotStorage>,
    handlers: Vec<Handler>,
    client: OutboundClient,
    worker: Option<OutboundWorker>,
    user_id: UserId,
    handler_timeout: Duration,
}

impl Bot {
    pub fn new(transport: Arc<dyn Transport>, storage: Arc<dyn BotStorage>, config: &HeraldConfig) -> Self {
        let (client, worker) = outbound::queue(transport.clone(), &config.outbound);
        Self {
            transport,
            storage,
            handlers: Vec::new(),
            client,
            worker: Some(worker),
            user_id: UserId::from(config.bot.user_id.as_str()),
            handler_timeout: config.dispatch.handler_timeout(),
        }
    }

    /// A handle for enqueueing outbound actions outside of handlers.
    pub fn client(&self) -> OutboundClient {
        self.client.clone()
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Register a handler. Order of registration is order of invocation.
    pub fn on(&mut self, handler: Arc<dyn EventHandler>, predicates: Vec<Predicate>) {
        tracing::debug!(
            handler = handler.name(),
            predicates = predicates.len(),
            "handler registered"
        );
        self.handlers.push(Handler { handler, predicates });
    }

    /// Log in, reusing the stored device id, and persist the device id the
    /// server hands back when it differs.
    pub async fn authenticate(&mut self, user: &str, password: &str) -> Result<Session> {
        let device_id = self.storage.load_device_id()?;
        let credentials = Credentials {
            user: user.to_string(),
            password: password.to_string(),
            device_id: device_id.clone(),
        };

        let session = self.transport.login(&credentials).await.map_err(|e| match e {
            HeraldError::AuthenticationFailed(_) => e,
            other => HeraldError::AuthenticationFailed(other.to_string()),
        })?;

        if device_id.as_ref() != Some(&session.device_id) {
            self.storage.store_device_id(&session.device_id)?;
        }
        self.user_id = session.user_id.clone();

        tracing::info!(
            "🔑 Login successful: {} (device {})",
            session.user_id,
            session.device_id
        );
        Ok(session)
    }

    /// Offer one event to every handler.
    pub async fn dispatch(&self, source: EventSource, event: &Event) -> DispatchReport {
        let mut report = DispatchReport::default();

        if event.kind.is_ephemeral() || event.sender == self.user_id {
            report.skipped = true;
            return report;
        }

        tracing::info!(
            source = %source,
            sender = %event.sender,
            kind = %event.kind,
            "event"
        );

        for handler in &self.handlers {
            if !matches_all(&handler.predicates, source, event) {
                continue;
            }
            report.matched += 1;

            let ctx = HandlerContext {
                bot_user: self.user_id.clone(),
                source,
                deadline: Instant::now() + self.handler_timeout,
            };
            let invocation = handler.handler.handle(&ctx, &self.client, event);
            match tokio::time::timeout(self.handler_timeout, invocation).await {
                Ok(Ok(())) => report.succeeded += 1,
                Ok(Err(e)) => {
                    tracing::error!(handler = handler.name(), error = %e, "handler failed");
                    report.failed += 1;
                }
                Err(_) => {
                    let e = HeraldError::HandlerTimeout(self.handler_timeout);
                    tracing::error!(handler = handler.name(), error = %e, "handler failed");
                    report.timed_out += 1;
                }
            }
        }

        self.client.mark_read(&event.room, &event.id).await;
        report
    }

    pub(crate) fn take_worker(&mut self) -> Option<OutboundWorker> {
        self.worker.take()
    }

    /// Run until shutdown: announce presence, start the outbound worker,
    /// resume sync from the stored cursor and dispatch everything that arrives.
    pub async fn run(mut self, mut shutdown: Shutdown) -> Result<()> {
        let worker = self
            .take_worker()
            .ok_or_else(|| HeraldError::Other("outbound worker already started".into()))?;

        self.respect_limits(Presence::Online).await?;
        let (drain, drained) = herald_core::shutdown::channel();
        let worker = worker.spawn_draining(shutdown.clone(), drained);

        let since = match self.storage.load_next_batch(&self.user_id) {
            Ok(since) => since,
            Err(e) => {
                tracing::warn!("⚠️ Could not load sync cursor, starting fresh: {e}");
                None
            }
        };

        tracing::info!(
            "🚀 Beginning sync for {} with {} handlers",
            self.user_id,
            self.handlers.len()
        );
        let mut stream = match self.transport.listen(since).await {
            Ok(stream) => stream,
            Err(e) => {
                worker.abort();
                return Err(e);
            }
        };

        let ended = loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break false,
                item = stream.next() => match item {
                    Some(SyncItem::Event(source, event)) => {
                        self.dispatch(source, &event).await;
                    }
                    Some(SyncItem::Cursor(token)) => {
                        if let Err(e) = self.storage.store_next_batch(&self.user_id, &token) {
                            tracing::warn!("⚠️ Failed to store sync cursor: {e}");
                        }
                    }
                    None => break true,
                },
            }
        };

        drop(stream);
        if ended {
            // Replies already queued still go out before we report the failure.
            tracing::warn!("⚠️ Sync stream ended, flushing outbound queue");
            drain.trigger();
        } else {
            tracing::info!("🛑 Shutting down dispatch loop");
        }
        if let Err(e) = worker.await {
            tracing::warn!("⚠️ Outbound worker ended abnormally: {e}");
        }
        if let Err(e) = self.respect_limits(Presence::Offline).await {
            tracing::warn!("⚠️ Could not set presence offline: {e}");
        }
        if ended {
            return Err(HeraldError::transport("sync stream ended"));
        }
        Ok(())
    }

    /// Set presence directly, treating a rate-limit response as success.
    /// Only used while the outbound worker is not running.
    async fn respect_limits(&self, presence: Presence) -> Result<()> {
        match self.transport.execute(&OutboundAction::SetPresence { presence }).await {
            Err(e) if e.is_rate_limited() => {
                tracing::warn!(%presence, "rate limited while setting presence, ignoring");
                Ok(())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::predicates::{message_matching, not_from_user, pattern};
    use crate::storage::MemoryBotStorage;
    use crate::testing::RecordingTransport;
    use herald_core::shutdown;
    use herald_core::types::{DeviceId, EventKind, RoomId};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BOT: &str = "@herald:example.org";

    fn config() -> HeraldConfig {
        let mut config = HeraldConfig::default();
        config.bot.user_id = BOT.into();
        config
    }

    fn bot_with(transport: Arc<RecordingTransport>, storage: Arc<MemoryBotStorage>) -> Bot {
        Bot::new(transport, storage, &config())
    }

    fn bot() -> (Bot, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new(BOT));
        let bot = bot_with(transport.clone(), Arc::new(MemoryBotStorage::new()));
        (bot, transport)
    }

    fn msg(id: &str, sender: &str, body: &str) -> Event {
        Event::message(id, "!room:example.org", sender, body)
    }

    fn counting(name: &str, counter: Arc<AtomicUsize>) -> Arc<dyn EventHandler> {
        handler_fn(name, move |_, _, _| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    fn constant(value: bool) -> Predicate {
        Predicate::new("const", move |_, _| value)
    }

    #[tokio::test]
    async fn test_skips_ephemeral_and_own_events() {
        let (mut bot, _) = bot();
        let hits = Arc::new(AtomicUsize::new(0));
        bot.on(counting("any", hits.clone()), vec![]);

        let typing = msg("$1", "@alice:example.org", "").with_kind(EventKind::Typing);
        assert!(bot.dispatch(EventSource::Ephemeral, &typing).await.skipped);

        let own = msg("$2", BOT, "echo");
        assert!(bot.dispatch(EventSource::Timeline, &own).await.skipped);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(bot.client().pending(), 0);

        let report = bot.dispatch(EventSource::Timeline, &msg("$3", "@alice:example.org", "hi")).await;
        assert!(!report.skipped);
        assert_eq!(report.succeeded, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handlers_run_in_order_then_mark_read() {
        let (mut bot, transport) = bot();
        bot.on(
            handler_fn("first", |_, client, event| async move {
                client.send_text(&event.room, "first").await;
                Ok(())
            }),
            vec![message_matching(pattern(r"\Aping").unwrap())],
        );
        bot.on(
            handler_fn("second", |_, client, event| async move {
                client.send_text(&event.room, "second").await;
                Ok(())
            }),
            vec![not_from_user(&UserId::from("@mallory:example.org"))],
        );

        let event = msg("$1", "@alice:example.org", "PING");
        let report = bot.dispatch(EventSource::Timeline, &event).await;
        assert_eq!(report.matched, 2);

        let (trigger, shutdown) = shutdown::channel();
        let handle = bot.take_worker().unwrap().spawn(shutdown);
        transport.wait_for_executed(3).await;
        trigger.trigger();
        handle.await.unwrap();

        assert_eq!(transport.texts(), vec!["first", "second"]);
        assert_eq!(
            transport.executed().last(),
            Some(&OutboundAction::MarkRead {
                room: RoomId::from("!room:example.org"),
                event: event.id.clone(),
            })
        );
    }

    #[tokio::test]
    async fn test_failing_handler_is_isolated() {
        let (mut bot, _) = bot();
        let hits = Arc::new(AtomicUsize::new(0));
        bot.on(
            handler_fn("broken", |_, _, _| async { Err(HeraldError::Other("boom".into())) }),
            vec![],
        );
        bot.on(counting("after", hits.clone()), vec![]);

        let report = bot.dispatch(EventSource::Timeline, &msg("$1", "@alice:example.org", "x")).await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_is_cancelled() {
        let (mut bot, _) = bot();
        let finished = Arc::new(AtomicUsize::new(0));
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let finished = finished.clone();
            bot.on(
                handler_fn("slow", move |_, _, _| {
                    let finished = finished.clone();
                    async move {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
                vec![],
            );
        }
        bot.on(counting("next", hits.clone()), vec![]);

        let started = Instant::now();
        let report = bot.dispatch(EventSource::Timeline, &msg("$1", "@alice:example.org", "x")).await;
        assert_eq!(report.timed_out, 1);
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(6));
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_authenticate_stores_new_device_id() {
        let transport = Arc::new(RecordingTransport::new(BOT));
        let storage = Arc::new(MemoryBotStorage::new());
        let mut bot = bot_with(transport.clone(), storage.clone());

        let session = bot.authenticate("herald", "secret").await.unwrap();
        assert_eq!(session.device_id, DeviceId::from("TESTDEVICE"));
        assert_eq!(storage.load_device_id().unwrap(), Some(DeviceId::from("TESTDEVICE")));
        assert_eq!(bot.user_id(), &UserId::from(BOT));

        // The stored id is offered on the next login.
        bot.authenticate("herald", "secret").await.unwrap();
        let logins = transport.logins();
        assert_eq!(logins[0].device_id, None);
        assert_eq!(logins[1].device_id, Some(DeviceId::from("TESTDEVICE")));
    }

    #[tokio::test]
    async fn test_authenticate_failure() {
        let transport = Arc::new(RecordingTransport::new(BOT));
        transport.reject_login();
        let mut bot = bot_with(transport, Arc::new(MemoryBotStorage::new()));
        let err = bot.authenticate("herald", "wrong").await.unwrap_err();
        assert!(matches!(err, HeraldError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn test_run_dispatches_and_persists_cursor() {
        let transport = Arc::new(RecordingTransport::new(BOT));
        let storage = Arc::new(MemoryBotStorage::new());
        storage.store_next_batch(&UserId::from(BOT), "s1").unwrap();
        transport.push_event(EventSource::Timeline, msg("$1", "@alice:example.org", "ping"));
        transport.push_cursor("s2");

        let mut bot = bot_with(transport.clone(), storage.clone());
        bot.on(
            handler_fn("pong", |_, client, event| async move {
                client.send_text(&event.room, "pong").await;
                Ok(())
            }),
            vec![message_matching(pattern(r"\Aping").unwrap())],
        );

        let (trigger, shutdown) = shutdown::channel();
        let running = tokio::spawn(bot.run(shutdown));
        // presence + pong + mark_read
        transport.wait_for_executed(3).await;
        trigger.trigger();
        running.await.unwrap().unwrap();

        assert_eq!(transport.listened_since(), Some(Some("s1".to_string())));
        assert_eq!(storage.load_next_batch(&UserId::from(BOT)).unwrap(), Some("s2".to_string()));
        let executed = transport.executed();
        assert_eq!(
            executed.first(),
            Some(&OutboundAction::SetPresence { presence: Presence::Online })
        );
        assert_eq!(
            executed.last(),
            Some(&OutboundAction::SetPresence { presence: Presence::Offline })
        );
        assert_eq!(transport.texts(), vec!["pong"]);
    }

    #[tokio::test]
    async fn test_run_ignores_rate_limited_presence() {
        let transport = Arc::new(RecordingTransport::new(BOT));
        transport.fail_next(HeraldError::RateLimited("M_LIMIT_EXCEEDED".into()));
        transport.close_after_inbound();
        let bot = bot_with(transport.clone(), Arc::new(MemoryBotStorage::new()));

        let (_trigger, shutdown) = shutdown::channel();
        let err = bot.run(shutdown).await.unwrap_err();
        assert!(matches!(err, HeraldError::Transport(_)));
        assert_eq!(transport.listened_since(), Some(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_end_flushes_queued_replies() {
        let transport = Arc::new(RecordingTransport::new(BOT));
        transport.set_delay(Duration::from_millis(200));
        for i in 1..=3 {
            transport.push_event(EventSource::Timeline, msg(&format!("${i}"), "@alice:example.org", "ping"));
        }
        transport.close_after_inbound();
        let mut bot = bot_with(transport.clone(), Arc::new(MemoryBotStorage::new()));
        bot.on(
            handler_fn("pong", |_, client, event| async move {
                client.send_text(&event.room, "pong").await;
                Ok(())
            }),
            vec![message_matching(pattern(r"\Aping").unwrap())],
        );

        let (_trigger, shutdown) = shutdown::channel();
        let err = bot.run(shutdown).await.unwrap_err();
        assert!(matches!(err, HeraldError::Transport(_)));
        assert_eq!(transport.texts(), vec!["pong", "pong", "pong"]);
        assert!(matches!(
            transport.executed().last(),
            Some(OutboundAction::SetPresence { presence: Presence::Offline })
        ));
    }

    proptest! {
        #[test]
        fn property_handler_runs_iff_predicates_hold(
            outcomes in proptest::collection::vec(proptest::collection::vec(any::<bool>(), 0..4), 1..6)
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let (mut bot, _) = bot();
            let counters: Vec<Arc<AtomicUsize>> =
                outcomes.iter().map(|_| Arc::new(AtomicUsize::new(0))).collect();
            for (set, counter) in outcomes.iter().zip(&counters) {
                let predicates = set.iter().copied().map(constant).collect();
                bot.on(counting("h", counter.clone()), predicates);
            }

            let report = runtime.block_on(
                bot.dispatch(EventSource::Timeline, &msg("$1", "@alice:example.org", "x")),
            );

            let mut expected_matches = 0;
            for (set, counter) in outcomes.iter().zip(&counters) {
                let expected = set.iter().all(|b| *b);
                expected_matches += usize::from(expected);
                prop_assert_eq!(counter.load(Ordering::SeqCst), usize::from(expected));
            }
            prop_assert_eq!(report.matched, expected_matches);
        }
    }
}
