//! Chat commands for reminders: `remind me ...`, `cancel reminder <id>`
//! and `reminders`.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use herald_bot::predicates::message_matching;
use herald_bot::{Bot, EventHandler, HandlerContext, OutboundClient};
use herald_core::error::{HeraldError, Result};
use herald_core::types::Event;

use crate::engine::Scheduler;
use crate::tasks::Reminder;
use crate::timespec::CommandPatterns;

/// Listing entries are flushed once more than this many are buffered.
const PAGE_FLUSH_AFTER: usize = 5;

const CANCEL_HINT: &str = "To cancel a reminder, message me like so: <tt>cancel reminder 12</tt>";

/// Register the three reminder commands on the bot.
pub fn register(bot: &mut Bot, scheduler: Arc<Scheduler>) -> Result<()> {
    let patterns = CommandPatterns::new()?;
    bot.on(
        Arc::new(RemindHandler::new(scheduler.clone(), patterns.clone())),
        vec![message_matching(patterns.remind.clone())],
    );
    bot.on(
        Arc::new(CancelHandler::new(scheduler.clone(), patterns.clone())),
        vec![message_matching(patterns.cancel.clone())],
    );
    bot.on(Arc::new(ListHandler::new(scheduler)), vec![message_matching(patterns.list)]);
    tracing::info!("🗓️ Reminder commands registered");
    Ok(())
}

/// `remind me <time-spec> to <message>`
pub struct RemindHandler {
    scheduler: Arc<Scheduler>,
    patterns: CommandPatterns,
}

impl RemindHandler {
    pub fn new(scheduler: Arc<Scheduler>, patterns: CommandPatterns) -> Self {
        Self { scheduler, patterns }
    }
}

fn usage(user: &str) -> String {
    format!(
        "{user} I can remind you of stuff<br/>\
         Try <tt>remind me tomorrow at 3pm to call mom</tt> or \
         <tt>remind me every weekday morning to stand up</tt>"
    )
}

#[async_trait]
impl EventHandler for RemindHandler {
    fn name(&self) -> &str {
        "remind"
    }

    async fn handle(&self, _ctx: &HandlerContext, client: &OutboundClient, event: &Event) -> Result<()> {
        let spec = match self.patterns.parse_reminder(&event.body, &self.scheduler.now_local()) {
            Ok(spec) => spec,
            Err(HeraldError::Parse(reason)) => {
                tracing::debug!(sender = %event.sender, %reason, "unparsable reminder");
                client.send_html(&event.room, usage(event.sender.localpart())).await;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let reminder = self.scheduler.add(Reminder::new(
            spec.recurring,
            spec.day,
            spec.hour,
            spec.minute,
            spec.message,
            event.room.clone(),
            event.sender.clone(),
        ))?;
        client
            .send_text(&event.room, format!("🗓️ New reminder ({}) {}", reminder.id, reminder))
            .await;
        Ok(())
    }
}

/// `cancel reminder <id>`
pub struct CancelHandler {
    scheduler: Arc<Scheduler>,
    patterns: CommandPatterns,
}

impl CancelHandler {
    pub fn new(scheduler: Arc<Scheduler>, patterns: CommandPatterns) -> Self {
        Self { scheduler, patterns }
    }
}

#[async_trait]
impl EventHandler for CancelHandler {
    fn name(&self) -> &str {
        "cancel_reminder"
    }

    async fn handle(&self, _ctx: &HandlerContext, client: &OutboundClient, event: &Event) -> Result<()> {
        let id = match self.patterns.cancel_id(&event.body) {
            Ok(id) => id,
            Err(e) => {
                client
                    .send_text(&event.room, format!("Terribly sorry, but I couldn't cancel that reminder: {e}"))
                    .await;
                return Ok(());
            }
        };

        match self.scheduler.remove(id) {
            Ok(()) => {
                client
                    .send_text(&event.room, format!("✅ Very good, I've cancelled your reminder {id}."))
                    .await;
                Ok(())
            }
            Err(e @ HeraldError::NotFound(_)) => {
                client
                    .send_text(
                        &event.room,
                        format!("Terribly sorry, but I couldn't cancel your reminder {id}: {e}"),
                    )
                    .await;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// `reminders`: the sender's reminders, a few lines per message.
pub struct ListHandler {
    scheduler: Arc<Scheduler>,
}

impl ListHandler {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }
}

/// Split listing lines into messages of at most `PAGE_FLUSH_AFTER + 1` entries.
fn pages(reminders: &[Reminder]) -> Vec<String> {
    let mut pages = Vec::new();
    let mut page = String::new();
    let mut counter = 0;
    for reminder in reminders {
        counter += 1;
        let _ = writeln!(page, "{}. {}", reminder.id, reminder);
        if counter > PAGE_FLUSH_AFTER {
            pages.push(std::mem::take(&mut page));
            counter = 0;
        }
    }
    if !page.is_empty() {
        pages.push(page);
    }
    pages
}

#[async_trait]
impl EventHandler for ListHandler {
    fn name(&self) -> &str {
        "list_reminders"
    }

    async fn handle(&self, _ctx: &HandlerContext, client: &OutboundClient, event: &Event) -> Result<()> {
        let reminders = self.scheduler.list(&event.sender)?;
        let user = event.sender.localpart();
        if reminders.is_empty() {
            client
                .send_text(&event.room, format!("🗓️ I have no reminders for you, {user}"))
                .await;
            return Ok(());
        }

        client
            .send_text(
                &event.room,
                format!("🗓️ I have {} reminders for you, {user}", reminders.len()),
            )
            .await;
        for page in pages(&reminders) {
            client.send_text(&event.room, page).await;
        }
        client.send_html(&event.room, CANCEL_HINT).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryTaskStore, TaskStore};
    use herald_bot::outbound::queue;
    use herald_bot::storage::MemoryBotStorage;
    use herald_bot::testing::RecordingTransport;
    use herald_bot::OutboundWorker;
    use herald_core::config::{HeraldConfig, OutboundConfig, SchedulerConfig};
    use herald_core::shutdown;
    use herald_core::types::{EventSource, RoomId, UserId};
    use tokio::time::{Duration, Instant};

    const BOT: &str = "@herald:example.org";
    const ALICE: &str = "@alice:example.org";

    struct Harness {
        scheduler: Arc<Scheduler>,
        store: Arc<MemoryTaskStore>,
        transport: Arc<RecordingTransport>,
        client: OutboundClient,
        worker: OutboundWorker,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryTaskStore::new());
        let transport = Arc::new(RecordingTransport::new(BOT));
        let (client, worker) = queue(transport.clone(), &OutboundConfig::default());
        let scheduler = Scheduler::new(store.clone(), client.clone(), &SchedulerConfig::default()).unwrap();
        Harness {
            scheduler: Arc::new(scheduler),
            store,
            transport,
            client,
            worker,
        }
    }

    fn ctx() -> HandlerContext {
        HandlerContext {
            bot_user: UserId::from(BOT),
            source: EventSource::Timeline,
            deadline: Instant::now() + Duration::from_secs(5),
        }
    }

    fn msg(body: &str) -> Event {
        Event::message("$1", "!room:example.org", ALICE, body)
    }

    /// Drain `n` actions through the worker and return what was sent.
    async fn drain(h: Harness, n: usize) -> Arc<RecordingTransport> {
        let (trigger, shutdown) = shutdown::channel();
        let handle = h.worker.spawn(shutdown);
        h.transport.wait_for_executed(n).await;
        trigger.trigger();
        handle.await.unwrap();
        h.transport
    }

    #[tokio::test]
    async fn test_remind_replies_with_id() {
        let h = harness();
        let handler = RemindHandler::new(h.scheduler.clone(), CommandPatterns::new().unwrap());
        handler
            .handle(&ctx(), &h.client, &msg("remind me tomorrow at 3pm to call mom"))
            .await
            .unwrap();

        let stored = h.store.list_all().unwrap();
        assert_eq!(stored.len(), 1);
        let reminder = &stored[0];
        assert!(!reminder.recurring);
        assert_eq!((reminder.hour.as_str(), reminder.minute.as_str()), ("15", "00"));
        assert_eq!(reminder.message, "call mom");
        assert!(h.scheduler.is_armed(reminder.id));

        let id = reminder.id;
        let transport = drain(h, 1).await;
        let reply = &transport.texts()[0];
        assert!(reply.starts_with(&format!("🗓️ New reminder ({id}) ")), "{reply}");
        assert!(reply.ends_with("at 15:00: call mom"), "{reply}");
    }

    #[tokio::test]
    async fn test_remind_help() {
        let h = harness();
        let handler = RemindHandler::new(h.scheduler.clone(), CommandPatterns::new().unwrap());
        handler.handle(&ctx(), &h.client, &msg("remind me")).await.unwrap();
        assert!(h.store.list_all().unwrap().is_empty());

        let transport = drain(h, 1).await;
        assert!(transport.htmls()[0].starts_with("alice I can remind you of stuff"));
    }

    #[tokio::test]
    async fn test_cancel_missing_reminder() {
        let h = harness();
        let handler = CancelHandler::new(h.scheduler.clone(), CommandPatterns::new().unwrap());
        handler.handle(&ctx(), &h.client, &msg("cancel reminder 42")).await.unwrap();
        assert_eq!(h.store.delete(42).unwrap(), 0);

        let transport = drain(h, 1).await;
        assert!(transport.texts()[0].starts_with("Terribly sorry, but I couldn't cancel your reminder 42"));
    }

    #[tokio::test]
    async fn test_cancel_existing_reminder() {
        let h = harness();
        let added = h
            .scheduler
            .add(Reminder::new(
                true,
                "day",
                "21",
                "00",
                "floss",
                RoomId::from("!room:example.org"),
                UserId::from(ALICE),
            ))
            .unwrap();
        let handler = CancelHandler::new(h.scheduler.clone(), CommandPatterns::new().unwrap());
        handler
            .handle(&ctx(), &h.client, &msg(&format!("cancel reminder {}", added.id)))
            .await
            .unwrap();
        assert!(!h.scheduler.is_armed(added.id));

        let transport = drain(h, 1).await;
        assert_eq!(
            transport.texts(),
            vec![format!("✅ Very good, I've cancelled your reminder {}.", added.id)]
        );
    }

    #[tokio::test]
    async fn test_list_paginates() {
        let h = harness();
        for hour in 10..17 {
            h.scheduler
                .add(Reminder::new(
                    true,
                    "day",
                    hour.to_string(),
                    "00",
                    "drink water",
                    RoomId::from("!room:example.org"),
                    UserId::from(ALICE),
                ))
                .unwrap();
        }
        let handler = ListHandler::new(h.scheduler.clone());
        handler.handle(&ctx(), &h.client, &msg("reminders")).await.unwrap();

        // header, two pages, cancel hint
        let transport = drain(h, 4).await;
        let texts = transport.texts();
        assert_eq!(texts.len(), 3);
        assert_eq!(texts[0], "🗓️ I have 7 reminders for you, alice");
        assert_eq!(texts[1].lines().count(), 6);
        assert!(texts[1].starts_with("1. every day at 10:00: drink water\n"));
        assert_eq!(texts[2], "7. every day at 16:00: drink water\n");
        assert_eq!(transport.htmls(), vec![CANCEL_HINT]);
    }

    #[tokio::test]
    async fn test_list_empty() {
        let h = harness();
        let handler = ListHandler::new(h.scheduler.clone());
        handler.handle(&ctx(), &h.client, &msg("reminders")).await.unwrap();
        let transport = drain(h, 1).await;
        assert_eq!(transport.texts(), vec!["🗓️ I have no reminders for you, alice"]);
    }

    #[test]
    fn test_pages_of_six() {
        let reminder = |id| {
            let mut r = Reminder::new(
                false,
                "monday",
                "08",
                "00",
                "x",
                RoomId::from("!r:x"),
                UserId::from(ALICE),
            );
            r.id = id;
            r
        };
        let reminders: Vec<_> = (1..=13).map(reminder).collect();
        let sizes: Vec<_> = pages(&reminders).iter().map(|p| p.lines().count()).collect();
        assert_eq!(sizes, vec![6, 6, 1]);
        assert!(pages(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_register() {
        let h = harness();
        let mut config = HeraldConfig::default();
        config.bot.user_id = BOT.into();
        let mut bot = Bot::new(h.transport.clone(), Arc::new(MemoryBotStorage::new()), &config);
        register(&mut bot, h.scheduler.clone()).unwrap();
        assert_eq!(bot.handler_count(), 3);

        let report = bot.dispatch(EventSource::Timeline, &msg("reminders")).await;
        assert_eq!((report.matched, report.succeeded), (1, 1));
        let report = bot.dispatch(EventSource::Timeline, &msg("what are reminders")).await;
        assert_eq!(report.matched, 0);
    }
}
