//! Built-in handlers every Herald instance registers: the invite greeter,
//! the `status` reply and the dice roller.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_core::error::Result;
use herald_core::types::Event;
use rand::Rng;
use regex::Regex;

use crate::dispatcher::Bot;
use crate::handler::{EventHandler, HandlerContext};
use crate::outbound::OutboundClient;
use crate::predicates::{all, at_user, invited_to_room, message_matching, pattern};

/// Anything after an optional mention, then the word `status`.
pub const STATUS_PATTERN: &str = r"\A\s*@?\S+\s+status\b";
pub const DICE_PATTERN: &str = r"\A([0-9]+\s+)?dice\s+roll\s*";
pub const MAX_DICE: usize = 20;

/// Version details baked in at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    pub sha: &'static str,
    pub build_time: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            sha: option_env!("HERALD_GIT_SHA").unwrap_or("unknown"),
            build_time: option_env!("HERALD_BUILD_TIME").unwrap_or("unknown"),
        }
    }
}

/// Register the greeter, status and dice handlers.
pub fn register(bot: &mut Bot, started: DateTime<Utc>) -> Result<()> {
    let me = bot.user_id().clone();
    bot.on(Arc::new(InviteGreeter), vec![invited_to_room()]);
    bot.on(
        Arc::new(StatusHandler::new(started, BuildInfo::current())),
        vec![all(vec![message_matching(pattern(STATUS_PATTERN)?), at_user(&me)])],
    );
    let dice = DiceHandler::new()?;
    let predicate = message_matching(dice.pattern.clone());
    bot.on(Arc::new(dice), vec![predicate]);
    tracing::info!("🧩 Built-in handlers registered for {me}");
    Ok(())
}

/// Joins rooms the bot is invited to and waves.
pub struct InviteGreeter;

#[async_trait]
impl EventHandler for InviteGreeter {
    fn name(&self) -> &str {
        "invite_greeter"
    }

    async fn handle(&self, _ctx: &HandlerContext, client: &OutboundClient, event: &Event) -> Result<()> {
        tracing::info!("📨 Invited to {} by {}", event.room, event.sender);
        client.join_room(&event.room).await;
        client.send_text(&event.room, "👋").await;
        Ok(())
    }
}

/// Replies with uptime and build metadata.
pub struct StatusHandler {
    started: DateTime<Utc>,
    build: BuildInfo,
}

impl StatusHandler {
    pub fn new(started: DateTime<Utc>, build: BuildInfo) -> Self {
        Self { started, build }
    }

    pub fn render(&self, now: DateTime<Utc>) -> String {
        format!(
            "🤖 running since <strong>{}</strong>, version <code>{}</code>, sha <code>{}</code>, build time <strong>{}</strong>",
            humanize_since(now - self.started),
            self.build.version,
            self.build.sha,
            self.build.build_time,
        )
    }
}

#[async_trait]
impl EventHandler for StatusHandler {
    fn name(&self) -> &str {
        "status"
    }

    async fn handle(&self, _ctx: &HandlerContext, client: &OutboundClient, event: &Event) -> Result<()> {
        client.send_html(&event.room, self.render(Utc::now())).await;
        Ok(())
    }
}

fn humanize_since(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    let (n, unit) = match secs {
        0..=59 => return "just now".to_string(),
        60..=3599 => (secs / 60, "minute"),
        3600..=86_399 => (secs / 3600, "hour"),
        _ => (secs / 86_400, "day"),
    };
    if n == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}

/// `[N] dice roll`: rolls N six-sided dice, one when N is left out.
pub struct DiceHandler {
    pattern: Regex,
}

impl DiceHandler {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: pattern(DICE_PATTERN)?,
        })
    }

    /// How many dice the message asks for.
    fn requested(&self, body: &str) -> usize {
        let digits = self
            .pattern
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim());
        match digits {
            // Only overflow can fail here; that many dice is too many anyway.
            Some(d) => d.parse::<usize>().unwrap_or(usize::MAX).max(1),
            None => 1,
        }
    }

    pub fn reply<R: Rng>(&self, body: &str, rng: &mut R) -> String {
        let count = self.requested(body);
        if count > MAX_DICE {
            return "Sorry, I don't have that many dice!".to_string();
        }
        let rolls: Vec<String> = (0..count).map(|_| rng.gen_range(1..=6u8).to_string()).collect();
        format!("🎲 I've rolled the dice for you: {}", rolls.join(", "))
    }
}

#[async_trait]
impl EventHandler for DiceHandler {
    fn name(&self) -> &str {
        "dice"
    }

    async fn handle(&self, _ctx: &HandlerContext, client: &OutboundClient, event: &Event) -> Result<()> {
        let reply = self.reply(&event.body, &mut rand::thread_rng());
        client.send_text(&event.room, reply).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBotStorage;
    use crate::testing::RecordingTransport;
    use herald_core::config::HeraldConfig;
    use herald_core::shutdown;
    use herald_core::types::{EventSource, Membership, OutboundAction, RoomId, UserId};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const BOT: &str = "@herald:example.org";

    fn answers_status(bot_user: &UserId, body: &str) -> bool {
        let event = Event::message("$1", "!room:local", "@alice:local", body);
        let predicate = all(vec![message_matching(pattern(STATUS_PATTERN).unwrap()), at_user(bot_user)]);
        predicate.matches(EventSource::Timeline, &event)
    }

    #[test]
    fn test_status_requires_mention() {
        let me = UserId::from(BOT);
        assert!(answers_status(&me, "herald: status"));
        assert!(answers_status(&me, "@herald status please"));
        assert!(!answers_status(&me, "status"));
        assert!(!answers_status(&me, "alice: status"));
        assert!(!answers_status(&me, "herald: statuses"));
    }

    #[test]
    fn test_status_render() {
        let started = Utc::now() - chrono::Duration::hours(3);
        let handler = StatusHandler::new(
            started,
            BuildInfo {
                version: "0.2.0",
                sha: "abc123",
                build_time: "2026-01-01T00:00:00Z",
            },
        );
        let html = handler.render(Utc::now());
        assert!(html.contains("<strong>3 hours ago</strong>"));
        assert!(html.contains("<code>abc123</code>"));
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize_since(chrono::Duration::seconds(5)), "just now");
        assert_eq!(humanize_since(chrono::Duration::seconds(61)), "1 minute ago");
        assert_eq!(humanize_since(chrono::Duration::days(4)), "4 days ago");
    }

    #[test]
    fn test_dice_counts() {
        let dice = DiceHandler::new().unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let one = dice.reply("dice roll", &mut rng);
        let rolls = one.trim_start_matches("🎲 I've rolled the dice for you: ");
        assert_eq!(rolls.split(", ").count(), 1);

        let three = dice.reply("3 Dice Roll", &mut rng);
        let rolls: Vec<u8> = three
            .trim_start_matches("🎲 I've rolled the dice for you: ")
            .split(", ")
            .map(|r| r.parse().unwrap())
            .collect();
        assert_eq!(rolls.len(), 3);
        assert!(rolls.iter().all(|r| (1..=6).contains(r)));

        assert_eq!(dice.reply("21 dice roll", &mut rng), "Sorry, I don't have that many dice!");
        assert_eq!(
            dice.reply("99999999999999999999999 dice roll", &mut rng),
            "Sorry, I don't have that many dice!"
        );
    }

    #[tokio::test]
    async fn test_registered_builtins() {
        let transport = Arc::new(RecordingTransport::new(BOT));
        let mut config = HeraldConfig::default();
        config.bot.user_id = BOT.into();
        let mut bot = Bot::new(transport.clone(), Arc::new(MemoryBotStorage::new()), &config);
        register(&mut bot, Utc::now()).unwrap();
        assert_eq!(bot.handler_count(), 3);

        let invite = Event::membership("$1", "!new:example.org", "@alice:example.org", Membership::Invite);
        let report = bot.dispatch(EventSource::Invite, &invite).await;
        assert_eq!(report.matched, 1);

        let status = Event::message("$2", "!new:example.org", "@alice:example.org", "herald: status");
        assert_eq!(bot.dispatch(EventSource::Timeline, &status).await.matched, 1);

        let (trigger, shutdown) = shutdown::channel();
        let handle = bot.take_worker().unwrap().spawn(shutdown);
        // join, wave, mark read, status html, mark read
        transport.wait_for_executed(5).await;
        trigger.trigger();
        handle.await.unwrap();

        let executed = transport.executed();
        assert_eq!(
            executed[0],
            OutboundAction::JoinRoom {
                room: RoomId::from("!new:example.org")
            }
        );
        assert_eq!(transport.texts(), vec!["👋"]);
        assert_eq!(transport.htmls().len(), 1);
    }
}
