//! Console transport: stdin lines become room messages, actions are printed.
//!
//! One line is one message from the operator in a single room. A few slash
//! commands stand in for things a real homeserver would send:
//!
//! ```text
//! /invite                 invite the bot to the room
//! /as @bob:console hello  a message from someone else
//! ```

use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::stream::Stream;
use herald_core::error::{HeraldError, Result};
use herald_core::traits::{Credentials, Session, SyncStream, Transport};
use herald_core::types::{DeviceId, Event, EventSource, Membership, OutboundAction, RoomId, SyncItem, UserId};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;

pub const DEFAULT_OPERATOR: &str = "@operator:console";
pub const DEFAULT_ROOM: &str = "!console:local";
const DEFAULT_DEVICE: &str = "CONSOLE";

type Input = Box<dyn AsyncBufRead + Send + Unpin>;
type Output = Box<dyn AsyncWrite + Send + Unpin>;

pub struct ConsoleTransport {
    operator: UserId,
    room: RoomId,
    input: Mutex<Option<Input>>,
    output: tokio::sync::Mutex<Output>,
}

impl ConsoleTransport {
    /// Read from stdin, write to stdout.
    pub fn stdio(operator: UserId, room: RoomId) -> Self {
        Self::with_io(
            operator,
            room,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
    }

    pub fn with_io(
        operator: UserId,
        room: RoomId,
        input: impl AsyncBufRead + Send + Unpin + 'static,
        output: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            operator,
            room,
            input: Mutex::new(Some(Box::new(input))),
            output: tokio::sync::Mutex::new(Box::new(output)),
        }
    }

    async fn print(&self, line: String) -> Result<()> {
        let mut out = self.output.lock().await;
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
        Ok(())
    }
}

/// Turn one input line into an event. Blank lines yield nothing.
pub fn parse_line(line: &str, seq: u64, operator: &UserId, room: &RoomId) -> Option<(EventSource, Event)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let id = format!("$console{seq}");

    if line == "/invite" {
        let event = Event::membership(id, room.clone(), operator.clone(), Membership::Invite);
        return Some((EventSource::Invite, event));
    }
    if let Some(rest) = line.strip_prefix("/as ") {
        let (sender, body) = rest.trim().split_once(' ')?;
        return Some((
            EventSource::Timeline,
            Event::message(id, room.clone(), sender, body.trim()),
        ));
    }
    Some((
        EventSource::Timeline,
        Event::message(id, room.clone(), operator.clone(), line),
    ))
}

/// How an action looks on the console. Read receipts print nothing.
pub fn render(action: &OutboundAction) -> Option<String> {
    let line = match action {
        OutboundAction::SendText { room, body } => format!("[{room}] {body}"),
        OutboundAction::SendHtml { room, html } => format!("[{room}] (html) {html}"),
        OutboundAction::SendNotice { room, body } => format!("[{room}] (notice) {body}"),
        OutboundAction::SendReaction { room, event, key } => format!("[{room}] reacted {key} to {event}"),
        OutboundAction::JoinRoom { room } => format!("* joined {room}"),
        OutboundAction::SetPresence { presence } => format!("* presence: {presence}"),
        OutboundAction::MarkRead { .. } => return None,
    };
    Some(line)
}

#[async_trait]
impl Transport for ConsoleTransport {
    fn name(&self) -> &str {
        "console"
    }

    async fn login(&self, credentials: &Credentials) -> Result<Session> {
        if credentials.user.is_empty() {
            return Err(HeraldError::AuthenticationFailed("no user id given".into()));
        }
        let device_id = credentials
            .device_id
            .clone()
            .unwrap_or_else(|| DeviceId::from(DEFAULT_DEVICE));
        tracing::info!("🖥️ Console session for {} ({device_id})", credentials.user);
        Ok(Session {
            user_id: UserId::from(credentials.user.as_str()),
            device_id,
        })
    }

    /// Lines are numbered; the cursor after each event is that number, so a
    /// stored cursor continues the numbering on the next run.
    async fn listen(&self, since: Option<String>) -> Result<SyncStream> {
        let input = self
            .input
            .lock()
            .map_err(|e| HeraldError::transport(e.to_string()))?
            .take()
            .ok_or_else(|| HeraldError::transport("console input already in use"))?;
        let mut seq: u64 = since.as_deref().and_then(|s| s.parse().ok()).unwrap_or(0);
        let operator = self.operator.clone();
        let room = self.room.clone();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            tracing::info!("Console reader started in {room} as {operator}");
            let mut lines = LinesStream::new(input.lines());
            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::error!("Console read error: {e}");
                        break;
                    }
                };
                seq += 1;
                let Some((source, event)) = parse_line(&line, seq, &operator, &room) else {
                    continue;
                };
                if tx.send(SyncItem::Event(source, event)).is_err()
                    || tx.send(SyncItem::Cursor(seq.to_string())).is_err()
                {
                    tracing::info!("Console reader stopped (receiver dropped)");
                    return;
                }
            }
            tracing::info!("Console input closed");
        });

        Ok(Box::new(ConsoleStream { rx }))
    }

    async fn execute(&self, action: &OutboundAction) -> Result<()> {
        match render(action) {
            Some(line) => self.print(line).await,
            None => {
                tracing::trace!(action = action.name(), "not rendered");
                Ok(())
            }
        }
    }
}

/// Inbound items read from the console.
pub struct ConsoleStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<SyncItem>,
}

impl Stream for ConsoleStream {
    type Item = SyncItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
