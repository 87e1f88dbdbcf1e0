//! Scripted in-memory transport for tests.
//!
//! Records every action the outbound worker executes, plays back a fixed list
//! of inbound sync items, and can be told to fail the next few calls.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use herald_core::error::{HeraldError, Result};
use herald_core::traits::{Credentials, Session, SyncStream, Transport};
use herald_core::types::{DeviceId, Event, EventSource, OutboundAction, SyncItem, UserId};
use tokio::sync::Notify;

#[derive(Default)]
struct State {
    inbound: Vec<SyncItem>,
    failures: VecDeque<HeraldError>,
    attempts: Vec<OutboundAction>,
    executed: Vec<OutboundAction>,
    logins: Vec<Credentials>,
    since: Option<Option<String>>,
}

pub struct RecordingTransport {
    user: UserId,
    state: Mutex<State>,
    notify: Notify,
    delay: Mutex<Duration>,
    reject_login: Mutex<bool>,
    close_after_inbound: Mutex<bool>,
    issued_device: DeviceId,
}

impl RecordingTransport {
    pub fn new(user: &str) -> Self {
        Self {
            user: UserId::from(user),
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            delay: Mutex::new(Duration::ZERO),
            reject_login: Mutex::new(false),
            close_after_inbound: Mutex::new(false),
            issued_device: DeviceId::from("TESTDEVICE"),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue an error for the next `execute` call.
    pub fn fail_next(&self, error: HeraldError) {
        self.state().failures.push_back(error);
    }

    /// Make every `execute` call take this long.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn reject_login(&self) {
        *self.reject_login.lock().unwrap_or_else(|e| e.into_inner()) = true;
    }

    /// End the sync stream once the scripted items are delivered instead of
    /// keeping it open.
    pub fn close_after_inbound(&self) {
        *self.close_after_inbound.lock().unwrap_or_else(|e| e.into_inner()) = true;
    }

    pub fn push_event(&self, source: EventSource, event: Event) {
        self.state().inbound.push(SyncItem::Event(source, event));
    }

    pub fn push_cursor(&self, token: &str) {
        self.state().inbound.push(SyncItem::Cursor(token.to_string()));
    }

    /// Every action handed to `execute`, including failed ones.
    pub fn attempts(&self) -> Vec<OutboundAction> {
        self.state().attempts.clone()
    }

    /// Actions that completed successfully.
    pub fn executed(&self) -> Vec<OutboundAction> {
        self.state().executed.clone()
    }

    pub fn logins(&self) -> Vec<Credentials> {
        self.state().logins.clone()
    }

    /// The cursor passed to the last `listen` call, if `listen` was called.
    pub fn listened_since(&self) -> Option<Option<String>> {
        self.state().since.clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.executed()
            .into_iter()
            .filter_map(|a| match a {
                OutboundAction::SendText { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<String> {
        self.executed()
            .into_iter()
            .filter_map(|a| match a {
                OutboundAction::SendNotice { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }

    pub fn htmls(&self) -> Vec<String> {
        self.executed()
            .into_iter()
            .filter_map(|a| match a {
                OutboundAction::SendHtml { html, .. } => Some(html),
                _ => None,
            })
            .collect()
    }

    /// Wait until at least `n` actions have executed successfully.
    pub async fn wait_for_executed(&self, n: usize) {
        loop {
            let notified = self.notify.notified();
            if self.state().executed.len() >= n {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn login(&self, credentials: &Credentials) -> Result<Session> {
        self.state().logins.push(credentials.clone());
        if *self.reject_login.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(HeraldError::AuthenticationFailed("M_FORBIDDEN".into()));
        }
        Ok(Session {
            user_id: self.user.clone(),
            device_id: credentials
                .device_id
                .clone()
                .unwrap_or_else(|| self.issued_device.clone()),
        })
    }

    async fn listen(&self, since: Option<String>) -> Result<SyncStream> {
        let items = {
            let mut state = self.state();
            state.since = Some(since);
            std::mem::take(&mut state.inbound)
        };
        let close = *self.close_after_inbound.lock().unwrap_or_else(|e| e.into_inner());
        if close {
            Ok(Box::new(stream::iter(items)))
        } else {
            Ok(Box::new(stream::iter(items).chain(stream::pending())))
        }
    }

    async fn execute(&self, action: &OutboundAction) -> Result<()> {
        self.state().attempts.push(action.clone());
        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.state().failures.pop_front() {
            return Err(error);
        }
        self.state().executed.push(action.clone());
        self.notify.notify_waiters();
        Ok(())
    }
}
