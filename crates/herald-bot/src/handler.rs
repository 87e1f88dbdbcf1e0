//! Handler trait and registration records.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use herald_core::error::Result;
use herald_core::types::{Event, EventSource, UserId};
use tokio::time::Instant;

use crate::outbound::OutboundClient;
use crate::predicates::Predicate;

/// Per-invocation context handed to a handler.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// The identity the bot is logged in as.
    pub bot_user: UserId,
    pub source: EventSource,
    /// The handler is cancelled once this instant passes.
    pub deadline: Instant,
}

/// Reacts to a matched event. Side effects go through the outbound client.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in dispatch logs.
    fn name(&self) -> &str;

    async fn handle(&self, ctx: &HandlerContext, client: &OutboundClient, event: &Event) -> Result<()>;
}

type HandlerFn =
    dyn Fn(HandlerContext, OutboundClient, Event) -> BoxFuture<'static, Result<()>> + Send + Sync;

struct FnHandler {
    name: String,
    f: Box<HandlerFn>,
}

#[async_trait]
impl EventHandler for FnHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, ctx: &HandlerContext, client: &OutboundClient, event: &Event) -> Result<()> {
        (self.f)(ctx.clone(), client.clone(), event.clone()).await
    }
}

/// Wrap an async closure as a handler.
///
/// ```ignore
/// bot.on(
///     handler_fn("wave", |_ctx, client, event| async move {
///         client.send_reaction(&event.room, &event.id, "👋").await;
///         Ok(())
///     }),
///     vec![invited_to_room()],
/// );
/// ```
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn EventHandler>
where
    F: Fn(HandlerContext, OutboundClient, Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f: Box::new(move |ctx, client, event| f(ctx, client, event).boxed()),
    })
}

/// A registered handler and the predicates guarding it.
#[derive(Clone)]
pub struct Handler {
    pub handler: Arc<dyn EventHandler>,
    pub predicates: Vec<Predicate>,
}

impl Handler {
    pub fn name(&self) -> &str {
        self.handler.name()
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name())
            .field("predicates", &self.predicates)
            .finish()
    }
}
