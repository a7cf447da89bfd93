//! # Event Handlers
//!
//! The consumer side of the bus. A handler is invoked once per delivered
//! event; returning an error (or panicking) is counted as a failure and
//! recorded in the error ring, never retried by the bus.

use crate::events::{Event, EventType};
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

/// Errors a handler may report back to the bus.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("handler failed: {0}")]
    Failed(String),

    /// A collaborator the handler depends on is unreachable.
    #[error("dependency unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected event type {0}")]
    UnexpectedEvent(EventType),
}

impl HandlerError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// A subscriber registered against one event type.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: Arc<Event>) -> Result<(), HandlerError>;
}

#[async_trait]
impl<H: EventHandler + ?Sized> EventHandler for Arc<H> {
    async fn handle(&self, event: Arc<Event>) -> Result<(), HandlerError> {
        (**self).handle(event).await
    }
}

/// Adapter turning an async closure into an [`EventHandler`].
pub struct FnHandler<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F, Fut>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, event: Arc<Event>) -> Result<(), HandlerError> {
        (self.f)(event).await
    }
}

/// Wrap an async closure as a handler.
///
/// ```ignore
/// bus.subscribe(EventType::ScoreUpdated, handler_fn(|event| async move {
///     tracing::info!(event_id = %event.event_id(), "score changed");
///     Ok(())
/// }), "score-logger", 1)?;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F, Fut>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    FnHandler {
        f,
        _marker: PhantomData,
    }
}
