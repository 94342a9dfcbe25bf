//! Event dispatch: the seam between the engine facade and its handlers.
//!
//! The facade only knows the [`Dispatcher`] trait. Production code injects an
//! [`EventBus`]; tests inject recording stubs. Nothing here is global, so two
//! engines with different buses never see each other's handlers.
//!
//! ## Pieces
//!
//! - [`Invocation`] - everything a handler receives: event, sender, shared
//!   context, and the operation's arguments.
//! - [`HandlerFn`] / [`box_handler`] - type-erased async handler.
//! - [`ResultPolicy`] - how several handler results collapse into one.
//! - [`EventBus`] - ordered, sender-aware subscription registry.

mod bus;

pub use bus::{EventBus, SubscriptionId};

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

use crate::context::{Context, Sender};
use crate::events::{EngineEvent, EventArgs, EventValue};

/// Errors raised by individual handlers.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("no image loaded in context")]
    MissingImage,
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("pixel data length {actual} does not match {width}x{height} RGB or RGBA")]
    PixelDataMismatch {
        width: u32,
        height: u32,
        actual: usize,
    },
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("{0}")]
    Failed(String),
}

/// Errors surfaced by a dispatcher's `trigger`.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("handler for {event} failed: {source}")]
    Handler {
        event: EngineEvent,
        #[source]
        source: HandlerError,
    },
    #[error("{count} handlers produced a result for {event}; expected at most one")]
    AmbiguousResult { event: EngineEvent, count: usize },
    #[error("handler registry lock poisoned")]
    RegistryPoisoned,
}

/// One trigger of one event, as seen by a handler.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub event: EngineEvent,
    pub sender: Sender,
    pub context: Context,
    pub args: EventArgs,
}

/// Boxed future returned by type-erased handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<EventValue, HandlerError>> + Send>>;

/// Type-erased async handler.
pub type HandlerFn = Arc<dyn Fn(Invocation) -> HandlerFuture + Send + Sync>;

/// Erase an async closure into a [`HandlerFn`].
pub fn box_handler<F, Fut>(handler: F) -> HandlerFn
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<EventValue, HandlerError>> + Send + 'static,
{
    Arc::new(move |invocation| Box::pin(handler(invocation)))
}

/// How a dispatcher collapses the non-unit results of several handlers.
///
/// Handlers returning [`EventValue::Unit`] never count. With no counted
/// results every policy yields `Unit`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultPolicy {
    /// The earliest-subscribed handler's result wins.
    First,
    /// The latest-subscribed handler's result wins.
    Last,
    /// At most one handler may produce a result.
    #[default]
    Single,
}

impl ResultPolicy {
    pub fn resolve(
        self,
        event: EngineEvent,
        mut values: Vec<EventValue>,
    ) -> Result<EventValue, DispatchError> {
        match self {
            ResultPolicy::First => Ok(values.into_iter().next().unwrap_or(EventValue::Unit)),
            ResultPolicy::Last => Ok(values.pop().unwrap_or(EventValue::Unit)),
            ResultPolicy::Single => match values.len() {
                0 => Ok(EventValue::Unit),
                1 => Ok(values.remove(0)),
                count => Err(DispatchError::AmbiguousResult { event, count }),
            },
        }
    }
}

/// Anything able to fire a named event at its subscribed handlers.
///
/// Implementations must run the handlers of one trigger to completion before
/// the returned future resolves; the engine relies on that to order phases.
pub trait Dispatcher: Send + Sync {
    fn trigger(
        &self,
        invocation: Invocation,
    ) -> impl Future<Output = Result<EventValue, DispatchError>> + Send;
}

impl<D: Dispatcher> Dispatcher for Arc<D> {
    fn trigger(
        &self,
        invocation: Invocation,
    ) -> impl Future<Output = Result<EventValue, DispatchError>> + Send {
        (**self).trigger(invocation)
    }
}

impl<D: Dispatcher> Dispatcher for &D {
    fn trigger(
        &self,
        invocation: Invocation,
    ) -> impl Future<Output = Result<EventValue, DispatchError>> + Send {
        (**self).trigger(invocation)
    }
}
