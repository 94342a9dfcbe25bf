//! Ordered, sender-aware subscription registry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{
    DispatchError, Dispatcher, HandlerError, HandlerFn, Invocation, ResultPolicy, box_handler,
};
use crate::config::DispatchConfig;
use crate::context::Sender;
use crate::events::{EngineEvent, EventValue};

/// Handle returned by `subscribe*`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    /// `None` accepts every sender.
    sender: Option<Sender>,
    handler: HandlerFn,
}

/// In-process [`Dispatcher`] keeping, per event, handlers in subscription order.
///
/// A trigger snapshots the matching handlers, releases the registry lock, and
/// awaits each handler before starting the next. The first handler error
/// stops the chain.
pub struct EventBus {
    handlers: RwLock<HashMap<EngineEvent, Vec<Subscription>>>,
    policies: HashMap<EngineEvent, ResultPolicy>,
    default_policy: ResultPolicy,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            policies: HashMap::new(),
            default_policy: ResultPolicy::default(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Build a bus whose result policies come from configuration.
    ///
    /// Policy keys are validated by [`crate::config::EngineConfig::validate`];
    /// unknown names are skipped here.
    pub fn from_config(config: &DispatchConfig) -> Self {
        let mut bus = Self::new().with_default_policy(config.default_policy);
        for (name, policy) in &config.policies {
            match name.parse::<EngineEvent>() {
                Ok(event) => bus.set_policy(event, *policy),
                Err(err) => log::warn!("ignoring policy: {err}"),
            }
        }
        bus
    }

    pub fn with_default_policy(mut self, policy: ResultPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn with_policy(mut self, event: EngineEvent, policy: ResultPolicy) -> Self {
        self.set_policy(event, policy);
        self
    }

    pub fn set_policy(&mut self, event: EngineEvent, policy: ResultPolicy) {
        self.policies.insert(event, policy);
    }

    pub fn policy(&self, event: EngineEvent) -> ResultPolicy {
        self.policies
            .get(&event)
            .copied()
            .unwrap_or(self.default_policy)
    }

    /// Run `handler` on every trigger of `event`.
    pub fn subscribe<F, Fut>(
        &self,
        event: EngineEvent,
        handler: F,
    ) -> Result<SubscriptionId, DispatchError>
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<EventValue, HandlerError>> + Send + 'static,
    {
        self.insert(event, None, box_handler(handler))
    }

    /// Run `handler` only for triggers issued by `sender`.
    pub fn subscribe_from<F, Fut>(
        &self,
        event: EngineEvent,
        sender: Sender,
        handler: F,
    ) -> Result<SubscriptionId, DispatchError>
    where
        F: Fn(Invocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<EventValue, HandlerError>> + Send + 'static,
    {
        self.insert(event, Some(sender), box_handler(handler))
    }

    /// Subscribe one already-boxed handler to several events.
    pub fn subscribe_many(
        &self,
        events: impl IntoIterator<Item = EngineEvent>,
        handler: HandlerFn,
    ) -> Result<Vec<SubscriptionId>, DispatchError> {
        events
            .into_iter()
            .map(|event| self.insert(event, None, handler.clone()))
            .collect()
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<bool, DispatchError> {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| DispatchError::RegistryPoisoned)?;
        for subscriptions in handlers.values_mut() {
            if let Some(pos) = subscriptions.iter().position(|s| s.id == id) {
                subscriptions.remove(pos);
                log::debug!("unsubscribed {id:?}");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Number of handlers subscribed to `event`, regardless of sender.
    pub fn handler_count(&self, event: EngineEvent) -> Result<usize, DispatchError> {
        let handlers = self
            .handlers
            .read()
            .map_err(|_| DispatchError::RegistryPoisoned)?;
        Ok(handlers.get(&event).map_or(0, Vec::len))
    }

    fn insert(
        &self,
        event: EngineEvent,
        sender: Option<Sender>,
        handler: HandlerFn,
    ) -> Result<SubscriptionId, DispatchError> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| DispatchError::RegistryPoisoned)?;
        log::debug!(
            "subscribed {id:?} to {event}{}",
            sender
                .as_ref()
                .map(|s| format!(" (sender {s})"))
                .unwrap_or_default()
        );
        handlers.entry(event).or_default().push(Subscription {
            id,
            sender,
            handler,
        });
        Ok(id)
    }

    /// Handlers for `event` that accept `sender`, in subscription order.
    fn matching(
        &self,
        event: EngineEvent,
        sender: &Sender,
    ) -> Result<Vec<HandlerFn>, DispatchError> {
        let handlers = self
            .handlers
            .read()
            .map_err(|_| DispatchError::RegistryPoisoned)?;
        Ok(handlers
            .get(&event)
            .map(|subscriptions| {
                subscriptions
                    .iter()
                    .filter(|s| s.sender.as_ref().is_none_or(|only| only == sender))
                    .map(|s| s.handler.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl Dispatcher for EventBus {
    fn trigger(
        &self,
        invocation: Invocation,
    ) -> impl Future<Output = Result<EventValue, DispatchError>> + Send {
        async move {
            let event = invocation.event;
            let handlers = self.matching(event, &invocation.sender)?;
            log::trace!(
                "trigger {event} from {} ({} handlers)",
                invocation.sender,
                handlers.len()
            );

            let mut produced = Vec::new();
            for handler in handlers {
                let value = handler(invocation.clone())
                    .await
                    .map_err(|source| DispatchError::Handler { event, source })?;
                if !value.is_unit() {
                    produced.push(value);
                }
            }

            self.policy(event).resolve(event, produced)
        }
    }
}
