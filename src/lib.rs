//! # Lifecycle Engine
//!
//! An image engine whose operations are carried out by pluggable handlers.
//! The [`engine::Engine`] facade owns no image code: every operation is a
//! fixed sequence of named events, and whatever handlers are subscribed to
//! those events do the work.
//!
//! # Architecture: Three Phases per Operation
//!
//! ```text
//!              ┌──────────────┐   trigger    ┌────────────┐   await each   ┌──────────┐
//! caller ────► │ Engine       │ ───────────► │ Dispatcher │ ─────────────► │ handlers │
//!              │ (facade)     │ ◄─────────── │ (EventBus) │ ◄───────────── │          │
//!              └──────────────┘  one value   └────────────┘   EventValue   └──────────┘
//!
//! resize:  before_resize → resize → after_resize      (returns ())
//! size:    get_image_size                             (returns ImageSize)
//! ```
//!
//! Before/after events exist for observers: a `before_resize` handler can
//! record the original size in the shared [`context::Details`] and an
//! `after_resize` handler can compare. The main event does the work.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | The facade: one async method per operation, plus proportional sizing |
//! | [`dispatch`] | `Dispatcher` trait, `EventBus`, handler boxing, result policies |
//! | [`events`] | Typed event names, per-operation arguments, handler results |
//! | [`context`] | Per-request shared state (`Context`, `Details`, `FocalPoint`, `Sender`) |
//! | [`handlers`] | Built-in main-phase handlers on top of the `image` crate |
//! | [`config`] | `engine.toml` loading, merging, and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Injected Dispatcher
//!
//! The dispatcher is a value passed to [`engine::Engine::new`], never a
//! process-wide registry. Tests swap in a recording stub; two engines never
//! share handlers by accident.
//!
//! ## Explicit Result Policies
//!
//! When several handlers answer the same event, the bus applies a
//! [`dispatch::ResultPolicy`]. The default, `single`, makes a second answer
//! an error instead of silently picking one.
//!
//! ## Banker's Rounding
//!
//! Proportional sizes round half to even (`2.5 → 2`, `3.5 → 4`) and stay
//! floating point, matching the established behavior callers depend on.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod events;
pub mod handlers;
pub mod output;

#[cfg(test)]
pub(crate) mod test_helpers;
