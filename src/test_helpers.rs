//! Shared test utilities for the lifecycle-engine test suite.
//!
//! [`RecordingDispatcher`] stands in for the event bus: it records every
//! trigger in order, answers chosen events with canned values, and can be
//! told to fail on a given event.
//!
//! ```ignore
//! use crate::test_helpers::*;
//!
//! let engine = Engine::new(RecordingDispatcher::new().answering(
//!     Operation::GetImageSize.main(),
//!     EventValue::Size(ImageSize { width: 200, height: 50 }),
//! ));
//! engine.resize(&sender, &ctx, 10, 10).await?;
//! let triggers = engine.dispatcher().triggers();
//! let names: Vec<String> = triggers.iter().map(|t| t.event.to_string()).collect();
//! ```

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::io::Cursor;
use std::sync::Mutex;

use crate::context::{Context, Sender};
use crate::dispatch::{DispatchError, Dispatcher, HandlerError, Invocation};
use crate::events::{EngineEvent, EventArgs, EventValue};

// =========================================================================
// Recording dispatcher
// =========================================================================

/// One trigger as seen by [`RecordingDispatcher`].
#[derive(Debug, Clone)]
pub struct RecordedTrigger {
    pub event: EngineEvent,
    pub sender: Sender,
    pub context: Context,
    pub args: EventArgs,
}

/// Dispatcher stub that records triggers without running any handlers.
/// Uses Mutex (not RefCell) so it is Sync like a real dispatcher.
#[derive(Default)]
pub struct RecordingDispatcher {
    triggers: Mutex<Vec<RecordedTrigger>>,
    answers: HashMap<EngineEvent, EventValue>,
    failures: HashSet<EngineEvent>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to `event` with `value` instead of `Unit`.
    pub fn answering(mut self, event: EngineEvent, value: EventValue) -> Self {
        self.answers.insert(event, value);
        self
    }

    /// Fail every trigger of `event` with a handler error.
    pub fn failing(mut self, event: EngineEvent) -> Self {
        self.failures.insert(event);
        self
    }

    pub fn triggers(&self) -> Vec<RecordedTrigger> {
        self.triggers.lock().unwrap().clone()
    }
}

impl Dispatcher for RecordingDispatcher {
    fn trigger(
        &self,
        invocation: Invocation,
    ) -> impl Future<Output = Result<EventValue, DispatchError>> + Send {
        let event = invocation.event;
        self.triggers.lock().unwrap().push(RecordedTrigger {
            event,
            sender: invocation.sender,
            context: invocation.context,
            args: invocation.args,
        });

        let result = if self.failures.contains(&event) {
            Err(DispatchError::Handler {
                event,
                source: HandlerError::Failed("stubbed failure".into()),
            })
        } else {
            Ok(self.answers.get(&event).cloned().unwrap_or(EventValue::Unit))
        };
        std::future::ready(result)
    }
}

// =========================================================================
// Image fixtures
// =========================================================================

/// An RGB gradient, so flips and crops are observable per pixel.
pub fn gradient_rgb(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 10 % 256) as u8, (y * 10 % 256) as u8, 128])
    }))
}

/// A fully opaque single-colour RGBA image.
pub fn solid_rgba(width: u32, height: u32, color: [u8; 4]) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)))
}

/// Encode `image` as PNG bytes.
pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}
