//! The engine facade: one async entry point per image operation.
//!
//! [`Engine`] does no image work. Each call fires the operation's lifecycle
//! events through the injected [`Dispatcher`] and shapes what comes back:
//!
//! ```text
//! engine.resize(sender, ctx, 800, 600)
//!     ├─ before_resize   (awaited)
//!     ├─ resize          (awaited)
//!     └─ after_resize    (awaited)   → ()
//!
//! engine.get_image_size(sender, ctx)
//!     └─ get_image_size  (awaited)   → ImageSize
//! ```
//!
//! Every phase of a call receives the same [`Context`] handle and identical
//! arguments. Results of multi-phase triggers are dropped: those operations
//! act only through handler side effects on the context. Errors from the
//! dispatcher are returned as they are, with no retry and no rollback of
//! phases that already ran.

mod calculations;

pub use calculations::{proportional_height, proportional_width};

use bytes::Bytes;
use thiserror::Error;

use crate::context::{Context, Sender};
use crate::dispatch::{DispatchError, Dispatcher, Invocation};
use crate::events::{
    EngineEvent, EventArgs, EventValue, GrayscaleOptions, ImageSize, Operation, Phase,
};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("division by zero: image {dimension} is 0")]
    DivisionByZero { dimension: &'static str },
    #[error("no handler produced a result for {event}")]
    MissingResult { event: EngineEvent },
    #[error("{event} produced {found}, expected {expected}")]
    UnexpectedResult {
        event: EngineEvent,
        expected: &'static str,
        found: &'static str,
    },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Lifecycle facade over a [`Dispatcher`].
///
/// Holds nothing but the dispatcher, so one engine can serve any number of
/// concurrent requests as long as each uses its own [`Context`].
#[derive(Debug, Clone, Default)]
pub struct Engine<D> {
    dispatcher: D,
}

impl<D: Dispatcher> Engine<D> {
    pub fn new(dispatcher: D) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Decode `buffer` into the context.
    pub async fn read_image(
        &self,
        sender: &Sender,
        details: &Context,
        buffer: Bytes,
    ) -> Result<()> {
        self.run_lifecycle(Operation::ReadImage, sender, details, EventArgs::Buffer(buffer))
            .await
    }

    /// Resize to `width` x `height`. Zero values are passed through; handlers
    /// decide what they mean.
    pub async fn resize(
        &self,
        sender: &Sender,
        details: &Context,
        width: u32,
        height: u32,
    ) -> Result<()> {
        self.run_lifecycle(
            Operation::Resize,
            sender,
            details,
            EventArgs::Resize { width, height },
        )
        .await
    }

    pub async fn crop(
        &self,
        sender: &Sender,
        details: &Context,
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
    ) -> Result<()> {
        self.run_lifecycle(
            Operation::Crop,
            sender,
            details,
            EventArgs::Crop {
                left,
                top,
                right,
                bottom,
            },
        )
        .await
    }

    pub async fn flip_horizontally(&self, sender: &Sender, details: &Context) -> Result<()> {
        self.run_lifecycle(Operation::FlipHorizontally, sender, details, EventArgs::None)
            .await
    }

    pub async fn flip_vertically(&self, sender: &Sender, details: &Context) -> Result<()> {
        self.run_lifecycle(Operation::FlipVertically, sender, details, EventArgs::None)
            .await
    }

    /// Reorient according to the orientation stored in the context.
    pub async fn reorientate(&self, sender: &Sender, details: &Context) -> Result<()> {
        self.run_lifecycle(Operation::Reorientate, sender, details, EventArgs::None)
            .await
    }

    pub async fn serialize(&self, sender: &Sender, details: &Context) -> Result<()> {
        self.run_lifecycle(Operation::Serialize, sender, details, EventArgs::None)
            .await
    }

    /// Fire the `focal_points_changed` family with the context's focal
    /// points. Each phase reads them afresh, so points added by a
    /// `before_focal_points_changed` handler reach the later phases.
    pub async fn focus(&self, sender: &Sender, details: &Context) -> Result<()> {
        for phase in Phase::SEQUENCE {
            let focal_points = details.lock().await.focal_points.clone();
            self.trigger_main(
                Operation::Focus.event(phase),
                sender,
                details,
                EventArgs::FocalPoints(focal_points),
            )
            .await?;
        }
        Ok(())
    }

    pub async fn draw_rectangle(
        &self,
        sender: &Sender,
        details: &Context,
        left: i32,
        top: i32,
        width: i32,
        height: i32,
    ) -> Result<()> {
        self.run_lifecycle(
            Operation::DrawRectangle,
            sender,
            details,
            EventArgs::Rectangle {
                left,
                top,
                width,
                height,
            },
        )
        .await
    }

    /// Extract the pixel buffer as `(mode, data)`, with the mode label
    /// returned as its UTF-8 bytes (`b"RGB"`, `b"RGBA"`).
    pub async fn get_image_data_as_rgb(
        &self,
        sender: &Sender,
        details: &Context,
    ) -> Result<(Vec<u8>, Bytes)> {
        let event = Operation::GetImageDataAsRgb.main();
        match self.trigger_main(event, sender, details, EventArgs::None).await? {
            EventValue::RgbData { mode, data } => Ok((mode.into_bytes(), data)),
            other => Err(unexpected(event, "rgb data", &other)),
        }
    }

    pub async fn set_image_data(
        &self,
        sender: &Sender,
        details: &Context,
        data: Bytes,
    ) -> Result<()> {
        self.trigger_main(
            Operation::SetImageData.main(),
            sender,
            details,
            EventArgs::Data(data),
        )
        .await?;
        Ok(())
    }

    pub async fn get_image_size(&self, sender: &Sender, details: &Context) -> Result<ImageSize> {
        let event = Operation::GetImageSize.main();
        match self.trigger_main(event, sender, details, EventArgs::None).await? {
            EventValue::Size(size) => Ok(size),
            other => Err(unexpected(event, "size", &other)),
        }
    }

    /// Returns whatever the grayscale handler produced, untouched.
    pub async fn convert_to_grayscale(
        &self,
        sender: &Sender,
        details: &Context,
        options: GrayscaleOptions,
    ) -> Result<EventValue> {
        self.trigger_main(
            Operation::ConvertToGrayscale.main(),
            sender,
            details,
            EventArgs::Grayscale(options),
        )
        .await
    }

    /// Width matching `new_height` at the current aspect ratio.
    pub async fn get_proportional_width(
        &self,
        sender: &Sender,
        details: &Context,
        new_height: u32,
    ) -> Result<f64> {
        let size = self.get_image_size(sender, details).await?;
        proportional_width(size, new_height)
    }

    /// Height matching `new_width` at the current aspect ratio.
    pub async fn get_proportional_height(
        &self,
        sender: &Sender,
        details: &Context,
        new_width: u32,
    ) -> Result<f64> {
        let size = self.get_image_size(sender, details).await?;
        proportional_height(size, new_width)
    }

    async fn run_lifecycle(
        &self,
        operation: Operation,
        sender: &Sender,
        details: &Context,
        args: EventArgs,
    ) -> Result<()> {
        for phase in Phase::SEQUENCE {
            self.dispatcher
                .trigger(Invocation {
                    event: operation.event(phase),
                    sender: sender.clone(),
                    context: details.clone(),
                    args: args.clone(),
                })
                .await?;
        }
        Ok(())
    }

    async fn trigger_main(
        &self,
        event: EngineEvent,
        sender: &Sender,
        details: &Context,
        args: EventArgs,
    ) -> Result<EventValue> {
        Ok(self
            .dispatcher
            .trigger(Invocation {
                event,
                sender: sender.clone(),
                context: details.clone(),
                args,
            })
            .await?)
    }
}

fn unexpected(event: EngineEvent, expected: &'static str, found: &EventValue) -> EngineError {
    if found.is_unit() {
        EngineError::MissingResult { event }
    } else {
        EngineError::UnexpectedResult {
            event,
            expected,
            found: found.kind(),
        }
    }
}
