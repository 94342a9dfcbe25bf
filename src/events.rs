//! Event catalogue: typed event names, per-operation arguments, and handler results.
//!
//! Every engine operation is an [`Operation`]. Multi-phase operations fire
//! three events (`before_<name>`, `<name>`, `after_<name>`) while the four
//! value-returning operations fire only their main event. An [`EngineEvent`]
//! is one `(operation, phase)` pair and renders to its canonical name:
//!
//! ```text
//! Operation::Resize  + Phase::Before  →  before_resize
//! Operation::Resize  + Phase::Main    →  resize
//! Operation::Focus   + Phase::After   →  after_focal_points_changed
//! Operation::GetImageSize + Main      →  get_image_size
//! ```
//!
//! Names are what configuration files use to key per-event result policies.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::context::FocalPoint;

/// One image operation exposed by the engine facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    ReadImage,
    Resize,
    Crop,
    FlipHorizontally,
    FlipVertically,
    Reorientate,
    Serialize,
    Focus,
    DrawRectangle,
    GetImageDataAsRgb,
    SetImageData,
    GetImageSize,
    ConvertToGrayscale,
}

impl Operation {
    pub const ALL: [Operation; 13] = [
        Operation::ReadImage,
        Operation::Resize,
        Operation::Crop,
        Operation::FlipHorizontally,
        Operation::FlipVertically,
        Operation::Reorientate,
        Operation::Serialize,
        Operation::Focus,
        Operation::DrawRectangle,
        Operation::GetImageDataAsRgb,
        Operation::SetImageData,
        Operation::GetImageSize,
        Operation::ConvertToGrayscale,
    ];

    /// Event-family name. `Focus` keeps its historical `focal_points_changed` name.
    pub fn name(self) -> &'static str {
        match self {
            Operation::ReadImage => "read_image",
            Operation::Resize => "resize",
            Operation::Crop => "crop",
            Operation::FlipHorizontally => "flip_horizontally",
            Operation::FlipVertically => "flip_vertically",
            Operation::Reorientate => "reorientate",
            Operation::Serialize => "serialize",
            Operation::Focus => "focal_points_changed",
            Operation::DrawRectangle => "draw_rectangle",
            Operation::GetImageDataAsRgb => "get_image_data_as_rgb",
            Operation::SetImageData => "set_image_data",
            Operation::GetImageSize => "get_image_size",
            Operation::ConvertToGrayscale => "convert_to_grayscale",
        }
    }

    /// Whether the operation fires before/after hooks around its main event.
    pub fn is_multi_phase(self) -> bool {
        !matches!(
            self,
            Operation::GetImageDataAsRgb
                | Operation::SetImageData
                | Operation::GetImageSize
                | Operation::ConvertToGrayscale
        )
    }

    /// Phases fired for this operation, in firing order.
    pub fn phases(self) -> &'static [Phase] {
        if self.is_multi_phase() {
            &Phase::SEQUENCE
        } else {
            &[Phase::Main]
        }
    }

    pub fn event(self, phase: Phase) -> EngineEvent {
        EngineEvent {
            operation: self,
            phase,
        }
    }

    pub fn before(self) -> EngineEvent {
        self.event(Phase::Before)
    }

    pub fn main(self) -> EngineEvent {
        self.event(Phase::Main)
    }

    pub fn after(self) -> EngineEvent {
        self.event(Phase::After)
    }
}

/// Position of an event within its operation's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    Before,
    Main,
    After,
}

impl Phase {
    pub const SEQUENCE: [Phase; 3] = [Phase::Before, Phase::Main, Phase::After];
}

/// A single named event: one phase of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineEvent {
    pub operation: Operation,
    pub phase: Phase,
}

impl EngineEvent {
    /// Every event the engine can fire, grouped by operation in firing order.
    pub fn catalogue() -> Vec<EngineEvent> {
        Operation::ALL
            .iter()
            .flat_map(|op| op.phases().iter().map(move |phase| op.event(*phase)))
            .collect()
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.phase {
            Phase::Before => write!(f, "before_{}", self.operation.name()),
            Phase::Main => f.write_str(self.operation.name()),
            Phase::After => write!(f, "after_{}", self.operation.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown engine event: {0}")]
pub struct UnknownEvent(pub String);

impl FromStr for EngineEvent {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (phase, family) = if let Some(rest) = s.strip_prefix("before_") {
            (Phase::Before, rest)
        } else if let Some(rest) = s.strip_prefix("after_") {
            (Phase::After, rest)
        } else {
            (Phase::Main, s)
        };

        Operation::ALL
            .iter()
            .find(|op| op.name() == family && op.phases().contains(&phase))
            .map(|op| op.event(phase))
            .ok_or_else(|| UnknownEvent(s.to_string()))
    }
}

/// Image dimensions as reported by a `get_image_size` handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// Flags forwarded to `convert_to_grayscale` handlers.
///
/// - `update_image`: the handler replaces the stored image with the grayscale
///   result; otherwise the stored image is left untouched.
/// - `with_alpha`: keep (or synthesize) an alpha channel in the result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrayscaleOptions {
    pub update_image: bool,
    pub with_alpha: bool,
}

/// Operation-specific parameters, forwarded unchanged to every phase.
#[derive(Debug, Clone, PartialEq)]
pub enum EventArgs {
    None,
    Buffer(Bytes),
    Resize {
        width: u32,
        height: u32,
    },
    Crop {
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
    },
    FocalPoints(Vec<FocalPoint>),
    Rectangle {
        left: i32,
        top: i32,
        width: i32,
        height: i32,
    },
    Data(Bytes),
    Grayscale(GrayscaleOptions),
}

/// What a handler hands back to the dispatcher.
///
/// Side-effect handlers return [`EventValue::Unit`]; dispatchers only
/// aggregate the other variants.
#[derive(Debug, Clone, PartialEq)]
pub enum EventValue {
    Unit,
    Size(ImageSize),
    RgbData { mode: String, data: Bytes },
    Buffer(Bytes),
    /// Structured answer from a custom handler, such as grayscale statistics.
    Json(serde_json::Value),
}

impl EventValue {
    pub fn is_unit(&self) -> bool {
        matches!(self, EventValue::Unit)
    }

    /// Short shape label used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            EventValue::Unit => "unit",
            EventValue::Size(_) => "size",
            EventValue::RgbData { .. } => "rgb data",
            EventValue::Buffer(_) => "buffer",
            EventValue::Json(_) => "json",
        }
    }
}
