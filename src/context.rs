//! Per-request state shared across every phase of every operation.
//!
//! The caller creates one [`Context`] per logical image request and passes it
//! to each engine call. Handlers lock it to read or mutate the [`Details`]
//! record; a `before_resize` handler can stash the original size in
//! [`Details::notes`] for an `after_resize` handler to read back.
//!
//! [`Context`] is a shared handle: cloning it does not copy the record, and
//! [`Context::same_as`] tells whether two handles point at the same request.

use bytes::Bytes;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// A point of interest the caller wants preserved when cropping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocalPoint {
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_extent")]
    pub width: f64,
    #[serde(default = "default_extent")]
    pub height: f64,
    #[serde(default = "default_extent")]
    pub weight: f64,
    /// Who produced the point, e.g. `"manual"` or a detector name.
    #[serde(default = "default_origin")]
    pub origin: String,
}

fn default_extent() -> f64 {
    1.0
}

fn default_origin() -> String {
    "alignment".to_string()
}

impl FocalPoint {
    /// A unit-sized manual point at `(x, y)`.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            width: default_extent(),
            height: default_extent(),
            weight: default_extent(),
            origin: "manual".to_string(),
        }
    }
}

/// The request record handlers read and mutate.
///
/// All fields are optional so handlers can populate them as the request
/// advances: `read_image` fills `source` and `image`, `serialize` fills
/// `output`, and so on.
#[derive(Default)]
pub struct Details {
    /// Points forwarded by `focus` to `focal_points_changed` handlers.
    pub focal_points: Vec<FocalPoint>,
    /// EXIF orientation tag (1-8) supplied by the caller.
    pub orientation: Option<u16>,
    /// Output format for `serialize`; guessed from the source when unset.
    pub format: Option<ImageFormat>,
    /// Lossy encoding quality (1-100).
    pub quality: Option<u8>,
    /// The buffer handed to `read_image`.
    pub source: Option<Bytes>,
    /// Decoded working image.
    pub image: Option<DynamicImage>,
    /// Encoded result written by `serialize`.
    pub output: Option<Bytes>,
    /// Free-form handler state, keyed by handler-chosen names.
    pub notes: BTreeMap<String, serde_json::Value>,
}

impl Details {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_focal_points(mut self, points: Vec<FocalPoint>) -> Self {
        self.focal_points = points;
        self
    }

    pub fn with_orientation(mut self, orientation: u16) -> Self {
        self.orientation = Some(orientation);
        self
    }

    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = Some(format);
        self
    }
}

impl fmt::Debug for Details {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Details")
            .field("focal_points", &self.focal_points)
            .field("orientation", &self.orientation)
            .field("format", &self.format)
            .field("quality", &self.quality)
            .field("source_len", &self.source.as_ref().map(Bytes::len))
            .field(
                "image",
                &self.image.as_ref().map(|img| (img.width(), img.height())),
            )
            .field("output_len", &self.output.as_ref().map(Bytes::len))
            .field("notes", &self.notes)
            .finish()
    }
}

/// Shared handle to one request's [`Details`].
#[derive(Clone, Default)]
pub struct Context {
    inner: Arc<Mutex<Details>>,
}

impl Context {
    pub fn new(details: Details) -> Self {
        Self {
            inner: Arc::new(Mutex::new(details)),
        }
    }

    /// Wait for exclusive access to the record.
    pub async fn lock(&self) -> MutexGuard<'_, Details> {
        self.inner.lock().await
    }

    /// Whether both handles refer to the same request.
    pub fn same_as(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

/// Opaque identifier of the component issuing an engine call.
///
/// The engine forwards it untouched; the event bus uses it to route
/// sender-scoped subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sender(Arc<str>);

impl Sender {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Sender {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_identity() {
        let ctx = Context::new(Details::new());
        let other = ctx.clone();
        assert!(ctx.same_as(&other));
        assert!(!ctx.same_as(&Context::default()));
    }

    #[tokio::test]
    async fn mutations_are_visible_through_clones() {
        let ctx = Context::new(Details::new());
        let handle = ctx.clone();
        handle
            .lock()
            .await
            .notes
            .insert("seen".into(), serde_json::json!(true));

        assert_eq!(ctx.lock().await.notes["seen"], serde_json::json!(true));
    }

    #[test]
    fn focal_point_defaults_from_json() {
        let point: FocalPoint = serde_json::from_str(r#"{"x": 10.0, "y": 20.0}"#).unwrap();
        assert_eq!(point.width, 1.0);
        assert_eq!(point.weight, 1.0);
        assert_eq!(point.origin, "alignment");
    }

    #[test]
    fn builder_fields() {
        let details = Details::new()
            .with_orientation(6)
            .with_format(ImageFormat::Png)
            .with_focal_points(vec![FocalPoint::new(1.0, 2.0)]);
        assert_eq!(details.orientation, Some(6));
        assert_eq!(details.format, Some(ImageFormat::Png));
        assert_eq!(details.focal_points[0].origin, "manual");
    }

    #[test]
    fn sender_display() {
        assert_eq!(Sender::from("cli").to_string(), "cli");
    }
}
