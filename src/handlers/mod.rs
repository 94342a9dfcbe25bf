//! Built-in main-phase handlers backed by the `image` crate.
//!
//! [`ImageHandlers::register`] subscribes one handler per main event so an
//! [`EventBus`] behaves like a complete image engine. The handlers keep the
//! working image in [`Details::image`](crate::context::Details::image):
//!
//! | Event | Effect on the context | Result |
//! |---|---|---|
//! | `read_image` | decodes into `image`, keeps `source`, sets `format` if unset | unit |
//! | `resize`, `crop`, flips, `reorientate`, `draw_rectangle` | replaces `image` | unit |
//! | `serialize` | writes `output` | unit |
//! | `set_image_data` | replaces `image` pixels | unit |
//! | `get_image_size` | - | size |
//! | `get_image_data_as_rgb` | - | rgb data |
//! | `convert_to_grayscale` | replaces `image` when `update_image` | buffer |
//!
//! `focal_points_changed` and all before/after events are left to observers.

mod pixels;

use bytes::Bytes;
use image::{DynamicImage, ImageFormat};

use crate::config::{ConfigError, EngineConfig};
use crate::context::Details;
use crate::dispatch::{DispatchError, EventBus, HandlerError, Invocation, SubscriptionId};
use crate::events::{EngineEvent, EventArgs, EventValue, Operation};

/// Settings the built-in handlers fall back to when the context leaves them unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHandlers {
    pub format: ImageFormat,
    pub quality: u8,
    pub outline: [u8; 4],
}

impl Default for ImageHandlers {
    fn default() -> Self {
        Self {
            format: ImageFormat::Png,
            quality: 90,
            outline: [255, 0, 0, 255],
        }
    }
}

fn loaded(details: &Details) -> Result<&DynamicImage, HandlerError> {
    details.image.as_ref().ok_or(HandlerError::MissingImage)
}

fn wrong_args(event: EngineEvent, args: &EventArgs) -> HandlerError {
    HandlerError::Failed(format!("{event} received unexpected arguments {args:?}"))
}

/// Replace the working image with `transform(image)`.
async fn transform<F>(invocation: &Invocation, transform: F) -> Result<EventValue, HandlerError>
where
    F: FnOnce(&DynamicImage) -> Result<DynamicImage, HandlerError>,
{
    let mut details = invocation.context.lock().await;
    let next = transform(loaded(&details)?)?;
    log::debug!(
        "{}: {}x{} -> {}x{}",
        invocation.event,
        details.image.as_ref().map_or(0, DynamicImage::width),
        details.image.as_ref().map_or(0, DynamicImage::height),
        next.width(),
        next.height()
    );
    details.image = Some(next);
    Ok(EventValue::Unit)
}

impl ImageHandlers {
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            format: config.output.image_format()?,
            quality: config.output.quality,
            outline: config.draw.color,
        })
    }

    /// Subscribe every built-in handler to `bus`, returning the subscriptions
    /// in registration order.
    pub fn register(self, bus: &EventBus) -> Result<Vec<SubscriptionId>, DispatchError> {
        let settings = self;
        let mut ids = Vec::new();

        ids.push(bus.subscribe(Operation::ReadImage.main(), |inv: Invocation| async move {
            let EventArgs::Buffer(buffer) = &inv.args else {
                return Err(wrong_args(inv.event, &inv.args));
            };
            let (image, format) = pixels::decode(buffer)?;
            log::debug!(
                "read_image: decoded {}x{} {format:?}",
                image.width(),
                image.height()
            );
            let mut details = inv.context.lock().await;
            details.format.get_or_insert(format);
            details.image = Some(image);
            details.source = Some(buffer.clone());
            Ok(EventValue::Unit)
        })?);

        ids.push(bus.subscribe(Operation::Resize.main(), |inv: Invocation| async move {
            let EventArgs::Resize { width, height } = inv.args else {
                return Err(wrong_args(inv.event, &inv.args));
            };
            transform(&inv, |image| {
                Ok(pixels::resize(image, width, height)?.unwrap_or_else(|| image.clone()))
            })
            .await
        })?);

        ids.push(bus.subscribe(Operation::Crop.main(), |inv: Invocation| async move {
            let EventArgs::Crop {
                left,
                top,
                right,
                bottom,
            } = inv.args
            else {
                return Err(wrong_args(inv.event, &inv.args));
            };
            transform(&inv, |image| pixels::crop(image, left, top, right, bottom)).await
        })?);

        ids.push(bus.subscribe(
            Operation::FlipHorizontally.main(),
            |inv: Invocation| async move { transform(&inv, |image| Ok(image.fliph())).await },
        )?);

        ids.push(bus.subscribe(
            Operation::FlipVertically.main(),
            |inv: Invocation| async move { transform(&inv, |image| Ok(image.flipv())).await },
        )?);

        ids.push(bus.subscribe(Operation::Reorientate.main(), |inv: Invocation| async move {
            let mut details = inv.context.lock().await;
            let Some(orientation) = details.orientation else {
                return Ok(EventValue::Unit);
            };
            let oriented = pixels::apply_orientation(loaded(&details)?, orientation)?;
            log::debug!("reorientate: applied orientation {orientation}");
            details.image = Some(oriented);
            details.orientation = None;
            Ok(EventValue::Unit)
        })?);

        ids.push(bus.subscribe(Operation::Serialize.main(), move |inv: Invocation| {
            async move {
                let mut details = inv.context.lock().await;
                let format = details.format.unwrap_or(settings.format);
                let quality = details.quality.unwrap_or(settings.quality);
                let encoded = pixels::encode(loaded(&details)?, format, quality)?;
                log::debug!("serialize: {} bytes as {format:?}", encoded.len());
                details.output = Some(Bytes::from(encoded));
                Ok(EventValue::Unit)
            }
        })?);

        let outline = settings.outline;
        ids.push(bus.subscribe(
            Operation::DrawRectangle.main(),
            move |inv: Invocation| async move {
                let EventArgs::Rectangle {
                    left,
                    top,
                    width,
                    height,
                } = inv.args
                else {
                    return Err(wrong_args(inv.event, &inv.args));
                };
                transform(&inv, |image| {
                    Ok(pixels::draw_outline(image, left, top, width, height, outline))
                })
                .await
            },
        )?);

        ids.push(bus.subscribe(
            Operation::GetImageDataAsRgb.main(),
            |inv: Invocation| async move {
                let details = inv.context.lock().await;
                let (mode, data) = pixels::rgb_data(loaded(&details)?);
                Ok(EventValue::RgbData {
                    mode: mode.to_string(),
                    data: Bytes::from(data),
                })
            },
        )?);

        ids.push(bus.subscribe(Operation::SetImageData.main(), |inv: Invocation| async move {
            let EventArgs::Data(data) = &inv.args else {
                return Err(wrong_args(inv.event, &inv.args));
            };
            let mut details = inv.context.lock().await;
            let current = loaded(&details)?;
            let replaced = pixels::from_pixel_data(current.width(), current.height(), data)?;
            details.image = Some(replaced);
            Ok(EventValue::Unit)
        })?);

        ids.push(bus.subscribe(Operation::GetImageSize.main(), |inv: Invocation| async move {
            let details = inv.context.lock().await;
            Ok(EventValue::Size(pixels::size_of(loaded(&details)?)))
        })?);

        ids.push(bus.subscribe(
            Operation::ConvertToGrayscale.main(),
            |inv: Invocation| async move {
                let EventArgs::Grayscale(options) = inv.args else {
                    return Err(wrong_args(inv.event, &inv.args));
                };
                let mut details = inv.context.lock().await;
                let gray = pixels::grayscale(loaded(&details)?, options.with_alpha);
                let buffer = Bytes::copy_from_slice(gray.as_bytes());
                if options.update_image {
                    details.image = Some(gray);
                }
                Ok(EventValue::Buffer(buffer))
            },
        )?);

        log::debug!("registered {} image handlers", ids.len());
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, Sender};
    use crate::engine::{Engine, EngineError};
    use crate::events::{GrayscaleOptions, ImageSize};
    use crate::test_helpers::{gradient_rgb, png_bytes, solid_rgba};
    use image::GenericImageView;

    async fn loaded_engine(image: &DynamicImage) -> (Engine<EventBus>, Context, Sender) {
        let bus = EventBus::new();
        ImageHandlers::default().register(&bus).unwrap();
        let engine = Engine::new(bus);
        let ctx = Context::new(Details::new());
        let sender = Sender::from("test");
        engine
            .read_image(&sender, &ctx, Bytes::from(png_bytes(image)))
            .await
            .unwrap();
        (engine, ctx, sender)
    }

    #[tokio::test]
    async fn registers_one_handler_per_main_event_except_focus() {
        let bus = EventBus::new();
        let ids = ImageHandlers::default().register(&bus).unwrap();
        assert_eq!(ids.len(), Operation::ALL.len() - 1);
        assert_eq!(bus.handler_count(Operation::Focus.main()).unwrap(), 0);
        assert_eq!(bus.handler_count(Operation::Resize.before()).unwrap(), 0);
    }

    #[tokio::test]
    async fn read_image_populates_context() {
        let (_, ctx, _) = loaded_engine(&gradient_rgb(8, 6)).await;
        let details = ctx.lock().await;
        assert_eq!(details.format, Some(ImageFormat::Png));
        assert!(details.source.is_some());
        assert_eq!(details.image.as_ref().unwrap().dimensions(), (8, 6));
    }

    #[tokio::test]
    async fn operations_without_image_fail() {
        let bus = EventBus::new();
        ImageHandlers::default().register(&bus).unwrap();
        let engine = Engine::new(bus);
        let ctx = Context::new(Details::new());

        let err = engine
            .get_image_size(&Sender::from("test"), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Dispatch(DispatchError::Handler {
                source: HandlerError::MissingImage,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn size_and_proportions_follow_resize_and_crop() {
        let (engine, ctx, sender) = loaded_engine(&gradient_rgb(40, 20)).await;

        engine.resize(&sender, &ctx, 20, 10).await.unwrap();
        assert_eq!(
            engine.get_image_size(&sender, &ctx).await.unwrap(),
            ImageSize {
                width: 20,
                height: 10
            }
        );

        engine.crop(&sender, &ctx, 0, 0, 10, 10).await.unwrap();
        assert_eq!(
            engine.get_proportional_height(&sender, &ctx, 30).await.unwrap(),
            30.0
        );
    }

    #[tokio::test]
    async fn flips_mirror_pixels() {
        let source = gradient_rgb(4, 3);
        let (engine, ctx, sender) = loaded_engine(&source).await;

        engine.flip_horizontally(&sender, &ctx).await.unwrap();
        engine.flip_vertically(&sender, &ctx).await.unwrap();

        let details = ctx.lock().await;
        let image = details.image.as_ref().unwrap();
        assert_eq!(image.get_pixel(0, 0), source.get_pixel(3, 2));
    }

    #[tokio::test]
    async fn reorientate_consumes_orientation() {
        let (engine, ctx, sender) = loaded_engine(&gradient_rgb(4, 2)).await;
        ctx.lock().await.orientation = Some(6);

        engine.reorientate(&sender, &ctx).await.unwrap();

        let details = ctx.lock().await;
        assert_eq!(details.orientation, None);
        assert_eq!(details.image.as_ref().unwrap().dimensions(), (2, 4));
    }

    #[tokio::test]
    async fn rgb_data_round_trips_through_set_image_data() {
        let (engine, ctx, sender) = loaded_engine(&solid_rgba(2, 2, [1, 2, 3, 255])).await;

        let (mode, data) = engine.get_image_data_as_rgb(&sender, &ctx).await.unwrap();
        assert_eq!(mode, b"RGBA".to_vec());

        let inverted: Vec<u8> = data.iter().map(|b| 255 - b).collect();
        engine
            .set_image_data(&sender, &ctx, Bytes::from(inverted))
            .await
            .unwrap();

        let (_, data) = engine.get_image_data_as_rgb(&sender, &ctx).await.unwrap();
        assert_eq!(&data[..4], &[254, 253, 252, 0]);
    }

    #[tokio::test]
    async fn grayscale_only_updates_image_when_asked() {
        let (engine, ctx, sender) = loaded_engine(&gradient_rgb(3, 3)).await;

        let value = engine
            .convert_to_grayscale(&sender, &ctx, GrayscaleOptions::default())
            .await
            .unwrap();
        assert!(matches!(value, EventValue::Buffer(ref b) if b.len() == 9));
        assert!(matches!(
            ctx.lock().await.image,
            Some(DynamicImage::ImageRgb8(_))
        ));

        engine
            .convert_to_grayscale(
                &sender,
                &ctx,
                GrayscaleOptions {
                    update_image: true,
                    with_alpha: true,
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            ctx.lock().await.image,
            Some(DynamicImage::ImageLumaA8(_))
        ));
    }

    #[tokio::test]
    async fn serialize_uses_context_format_over_default() {
        let (engine, ctx, sender) = loaded_engine(&gradient_rgb(5, 5)).await;
        {
            let mut details = ctx.lock().await;
            details.format = Some(ImageFormat::Jpeg);
            details.quality = Some(70);
        }

        engine.serialize(&sender, &ctx).await.unwrap();

        let output = ctx.lock().await.output.clone().unwrap();
        assert_eq!(image::guess_format(&output).unwrap(), ImageFormat::Jpeg);
    }

    #[tokio::test]
    async fn draw_rectangle_uses_configured_outline() {
        let bus = EventBus::new();
        ImageHandlers {
            outline: [0, 0, 255, 255],
            ..ImageHandlers::default()
        }
        .register(&bus)
        .unwrap();
        let engine = Engine::new(bus);
        let ctx = Context::new(Details::new());
        let sender = Sender::from("test");
        engine
            .read_image(&sender, &ctx, Bytes::from(png_bytes(&solid_rgba(6, 6, [0, 0, 0, 255]))))
            .await
            .unwrap();

        engine.draw_rectangle(&sender, &ctx, 1, 1, 3, 3).await.unwrap();

        let details = ctx.lock().await;
        let image = details.image.as_ref().unwrap();
        assert_eq!(image.get_pixel(1, 1).0, [0, 0, 255, 255]);
        assert_eq!(image.get_pixel(2, 2).0, [0, 0, 0, 255]);
    }
}
