//! Pixel operations behind the built-in handlers.
//!
//! Synchronous and free of any context or locking, so each one is unit
//! testable on small synthetic images.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode | `image::guess_format` + `load_from_memory_with_format` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Crop | `DynamicImage::crop_imm`, edges clamped to the image |
//! | Orientation | `rotate90/180/270` + `fliph/flipv` per EXIF tag |
//! | Grayscale | `to_luma8` / `to_luma_alpha8` |
//! | Encode | `JpegEncoder::new_with_quality`, `write_to` for the rest |

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;

use crate::dispatch::HandlerError;
use crate::engine::{proportional_height, proportional_width};
use crate::events::ImageSize;

pub fn size_of(image: &DynamicImage) -> ImageSize {
    ImageSize {
        width: image.width(),
        height: image.height(),
    }
}

/// Decode a buffer, returning the image and the format it was stored in.
pub fn decode(buffer: &[u8]) -> Result<(DynamicImage, ImageFormat), HandlerError> {
    let format = image::guess_format(buffer)?;
    let image = image::load_from_memory_with_format(buffer, format)?;
    Ok((image, format))
}

/// Resize to exactly `width` x `height`.
///
/// A zero dimension is derived from the other one at the image's aspect
/// ratio. Both zero means "keep the current size" and returns `None`.
pub fn resize(
    image: &DynamicImage,
    width: u32,
    height: u32,
) -> Result<Option<DynamicImage>, HandlerError> {
    let size = size_of(image);
    let (width, height) = match (width, height) {
        (0, 0) => return Ok(None),
        (0, h) => (derived(proportional_width(size, h))?, h),
        (w, 0) => (w, derived(proportional_height(size, w))?),
        (w, h) => (w, h),
    };
    Ok(Some(image.resize_exact(width, height, FilterType::Lanczos3)))
}

fn derived(value: Result<f64, crate::engine::EngineError>) -> Result<u32, HandlerError> {
    let value = value.map_err(|e| HandlerError::InvalidGeometry(e.to_string()))?;
    Ok((value as u32).max(1))
}

/// Crop to the half-open box `[left, right) x [top, bottom)`.
///
/// Edges outside the image are clamped; a box with no area left after
/// clamping is an error.
pub fn crop(
    image: &DynamicImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
) -> Result<DynamicImage, HandlerError> {
    let clamp = |v: i32, max: u32| v.clamp(0, max as i32) as u32;
    let (x0, x1) = (clamp(left, image.width()), clamp(right, image.width()));
    let (y0, y1) = (clamp(top, image.height()), clamp(bottom, image.height()));

    if x1 <= x0 || y1 <= y0 {
        return Err(HandlerError::InvalidGeometry(format!(
            "crop box ({left}, {top}, {right}, {bottom}) is empty within {}x{}",
            image.width(),
            image.height()
        )));
    }
    Ok(image.crop_imm(x0, y0, x1 - x0, y1 - y0))
}

/// Undo the transform described by an EXIF orientation tag (1-8).
pub fn apply_orientation(
    image: &DynamicImage,
    orientation: u16,
) -> Result<DynamicImage, HandlerError> {
    let oriented = match orientation {
        1 => image.clone(),
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        other => {
            return Err(HandlerError::InvalidGeometry(format!(
                "orientation {other} is not an EXIF orientation (1-8)"
            )));
        }
    };
    Ok(oriented)
}

/// Raw pixels with their mode label: `RGBA` when the image carries alpha,
/// `RGB` otherwise.
pub fn rgb_data(image: &DynamicImage) -> (&'static str, Vec<u8>) {
    if image.color().has_alpha() {
        ("RGBA", image.to_rgba8().into_raw())
    } else {
        ("RGB", image.to_rgb8().into_raw())
    }
}

/// Rebuild an image of the given size from raw RGB or RGBA pixels.
pub fn from_pixel_data(width: u32, height: u32, data: &[u8]) -> Result<DynamicImage, HandlerError> {
    let pixels = width as usize * height as usize;
    let mismatch = || HandlerError::PixelDataMismatch {
        width,
        height,
        actual: data.len(),
    };

    if data.len() == pixels * 3 {
        RgbImage::from_raw(width, height, data.to_vec())
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(mismatch)
    } else if data.len() == pixels * 4 {
        RgbaImage::from_raw(width, height, data.to_vec())
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(mismatch)
    } else {
        Err(mismatch())
    }
}

/// Draw a one-pixel outline; parts outside the image are clipped.
pub fn draw_outline(
    image: &DynamicImage,
    left: i32,
    top: i32,
    width: i32,
    height: i32,
    color: [u8; 4],
) -> DynamicImage {
    let had_alpha = image.color().has_alpha();
    let mut canvas = image.to_rgba8();

    if width > 0 && height > 0 {
        let (left, top) = (i64::from(left), i64::from(top));
        let right = left + i64::from(width) - 1;
        let bottom = top + i64::from(height) - 1;
        let (w, h) = (i64::from(canvas.width()), i64::from(canvas.height()));

        let mut put = |x: i64, y: i64| {
            if (0..w).contains(&x) && (0..h).contains(&y) {
                canvas.put_pixel(x as u32, y as u32, Rgba(color));
            }
        };
        for x in left.max(0)..=right.min(w - 1) {
            put(x, top);
            put(x, bottom);
        }
        for y in top.max(0)..=bottom.min(h - 1) {
            put(left, y);
            put(right, y);
        }
    }

    let drawn = DynamicImage::ImageRgba8(canvas);
    if had_alpha {
        drawn
    } else {
        DynamicImage::ImageRgb8(drawn.to_rgb8())
    }
}

pub fn grayscale(image: &DynamicImage, with_alpha: bool) -> DynamicImage {
    if with_alpha {
        DynamicImage::ImageLumaA8(image.to_luma_alpha8())
    } else {
        DynamicImage::ImageLuma8(image.to_luma8())
    }
}

/// Encode `image` in `format`. `quality` (1-100) only affects JPEG.
pub fn encode(
    image: &DynamicImage,
    format: ImageFormat,
    quality: u8,
) -> Result<Vec<u8>, HandlerError> {
    if !format.writing_enabled() {
        return Err(HandlerError::UnsupportedFormat(format!("{format:?}")));
    }

    let mut out = Cursor::new(Vec::new());
    match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel.
            let flat = match image {
                DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image.clone(),
                _ => DynamicImage::ImageRgb8(image.to_rgb8()),
            };
            let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
            flat.write_with_encoder(encoder)?;
        }
        ImageFormat::WebP => {
            DynamicImage::ImageRgba8(image.to_rgba8()).write_to(&mut out, format)?;
        }
        _ => image.write_to(&mut out, format)?,
    }
    Ok(out.into_inner())
}
