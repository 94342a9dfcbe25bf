//! Pure proportional-scaling math.
//!
//! All functions here are pure and testable without a dispatcher.

use super::EngineError;
use crate::events::ImageSize;

/// Width that keeps `size`'s aspect ratio at `new_height`.
///
/// Rounds half to even and keeps the result as a float:
/// `new_height * width / height`.
///
/// # Examples
/// ```
/// # use lifecycle_engine::engine::proportional_width;
/// # use lifecycle_engine::events::ImageSize;
/// let size = ImageSize { width: 200, height: 50 };
/// assert_eq!(proportional_width(size, 100).unwrap(), 400.0);
/// ```
pub fn proportional_width(size: ImageSize, new_height: u32) -> Result<f64, EngineError> {
    scale(new_height, size.width, size.height, "height")
}

/// Height that keeps `size`'s aspect ratio at `new_width`.
///
/// Symmetric to [`proportional_width`]: `new_width * height / width`.
pub fn proportional_height(size: ImageSize, new_width: u32) -> Result<f64, EngineError> {
    scale(new_width, size.height, size.width, "width")
}

fn scale(
    value: u32,
    numerator: u32,
    denominator: u32,
    dimension: &'static str,
) -> Result<f64, EngineError> {
    if denominator == 0 {
        return Err(EngineError::DivisionByZero { dimension });
    }
    Ok((f64::from(value) * f64::from(numerator) / f64::from(denominator)).round_ties_even())
}
