//! Conversion between absolute pixel coordinates and fractional coordinates.
//!
//! Scaling is per axis: x is divided by (or multiplied with) the width and y
//! by the height. When reference and target images have different aspect
//! ratios the relative position of a click is kept, not its geometry.

use thiserror::Error;

use super::types::{FractionalPoint, FractionalPrompts, ImageSize, PixelPoint, PixelPrompts, Prompt};

/// Coordinate conversion errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinateError {
    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimension { width: u32, height: u32 },
}

fn check_size(size: ImageSize) -> Result<(), CoordinateError> {
    if size.is_valid() {
        Ok(())
    } else {
        Err(CoordinateError::InvalidDimension {
            width: size.width,
            height: size.height,
        })
    }
}

/// Convert an absolute pixel coordinate on the reference image into
/// fractional coordinates.
pub fn to_fractional(
    point: PixelPoint,
    reference: ImageSize,
) -> Result<FractionalPoint, CoordinateError> {
    check_size(reference)?;
    Ok(FractionalPoint::new(
        point.x as f64 / reference.width as f64,
        point.y as f64 / reference.height as f64,
    ))
}

/// Convert a fractional coordinate into an absolute pixel coordinate on a
/// target image, rounding to the nearest pixel and clamping to the image.
pub fn to_absolute(
    point: FractionalPoint,
    target: ImageSize,
) -> Result<PixelPoint, CoordinateError> {
    check_size(target)?;
    Ok(PixelPoint::new(
        scale_axis(point.x, target.width),
        scale_axis(point.y, target.height),
    ))
}

fn scale_axis(fraction: f64, dimension: u32) -> u32 {
    let scaled = (fraction * dimension as f64).round() as i64;
    scaled.clamp(0, dimension as i64 - 1) as u32
}

impl PixelPrompts {
    /// Convert every prompt to fractional space relative to `reference`.
    pub fn to_fractional(&self, reference: ImageSize) -> Result<FractionalPrompts, CoordinateError> {
        self.iter()
            .map(|p| Ok(Prompt::new(to_fractional(p.point, reference)?, p.label)))
            .collect()
    }
}

impl FractionalPrompts {
    /// Convert every prompt to absolute pixel space of `target`.
    pub fn to_absolute(&self, target: ImageSize) -> Result<PixelPrompts, CoordinateError> {
        self.iter()
            .map(|p| Ok(Prompt::new(to_absolute(p.point, target)?, p.label)))
            .collect()
    }
}
