//! Preview overlay rendering.
//!
//! Draws the current prompts and preview mask on top of the reference image
//! and saves it as a PNG, so the operator can inspect a preview with any
//! image viewer while typing commands.

use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut};
use std::fs;
use std::path::{Path, PathBuf};

use crate::mask::FOREGROUND;
use crate::prompt::{Label, PixelPrompts};

/// Radius of prompt markers in pixels.
pub const MARKER_RADIUS: i32 = 5;

const POSITIVE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const NEGATIVE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const MASK_COLOR: [u8; 3] = [255, 0, 0];
const OUTLINE_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Render prompts and an optional mask over the reference image.
///
/// Foreground mask pixels are blended 50/50 with red; prompts are filled
/// circles, green for positive and red for negative.
pub fn render_overlay(
    reference: &DynamicImage,
    prompts: &PixelPrompts,
    mask: Option<&GrayImage>,
) -> RgbImage {
    let mut canvas = reference.to_rgb8();

    if let Some(mask) = mask {
        if mask.dimensions() == canvas.dimensions() {
            for (x, y, pixel) in canvas.enumerate_pixels_mut() {
                if mask.get_pixel(x, y).0[0] == FOREGROUND {
                    for c in 0..3 {
                        pixel.0[c] = ((pixel.0[c] as u16 + MASK_COLOR[c] as u16) / 2) as u8;
                    }
                }
            }
        } else {
            tracing::warn!(
                "Skipping mask overlay: mask is {:?}, image is {:?}",
                mask.dimensions(),
                canvas.dimensions()
            );
        }
    }

    for prompt in prompts {
        let center = (prompt.point.x as i32, prompt.point.y as i32);
        let color = match prompt.label {
            Label::Positive => POSITIVE_COLOR,
            Label::Negative => NEGATIVE_COLOR,
        };
        draw_filled_circle_mut(&mut canvas, center, MARKER_RADIUS, color);
        draw_hollow_circle_mut(&mut canvas, center, MARKER_RADIUS + 1, OUTLINE_COLOR);
    }

    canvas
}

/// Writes the overlay to a fixed path after every change.
#[derive(Debug, Clone)]
pub struct PreviewWriter {
    path: PathBuf,
}

impl PreviewWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(
        &self,
        reference: &DynamicImage,
        prompts: &PixelPrompts,
        mask: Option<&GrayImage>,
    ) -> Result<(), image::ImageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(image::ImageError::IoError)?;
            }
        }
        render_overlay(reference, prompts, mask).save(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PixelPoint;
    use image::Luma;

    #[test]
    fn test_overlay_blends_mask() {
        let reference = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([0, 0, 200])));
        let mut mask = GrayImage::new(4, 4);
        mask.put_pixel(1, 1, Luma([FOREGROUND]));

        let canvas = render_overlay(&reference, &PixelPrompts::new(), Some(&mask));
        assert_eq!(canvas.get_pixel(1, 1), &Rgb([127, 0, 100]));
        assert_eq!(canvas.get_pixel(0, 0), &Rgb([0, 0, 200]));
    }

    #[test]
    fn test_overlay_draws_markers() {
        let reference = DynamicImage::new_rgb8(40, 40);
        let mut prompts = PixelPrompts::new();
        prompts.push(PixelPoint::new(10, 10), Label::Positive);
        prompts.push(PixelPoint::new(30, 30), Label::Negative);

        let canvas = render_overlay(&reference, &prompts, None);
        assert_eq!(canvas.get_pixel(10, 10), &POSITIVE_COLOR);
        assert_eq!(canvas.get_pixel(30, 30), &NEGATIVE_COLOR);
        assert_eq!(canvas.get_pixel(20, 20), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_overlay_ignores_mismatched_mask() {
        let reference = DynamicImage::new_rgb8(4, 4);
        let mask = GrayImage::from_pixel(2, 2, Luma([FOREGROUND]));
        let canvas = render_overlay(&reference, &PixelPrompts::new(), Some(&mask));
        assert!(canvas.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_preview_writer_creates_parent_dir() {
        let dir = crate::test_utils::scratch_dir("preview-writer");
        let writer = PreviewWriter::new(dir.join("out").join("preview.png"));
        writer
            .write(&DynamicImage::new_rgb8(8, 8), &PixelPrompts::new(), None)
            .unwrap();
        assert!(writer.path().is_file());
        fs::remove_dir_all(dir).ok();
    }
}
