//! Thresholding raw model output into binary masks.

use image::{GrayImage, Luma};

use crate::model::MaskLogits;

/// Foreground pixel value in binary masks.
pub const FOREGROUND: u8 = 255;

/// Background pixel value in binary masks.
pub const BACKGROUND: u8 = 0;

/// Threshold raw logits: a pixel is foreground iff its value is above zero.
pub fn threshold_mask(logits: &MaskLogits) -> GrayImage {
    let width = logits.width as usize;
    GrayImage::from_fn(logits.width, logits.height, |x, y| {
        let value = logits.values[y as usize * width + x as usize];
        if value > 0.0 {
            Luma([FOREGROUND])
        } else {
            Luma([BACKGROUND])
        }
    })
}

/// Fraction of foreground pixels, used for log output.
pub fn coverage(mask: &GrayImage) -> f64 {
    let total = mask.width() as usize * mask.height() as usize;
    if total == 0 {
        return 0.0;
    }
    let foreground = mask.pixels().filter(|p| p.0[0] == FOREGROUND).count();
    foreground as f64 / total as f64
}
