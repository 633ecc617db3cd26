//! Segmentation model contract.

use image::DynamicImage;
use thiserror::Error;

use crate::prompt::{ImageSize, PixelPrompts};

/// Segmentation model errors.
#[derive(Error, Debug)]
pub enum SegmentationError {
    #[error("Segmentation model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("No image bound to the model")]
    NoImageBound,
    #[error("Model returned no candidate masks")]
    NoCandidates,
}

/// Raw per-pixel model output. Values above zero are foreground.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskLogits {
    pub width: u32,
    pub height: u32,
    /// Row-major values, `width * height` long.
    pub values: Vec<f32>,
}

impl MaskLogits {
    /// Build a raster, checking that the buffer matches the dimensions.
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Result<Self, SegmentationError> {
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(SegmentationError::Inference(format!(
                "Mask buffer has {} values, expected {} for {}x{}",
                values.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    /// Raster filled with `f(x, y)`.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> f32) -> Self {
        let mut values = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                values.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            values,
        }
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }
}

/// One candidate mask returned by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub mask: MaskLogits,
    pub score: f32,
}

/// A promptable segmentation model (Segment Anything style).
///
/// The model keeps one "current image". Callers must bind the image with
/// [`SegmentationModel::set_image`] before every [`SegmentationModel::predict`]
/// that uses coordinates from a different image; the model never rebinds on
/// its own. Prompts passed to `predict` are in the pixel space of the bound
/// image.
#[allow(async_fn_in_trait)]
pub trait SegmentationModel {
    /// Bind `image` as the current image.
    async fn set_image(&mut self, image: &DynamicImage) -> Result<(), SegmentationError>;

    /// Predict candidate masks for the bound image.
    ///
    /// With `multimask_output == false` the model returns a single candidate.
    async fn predict(
        &self,
        prompts: &PixelPrompts,
        multimask_output: bool,
    ) -> Result<Vec<Candidate>, SegmentationError>;
}

/// Pick the highest scoring candidate.
pub fn select_best(candidates: Vec<Candidate>) -> Result<Candidate, SegmentationError> {
    candidates
        .into_iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .ok_or(SegmentationError::NoCandidates)
}
