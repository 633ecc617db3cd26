//! Shared test helpers: a deterministic fake model and scratch directories.

use image::DynamicImage;
use std::cell::{Cell, RefCell};
use std::path::PathBuf;

use crate::model::{Candidate, MaskLogits, SegmentationError, SegmentationModel};
use crate::prompt::{ImageSize, Label, PixelPoint, PixelPrompts};

/// Fake model whose foreground is a square of half-width 10 around the first
/// positive prompt of each call.
#[derive(Default)]
pub(crate) struct SquareModel {
    pub bound: Option<ImageSize>,
    pub binds: usize,
    pub calls: Cell<usize>,
    /// Prompts received by every `predict` call, in order.
    pub seen: RefCell<Vec<PixelPrompts>>,
    pub fail_predict: bool,
    /// Return no candidates when the bound image has this size.
    pub empty_for: Option<ImageSize>,
}

impl SegmentationModel for SquareModel {
    async fn set_image(&mut self, image: &DynamicImage) -> Result<(), SegmentationError> {
        self.bound = Some(ImageSize::of(image));
        self.binds += 1;
        Ok(())
    }

    async fn predict(
        &self,
        prompts: &PixelPrompts,
        _multimask_output: bool,
    ) -> Result<Vec<Candidate>, SegmentationError> {
        self.calls.set(self.calls.get() + 1);
        self.seen.borrow_mut().push(prompts.clone());
        if self.fail_predict {
            return Err(SegmentationError::Inference("boom".to_string()));
        }
        let size = self.bound.ok_or(SegmentationError::NoImageBound)?;
        if self.empty_for == Some(size) {
            return Ok(Vec::new());
        }

        let center = prompts
            .iter()
            .find(|p| p.label == Label::Positive)
            .map(|p| p.point)
            .unwrap_or(PixelPoint::new(0, 0));
        let mask = MaskLogits::from_fn(size.width, size.height, |x, y| {
            let dx = (x as i64 - center.x as i64).abs();
            let dy = (y as i64 - center.y as i64).abs();
            if dx <= 10 && dy <= 10 {
                1.0
            } else {
                -1.0
            }
        });
        Ok(vec![Candidate { mask, score: 0.9 }])
    }
}

/// Fresh, empty directory under the system temp dir.
pub(crate) fn scratch_dir(prefix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
