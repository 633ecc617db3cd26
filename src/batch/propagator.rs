//! Applies one calibration to a list of target images.

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::sink::{MaskSink, SinkError};
use super::source::{image_name, load_image};
use crate::mask::{coverage, threshold_mask};
use crate::model::{select_best, SegmentationError, SegmentationModel};
use crate::prompt::{CoordinateError, FractionalPrompts, ImageSize};

/// Errors that stop a batch before any image is touched.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Prompt set is empty; confirm a calibration first")]
    EmptyPrompts,
}

/// Pipeline step a per-image failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStep {
    LoadImage,
    CheckDimensions,
    BindImage,
    Predict,
    WriteOutput,
}

impl fmt::Display for BatchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchStep::LoadImage => "load image",
            BatchStep::CheckDimensions => "check dimensions",
            BatchStep::BindImage => "bind image",
            BatchStep::Predict => "predict",
            BatchStep::WriteOutput => "write output",
        };
        f.write_str(name)
    }
}

/// Failure of a single image. Never aborts the batch.
#[derive(Error, Debug)]
pub enum ItemError {
    #[error("Could not load image: {0}")]
    ImageLoad(#[from] image::ImageError),
    #[error(transparent)]
    InvalidDimension(#[from] CoordinateError),
    #[error("Failed to bind image to the model: {0}")]
    Bind(#[source] SegmentationError),
    #[error("{0}")]
    Inference(#[source] SegmentationError),
    #[error("Could not save mask: {0}")]
    OutputWrite(#[from] SinkError),
}

impl ItemError {
    /// Step that failed.
    pub fn step(&self) -> BatchStep {
        match self {
            ItemError::ImageLoad(_) => BatchStep::LoadImage,
            ItemError::InvalidDimension(_) => BatchStep::CheckDimensions,
            ItemError::Bind(_) => BatchStep::BindImage,
            ItemError::Inference(_) => BatchStep::Predict,
            ItemError::OutputWrite(_) => BatchStep::WriteOutput,
        }
    }

    /// Skipped images never reached the model; failed ones did.
    pub fn is_skip(&self) -> bool {
        matches!(self, ItemError::ImageLoad(_) | ItemError::InvalidDimension(_))
    }
}

/// Result for one target image.
#[derive(Debug)]
pub struct ItemOutcome {
    pub source: PathBuf,
    /// Where the mask was written, or why not.
    pub result: Result<PathBuf, ItemError>,
}

/// Counts and per-image outcomes of a batch run, in input order.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchSummary {
    fn record(&mut self, outcome: ItemOutcome) {
        match &outcome.result {
            Ok(_) => self.processed += 1,
            Err(e) if e.is_skip() => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Outcomes that did not produce a mask.
    pub fn problems(&self) -> impl Iterator<Item = (&Path, &ItemError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.source.as_path(), e)))
    }
}

/// Runs the model over many images with one fractional prompt set.
///
/// Images are processed one at a time; the model is rebound to every image
/// before its prediction.
pub struct BatchPropagator<'m, M: SegmentationModel> {
    model: &'m mut M,
    multimask_output: bool,
    reference_size: Option<ImageSize>,
}

impl<'m, M: SegmentationModel> BatchPropagator<'m, M> {
    pub fn new(model: &'m mut M) -> Self {
        Self {
            model,
            multimask_output: false,
            reference_size: None,
        }
    }

    /// Ask for several candidates per image and keep the best.
    pub fn with_multimask_output(mut self, multimask_output: bool) -> Self {
        self.multimask_output = multimask_output;
        self
    }

    /// Size of the calibration image; used to flag aspect ratio changes.
    pub fn with_reference_size(mut self, size: ImageSize) -> Self {
        self.reference_size = Some(size);
        self
    }

    /// Process `targets` in order, emitting one mask per image into `sink`.
    pub async fn run<S: MaskSink + ?Sized>(
        &mut self,
        prompts: &FractionalPrompts,
        targets: &[PathBuf],
        sink: &mut S,
    ) -> Result<BatchSummary, BatchError> {
        if prompts.is_empty() {
            return Err(BatchError::EmptyPrompts);
        }

        let mut summary = BatchSummary::default();
        for (index, path) in targets.iter().enumerate() {
            let name = image_name(path);
            tracing::info!("Processing [{}/{}]: {}", index + 1, targets.len(), name);

            let result = self.process_one(prompts, path, sink).await;
            match &result {
                Ok(output) => tracing::info!("  ✅ Saved to {}", output.display()),
                Err(e) if e.is_skip() => {
                    tracing::warn!("  ⚠️ Skipping {} ({}): {}", name, e.step(), e)
                }
                Err(e) => tracing::error!("  ❌ Failed {} ({}): {}", name, e.step(), e),
            }

            summary.record(ItemOutcome {
                source: path.clone(),
                result,
            });
        }

        tracing::info!(
            "Batch complete: {} processed, {} skipped, {} failed",
            summary.processed,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }

    async fn process_one<S: MaskSink + ?Sized>(
        &mut self,
        prompts: &FractionalPrompts,
        path: &Path,
        sink: &mut S,
    ) -> Result<PathBuf, ItemError> {
        let image = load_image(path)?;
        let size = ImageSize::of(&image);
        let absolute = prompts.to_absolute(size)?;

        if let Some(reference) = self.reference_size {
            if (reference.aspect_ratio() - size.aspect_ratio()).abs() > 1e-3 {
                tracing::debug!(
                    "{} is {} but the calibration image was {}; prompts are scaled per axis",
                    image_name(path),
                    size,
                    reference
                );
            }
        }

        self.model.set_image(&image).await.map_err(ItemError::Bind)?;
        let candidates = self
            .model
            .predict(&absolute, self.multimask_output)
            .await
            .map_err(ItemError::Inference)?;
        let best = select_best(candidates).map_err(ItemError::Inference)?;
        if best.mask.size() != size {
            return Err(ItemError::Inference(SegmentationError::Inference(format!(
                "Mask is {} but the image is {}",
                best.mask.size(),
                size
            ))));
        }

        let mask = threshold_mask(&best.mask);
        tracing::debug!(
            "Mask score {:.3}, {:.1}% foreground",
            best.score,
            coverage(&mask) * 100.0
        );
        Ok(sink.emit(path, &mask)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::sink::DirectorySink;
    use crate::prompt::{FractionalPoint, Label, PixelPoint};
    use crate::test_utils::{scratch_dir, SquareModel};
    use image::{DynamicImage, GrayImage};
    use std::fs;

    /// Keeps masks in memory.
    #[derive(Default)]
    struct MemorySink {
        masks: Vec<(PathBuf, GrayImage)>,
        fail_on: Option<String>,
    }

    impl MaskSink for MemorySink {
        fn emit(&mut self, source: &Path, mask: &GrayImage) -> Result<PathBuf, SinkError> {
            if self.fail_on.as_deref() == Some(image_name(source).as_str()) {
                return Err(SinkError::InvalidSource(source.to_path_buf()));
            }
            self.masks.push((source.to_path_buf(), mask.clone()));
            Ok(source.with_extension("mask"))
        }
    }

    fn center_prompt() -> FractionalPrompts {
        let mut prompts = FractionalPrompts::new();
        prompts.push(FractionalPoint::new(0.5, 0.5), Label::Positive);
        prompts
    }

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        DynamicImage::new_rgb8(width, height).save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn test_empty_prompts_rejected() {
        let mut model = SquareModel::default();
        let mut propagator = BatchPropagator::new(&mut model);
        let mut sink = MemorySink::default();
        let result = propagator
            .run(&FractionalPrompts::new(), &[PathBuf::from("a.png")], &mut sink)
            .await;
        assert!(matches!(result, Err(BatchError::EmptyPrompts)));
        assert!(sink.masks.is_empty());
    }

    #[tokio::test]
    async fn test_batch_isolation_with_corrupt_image() {
        let dir = scratch_dir("batch-isolation");
        let first = write_png(&dir, "img1.png", 40, 40);
        let second = dir.join("img2.png");
        fs::write(&second, b"corrupted bytes").unwrap();
        let third = write_png(&dir, "img3.png", 60, 30);

        let mut model = SquareModel::default();
        let mut sink = MemorySink::default();
        let targets = vec![first.clone(), second.clone(), third.clone()];
        let summary = BatchPropagator::new(&mut model)
            .run(&center_prompt(), &targets, &mut sink)
            .await
            .unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.total(), 3);

        let emitted: Vec<&PathBuf> = sink.masks.iter().map(|(p, _)| p).collect();
        assert_eq!(emitted, vec![&first, &third]);

        let problems: Vec<_> = summary.problems().collect();
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].0, second.as_path());
        assert_eq!(problems[0].1.step(), BatchStep::LoadImage);

        // Bound once per readable image, with prompts rescaled for each.
        assert_eq!(model.binds, 2);
        let seen = model.seen.borrow();
        assert_eq!(seen[0].as_slice()[0].point, PixelPoint::new(20, 20));
        assert_eq!(seen[1].as_slice()[0].point, PixelPoint::new(30, 15));
        fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_inference_and_output_failures_continue() {
        let dir = scratch_dir("batch-failures");
        let a = write_png(&dir, "a.png", 20, 20);
        let b = write_png(&dir, "b.png", 30, 20);
        let c = write_png(&dir, "c.png", 25, 25);

        let mut model = SquareModel {
            empty_for: Some(ImageSize::new(30, 20)),
            ..Default::default()
        };
        let mut sink = MemorySink {
            fail_on: Some("c.png".to_string()),
            ..Default::default()
        };
        let summary = BatchPropagator::new(&mut model)
            .run(&center_prompt(), &[a.clone(), b, c], &mut sink)
            .await
            .unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.failed, 2);
        let steps: Vec<BatchStep> = summary.problems().map(|(_, e)| e.step()).collect();
        assert_eq!(steps, vec![BatchStep::Predict, BatchStep::WriteOutput]);
        assert_eq!(sink.masks.len(), 1);
        assert_eq!(sink.masks[0].0, a);
        fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let dir = scratch_dir("batch-e2e");
        let target = write_png(&dir, "target.png", 200, 50);
        let out = dir.join("masks");

        // Calibration on a 100x100 reference: one positive click at (50, 50).
        let mut absolute = crate::prompt::PixelPrompts::new();
        absolute.push(PixelPoint::new(50, 50), Label::Positive);
        let prompts = absolute.to_fractional(ImageSize::new(100, 100)).unwrap();
        assert_eq!(prompts.as_slice()[0].point, FractionalPoint::new(0.5, 0.5));

        let mut model = SquareModel::default();
        let mut sink = DirectorySink::new(&out);
        let summary = BatchPropagator::new(&mut model)
            .with_reference_size(ImageSize::new(100, 100))
            .run(&prompts, &[target], &mut sink)
            .await
            .unwrap();
        assert_eq!(summary.processed, 1);

        assert_eq!(
            model.seen.borrow()[0].as_slice()[0].point,
            PixelPoint::new(100, 25)
        );

        let mask = image::open(out.join("target_mask.png")).unwrap().to_luma8();
        assert_eq!(mask.dimensions(), (200, 50));
        assert!(mask.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        assert_eq!(mask.get_pixel(100, 25).0[0], 255);
        assert_eq!(mask.get_pixel(0, 0).0[0], 0);
        fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_same_stem_counts_as_failed() {
        let dir = scratch_dir("batch-same-stem");
        let png = write_png(&dir, "a.png", 20, 20);
        let jpg = write_png(&dir, "a.jpg", 20, 20);
        let out = dir.join("masks");

        let mut model = SquareModel::default();
        let mut sink = DirectorySink::new(&out);
        let summary = BatchPropagator::new(&mut model)
            .run(&center_prompt(), &[png, jpg.clone()], &mut sink)
            .await
            .unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 1);
        let problems: Vec<_> = summary.problems().collect();
        assert_eq!(problems[0].0, jpg.as_path());
        assert_eq!(problems[0].1.step(), BatchStep::WriteOutput);
        fs::remove_dir_all(dir).ok();
    }
}
