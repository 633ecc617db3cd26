//! Basic usage example for Mask Propagator.
//!
//! Runs a scripted calibration and a batch against an in-process model,
//! so no segmentation service is needed.

use image::{DynamicImage, Rgb, RgbImage};
use mask_propagator::{
    run_session, BatchPropagator, Calibration, CalibrationSession, Candidate, DirectorySink, Label,
    MaskLogits, PixelPoint, PixelPrompts, ReferenceImage, SegmentationError, SegmentationModel,
    SessionCommand, SessionOutcome,
};

/// Marks every pixel whose colour is close to the colour under the first
/// positive prompt.
#[derive(Default)]
struct ColorMatchModel {
    image: Option<RgbImage>,
}

impl SegmentationModel for ColorMatchModel {
    async fn set_image(&mut self, image: &DynamicImage) -> Result<(), SegmentationError> {
        self.image = Some(image.to_rgb8());
        Ok(())
    }

    async fn predict(
        &self,
        prompts: &PixelPrompts,
        _multimask_output: bool,
    ) -> Result<Vec<Candidate>, SegmentationError> {
        let image = self.image.as_ref().ok_or(SegmentationError::NoImageBound)?;
        let seed = prompts
            .iter()
            .find(|p| p.label == Label::Positive)
            .ok_or_else(|| SegmentationError::Inference("no positive prompt".to_string()))?;
        let target = *image.get_pixel(seed.point.x, seed.point.y);

        let mask = MaskLogits::from_fn(image.width(), image.height(), |x, y| {
            let pixel = image.get_pixel(x, y);
            let distance: i32 = pixel
                .0
                .iter()
                .zip(target.0.iter())
                .map(|(a, b)| (*a as i32 - *b as i32).abs())
                .sum();
            if distance < 30 {
                1.0
            } else {
                -1.0
            }
        });

        Ok(vec![Candidate { mask, score: 1.0 }])
    }
}

/// Dark background with a bright rectangle covering the middle third.
fn synthetic_image(width: u32, height: u32) -> DynamicImage {
    let image = RgbImage::from_fn(width, height, |x, y| {
        let inside = x >= width / 3 && x < 2 * width / 3 && y >= height / 3 && y < 2 * height / 3;
        if inside {
            Rgb([230, 200, 40])
        } else {
            Rgb([20, 20, 30])
        }
    });
    DynamicImage::ImageRgb8(image)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let workdir = std::env::temp_dir().join("mask-propagator-demo");
    let input_dir = workdir.join("images");
    let output_dir = workdir.join("masks");
    std::fs::create_dir_all(&input_dir)?;

    // Same scene at three resolutions
    for (name, width, height) in [("a.png", 300, 300), ("b.png", 600, 300), ("c.png", 120, 240)] {
        synthetic_image(width, height).save(input_dir.join(name))?;
    }

    let mut model = ColorMatchModel::default();

    println!("🎯 Calibrating on a.png...\n");
    let reference = ReferenceImage::new("a.png", image::open(input_dir.join("a.png"))?);
    let session = CalibrationSession::start(&mut model, reference).await?;

    let mut commands = vec![
        SessionCommand::AddPoint {
            point: PixelPoint::new(150, 150),
            label: Label::Positive,
        },
        SessionCommand::AddPoint {
            point: PixelPoint::new(10, 10),
            label: Label::Negative,
        },
        SessionCommand::Preview,
        SessionCommand::Confirm,
    ]
    .into_iter();

    let Calibration { prompts, .. } = match run_session(session, &mut commands, None).await? {
        SessionOutcome::Confirmed(calibration) => calibration,
        SessionOutcome::Quit => return Ok(()),
    };

    println!("\n🚀 Propagating to every image...\n");
    let targets = mask_propagator::list_images(&input_dir, Some("_mask"))?;
    let mut sink = DirectorySink::new(&output_dir);
    let summary = BatchPropagator::new(&mut model)
        .run(&prompts, &targets, &mut sink)
        .await?;

    println!(
        "\n✅ {} masks written to {} ({} skipped, {} failed)",
        summary.processed,
        output_dir.display(),
        summary.skipped,
        summary.failed
    );

    Ok(())
}
