//! End-to-end flow shared by the `mask-propagator` and `mask-single` binaries:
//! plan the run, connect to the model, calibrate on the reference image, then
//! propagate.

use anyhow::{bail, Context};
use chrono::Local;
use std::path::{Path, PathBuf};

use crate::batch::{
    image_name, list_images, BatchPropagator, BatchReport, BatchSummary, DirectorySink,
};
use crate::model::{HttpSegmenter, SegmentationModel};
use crate::render::PreviewWriter;
use crate::session::{
    run_session, CalibrationSession, CommandSource, LineCommandSource, ReferenceImage,
    SessionOutcome, CONTROLS_HELP,
};
use crate::settings::AppSettings;

/// Which images the calibration is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    /// Every supported image in the reference image's folder.
    Folder,
    /// Only the reference image itself.
    ReferenceOnly,
}

/// Parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub reference: PathBuf,
    pub output_dir: PathBuf,
    /// Read calibration commands from this file instead of stdin.
    pub script: Option<PathBuf>,
    pub no_preview: bool,
    pub save_settings: bool,
}

impl RunOptions {
    /// Parse `<reference-image> <output-dir> [--script FILE] [--no-preview] [--save-settings]`.
    ///
    /// `args` excludes the program name. Returns `Ok(None)` for `--help`.
    pub fn parse(args: &[String]) -> anyhow::Result<Option<Self>> {
        let mut positional = Vec::new();
        let mut script = None;
        let mut no_preview = false;
        let mut save_settings = false;

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-h" | "--help" => return Ok(None),
                "--script" => {
                    let path = iter.next().context("--script needs a file path")?;
                    script = Some(PathBuf::from(path));
                }
                "--no-preview" => no_preview = true,
                "--save-settings" => save_settings = true,
                other if other.starts_with("--") => bail!("Unknown option: {}", other),
                other => positional.push(PathBuf::from(other)),
            }
        }

        match <[PathBuf; 2]>::try_from(positional) {
            Ok([reference, output_dir]) => Ok(Some(Self {
                reference,
                output_dir,
                script,
                no_preview,
                save_settings,
            })),
            Err(found) => bail!(
                "Expected <reference-image> <output-dir>, got {} positional argument(s)",
                found.len()
            ),
        }
    }
}

/// Usage text for a binary.
pub fn usage(program: &str, mode: TargetMode) -> String {
    let what = match mode {
        TargetMode::Folder => "every image in the reference image's folder",
        TargetMode::ReferenceOnly => "the reference image",
    };
    format!(
        "Usage: {} <reference-image> <output-dir> [--script FILE] [--no-preview] [--save-settings]\n\n\
         Calibrate point prompts on <reference-image> and write a binary mask for {}\n\
         into <output-dir>.\n\n\
         Commands during calibration:\n{}",
        program, what, CONTROLS_HELP
    )
}

/// Initialize tracing, defaulting to `info` when `RUST_LOG` is unset.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Everything a run needs before the model is involved.
pub struct RunPlan {
    pub reference: ReferenceImage,
    pub targets: Vec<PathBuf>,
    pub preview: Option<PreviewWriter>,
}

/// Resolve targets and the preview file, then load the reference image.
///
/// Every failure here is fatal and happens before any mask is written.
pub fn plan(options: &RunOptions, settings: &AppSettings, mode: TargetMode) -> anyhow::Result<RunPlan> {
    if !options.reference.is_file() {
        bail!("Reference image not found: {}", options.reference.display());
    }

    let preview = if options.no_preview {
        None
    } else {
        settings
            .preview_path(&options.output_dir)
            .map(PreviewWriter::new)
    };

    let targets = select_targets(options, settings, mode, preview.as_ref().map(|w| w.path()))?;

    let image = image::open(&options.reference).with_context(|| {
        format!(
            "Could not load the reference image at {}",
            options.reference.display()
        )
    })?;
    let reference = ReferenceImage::new(image_name(&options.reference), image);

    Ok(RunPlan {
        reference,
        targets,
        preview,
    })
}

/// Images the calibration is applied to.
///
/// In folder mode, files already carrying the mask suffix are left out only
/// when masks are written back into the input folder. The preview overlay is
/// never a target.
pub fn select_targets(
    options: &RunOptions,
    settings: &AppSettings,
    mode: TargetMode,
    preview: Option<&Path>,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut targets = match mode {
        TargetMode::Folder => {
            let input_dir = input_folder(&options.reference);
            println!("Input folder detected: {}", input_dir.display());

            let exclude_suffix = if same_path(&input_dir, &options.output_dir) {
                Some(settings.mask_suffix.as_str())
            } else {
                None
            };
            let targets = list_images(&input_dir, exclude_suffix)
                .with_context(|| format!("Failed to list images in {}", input_dir.display()))?;
            if targets.is_empty() {
                bail!("No images found in the input folder {}", input_dir.display());
            }
            targets
        }
        TargetMode::ReferenceOnly => vec![options.reference.clone()],
    };

    if let Some(preview) = preview {
        targets.retain(|target| !same_path(target, preview));
    }
    Ok(targets)
}

/// Connect to the segmentation service and run.
pub async fn run_with_service(
    options: &RunOptions,
    settings: &AppSettings,
    mode: TargetMode,
) -> anyhow::Result<()> {
    let plan = plan(options, settings, mode)?;
    println!("Images to process: {}", plan.targets.len());

    // A model that cannot be reached ends the run before any interaction.
    println!("Connecting to segmentation service at {}...", settings.base_url);
    let mut model = HttpSegmenter::connect(settings.segmenter_config()).await?;

    run(&mut model, plan, options, settings).await?;
    Ok(())
}

/// Calibrate on the reference image, then propagate to every target.
///
/// Returns `None` when the calibration was aborted.
pub async fn run<M: SegmentationModel>(
    model: &mut M,
    plan: RunPlan,
    options: &RunOptions,
    settings: &AppSettings,
) -> anyhow::Result<Option<BatchSummary>> {
    let RunPlan {
        reference,
        targets,
        preview,
    } = plan;

    println!("\n--- 🖱️ INTERACTIVE MODE ---");
    println!("Reference image: {} ({})", reference.name, reference.size());
    println!("{}", CONTROLS_HELP);
    if let Some(ref writer) = preview {
        println!("Preview overlay: {}", writer.path().display());
    }
    println!();

    let mut source: Box<dyn CommandSource> = match options.script {
        Some(ref script) => Box::new(
            LineCommandSource::from_file(script)
                .with_context(|| format!("Failed to open script {}", script.display()))?,
        ),
        None => Box::new(LineCommandSource::stdin()),
    };

    let session = CalibrationSession::start(&mut *model, reference.clone())
        .await?
        .with_multimask_output(settings.multimask_output);
    let calibration = match run_session(session, source.as_mut(), preview.as_ref()).await? {
        SessionOutcome::Confirmed(calibration) => calibration,
        SessionOutcome::Quit => {
            println!("Calibration aborted, nothing to process.");
            return Ok(None);
        }
    };

    println!("\n--- 🚀 Starting Batch Processing ---");
    for prompt in &calibration.prompts {
        println!(
            "  {:<8} ({:.4}, {:.4})",
            prompt.label.as_str(),
            prompt.point.x,
            prompt.point.y
        );
    }

    let started_at = Local::now();
    let mut sink = DirectorySink::new(&options.output_dir).with_suffix(&settings.mask_suffix);
    let summary = BatchPropagator::new(&mut *model)
        .with_multimask_output(settings.multimask_output)
        .with_reference_size(calibration.reference_size)
        .run(&calibration.prompts, &targets, &mut sink)
        .await?;

    println!("\n--- Batch processing complete! ---");
    println!(
        "Processed: {}  Skipped: {}  Failed: {}",
        summary.processed, summary.skipped, summary.failed
    );
    for (source, error) in summary.problems() {
        println!("  - {} [{}]: {}", image_name(source), error.step(), error);
    }

    if settings.write_report {
        let report = BatchReport::new(started_at, &reference.name, &calibration, &summary);
        match report.write(&options.output_dir) {
            Ok(path) => println!("Report written to {}", path.display()),
            Err(e) => tracing::warn!("Failed to write batch report: {}", e),
        }
    }

    Ok(Some(summary))
}

/// Same file or folder; paths that do not exist yet compare as written.
fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Folder holding the reference image; the batch runs over this folder.
fn input_folder(reference: &Path) -> PathBuf {
    match reference.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
