// Copyright 2025 ModerRAS
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Mask Propagator
//!
//! Calibrate a handful of point prompts on one reference image, then apply
//! them to a whole folder of similar images with a Segment Anything service.
//!
//! Clicks are stored in fractional coordinates (x / width, y / height), so
//! one calibration works for images of any resolution. Every target image
//! gets its own binary mask, `<stem>_mask.png`, with values 0 and 255.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mask_propagator::{
//!     run_session, BatchPropagator, CalibrationSession, DirectorySink, HttpSegmenter,
//!     LineCommandSource, ReferenceImage, SegmenterConfig, SessionOutcome,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut model = HttpSegmenter::connect(SegmenterConfig::default()).await?;
//!
//!     let reference = ReferenceImage::new("ref.png", image::open("images/ref.png")?);
//!     let session = CalibrationSession::start(&mut model, reference).await?;
//!     let mut commands = LineCommandSource::stdin();
//!
//!     if let SessionOutcome::Confirmed(calibration) =
//!         run_session(session, &mut commands, None).await?
//!     {
//!         let targets = mask_propagator::list_images("images".as_ref(), Some("_mask"))?;
//!         let mut sink = DirectorySink::new("masks");
//!         let summary = BatchPropagator::new(&mut model)
//!             .run(&calibration.prompts, &targets, &mut sink)
//!             .await?;
//!         println!("{} masks written", summary.processed);
//!     }
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod batch;
pub mod mask;
pub mod model;
pub mod prompt;
pub mod render;
pub mod session;
pub mod settings;

#[cfg(test)]
pub(crate) mod test_utils;

pub use batch::{
    list_images, BatchError, BatchPropagator, BatchReport, BatchSummary, DirectorySink, ItemError,
    MaskSink,
};
pub use mask::threshold_mask;
pub use model::{
    Candidate, HttpSegmenter, MaskLogits, SegmentationError, SegmentationModel, SegmenterConfig,
};
pub use prompt::{
    FractionalPoint, FractionalPrompts, ImageSize, Label, PixelPoint, PixelPrompts, PromptSet,
};
pub use render::PreviewWriter;
pub use session::{
    run_session, Calibration, CalibrationSession, LineCommandSource, ReferenceImage,
    SessionCommand, SessionError, SessionOutcome, SessionState,
};
pub use settings::AppSettings;
