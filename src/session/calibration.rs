//! Calibration session state machine.
//!
//! A session collects labeled clicks on one reference image, can ask the
//! model for a preview mask, and on confirmation turns the clicks into a
//! resolution independent [`Calibration`].
//!
//! ```text
//! Empty --add--> Collecting --preview--> Previewing
//!   ^               |  ^                    |
//!   +----reset------+  +-------add----------+
//! Collecting/Previewing --confirm--> Confirmed
//! any non-terminal      --quit-----> Quit
//! ```

use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mask::threshold_mask;
use crate::model::{select_best, SegmentationError, SegmentationModel};
use crate::prompt::{CoordinateError, FractionalPrompts, ImageSize, Label, PixelPoint, PixelPrompts};

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No points yet.
    Empty,
    /// At least one point, no current preview.
    Collecting,
    /// A preview mask matching the current points exists.
    Previewing,
    /// Terminal: calibration produced.
    Confirmed,
    /// Terminal: aborted.
    Quit,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Confirmed | SessionState::Quit)
    }
}

/// Session errors.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No prompts selected; add at least one point first")]
    NoPrompts,
    #[error("Point ({x}, {y}) is outside the reference image {size}")]
    PointOutOfBounds { x: u32, y: u32, size: ImageSize },
    #[error("Session already finished ({0:?})")]
    Finished(SessionState),
    #[error("Preview failed: {0}")]
    Inference(#[from] SegmentationError),
    #[error(transparent)]
    Coordinate(#[from] CoordinateError),
}

/// Image the calibration is performed against.
#[derive(Debug, Clone)]
pub struct ReferenceImage {
    pub name: String,
    pub image: DynamicImage,
}

impl ReferenceImage {
    pub fn new(name: impl Into<String>, image: DynamicImage) -> Self {
        Self {
            name: name.into(),
            image,
        }
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::of(&self.image)
    }
}

/// Result of a confirmed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Prompts in fractional coordinates.
    pub prompts: FractionalPrompts,
    /// Size of the image the prompts were clicked on.
    pub reference_size: ImageSize,
}

/// Preview mask computed for the current prompts.
#[derive(Debug, Clone)]
pub struct PreviewMask {
    pub mask: GrayImage,
    pub score: f32,
}

/// Interactive prompt collection against one reference image.
///
/// The session borrows the model exclusively for its lifetime, so the
/// reference image bound in [`CalibrationSession::start`] stays bound until
/// the session is dropped.
pub struct CalibrationSession<'m, M: SegmentationModel> {
    model: &'m mut M,
    reference: ReferenceImage,
    prompts: PixelPrompts,
    preview: Option<PreviewMask>,
    state: SessionState,
    multimask_output: bool,
}

impl<'m, M: SegmentationModel> CalibrationSession<'m, M> {
    /// Bind the reference image into the model and open an empty session.
    pub async fn start(model: &'m mut M, reference: ReferenceImage) -> Result<Self, SessionError> {
        let size = reference.size();
        if !size.is_valid() {
            return Err(CoordinateError::InvalidDimension {
                width: size.width,
                height: size.height,
            }
            .into());
        }

        model.set_image(&reference.image).await?;
        tracing::info!("Calibration session started on {} ({})", reference.name, size);

        Ok(Self {
            model,
            reference,
            prompts: PixelPrompts::new(),
            preview: None,
            state: SessionState::Empty,
            multimask_output: false,
        })
    }

    /// Ask the model for several candidates on preview and keep the best.
    pub fn with_multimask_output(mut self, multimask_output: bool) -> Self {
        self.multimask_output = multimask_output;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn prompts(&self) -> &PixelPrompts {
        &self.prompts
    }

    pub fn reference(&self) -> &ReferenceImage {
        &self.reference
    }

    /// The preview mask, only while it still matches the current prompts.
    pub fn current_preview(&self) -> Option<&PreviewMask> {
        match self.state {
            SessionState::Previewing => self.preview.as_ref(),
            _ => None,
        }
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.state.is_terminal() {
            Err(SessionError::Finished(self.state))
        } else {
            Ok(())
        }
    }

    fn ensure_prompts(&self) -> Result<(), SessionError> {
        if self.prompts.is_empty() {
            Err(SessionError::NoPrompts)
        } else {
            Ok(())
        }
    }

    /// Append a labeled point. Invalidates any preview.
    pub fn add_point(&mut self, point: PixelPoint, label: Label) -> Result<(), SessionError> {
        self.ensure_active()?;
        let size = self.reference.size();
        if !size.contains(point) {
            return Err(SessionError::PointOutOfBounds {
                x: point.x,
                y: point.y,
                size,
            });
        }

        self.prompts.push(point, label);
        self.preview = None;
        self.state = SessionState::Collecting;
        tracing::debug!(
            "Added {} point ({}, {}), {} total",
            label.as_str(),
            point.x,
            point.y,
            self.prompts.len()
        );
        Ok(())
    }

    /// Run the model on the reference image with the current prompts.
    ///
    /// On inference failure the session falls back to `Collecting` without a
    /// preview; the prompts are untouched either way.
    pub async fn preview(&mut self) -> Result<&PreviewMask, SessionError> {
        self.ensure_active()?;
        self.ensure_prompts()?;

        let best = match self.run_model().await {
            Ok(best) => best,
            Err(e) => {
                self.preview = None;
                self.state = SessionState::Collecting;
                return Err(e.into());
            }
        };

        self.state = SessionState::Previewing;
        let preview: &PreviewMask = self.preview.insert(best);
        Ok(preview)
    }

    async fn run_model(&self) -> Result<PreviewMask, SegmentationError> {
        let candidates = self
            .model
            .predict(&self.prompts, self.multimask_output)
            .await?;
        let best = select_best(candidates)?;
        if best.mask.size() != self.reference.size() {
            return Err(SegmentationError::Inference(format!(
                "Preview mask is {} but the reference image is {}",
                best.mask.size(),
                self.reference.size()
            )));
        }
        Ok(PreviewMask {
            mask: threshold_mask(&best.mask),
            score: best.score,
        })
    }

    /// Clear all prompts and the preview.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.prompts.clear();
        self.preview = None;
        self.state = SessionState::Empty;
        Ok(())
    }

    /// Finish the session and produce the fractional calibration.
    pub fn confirm(&mut self) -> Result<Calibration, SessionError> {
        self.ensure_active()?;
        self.ensure_prompts()?;

        let reference_size = self.reference.size();
        let prompts = self.prompts.to_fractional(reference_size)?;
        self.preview = None;
        self.state = SessionState::Confirmed;

        tracing::info!(
            "Calibration confirmed with {} prompts on {}",
            prompts.len(),
            reference_size
        );
        Ok(Calibration {
            prompts,
            reference_size,
        })
    }

    /// Abort the session, discarding prompts and preview.
    pub fn quit(&mut self) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.prompts.clear();
        self.preview = None;
        self.state = SessionState::Quit;
        Ok(())
    }
}
