//! Prompt types shared by the calibration session and the batch propagator.

use serde::{Deserialize, Serialize};

/// Whether a prompt marks a region to include or to exclude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    /// Include this region.
    Positive,
    /// Exclude this region.
    Negative,
}

impl Label {
    /// Label value expected by SAM-style predictors (1 = foreground, 0 = background).
    pub fn model_value(self) -> u8 {
        match self {
            Label::Positive => 1,
            Label::Negative => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Positive => "positive",
            Label::Negative => "negative",
        }
    }
}

/// Absolute pixel coordinate on a specific image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: u32,
    pub y: u32,
}

impl PixelPoint {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Resolution independent coordinate, each axis expressed as a fraction of
/// the image dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FractionalPoint {
    pub x: f64,
    pub y: f64,
}

impl FractionalPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size of a decoded image.
    pub fn of(image: &image::DynamicImage) -> Self {
        Self::new(image.width(), image.height())
    }

    /// True when both dimensions are non-zero.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Whether a pixel coordinate lies inside the image.
    pub fn contains(&self, point: PixelPoint) -> bool {
        point.x < self.width && point.y < self.height
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A single labeled point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prompt<P> {
    pub point: P,
    pub label: Label,
}

impl<P> Prompt<P> {
    pub fn new(point: P, label: Label) -> Self {
        Self { point, label }
    }
}

/// Ordered list of labeled points in one coordinate space.
///
/// The space is part of the type: a [`PixelPrompts`] set only becomes a
/// [`FractionalPrompts`] set through an explicit conversion, see
/// [`PixelPrompts::to_fractional`] and [`FractionalPrompts::to_absolute`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptSet<P> {
    prompts: Vec<Prompt<P>>,
}

/// Prompts in absolute pixel coordinates of one particular image.
pub type PixelPrompts = PromptSet<PixelPoint>;

/// Prompts in fractional coordinates, reusable across image sizes.
pub type FractionalPrompts = PromptSet<FractionalPoint>;

impl<P> Default for PromptSet<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> PromptSet<P> {
    /// Create an empty prompt set.
    pub fn new() -> Self {
        Self {
            prompts: Vec::new(),
        }
    }

    /// Append a labeled point.
    pub fn push(&mut self, point: P, label: Label) {
        self.prompts.push(Prompt::new(point, label));
    }

    /// Remove every point.
    pub fn clear(&mut self) {
        self.prompts.clear();
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Prompt<P>> {
        self.prompts.iter()
    }

    pub fn as_slice(&self) -> &[Prompt<P>] {
        &self.prompts
    }

    /// Labels in insertion order.
    pub fn labels(&self) -> Vec<Label> {
        self.prompts.iter().map(|p| p.label).collect()
    }

    /// Count of positive and negative prompts.
    pub fn label_counts(&self) -> (usize, usize) {
        let positive = self
            .prompts
            .iter()
            .filter(|p| p.label == Label::Positive)
            .count();
        (positive, self.prompts.len() - positive)
    }
}

impl<P> FromIterator<Prompt<P>> for PromptSet<P> {
    fn from_iter<I: IntoIterator<Item = Prompt<P>>>(iter: I) -> Self {
        Self {
            prompts: iter.into_iter().collect(),
        }
    }
}

impl<'a, P> IntoIterator for &'a PromptSet<P> {
    type Item = &'a Prompt<P>;
    type IntoIter = std::slice::Iter<'a, Prompt<P>>;

    fn into_iter(self) -> Self::IntoIter {
        self.prompts.iter()
    }
}
