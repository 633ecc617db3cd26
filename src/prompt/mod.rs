//! Prompt data model and coordinate normalization.

mod normalizer;
mod types;

pub use normalizer::{to_absolute, to_fractional, CoordinateError};
pub use types::{
    FractionalPoint, FractionalPrompts, ImageSize, Label, PixelPoint, PixelPrompts, Prompt,
    PromptSet,
};
