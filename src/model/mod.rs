//! Segmentation model contract and the HTTP service adapter.

mod client;
mod segmenter;

pub use client::{
    ClientError, HttpSegmenter, SegmenterConfig, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS,
    DEFAULT_TIMEOUT_SECS,
};
pub use segmenter::{select_best, Candidate, MaskLogits, SegmentationError, SegmentationModel};
