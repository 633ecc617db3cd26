//! Batch propagation of a confirmed calibration across many images.

mod propagator;
mod report;
mod sink;
mod source;

pub use propagator::{BatchError, BatchPropagator, BatchStep, BatchSummary, ItemError, ItemOutcome};
pub use report::{BatchReport, ReportItem, ReportStatus, REPORT_FILE_NAME};
pub use sink::{mask_file_name, DirectorySink, MaskSink, SinkError, DEFAULT_MASK_SUFFIX};
pub use source::{image_name, is_supported_image, list_images, load_image, SUPPORTED_EXTENSIONS};
