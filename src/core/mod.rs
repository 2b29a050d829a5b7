//! Core flood change-detection stages

pub mod preprocess;
pub mod change;
pub mod histogram;
pub mod otsu;
pub mod mask;
pub mod stats;
pub mod pipeline;

// Re-export main types
pub use preprocess::{PreprocessParams, Preprocessor};
pub use change::ChangeMapBuilder;
pub use histogram::{Histogram, HistogramAccumulator, HistogramBucket, HistogramBuilder, HistogramParams};
pub use otsu::otsu_threshold;
pub use mask::{MaskParams, MaskPostProcessor};
pub use stats::aggregate_statistics;
pub use pipeline::{
    DetectionParams, EventOutcome, FloodDetector, FloodEvent, FloodProduct, NoProgress,
    ProgressObserver, Stage, ThresholdMode, ThresholdSource,
};
