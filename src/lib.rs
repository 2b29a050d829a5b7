//! sarflood: SAR change-detection flood mapping engine
//!
//! Turns two co-registered radar backscatter rasters (pre- and post-event)
//! into a binary flood mask and area statistics. The pipeline despeckles
//! and dB-scales both acquisitions, differences them per polarization,
//! selects a threshold (fixed or via Otsu's method on the change
//! histogram), cleans the binarized mask with a majority filter, and
//! aggregates flooded area over a region of interest.
//!
//! Acquisition, compositing, rendering and export belong to the host; this
//! crate only owns the deterministic numerical pipeline between aligned
//! rasters and the resulting mask and statistics.

pub mod types;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    AreaStatistic, BandGrid, BinaryMask, BoundingBox, CancelToken, ChangeMap, FloodError,
    FloodResult, GridInfo, Polarization, Raster, RasterPair, Region, MASK_NODATA,
};

pub use core::{
    aggregate_statistics, otsu_threshold, ChangeMapBuilder, DetectionParams, FloodDetector,
    FloodEvent, FloodProduct, Histogram, HistogramBuilder, HistogramParams, MaskParams,
    MaskPostProcessor, PreprocessParams, Preprocessor, ProgressObserver, Stage, ThresholdMode,
    ThresholdSource,
};
