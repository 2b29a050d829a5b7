use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Real-valued backscatter or change data
pub type SampleValue = f32;

/// 2D grid of samples for a single band (row x col)
pub type BandGrid = Array2<SampleValue>;

/// Nodata marker in binary masks (valid cells are 0 or 1)
pub const MASK_NODATA: u8 = u8::MAX;

/// Polarization channels for dual-pol SAR acquisitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    VV,
    VH,
    HV,
    HH,
}

impl std::fmt::Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Polarization::VV => write!(f, "VV"),
            Polarization::VH => write!(f, "VH"),
            Polarization::HV => write!(f, "HV"),
            Polarization::HH => write!(f, "HH"),
        }
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

/// Grid geometry shared by every product in a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridInfo {
    pub rows: usize,
    pub cols: usize,
    /// (x, y) ground resolution in meters
    pub pixel_spacing: (f64, f64),
    pub bounding_box: BoundingBox,
}

impl GridInfo {
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Physical area of one cell in square meters
    pub fn cell_area_m2(&self) -> f64 {
        self.pixel_spacing.0 * self.pixel_spacing.1
    }

    /// Whether two grids are co-registered (same shape, resolution, extent)
    pub fn matches(&self, other: &GridInfo) -> bool {
        use approx::relative_eq;
        self.rows == other.rows
            && self.cols == other.cols
            && relative_eq!(self.pixel_spacing.0, other.pixel_spacing.0, max_relative = 1e-9)
            && relative_eq!(self.pixel_spacing.1, other.pixel_spacing.1, max_relative = 1e-9)
            && relative_eq!(self.bounding_box.min_lon, other.bounding_box.min_lon, epsilon = 1e-9)
            && relative_eq!(self.bounding_box.max_lon, other.bounding_box.max_lon, epsilon = 1e-9)
            && relative_eq!(self.bounding_box.min_lat, other.bounding_box.min_lat, epsilon = 1e-9)
            && relative_eq!(self.bounding_box.max_lat, other.bounding_box.max_lat, epsilon = 1e-9)
    }
}

/// Multi-band raster over a fixed grid.
///
/// Bands are co-registered grids keyed by name (e.g. "VV", "VH", or the
/// derived "VV_db"). Nodata cells carry `f32::NAN`; every consumer guards
/// reductions with `is_finite()`. Stages never mutate an input raster in
/// place, they produce a new one.
#[derive(Debug, Clone)]
pub struct Raster {
    pub grid: GridInfo,
    bands: BTreeMap<String, BandGrid>,
}

impl Raster {
    pub fn new(grid: GridInfo) -> Self {
        Self {
            grid,
            bands: BTreeMap::new(),
        }
    }

    /// Add a band, validating its shape against the grid
    pub fn insert_band(&mut self, name: impl Into<String>, data: BandGrid) -> FloodResult<()> {
        if data.dim() != self.grid.shape() {
            return Err(FloodError::InvalidRaster(format!(
                "band shape {:?} does not match grid {:?}",
                data.dim(),
                self.grid.shape()
            )));
        }
        self.bands.insert(name.into(), data);
        Ok(())
    }

    pub fn band(&self, name: &str) -> Option<&BandGrid> {
        self.bands.get(name)
    }

    /// Band names in deterministic (sorted) order
    pub fn band_names(&self) -> Vec<&str> {
        self.bands.keys().map(String::as_str).collect()
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }
}

/// Derived log-scale band name for a source band
pub fn db_band_name(band: &str) -> String {
    format!("{}_db", band)
}

/// Pre/post acquisition pair, validated to share grid and band set
#[derive(Debug, Clone)]
pub struct RasterPair {
    pre: Raster,
    post: Raster,
}

impl RasterPair {
    /// Pair two rasters, rejecting mismatched geometry or band sets
    pub fn new(pre: Raster, post: Raster) -> FloodResult<Self> {
        if !pre.grid.matches(&post.grid) {
            return Err(FloodError::MismatchedPair(format!(
                "grid mismatch: pre {}x{} @ {:?} vs post {}x{} @ {:?}",
                pre.grid.rows,
                pre.grid.cols,
                pre.grid.pixel_spacing,
                post.grid.rows,
                post.grid.cols,
                post.grid.pixel_spacing
            )));
        }
        if pre.band_names() != post.band_names() {
            return Err(FloodError::MismatchedPair(format!(
                "band set mismatch: pre {:?} vs post {:?}",
                pre.band_names(),
                post.band_names()
            )));
        }
        Ok(Self { pre, post })
    }

    pub fn pre(&self) -> &Raster {
        &self.pre
    }

    pub fn post(&self) -> &Raster {
        &self.post
    }

    pub fn grid(&self) -> &GridInfo {
        &self.pre.grid
    }
}

/// Signed post-minus-pre change signal on the dB scale.
///
/// Negative values mean a backscatter drop, the candidate flood signal.
#[derive(Debug, Clone)]
pub struct ChangeMap {
    pub grid: GridInfo,
    pub data: BandGrid,
}

/// Binary flood mask aligned to a change map's grid.
///
/// Cells are 1 (flood), 0 (no flood) or [`MASK_NODATA`].
#[derive(Debug, Clone)]
pub struct BinaryMask {
    pub grid: GridInfo,
    pub data: Array2<u8>,
}

impl BinaryMask {
    pub fn flood_cell_count(&self) -> u64 {
        self.data.iter().filter(|&&v| v == 1).count() as u64
    }
}

/// Area of interest: an identifier plus an optional cell-membership mask.
///
/// Without a mask the region covers the full grid.
#[derive(Debug, Clone)]
pub struct Region {
    pub id: String,
    mask: Option<Array2<bool>>,
}

impl Region {
    pub fn full_grid(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mask: None,
        }
    }

    pub fn with_mask(id: impl Into<String>, mask: Array2<bool>) -> Self {
        Self {
            id: id.into(),
            mask: Some(mask),
        }
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        match &self.mask {
            Some(mask) => mask.get((row, col)).copied().unwrap_or(false),
            None => true,
        }
    }
}

/// Flood extent summary for one region of one event.
///
/// Derived from a mask and the region geometry, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaStatistic {
    pub event_id: String,
    pub region_id: String,
    pub flooded_cells: u64,
    pub flooded_area_km2: f64,
    pub total_area_km2: f64,
    pub percent_flooded: f64,
}

/// Cooperative cancellation flag shared between a host and a running pipeline.
///
/// Checked between row bands and pipeline stages; a cancelled run returns
/// [`FloodError::Cancelled`] and produces no partial output.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> FloodResult<()> {
        if self.is_cancelled() {
            Err(FloodError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Error types for flood detection
#[derive(Debug, thiserror::Error)]
pub enum FloodError {
    #[error("Invalid raster: {0}")]
    InvalidRaster(String),

    #[error("Mismatched raster pair: {0}")]
    MismatchedPair(String),

    #[error("Empty region: {0}")]
    EmptyRegion(String),

    #[error("Histogram is degenerate, no valid Otsu split exists")]
    HistogramDegenerate,

    #[error("Computation cancelled")]
    Cancelled,

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for flood detection operations
pub type FloodResult<T> = Result<T, FloodError>;
