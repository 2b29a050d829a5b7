use crate::types::{
    db_band_name, BandGrid, CancelToken, FloodError, FloodResult, Raster,
};
use ndarray::Array2;

/// Preprocessing parameters
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PreprocessParams {
    /// Focal median radius in cells (window is (2r+1) x (2r+1))
    pub filter_radius: usize,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self { filter_radius: 3 }
    }
}

/// Image size above which the parallel focal median path is used
#[cfg(feature = "parallel")]
const PARALLEL_PIXEL_THRESHOLD: usize = 1_000_000;

/// Raster preprocessor: focal-median despeckling plus dB conversion.
///
/// For each source band the output raster carries the original band
/// untouched and a derived `<band>_db` band holding
/// `10 * log10(median_filtered)`. Non-positive filtered amplitudes cannot
/// be log-transformed and become nodata (NaN) instead of propagating as
/// normal numbers.
pub struct Preprocessor {
    params: PreprocessParams,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self {
            params: PreprocessParams::default(),
        }
    }

    pub fn with_params(params: PreprocessParams) -> Self {
        Self { params }
    }

    /// Preprocess every band of a raster, adding derived dB bands
    pub fn preprocess(&self, raster: &Raster, cancel: &CancelToken) -> FloodResult<Raster> {
        log::info!(
            "Preprocessing {} band(s) with focal median radius {}",
            raster.band_count(),
            self.params.filter_radius
        );

        if raster.band_count() == 0 {
            return Err(FloodError::InvalidRaster(
                "raster has no bands to preprocess".to_string(),
            ));
        }

        let mut output = Raster::new(raster.grid.clone());
        for name in raster.band_names() {
            let band = raster
                .band(name)
                .ok_or_else(|| FloodError::Processing(format!("band {} disappeared", name)))?;

            let filtered = self.focal_median(band, cancel)?;
            let (db, invalid) = Self::to_db(&filtered);

            if invalid > 0 {
                log::warn!(
                    "Band {}: {} cell(s) had non-positive amplitude, marked nodata",
                    name,
                    invalid
                );
            }
            if db.iter().all(|v| !v.is_finite()) {
                return Err(FloodError::InvalidRaster(format!(
                    "band {} has no valid amplitude after filtering",
                    name
                )));
            }

            output.insert_band(name, band.clone())?;
            output.insert_band(db_band_name(name), db)?;
        }

        log::debug!("Preprocessing produced bands {:?}", output.band_names());
        Ok(output)
    }

    /// Focal median over a clipped square window.
    ///
    /// Boundary cells use whatever window falls inside the grid. Nodata
    /// centers stay nodata; nodata neighbors cast no vote.
    pub fn focal_median(&self, band: &BandGrid, cancel: &CancelToken) -> FloodResult<BandGrid> {
        let (height, width) = band.dim();

        if self.params.filter_radius == 0 {
            return Ok(band.clone());
        }

        #[cfg(feature = "parallel")]
        if height * width > PARALLEL_PIXEL_THRESHOLD {
            return self.focal_median_parallel(band, cancel);
        }

        let mut filtered = Array2::zeros((height, width));
        for i in 0..height {
            cancel.check()?;
            for j in 0..width {
                filtered[[i, j]] = self.median_at(band, i, j);
            }
        }
        Ok(filtered)
    }

    #[cfg(feature = "parallel")]
    fn focal_median_parallel(&self, band: &BandGrid, cancel: &CancelToken) -> FloodResult<BandGrid> {
        use rayon::prelude::*;

        log::debug!("Applying focal median with parallel row processing");
        let (height, width) = band.dim();

        let rows: Vec<FloodResult<Vec<f32>>> = (0..height)
            .into_par_iter()
            .map(|i| {
                cancel.check()?;
                let mut row = Vec::with_capacity(width);
                for j in 0..width {
                    row.push(self.median_at(band, i, j));
                }
                Ok(row)
            })
            .collect();

        let mut flat = Vec::with_capacity(height * width);
        for row in rows {
            flat.extend(row?);
        }
        Array2::from_shape_vec((height, width), flat)
            .map_err(|e| FloodError::Processing(format!("shape error: {}", e)))
    }

    fn median_at(&self, band: &BandGrid, i: usize, j: usize) -> f32 {
        let (height, width) = band.dim();
        let radius = self.params.filter_radius;

        let center = band[[i, j]];
        if !center.is_finite() {
            return f32::NAN;
        }

        let i_start = i.saturating_sub(radius);
        let i_end = (i + radius + 1).min(height);
        let j_start = j.saturating_sub(radius);
        let j_end = (j + radius + 1).min(width);

        let mut window = Vec::with_capacity((2 * radius + 1) * (2 * radius + 1));
        for wi in i_start..i_end {
            for wj in j_start..j_end {
                let value = band[[wi, wj]];
                if value.is_finite() {
                    window.push(value);
                }
            }
        }

        // center is finite, so the window is never empty
        window.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        window[window.len() / 2]
    }

    /// Convert filtered amplitudes to dB scale.
    ///
    /// Returns the converted band and the number of cells marked nodata
    /// because their amplitude was zero or negative. Cells that were
    /// already nodata stay nodata without entering that count.
    pub fn to_db(band: &BandGrid) -> (BandGrid, usize) {
        log::debug!("Converting to dB scale");

        let mut non_positive = 0usize;
        let db = band.mapv(|x| {
            if x.is_finite() && x > 0.0 {
                10.0 * x.log10()
            } else {
                if x.is_finite() {
                    non_positive += 1;
                }
                f32::NAN
            }
        });
        (db, non_positive)
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}
