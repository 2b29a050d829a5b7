use crate::types::{ChangeMap, FloodError, FloodResult, Region};

/// Histogram parameters
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HistogramParams {
    /// Number of uniform buckets over the observed value range
    pub bucket_count: usize,
    /// Range widening factor; 1.0 keeps the observed min/max.
    ///
    /// Widening is multiplicative around the range center, so all-equal
    /// data still collapses to a single bucket regardless of spread; the
    /// fixed-threshold fallback covers that case.
    pub spread: f64,
}

impl Default for HistogramParams {
    fn default() -> Self {
        Self {
            bucket_count: 255,
            spread: 1.0,
        }
    }
}

/// One histogram bucket: mean of its member values and their count
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramBucket {
    pub mean: f64,
    pub count: u64,
}

/// Weighted histogram of a change signal over a region.
///
/// Empty buckets are dropped on construction, so bucket means are strictly
/// increasing and counts sum to the number of sampled cells.
#[derive(Debug, Clone)]
pub struct Histogram {
    buckets: Vec<HistogramBucket>,
}

impl Histogram {
    pub fn buckets(&self) -> &[HistogramBucket] {
        &self.buckets
    }

    pub fn total_count(&self) -> u64 {
        self.buckets.iter().map(|b| b.count).sum()
    }

    /// Test/advanced constructor from explicit buckets.
    ///
    /// Buckets must be in strictly increasing mean order.
    pub fn from_buckets(buckets: Vec<HistogramBucket>) -> FloodResult<Self> {
        for pair in buckets.windows(2) {
            if pair[1].mean <= pair[0].mean {
                return Err(FloodError::Processing(
                    "histogram bucket means must be strictly increasing".to_string(),
                ));
            }
        }
        Ok(Self { buckets })
    }
}

/// Bucket-grid accumulator supporting commutative merge across tiles.
///
/// All accumulators merged together must be created with the same range
/// and bucket count.
#[derive(Debug, Clone)]
pub struct HistogramAccumulator {
    lo: f64,
    width: f64,
    sums: Vec<f64>,
    counts: Vec<u64>,
}

impl HistogramAccumulator {
    pub fn new(lo: f64, hi: f64, bucket_count: usize) -> FloodResult<Self> {
        if bucket_count == 0 {
            return Err(FloodError::Processing(
                "histogram bucket count must be positive".to_string(),
            ));
        }
        if !(hi >= lo) {
            return Err(FloodError::Processing(format!(
                "invalid histogram range [{}, {}]",
                lo, hi
            )));
        }
        Ok(Self {
            lo,
            width: (hi - lo) / bucket_count as f64,
            sums: vec![0.0; bucket_count],
            counts: vec![0; bucket_count],
        })
    }

    /// Assign one value to its bucket
    pub fn push(&mut self, value: f64) {
        let index = if self.width > 0.0 {
            (((value - self.lo) / self.width) as usize).min(self.counts.len() - 1)
        } else {
            0
        };
        self.sums[index] += value;
        self.counts[index] += 1;
    }

    /// Merge another tile's accumulator into this one
    pub fn merge(&mut self, other: &HistogramAccumulator) -> FloodResult<()> {
        if self.counts.len() != other.counts.len()
            || (self.lo - other.lo).abs() > 1e-12
            || (self.width - other.width).abs() > 1e-12
        {
            return Err(FloodError::Processing(
                "cannot merge histograms with different bucket grids".to_string(),
            ));
        }
        for i in 0..self.counts.len() {
            self.sums[i] += other.sums[i];
            self.counts[i] += other.counts[i];
        }
        Ok(())
    }

    /// Finalize into a histogram, dropping empty buckets
    pub fn finish(self) -> Histogram {
        let buckets = self
            .sums
            .iter()
            .zip(&self.counts)
            .filter(|(_, &count)| count > 0)
            .map(|(&sum, &count)| HistogramBucket {
                mean: sum / count as f64,
                count,
            })
            .collect();
        Histogram { buckets }
    }
}

/// Histogram builder over a change map restricted to a region
pub struct HistogramBuilder {
    params: HistogramParams,
}

impl HistogramBuilder {
    pub fn new() -> Self {
        Self {
            params: HistogramParams::default(),
        }
    }

    pub fn with_params(params: HistogramParams) -> Self {
        Self { params }
    }

    /// Bin the valid in-region change values into a weighted histogram
    pub fn build(&self, change: &ChangeMap, region: &Region) -> FloodResult<Histogram> {
        let (height, width) = change.grid.shape();

        // first pass: observed range of valid in-region cells
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut valid_cells = 0u64;
        for i in 0..height {
            for j in 0..width {
                let value = change.data[[i, j]];
                if region.contains(i, j) && value.is_finite() {
                    let v = value as f64;
                    min = min.min(v);
                    max = max.max(v);
                    valid_cells += 1;
                }
            }
        }

        if valid_cells == 0 {
            return Err(FloodError::EmptyRegion(format!(
                "region {} has no valid change samples",
                region.id
            )));
        }

        // widen the range around its center to avoid degenerate edge buckets
        let center = 0.5 * (min + max);
        let half = 0.5 * (max - min) * self.params.spread;
        let (lo, hi) = (center - half, center + half);

        log::debug!(
            "Histogram over region {}: {} cells, range [{:.3}, {:.3}], {} buckets",
            region.id,
            valid_cells,
            lo,
            hi,
            self.params.bucket_count
        );

        let mut acc = HistogramAccumulator::new(lo, hi, self.params.bucket_count)?;
        for i in 0..height {
            for j in 0..width {
                let value = change.data[[i, j]];
                if region.contains(i, j) && value.is_finite() {
                    acc.push(value as f64);
                }
            }
        }

        let histogram = acc.finish();
        debug_assert_eq!(histogram.total_count(), valid_cells);
        Ok(histogram)
    }
}

impl Default for HistogramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, GridInfo};
    use ndarray::Array2;

    fn change_map(values: Array2<f32>) -> ChangeMap {
        let (rows, cols) = values.dim();
        ChangeMap {
            grid: GridInfo {
                rows,
                cols,
                pixel_spacing: (10.0, 10.0),
                bounding_box: BoundingBox {
                    min_lon: 0.0,
                    max_lon: 1.0,
                    min_lat: 0.0,
                    max_lat: 1.0,
                },
            },
            data: values,
        }
    }

    #[test]
    fn test_counts_sum_to_valid_cells() {
        let mut data = Array2::from_elem((4, 4), -2.0f32);
        data[[0, 0]] = f32::NAN;
        data[[3, 3]] = -6.0;
        let change = change_map(data);

        let hist = HistogramBuilder::new()
            .build(&change, &Region::full_grid("aoi"))
            .unwrap();
        assert_eq!(hist.total_count(), 15);
    }

    #[test]
    fn test_bucket_means_strictly_increasing() {
        let values = Array2::from_shape_fn((8, 8), |(i, j)| -((i * 8 + j) as f32) / 4.0);
        let change = change_map(values);

        let hist = HistogramBuilder::new()
            .build(&change, &Region::full_grid("aoi"))
            .unwrap();
        for pair in hist.buckets().windows(2) {
            assert!(pair[1].mean > pair[0].mean);
        }
    }

    #[test]
    fn test_bucket_mean_is_member_mean() {
        // two clusters land in the extreme buckets; means must be the
        // cluster means, not nominal bucket centers
        let mut data = Array2::from_elem((2, 2), -8.0f32);
        data[[1, 0]] = 0.0;
        data[[1, 1]] = 0.0;
        let change = change_map(data);

        let hist = HistogramBuilder::with_params(HistogramParams {
            bucket_count: 4,
            spread: 1.0,
        })
        .build(&change, &Region::full_grid("aoi"))
        .unwrap();

        let buckets = hist.buckets();
        assert_eq!(buckets.len(), 2);
        assert!((buckets[0].mean - (-8.0)).abs() < 1e-9);
        assert_eq!(buckets[0].count, 2);
        assert!((buckets[1].mean - 0.0).abs() < 1e-9);
        assert_eq!(buckets[1].count, 2);
    }

    #[test]
    fn test_empty_region_reported() {
        let change = change_map(Array2::from_elem((3, 3), f32::NAN));
        let result = HistogramBuilder::new().build(&change, &Region::full_grid("aoi"));
        assert!(matches!(result, Err(FloodError::EmptyRegion(_))));

        let masked = Region::with_mask("empty", Array2::from_elem((3, 3), false));
        let change = change_map(Array2::from_elem((3, 3), -1.0));
        let result = HistogramBuilder::new().build(&change, &masked);
        assert!(matches!(result, Err(FloodError::EmptyRegion(_))));
    }

    #[test]
    fn test_region_mask_restricts_samples() {
        let mut data = Array2::from_elem((2, 2), -1.0f32);
        data[[0, 0]] = -9.0;
        let change = change_map(data);

        let mut mask = Array2::from_elem((2, 2), true);
        mask[[0, 0]] = false;
        let hist = HistogramBuilder::new()
            .build(&change, &Region::with_mask("partial", mask))
            .unwrap();
        assert_eq!(hist.total_count(), 3);
        // single bucket: every sample is -1
        assert_eq!(hist.buckets().len(), 1);
        assert!((hist.buckets()[0].mean - (-1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_spread_widens_bucket_grid() {
        // values -8, -7, 0 over 8 buckets
        let mut data = Array2::from_elem((1, 3), -8.0f32);
        data[[0, 1]] = -7.0;
        data[[0, 2]] = 0.0;
        let change = change_map(data);
        let region = Region::full_grid("aoi");

        // spread 1.0: grid spans exactly [-8, 0], width 1; each value
        // occupies its own bucket and the extremes sit at the range ends
        let tight = HistogramBuilder::with_params(HistogramParams {
            bucket_count: 8,
            spread: 1.0,
        })
        .build(&change, &region)
        .unwrap();
        assert_eq!(tight.buckets().len(), 3);
        assert!((tight.buckets()[0].mean - (-8.0)).abs() < 1e-9);
        assert!((tight.buckets()[2].mean - 0.0).abs() < 1e-9);

        // spread 2.0: grid spans [-12, 4], width 2; -8 and -7 now share
        // the bucket at index 2, away from the grid edge
        let wide = HistogramBuilder::with_params(HistogramParams {
            bucket_count: 8,
            spread: 2.0,
        })
        .build(&change, &region)
        .unwrap();
        assert_eq!(wide.buckets().len(), 2);
        assert!((wide.buckets()[0].mean - (-7.5)).abs() < 1e-9);
        assert_eq!(wide.buckets()[0].count, 2);
        assert!((wide.buckets()[1].mean - 0.0).abs() < 1e-9);
        assert_eq!(wide.total_count(), 3);
    }

    #[test]
    fn test_spread_cannot_rescue_all_equal_data() {
        let change = change_map(Array2::from_elem((3, 3), -2.0));
        let hist = HistogramBuilder::with_params(HistogramParams {
            bucket_count: 8,
            spread: 4.0,
        })
        .build(&change, &Region::full_grid("aoi"))
        .unwrap();
        // zero observed range stays zero however far it is widened
        assert_eq!(hist.buckets().len(), 1);
    }

    #[test]
    fn test_all_equal_values_collapse_to_one_bucket() {
        let change = change_map(Array2::from_elem((4, 4), -3.0));
        let hist = HistogramBuilder::new()
            .build(&change, &Region::full_grid("aoi"))
            .unwrap();
        assert_eq!(hist.buckets().len(), 1);
        assert_eq!(hist.total_count(), 16);
    }

    #[test]
    fn test_accumulator_merge_matches_single_pass() {
        let values = [-5.0, -4.5, -1.0, 0.5, 2.0, -5.0, 1.5, 0.0];

        let mut whole = HistogramAccumulator::new(-5.0, 2.0, 8).unwrap();
        for &v in &values {
            whole.push(v);
        }

        let mut left = HistogramAccumulator::new(-5.0, 2.0, 8).unwrap();
        let mut right = HistogramAccumulator::new(-5.0, 2.0, 8).unwrap();
        for &v in &values[..4] {
            left.push(v);
        }
        for &v in &values[4..] {
            right.push(v);
        }
        left.merge(&right).unwrap();

        let a = whole.finish();
        let b = left.finish();
        assert_eq!(a.buckets().len(), b.buckets().len());
        for (x, y) in a.buckets().iter().zip(b.buckets()) {
            assert_eq!(x.count, y.count);
            assert!((x.mean - y.mean).abs() < 1e-12);
        }
    }

    #[test]
    fn test_merge_rejects_different_grids() {
        let mut a = HistogramAccumulator::new(-5.0, 2.0, 8).unwrap();
        let b = HistogramAccumulator::new(-4.0, 2.0, 8).unwrap();
        assert!(a.merge(&b).is_err());
    }
}
