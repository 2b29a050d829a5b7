use crate::types::{BinaryMask, CancelToken, ChangeMap, FloodResult, MASK_NODATA};
use ndarray::Array2;

/// Mask post-processing parameters
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MaskParams {
    /// Majority-filter radius in cells; 0 disables cleanup
    pub mode_filter_radius: usize,
}

impl Default for MaskParams {
    fn default() -> Self {
        Self {
            mode_filter_radius: 2,
        }
    }
}

/// Mask post-processor: thresholding plus majority-vote cleanup.
///
/// A cell is flood when its change value is below the threshold (a larger
/// backscatter drop than the cutoff). The mode filter then replaces each
/// cell with the most frequent value in its window, breaking ties toward
/// no-flood; isolated speckle residue disappears while uniform areas are
/// left untouched.
pub struct MaskPostProcessor {
    params: MaskParams,
}

impl MaskPostProcessor {
    pub fn new() -> Self {
        Self {
            params: MaskParams::default(),
        }
    }

    pub fn with_params(params: MaskParams) -> Self {
        Self { params }
    }

    /// Binarize then clean in one step
    pub fn apply(
        &self,
        change: &ChangeMap,
        threshold: f64,
        cancel: &CancelToken,
    ) -> FloodResult<BinaryMask> {
        log::info!(
            "Binarizing change map at {:.3} dB, mode filter radius {}",
            threshold,
            self.params.mode_filter_radius
        );
        let raw = Self::binarize(change, threshold);
        self.mode_filter(&raw, cancel)
    }

    /// Flood where change < threshold; nodata change cells stay nodata
    pub fn binarize(change: &ChangeMap, threshold: f64) -> BinaryMask {
        let data = change.data.mapv(|v| {
            if !v.is_finite() {
                MASK_NODATA
            } else if (v as f64) < threshold {
                1
            } else {
                0
            }
        });
        BinaryMask {
            grid: change.grid.clone(),
            data,
        }
    }

    /// Majority-vote filter over a clipped square window.
    ///
    /// Nodata cells stay nodata and cast no votes. Idempotent on uniform
    /// regions.
    pub fn mode_filter(&self, mask: &BinaryMask, cancel: &CancelToken) -> FloodResult<BinaryMask> {
        let radius = self.params.mode_filter_radius;
        if radius == 0 {
            return Ok(mask.clone());
        }

        let (height, width) = mask.data.dim();
        let mut cleaned = Array2::zeros((height, width));

        for i in 0..height {
            cancel.check()?;
            for j in 0..width {
                let center = mask.data[[i, j]];
                if center == MASK_NODATA {
                    cleaned[[i, j]] = MASK_NODATA;
                    continue;
                }

                let i_start = i.saturating_sub(radius);
                let i_end = (i + radius + 1).min(height);
                let j_start = j.saturating_sub(radius);
                let j_end = (j + radius + 1).min(width);

                let mut ones = 0u32;
                let mut zeros = 0u32;
                for wi in i_start..i_end {
                    for wj in j_start..j_end {
                        match mask.data[[wi, wj]] {
                            1 => ones += 1,
                            0 => zeros += 1,
                            _ => {}
                        }
                    }
                }

                // ties stay conservative: no flood
                cleaned[[i, j]] = u8::from(ones > zeros);
            }
        }

        Ok(BinaryMask {
            grid: mask.grid.clone(),
            data: cleaned,
        })
    }
}

impl Default for MaskPostProcessor {
    fn default() -> Self {
        Self::new()
    }
}
