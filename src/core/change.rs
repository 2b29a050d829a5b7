use crate::types::{ChangeMap, FloodError, FloodResult, RasterPair};
use ndarray::Array2;

/// Change map builder: post-minus-pre differencing on log-scale bands.
///
/// With several selected bands the per-band differences are combined by
/// an equal-weight arithmetic mean. A cell that is nodata in any selected
/// band of either acquisition is nodata in the change map.
pub struct ChangeMapBuilder;

impl ChangeMapBuilder {
    /// Build a change map from a preprocessed pair.
    ///
    /// `bands` selects which band names to difference; `None` selects every
    /// derived dB band of the pair.
    pub fn build(pair: &RasterPair, bands: Option<&[String]>) -> FloodResult<ChangeMap> {
        let selected: Vec<String> = match bands {
            Some(names) => names.to_vec(),
            None => pair
                .pre()
                .band_names()
                .iter()
                .filter(|name| name.ends_with("_db"))
                .map(|name| name.to_string())
                .collect(),
        };

        if selected.is_empty() {
            return Err(FloodError::Processing(
                "no bands selected for change detection (preprocess the pair first)".to_string(),
            ));
        }
        for name in &selected {
            if pair.pre().band(name).is_none() {
                return Err(FloodError::Processing(format!(
                    "selected band {} not present in pair",
                    name
                )));
            }
        }

        log::info!("Building change map from band(s) {:?}", selected);

        let (height, width) = pair.grid().shape();
        let mut data = Array2::zeros((height, width));
        let band_count = selected.len() as f32;

        for i in 0..height {
            for j in 0..width {
                let mut sum = 0.0f32;
                let mut valid = true;
                for name in &selected {
                    // presence validated above, pair guarantees both sides
                    let pre = pair.pre().band(name).map(|b| b[[i, j]]).unwrap_or(f32::NAN);
                    let post = pair.post().band(name).map(|b| b[[i, j]]).unwrap_or(f32::NAN);
                    if pre.is_finite() && post.is_finite() {
                        sum += post - pre;
                    } else {
                        valid = false;
                        break;
                    }
                }
                data[[i, j]] = if valid { sum / band_count } else { f32::NAN };
            }
        }

        Ok(ChangeMap {
            grid: pair.grid().clone(),
            data,
        })
    }
}
