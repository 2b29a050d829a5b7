use crate::types::{AreaStatistic, BinaryMask, FloodError, FloodResult, Region, MASK_NODATA};

const M2_PER_KM2: f64 = 1_000_000.0;

/// Reduce a binary mask over a region to an area statistic.
///
/// Nodata cells are excluded from both the flooded area and the region
/// total, so the percentage denominator only counts observed cells. A
/// region with no observed cells is `EmptyRegion`, never a 0-or-NaN
/// percentage presented as valid.
pub fn aggregate_statistics(
    mask: &BinaryMask,
    region: &Region,
    event_id: &str,
) -> FloodResult<AreaStatistic> {
    let (height, width) = mask.data.dim();
    let cell_area_m2 = mask.grid.cell_area_m2();

    let mut flooded_cells = 0u64;
    let mut valid_cells = 0u64;
    for i in 0..height {
        for j in 0..width {
            if !region.contains(i, j) {
                continue;
            }
            match mask.data[[i, j]] {
                MASK_NODATA => {}
                1 => {
                    flooded_cells += 1;
                    valid_cells += 1;
                }
                _ => valid_cells += 1,
            }
        }
    }

    if valid_cells == 0 {
        return Err(FloodError::EmptyRegion(format!(
            "region {} has no observed cells to aggregate",
            region.id
        )));
    }

    let flooded_area_km2 = flooded_cells as f64 * cell_area_m2 / M2_PER_KM2;
    let total_area_km2 = valid_cells as f64 * cell_area_m2 / M2_PER_KM2;
    let percent_flooded = flooded_area_km2 / total_area_km2 * 100.0;

    log::info!(
        "Event {} region {}: {:.4} km2 flooded of {:.4} km2 ({:.2}%)",
        event_id,
        region.id,
        flooded_area_km2,
        total_area_km2,
        percent_flooded
    );

    Ok(AreaStatistic {
        event_id: event_id.to_string(),
        region_id: region.id.clone(),
        flooded_cells,
        flooded_area_km2,
        total_area_km2,
        percent_flooded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, GridInfo};
    use ndarray::Array2;

    fn mask(data: Array2<u8>, spacing: f64) -> BinaryMask {
        let (rows, cols) = data.dim();
        BinaryMask {
            grid: GridInfo {
                rows,
                cols,
                pixel_spacing: (spacing, spacing),
                bounding_box: BoundingBox {
                    min_lon: 0.0,
                    max_lon: 1.0,
                    min_lat: 0.0,
                    max_lat: 1.0,
                },
            },
            data,
        }
    }

    #[test]
    fn test_area_consistency() {
        let mut data = Array2::zeros((4, 4));
        for j in 2..4 {
            for i in 0..4 {
                data[[i, j]] = 1;
            }
        }
        // 10 m cells: 100 m2 each
        let stat = aggregate_statistics(&mask(data, 10.0), &Region::full_grid("aoi"), "event-1")
            .unwrap();

        assert_eq!(stat.flooded_cells, 8);
        let expected_km2 = 8.0 * 100.0 / 1_000_000.0;
        assert!((stat.flooded_area_km2 - expected_km2).abs() < 1e-12);
        assert!((stat.percent_flooded - 50.0).abs() < 1e-9);
        assert!(stat.percent_flooded >= 0.0 && stat.percent_flooded <= 100.0);
    }

    #[test]
    fn test_nodata_excluded_from_both_sides() {
        let mut data = Array2::zeros((2, 2));
        data[[0, 0]] = 1;
        data[[0, 1]] = MASK_NODATA;
        let stat = aggregate_statistics(&mask(data, 100.0), &Region::full_grid("aoi"), "event-1")
            .unwrap();

        // 3 observed cells, 1 flooded
        assert_eq!(stat.flooded_cells, 1);
        assert!((stat.total_area_km2 - 0.03).abs() < 1e-12);
        assert!((stat.percent_flooded - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_region_restricts_totals() {
        let mut data = Array2::zeros((2, 2));
        data[[0, 0]] = 1;
        data[[1, 1]] = 1;
        let mut membership = Array2::from_elem((2, 2), false);
        membership[[0, 0]] = true;
        membership[[0, 1]] = true;

        let region = Region::with_mask("west", membership);
        let stat = aggregate_statistics(&mask(data, 10.0), &region, "event-1").unwrap();
        assert_eq!(stat.flooded_cells, 1);
        assert!((stat.percent_flooded - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_nodata_region_is_empty() {
        let data = Array2::from_elem((3, 3), MASK_NODATA);
        let result = aggregate_statistics(&mask(data, 10.0), &Region::full_grid("aoi"), "event-1");
        assert!(matches!(result, Err(FloodError::EmptyRegion(_))));
    }
}
