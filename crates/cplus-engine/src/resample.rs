//! Resampling a grid onto another grid's pixel lattice.

use cplus_core::extent::SpatialExtent;
use cplus_core::progress::Feedback;
use cplus_core::services::{RasterInfo, ResamplingMethod, ServiceError};

use crate::fill_cells;
use crate::grid::{Grid, DEFAULT_NODATA};

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Resample `source` onto the resolution and CRS of `reference`, covering
/// `extent`.
///
/// Window methods (average, min, max, median) combine every source cell
/// whose centre falls inside the target cell and fall back to the nearest
/// source cell when none does. With `rescale_values` the result is
/// multiplied by the target/source cell-area ratio.
pub fn align(
    source: &Grid,
    reference: &RasterInfo,
    extent: &SpatialExtent,
    method: ResamplingMethod,
    rescale_values: bool,
    feedback: &Feedback,
) -> Result<Grid, ServiceError> {
    use ResamplingMethod::*;

    if !matches!(method, NearestNeighbour | Bilinear | Average | Max | Min | Median) {
        return Err(ServiceError::Unsupported(format!("{method:?} resampling")));
    }

    let (x_res, y_res) = (reference.x_res, reference.y_res);
    let target_extent = extent.clone().with_crs(reference.extent.crs.clone());
    let mut out = Grid::on_extent(&target_extent, x_res, y_res, source.nodata.unwrap_or(DEFAULT_NODATA));

    let scale = if rescale_values {
        (x_res * y_res) / (source.x_res() * source.y_res())
    } else {
        1.0
    };

    fill_cells(&mut out, feedback, |x, y| {
        let window = || source.values_within(x - x_res / 2.0, x + x_res / 2.0, y - y_res / 2.0, y + y_res / 2.0);
        let value = match method {
            NearestNeighbour => source.sample_nearest(x, y),
            Bilinear => source.sample_bilinear(x, y),
            _ => {
                let mut values = window();
                if values.is_empty() {
                    source.sample_nearest(x, y)
                } else {
                    Some(match method {
                        Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                        Min => values.iter().copied().fold(f64::INFINITY, f64::min),
                        Median => median(&mut values),
                        _ => values.iter().sum::<f64>() / values.len() as f64,
                    })
                }
            }
        };
        value.map(|v| v * scale)
    })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{feedback, grid};
    use approx::assert_relative_eq;

    fn coarse_reference() -> RasterInfo {
        RasterInfo {
            extent: SpatialExtent::new(0.0, 20.0, 0.0, 20.0, "EPSG:32735"),
            width: 1,
            height: 1,
            x_res: 20.0,
            y_res: 20.0,
            nodata: None,
        }
    }

    #[test]
    fn average_combines_covered_cells() {
        let source = grid(&[1.0, 2.0, 3.0, 6.0]);
        let reference = coarse_reference();
        let out = align(&source, &reference, &reference.extent, ResamplingMethod::Average, false, &feedback()).unwrap();
        assert_eq!((out.width, out.height), (1, 1));
        assert_relative_eq!(out.get(0, 0), 3.0);
    }

    #[test]
    fn rescaling_multiplies_by_the_area_ratio() {
        let source = grid(&[1.0, 2.0, 3.0, 6.0]);
        let reference = coarse_reference();
        let out = align(&source, &reference, &reference.extent, ResamplingMethod::Max, true, &feedback()).unwrap();
        assert_relative_eq!(out.get(0, 0), 24.0);
    }

    #[test]
    fn median_and_min_windows() {
        let source = grid(&[1.0, 2.0, 3.0, 6.0]);
        let reference = coarse_reference();
        let med = align(&source, &reference, &reference.extent, ResamplingMethod::Median, false, &feedback()).unwrap();
        let min = align(&source, &reference, &reference.extent, ResamplingMethod::Min, false, &feedback()).unwrap();
        assert_relative_eq!(med.get(0, 0), 2.5);
        assert_relative_eq!(min.get(0, 0), 1.0);
    }

    #[test]
    fn finer_reference_uses_nearest_cells() {
        let source = grid(&[1.0, 2.0, 3.0, 4.0]);
        let reference = RasterInfo {
            extent: SpatialExtent::new(0.0, 20.0, 0.0, 20.0, "EPSG:32735"),
            width: 4,
            height: 4,
            x_res: 5.0,
            y_res: 5.0,
            nodata: None,
        };
        let out = align(&source, &reference, &reference.extent, ResamplingMethod::NearestNeighbour, false, &feedback())
            .unwrap();
        assert_eq!((out.width, out.height), (4, 4));
        assert_eq!(out.get(0, 0), 1.0);
        assert_eq!(out.get(3, 3), 4.0);
    }

    #[test]
    fn unsupported_methods_are_reported() {
        let source = grid(&[1.0, 2.0, 3.0, 4.0]);
        let reference = coarse_reference();
        let err = align(&source, &reference, &reference.extent, ResamplingMethod::Lanczos, false, &feedback()).unwrap_err();
        assert!(matches!(err, ServiceError::Unsupported(_)));
    }
}
