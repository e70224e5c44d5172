//! Cell statistics across a stack of grids.

use cplus_core::extent::SpatialExtent;
use cplus_core::progress::Feedback;
use cplus_core::services::{CellStatistic, ServiceError};

use crate::fill_cells;
use crate::grid::Grid;

fn apply(statistic: CellStatistic, values: &[f64]) -> f64 {
    match statistic {
        CellStatistic::Sum => values.iter().sum(),
        CellStatistic::Mean => values.iter().sum::<f64>() / values.len() as f64,
        CellStatistic::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        CellStatistic::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

/// Values of every input at `(x, y)`; `None` if a no-data value must
/// poison the cell or no input is valid.
fn stack_values(inputs: &[Grid], ignore_nodata: bool, x: f64, y: f64) -> Option<Vec<Option<f64>>> {
    let values: Vec<Option<f64>> = inputs.iter().map(|g| g.sample_nearest(x, y)).collect();
    if values.iter().all(Option::is_none) || (!ignore_nodata && values.iter().any(Option::is_none)) {
        return None;
    }
    Some(values)
}

/// Pixel-wise `statistic` over `inputs` on the grid of `reference`.
///
/// The output declares `output_nodata` as its no-data value, so cells whose
/// statistic equals it read back as no-data.
pub fn aggregate(
    statistic: CellStatistic,
    inputs: &[Grid],
    ignore_nodata: bool,
    output_nodata: f64,
    reference: &Grid,
    extent: &SpatialExtent,
    feedback: &Feedback,
) -> Result<Grid, ServiceError> {
    if inputs.is_empty() {
        return Err(ServiceError::NoInputs { operation: "cell statistics" });
    }
    let mut out = Grid::on_extent(extent, reference.x_res(), reference.y_res(), output_nodata);
    fill_cells(&mut out, feedback, |x, y| {
        let values: Vec<f64> = stack_values(inputs, ignore_nodata, x, y)?.into_iter().flatten().collect();
        Some(apply(statistic, &values))
    })?;
    Ok(out)
}

/// Per cell, the 1-based position in `inputs` of the highest value.
/// Ties go to the earliest input.
pub fn highest_position(
    inputs: &[Grid],
    ignore_nodata: bool,
    output_nodata: f64,
    reference: &Grid,
    extent: &SpatialExtent,
    feedback: &Feedback,
) -> Result<Grid, ServiceError> {
    if inputs.is_empty() {
        return Err(ServiceError::NoInputs { operation: "highest position" });
    }
    let mut out = Grid::on_extent(extent, reference.x_res(), reference.y_res(), output_nodata);
    fill_cells(&mut out, feedback, |x, y| {
        let values = stack_values(inputs, ignore_nodata, x, y)?;
        let mut best: Option<(usize, f64)> = None;
        for (index, value) in values.into_iter().enumerate() {
            let Some(value) = value else { continue };
            if best.map_or(true, |(_, top)| value > top) {
                best = Some((index, value));
            }
        }
        best.map(|(index, _)| (index + 1) as f64)
    })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{feedback, grid, uniform};

    #[test]
    fn sum_ignores_nodata_inputs() {
        let a = grid(&[1.0, -9999.0, 2.0, -9999.0]);
        let b = grid(&[10.0, 20.0, -9999.0, -9999.0]);
        let extent = a.extent.clone();
        let out = aggregate(CellStatistic::Sum, &[a.clone(), b], true, -9999.0, &a, &extent, &feedback()).unwrap();
        assert_eq!(out.data, vec![11.0, 20.0, 2.0, -9999.0]);
    }

    #[test]
    fn nodata_poisons_the_cell_unless_ignored() {
        let a = grid(&[1.0, -9999.0, 2.0, 3.0]);
        let b = grid(&[1.0, 1.0, 1.0, 1.0]);
        let extent = a.extent.clone();
        let out = aggregate(CellStatistic::Sum, &[a.clone(), b], false, -1.0, &a, &extent, &feedback()).unwrap();
        assert_eq!(out.value(0, 1), None);
        assert_eq!(out.value(1, 1), Some(4.0));
    }

    #[test]
    fn zero_output_nodata_turns_zeros_into_nodata() {
        let weighted = grid(&[0.0, 0.5, 0.0, 2.0]);
        let extent = weighted.extent.clone();
        let cleaned = aggregate(CellStatistic::Sum, &[weighted.clone()], true, 0.0, &weighted, &extent, &feedback()).unwrap();
        assert_eq!(cleaned.nodata, Some(0.0));
        let values: Vec<_> = (0..4).map(|i| cleaned.value(i / 2, i % 2)).collect();
        assert_eq!(values, vec![None, Some(0.5), None, Some(2.0)]);
    }

    #[test]
    fn highest_position_ties_go_to_the_lowest_rank() {
        let a = grid(&[0.2, 0.9, 0.5, -9999.0]);
        let b = grid(&[0.8, 0.1, 0.5, -9999.0]);
        let extent = a.extent.clone();
        let out = highest_position(&[a.clone(), b], true, -9999.0, &a, &extent, &feedback()).unwrap();
        assert_eq!(out.data, vec![2.0, 1.0, 1.0, -9999.0]);
    }

    #[test]
    fn empty_stack_is_rejected() {
        let r = uniform(1.0);
        let err = highest_position(&[], true, -9999.0, &r, &r.extent.clone(), &feedback()).unwrap_err();
        assert!(matches!(err, ServiceError::NoInputs { .. }));
    }
}
