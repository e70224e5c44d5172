//! Reference raster engine for the scenario pipeline.
//!
//! [`GridEngine`] implements every `cplus_core` service contract over
//! in-memory [`Grid`]s. Rasters are read from JSON grids or GeoTIFFs and
//! always written as JSON grids.

pub mod algebra;
pub mod grid;
pub mod io;
pub mod resample;
pub mod statistics;

use std::path::{Path, PathBuf};

use cplus_core::expr::{layer_aliases, Expr};
use cplus_core::extent::SpatialExtent;
use cplus_core::progress::Feedback;
use cplus_core::services::{
    AggregateRequest, AlignRequest, BandStatistics, CellStatistics, RankRequest, RasterAlgebra, RasterAligner,
    RasterInfo, RasterSource, ServiceError,
};
use tracing::{debug, info};

pub use grid::Grid;
pub use io::{read_grid, write_grid, GRID_EXTENSION};

/// Compute every cell of `grid` from its centre coordinates.
///
/// `cell` returning `None` writes the grid's no-data value. Rows are
/// processed in parallel with the `threading` feature; cancellation is
/// observed between rows.
pub(crate) fn fill_cells<F>(grid: &mut Grid, feedback: &Feedback, cell: F) -> Result<(), ServiceError>
where
    F: Fn(f64, f64) -> Option<f64> + Sync,
{
    let width = grid.width;
    let (x_res, y_res) = (grid.x_res(), grid.y_res());
    let (xmin, ymax) = (grid.extent.xmin, grid.extent.ymax);
    let nodata = grid.nodata.unwrap_or(grid::DEFAULT_NODATA) as f32;

    let fill_row = |row: usize, values: &mut [f32]| {
        let y = ymax - (row as f64 + 0.5) * y_res;
        for (col, v) in values.iter_mut().enumerate() {
            let x = xmin + (col as f64 + 0.5) * x_res;
            *v = cell(x, y).map_or(nodata, |value| value as f32);
        }
    };

    #[cfg(feature = "threading")]
    {
        use rayon::prelude::*;
        grid.data.par_chunks_mut(width).enumerate().for_each(|(row, values)| {
            if !feedback.is_cancelled() {
                fill_row(row, values);
            }
        });
        if feedback.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }
        feedback.set_progress(100.0);
    }

    #[cfg(not(feature = "threading"))]
    {
        let height = grid.height;
        for (row, values) in grid.data.chunks_mut(width).enumerate() {
            if feedback.is_cancelled() {
                return Err(ServiceError::Cancelled);
            }
            fill_row(row, values);
            feedback.set_progress((row + 1) as f64 / height as f64 * 100.0);
        }
    }

    Ok(())
}

/// Raster engine over JSON/GeoTIFF grids.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridEngine;

impl GridEngine {
    pub fn new() -> Self {
        Self
    }

    fn save(&self, grid: &Grid, output: &Path) -> Result<PathBuf, ServiceError> {
        write_grid(grid, output)?;
        Ok(output.to_path_buf())
    }
}

impl RasterSource for GridEngine {
    fn describe(&self, raster: &Path) -> Result<RasterInfo, ServiceError> {
        Ok(read_grid(raster)?.info())
    }

    fn band_statistics(&self, raster: &Path) -> Result<BandStatistics, ServiceError> {
        Ok(read_grid(raster)?.statistics().unwrap_or_else(BandStatistics::empty))
    }

    fn raster_extension(&self) -> &str {
        GRID_EXTENSION
    }
}

impl RasterAlgebra for GridEngine {
    fn evaluate(
        &self,
        expression: &Expr,
        extent: &SpatialExtent,
        layers: &[PathBuf],
        output: &Path,
        feedback: &Feedback,
    ) -> Result<PathBuf, ServiceError> {
        info!(%expression, output = %output.display(), "Raster calculator");
        let grids = layer_aliases(layers)
            .into_iter()
            .zip(layers)
            .map(|(alias, path)| Ok((alias, read_grid(path)?)))
            .collect::<Result<Vec<_>, ServiceError>>()?;
        let grid = algebra::evaluate(expression, extent, grids, feedback)?;
        self.save(&grid, output)
    }
}

impl CellStatistics for GridEngine {
    fn aggregate(&self, request: &AggregateRequest<'_>, feedback: &Feedback) -> Result<PathBuf, ServiceError> {
        debug!(?request, "Cell statistics");
        let inputs = request.inputs.iter().map(|p| read_grid(p)).collect::<Result<Vec<_>, _>>()?;
        let reference = read_grid(request.reference)?;
        let grid = statistics::aggregate(
            request.statistic,
            &inputs,
            request.ignore_nodata,
            request.output_nodata,
            &reference,
            request.extent,
            feedback,
        )?;
        self.save(&grid, request.output)
    }

    fn highest_position(&self, request: &RankRequest<'_>, feedback: &Feedback) -> Result<PathBuf, ServiceError> {
        debug!(?request, "Highest position");
        let inputs = request.inputs.iter().map(|p| read_grid(p)).collect::<Result<Vec<_>, _>>()?;
        let reference = read_grid(request.reference)?;
        let grid = statistics::highest_position(
            &inputs,
            request.ignore_nodata,
            request.output_nodata,
            &reference,
            request.extent,
            feedback,
        )?;
        self.save(&grid, request.output)
    }
}

impl RasterAligner for GridEngine {
    fn align(&self, request: &AlignRequest<'_>, feedback: &Feedback) -> Result<PathBuf, ServiceError> {
        debug!(?request, "Align raster");
        let source = read_grid(request.input)?;
        let reference = self.describe(request.reference)?;
        let grid = resample::align(
            &source,
            &reference,
            request.extent,
            request.resampling,
            request.rescale_values,
            feedback,
        )?;
        self.save(&grid, request.output)
    }

    fn replace_nodata(
        &self,
        input: &Path,
        output: &Path,
        nodata: Option<f64>,
        _feedback: &Feedback,
    ) -> Result<PathBuf, ServiceError> {
        let mut grid = read_grid(input)?;
        if let (Some(old), Some(new)) = (grid.nodata, nodata) {
            let (old, new) = (old as f32, new as f32);
            grid.data.iter_mut().filter(|v| **v == old).for_each(|v| *v = new);
        }
        grid.nodata = nodata;
        self.save(&grid, output)
    }
}
