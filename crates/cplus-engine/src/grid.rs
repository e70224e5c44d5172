use cplus_core::extent::SpatialExtent;
use cplus_core::services::{BandStatistics, RasterInfo};
use serde::{Deserialize, Serialize};

/// No-data value used when a source raster declares none.
pub const DEFAULT_NODATA: f64 = -9999.0;

/// A single-band, north-up raster stored as f32, row-major.
/// Row 0 is the northern edge; coordinate math uses f64.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    /// Row-major cell values.
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub extent: SpatialExtent,
    #[serde(default)]
    pub nodata: Option<f64>,
}

impl Grid {
    /// Create a new Grid filled with the given value.
    pub fn new(width: usize, height: usize, extent: SpatialExtent, nodata: Option<f64>, fill: f32) -> Self {
        Self {
            data: vec![fill; width * height],
            width,
            height,
            extent,
            nodata,
        }
    }

    /// Build a grid from row-major values; `None` if the length does not match.
    pub fn from_values(
        width: usize,
        height: usize,
        extent: SpatialExtent,
        nodata: Option<f64>,
        data: Vec<f32>,
    ) -> Option<Self> {
        (data.len() == width * height && width > 0 && height > 0).then_some(Self {
            data,
            width,
            height,
            extent,
            nodata,
        })
    }

    /// Empty grid covering `extent` at the given resolution.
    ///
    /// The cell count is rounded to the nearest integer and the extent is
    /// re-derived from it, anchored at the top-left corner.
    pub fn on_extent(extent: &SpatialExtent, x_res: f64, y_res: f64, nodata: f64) -> Self {
        let width = ((extent.width() / x_res).round() as usize).max(1);
        let height = ((extent.height() / y_res).round() as usize).max(1);
        let snapped = SpatialExtent::new(
            extent.xmin,
            extent.xmin + width as f64 * x_res,
            extent.ymax - height as f64 * y_res,
            extent.ymax,
            extent.crs.clone(),
        );
        Self::new(width, height, snapped, Some(nodata), nodata as f32)
    }

    pub fn x_res(&self) -> f64 {
        self.extent.width() / self.width as f64
    }

    pub fn y_res(&self) -> f64 {
        self.extent.height() / self.height as f64
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f32) {
        self.data[row * self.width + col] = val;
    }

    #[inline]
    pub fn is_nodata(&self, value: f32) -> bool {
        value.is_nan() || self.nodata.is_some_and(|nd| value == nd as f32)
    }

    /// Cell value, or `None` for no-data.
    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        let v = self.get(row, col);
        (!self.is_nodata(v)).then_some(v as f64)
    }

    /// Map coordinates of the centre of a cell.
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.extent.xmin + (col as f64 + 0.5) * self.x_res(),
            self.extent.ymax - (row as f64 + 0.5) * self.y_res(),
        )
    }

    /// `(row, col)` of the cell containing `(x, y)`.
    pub fn cell_at(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let e = &self.extent;
        if !(x >= e.xmin && x < e.xmax && y > e.ymin && y <= e.ymax) {
            return None;
        }
        let col = (((x - e.xmin) / self.x_res()).floor() as usize).min(self.width - 1);
        let row = (((e.ymax - y) / self.y_res()).floor() as usize).min(self.height - 1);
        Some((row, col))
    }

    pub fn sample_nearest(&self, x: f64, y: f64) -> Option<f64> {
        let (row, col) = self.cell_at(x, y)?;
        self.value(row, col)
    }

    /// Bilinear interpolation between the four surrounding cell centres.
    /// Falls back to the nearest cell when any neighbour is no-data.
    pub fn sample_bilinear(&self, x: f64, y: f64) -> Option<f64> {
        self.cell_at(x, y)?;

        let fx = ((x - self.extent.xmin) / self.x_res() - 0.5).clamp(0.0, (self.width - 1) as f64);
        let fy = ((self.extent.ymax - y) / self.y_res() - 0.5).clamp(0.0, (self.height - 1) as f64);

        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);

        let tx = fx - x0 as f64;
        let ty = fy - y0 as f64;

        let corners = [self.value(y0, x0), self.value(y0, x1), self.value(y1, x0), self.value(y1, x1)];
        let [Some(v00), Some(v10), Some(v01), Some(v11)] = corners else {
            return self.sample_nearest(x, y);
        };

        Some(
            v00 * (1.0 - tx) * (1.0 - ty)
                + v10 * tx * (1.0 - ty)
                + v01 * (1.0 - tx) * ty
                + v11 * tx * ty,
        )
    }

    /// Valid values of every cell whose centre lies inside the window.
    pub fn values_within(&self, xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Vec<f64> {
        let e = &self.extent;
        let (x_res, y_res) = (self.x_res(), self.y_res());

        let col_start = ((xmin - e.xmin) / x_res - 0.5).ceil().max(0.0) as usize;
        let col_end = ((xmax - e.xmin) / x_res - 0.5).floor();
        let row_start = ((e.ymax - ymax) / y_res - 0.5).ceil().max(0.0) as usize;
        let row_end = ((e.ymax - ymin) / y_res - 0.5).floor();
        if col_end < 0.0 || row_end < 0.0 {
            return Vec::new();
        }
        let col_end = (col_end as usize).min(self.width - 1);
        let row_end = (row_end as usize).min(self.height - 1);

        let mut out = Vec::new();
        for row in row_start..=row_end {
            for col in col_start..=col_end {
                if let Some(v) = self.value(row, col) {
                    out.push(v);
                }
            }
        }
        out
    }

    /// Band statistics over valid cells, `None` when every cell is no-data.
    pub fn statistics(&self) -> Option<BandStatistics> {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut count = 0usize;
        for &v in self.data.iter().filter(|&&v| !self.is_nodata(v)) {
            let v = v as f64;
            min = min.min(v);
            max = max.max(v);
            sum += v;
            count += 1;
        }
        (count > 0).then(|| BandStatistics {
            min,
            max,
            mean: sum / count as f64,
            valid_count: count,
        })
    }

    pub fn info(&self) -> RasterInfo {
        RasterInfo {
            extent: self.extent.clone(),
            width: self.width,
            height: self.height,
            x_res: self.x_res(),
            y_res: self.y_res(),
            nodata: self.nodata,
        }
    }
}
