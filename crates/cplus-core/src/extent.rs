//! Area-of-interest extents and their alignment to a reference pixel grid.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::services::RasterInfo;

/// CRS assumed when no reference layer can supply one.
pub const DEFAULT_CRS: &str = "EPSG:4326";

fn default_crs() -> String {
    DEFAULT_CRS.to_string()
}

/// Bounding box plus coordinate reference identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialExtent {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
    #[serde(default = "default_crs")]
    pub crs: String,
}

impl SpatialExtent {
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64, crs: impl Into<String>) -> Self {
        Self { xmin, xmax, ymin, ymax, crs: crs.into() }
    }

    /// Build from a `[xmin, xmax, ymin, ymax]` bounding box.
    pub fn from_bbox(bbox: [f64; 4], crs: impl Into<String>) -> Self {
        Self::new(bbox[0], bbox[1], bbox[2], bbox[3], crs)
    }

    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = crs.into();
        self
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn contains(&self, other: &SpatialExtent) -> bool {
        self.xmin <= other.xmin
            && self.xmax >= other.xmax
            && self.ymin <= other.ymin
            && self.ymax >= other.ymax
    }

    pub fn to_wkt_polygon(&self) -> String {
        format!(
            "POLYGON(({xmin} {ymin}, {xmax} {ymin}, {xmax} {ymax}, {xmin} {ymax}, {xmin} {ymin}))",
            xmin = self.xmin,
            xmax = self.xmax,
            ymin = self.ymin,
            ymax = self.ymax,
        )
    }
}

/// Renders as `xmin,xmax,ymin,ymax [crs]`, the form raster services accept.
impl fmt::Display for SpatialExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{} [{}]", self.xmin, self.xmax, self.ymin, self.ymax, self.crs)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum AlignmentError {
    #[error("reference raster has an unusable pixel size ({x_res}, {y_res})")]
    InvalidResolution { x_res: f64, y_res: f64 },
    #[error("reference raster extent is not finite")]
    NonFiniteExtent,
}

/// Snap `target` outward to the pixel boundaries of `reference`.
///
/// ```text
/// left   = ref.xmin + x_res * floor((target.xmin - ref.xmin) / x_res)
/// right  = ref.xmin + x_res * ceil ((target.xmax - ref.xmin) / x_res)
/// bottom = ref.ymin + y_res * floor((target.ymin - ref.ymin) / y_res)
/// top    = ref.ymax - y_res * floor((ref.ymax - target.ymax) / y_res)
/// ```
pub fn snap_to_grid(reference: &RasterInfo, target: &SpatialExtent) -> Result<SpatialExtent, AlignmentError> {
    let (x_res, y_res) = (reference.x_res, reference.y_res);
    if !(x_res.is_finite() && y_res.is_finite()) || x_res <= 0.0 || y_res <= 0.0 {
        return Err(AlignmentError::InvalidResolution { x_res, y_res });
    }

    let r = &reference.extent;
    if ![r.xmin, r.xmax, r.ymin, r.ymax].iter().all(|v| v.is_finite()) {
        return Err(AlignmentError::NonFiniteExtent);
    }

    let left = r.xmin + x_res * ((target.xmin - r.xmin) / x_res).floor();
    let right = r.xmin + x_res * ((target.xmax - r.xmin) / x_res).ceil();
    let bottom = r.ymin + y_res * ((target.ymin - r.ymin) / y_res).floor();
    let top = r.ymax - y_res * ((r.ymax - target.ymax) / y_res).floor();

    Ok(SpatialExtent::new(left, right, bottom, top, target.crs.clone()))
}

/// Like [`snap_to_grid`], but never fails: any problem is logged and the
/// original extent is returned unchanged.
pub fn align_extent(reference: &RasterInfo, target: &SpatialExtent) -> SpatialExtent {
    match snap_to_grid(reference, target) {
        Ok(aligned) => aligned,
        Err(err) => {
            warn!("Problem snapping area of interest extent, using the original extent, {err}");
            target.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn reference(xmin: f64, ymax: f64, res: f64, cols: usize, rows: usize) -> RasterInfo {
        RasterInfo {
            extent: SpatialExtent::new(
                xmin,
                xmin + res * cols as f64,
                ymax - res * rows as f64,
                ymax,
                "EPSG:32735",
            ),
            width: cols,
            height: rows,
            x_res: res,
            y_res: res,
            nodata: None,
        }
    }

    fn is_multiple(offset: f64, res: f64) -> bool {
        let steps = offset / res;
        (steps - steps.round()).abs() < 1e-9
    }

    #[test]
    fn aligned_extent_covers_target_and_sits_on_grid() {
        let reference = reference(100.0, 500.0, 30.0, 20, 20);
        let target = SpatialExtent::new(137.5, 311.2, 212.0, 458.9, "EPSG:32735");

        let aligned = snap_to_grid(&reference, &target).unwrap();

        assert!(aligned.contains(&target), "aligned {aligned} must cover {target}");
        assert!(is_multiple(aligned.xmin - 100.0, 30.0));
        assert!(is_multiple(aligned.xmax - 100.0, 30.0));
        assert!(is_multiple(aligned.ymin - reference.extent.ymin, 30.0));
        assert!(is_multiple(500.0 - aligned.ymax, 30.0));
    }

    #[test]
    fn aligned_bounds_match_formula() {
        let reference = reference(0.0, 100.0, 10.0, 10, 10);
        let target = SpatialExtent::new(12.0, 47.0, 3.0, 88.0, "EPSG:4326");

        let aligned = snap_to_grid(&reference, &target).unwrap();

        assert_relative_eq!(aligned.xmin, 10.0);
        assert_relative_eq!(aligned.xmax, 50.0);
        assert_relative_eq!(aligned.ymin, 0.0);
        assert_relative_eq!(aligned.ymax, 90.0);
    }

    #[test]
    fn already_aligned_extent_is_unchanged() {
        let reference = reference(0.0, 100.0, 10.0, 10, 10);
        let target = SpatialExtent::new(20.0, 60.0, 10.0, 80.0, "EPSG:4326");
        assert_eq!(snap_to_grid(&reference, &target).unwrap(), target);
    }

    #[test]
    fn degenerate_reference_falls_back_to_original_extent() {
        let mut reference = reference(0.0, 100.0, 10.0, 10, 10);
        reference.x_res = 0.0;
        let target = SpatialExtent::new(12.0, 47.0, 3.0, 88.0, "EPSG:4326");

        assert!(matches!(
            snap_to_grid(&reference, &target),
            Err(AlignmentError::InvalidResolution { .. })
        ));
        assert_eq!(align_extent(&reference, &target), target);
    }

    #[test]
    fn display_uses_service_extent_format() {
        let extent = SpatialExtent::new(1.0, 2.5, -3.0, 4.0, "EPSG:4326");
        assert_eq!(extent.to_string(), "1,2.5,-3,4 [EPSG:4326]");
        assert!(extent.to_wkt_polygon().starts_with("POLYGON((1 -3, 2.5 -3"));
    }
}
