//! Grid persistence: JSON grids for reading and writing, GeoTIFF for reading.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use cplus_core::extent::{SpatialExtent, DEFAULT_CRS};
use cplus_core::services::ServiceError;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tracing::debug;

use crate::grid::Grid;

/// Extension of every raster this engine writes.
pub const GRID_EXTENSION: &str = "json";

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

fn malformed(path: &Path, reason: impl Into<String>) -> ServiceError {
    ServiceError::Malformed {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

pub fn read_grid(path: &Path) -> Result<Grid, ServiceError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let grid = match ext.as_str() {
        "json" => read_json(path)?,
        "tif" | "tiff" => read_geotiff(path)?,
        other => return Err(ServiceError::Unsupported(format!("raster format '{other}'"))),
    };
    debug!(path = %path.display(), width = grid.width, height = grid.height, "Loaded grid");
    Ok(grid)
}

fn read_json(path: &Path) -> Result<Grid, ServiceError> {
    let file = File::open(path).map_err(|source| ServiceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let grid: Grid = serde_json::from_reader(BufReader::new(file)).map_err(|e| malformed(path, e.to_string()))?;
    if grid.width == 0 || grid.height == 0 || grid.data.len() != grid.width * grid.height {
        return Err(malformed(
            path,
            format!("{} values for a {}x{} grid", grid.data.len(), grid.width, grid.height),
        ));
    }
    Ok(grid)
}

/// Write `grid` as JSON, creating parent directories as needed.
pub fn write_grid(grid: &Grid, path: &Path) -> Result<(), ServiceError> {
    let write_err = |source| ServiceError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let file = File::create(path).map_err(write_err)?;
    serde_json::to_writer(BufWriter::new(file), grid).map_err(|e| write_err(e.into()))?;
    debug!(path = %path.display(), "Wrote grid");
    Ok(())
}

// ── GeoTIFF ───────────────────────────────────────────────────────────────────

fn read_geotiff(path: &Path) -> Result<Grid, ServiceError> {
    let file = File::open(path).map_err(|source| ServiceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let tiff_err = |e: tiff::TiffError| malformed(path, e.to_string());

    let mut decoder = Decoder::new(BufReader::new(file)).map_err(tiff_err)?;
    let (width, height) = decoder.dimensions().map_err(tiff_err)?;
    let (width, height) = (width as usize, height as usize);

    let scale = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE))
        .map_err(|_| malformed(path, "missing ModelPixelScale tag"))?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT))
        .map_err(|_| malformed(path, "missing ModelTiepoint tag"))?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(malformed(path, "incomplete georeferencing tags"));
    }

    let nodata = decoder
        .get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok());
    let crs = decoder
        .get_tag_u16_vec(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY))
        .ok()
        .and_then(|keys| epsg_from_geokeys(&keys))
        .map(|code| format!("EPSG:{code}"))
        .unwrap_or_else(|| DEFAULT_CRS.to_string());

    let values = to_f32(decoder.read_image().map_err(tiff_err)?)
        .ok_or_else(|| ServiceError::Unsupported(format!("pixel type of {}", path.display())))?;
    let cells = width * height;
    if cells == 0 || values.len() < cells || values.len() % cells != 0 {
        return Err(malformed(path, format!("{} samples for {width}x{height} pixels", values.len())));
    }
    // Interleaved bands: keep band 1.
    let samples = values.len() / cells;
    let data = values.into_iter().step_by(samples).collect();

    let (x_res, y_res) = (scale[0], scale[1]);
    let xmin = tiepoint[3] - tiepoint[0] * x_res;
    let ymax = tiepoint[4] + tiepoint[1] * y_res;
    let extent = SpatialExtent::new(xmin, xmin + width as f64 * x_res, ymax - height as f64 * y_res, ymax, crs);

    Grid::from_values(width, height, extent, nodata, data).ok_or_else(|| malformed(path, "empty raster"))
}

fn to_f32(image: DecodingResult) -> Option<Vec<f32>> {
    let values = match image {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        _ => return None,
    };
    Some(values)
}

/// EPSG code from a GeoKeyDirectory, projected CRS first.
fn epsg_from_geokeys(keys: &[u16]) -> Option<u16> {
    let count = *keys.get(3)? as usize;
    let entries: Vec<&[u16]> = keys.get(4..4 + count * 4)?.chunks_exact(4).collect();
    let lookup = |id: u16| {
        entries
            .iter()
            .find(|e| e[0] == id && e[1] == 0)
            .map(|e| e[3])
            .filter(|&code| code != 0 && code != 32767)
    };
    lookup(PROJECTED_CS_TYPE_KEY).or_else(|| lookup(GEOGRAPHIC_TYPE_KEY))
}
