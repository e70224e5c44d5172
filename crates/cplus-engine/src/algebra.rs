//! Pixel-wise evaluation of raster-algebra expressions.

use std::collections::HashMap;

use cplus_core::expr::Expr;
use cplus_core::extent::SpatialExtent;
use cplus_core::progress::Feedback;
use cplus_core::services::ServiceError;

use crate::fill_cells;
use crate::grid::{Grid, DEFAULT_NODATA};

/// Value of `expr` at map position `(x, y)`, `None` for no-data.
///
/// Any no-data operand makes the whole result no-data, as does a division
/// by zero or a non-finite result.
pub fn eval_at(expr: &Expr, layers: &HashMap<String, Grid>, x: f64, y: f64) -> Option<f64> {
    let value = match expr {
        Expr::Layer(alias) => layers.get(alias)?.sample_nearest(x, y)?,
        Expr::Const(c) => *c,
        Expr::Add(terms) => {
            let mut sum = 0.0;
            for term in terms {
                sum += eval_at(term, layers, x, y)?;
            }
            sum
        }
        Expr::Sub(a, b) => eval_at(a, layers, x, y)? - eval_at(b, layers, x, y)?,
        Expr::Mul(a, b) => eval_at(a, layers, x, y)? * eval_at(b, layers, x, y)?,
        Expr::Div(a, b) => {
            let divisor = eval_at(b, layers, x, y)?;
            if divisor == 0.0 {
                return None;
            }
            eval_at(a, layers, x, y)? / divisor
        }
    };
    value.is_finite().then_some(value)
}

/// Evaluate `expr` over `extent` at the resolution of the first layer.
pub fn evaluate(
    expr: &Expr,
    extent: &SpatialExtent,
    layers: Vec<(String, Grid)>,
    feedback: &Feedback,
) -> Result<Grid, ServiceError> {
    let (x_res, y_res, nodata) = match layers.first() {
        Some((_, first)) => (first.x_res(), first.y_res(), first.nodata.unwrap_or(DEFAULT_NODATA)),
        None => return Err(ServiceError::NoInputs { operation: "raster calculator" }),
    };

    let layers: HashMap<String, Grid> = layers.into_iter().collect();
    if let Some(alias) = expr.aliases().into_iter().find(|a| !layers.contains_key(*a)) {
        return Err(ServiceError::UnknownLayer { alias: alias.to_string() });
    }

    let mut out = Grid::on_extent(extent, x_res, y_res, nodata);
    fill_cells(&mut out, feedback, |x, y| eval_at(expr, &layers, x, y))?;
    Ok(out)
}
