//! Raster-algebra expressions.
//!
//! Stages build an [`Expr`] tree instead of formatting strings by hand; the
//! backend evaluates the tree and the `Display` impl renders the familiar
//! calculator syntax (`"layer@1"` references band 1 of `layer`) for logs.

use std::fmt;
use std::path::{Path, PathBuf};

/// File stem of `path`, the base of its expression alias.
pub fn layer_alias(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Aliases for an ordered list of input layers, one per entry.
///
/// A repeated path reuses its alias. A different path whose stem is already
/// taken gets `_2`, `_3`, ... appended, so `/soc/carbon.tif` and
/// `/agb/carbon.tif` become `carbon` and `carbon_2`.
pub fn layer_aliases(layers: &[PathBuf]) -> Vec<String> {
    let mut set = LayerSet::new();
    layers.iter().map(|path| set.alias_for(path)).collect()
}

/// Input layers of one expression, each bound to a unique alias.
#[derive(Debug, Clone, Default)]
pub struct LayerSet {
    paths: Vec<PathBuf>,
    aliases: Vec<String>,
}

impl LayerSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn alias_for(&mut self, path: &Path) -> String {
        if let Some(index) = self.paths.iter().position(|p| p == path) {
            return self.aliases[index].clone();
        }
        let stem = layer_alias(path);
        let mut alias = stem.clone();
        let mut n = 2;
        while self.aliases.contains(&alias) {
            alias = format!("{stem}_{n}");
            n += 1;
        }
        self.paths.push(path.to_path_buf());
        self.aliases.push(alias.clone());
        alias
    }

    /// Add `path` as an input (once) and reference it.
    pub fn bind(&mut self, path: &Path) -> Expr {
        Expr::Layer(self.alias_for(path))
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn into_paths(self) -> Vec<PathBuf> {
        self.paths
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Band 1 of the input layer with this alias.
    Layer(String),
    Const(f64),
    Add(Vec<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn layer(alias: impl Into<String>) -> Self {
        Expr::Layer(alias.into())
    }

    pub fn constant(value: f64) -> Self {
        Expr::Const(value)
    }

    /// Sum of `terms`; a single term is returned as-is.
    pub fn sum(mut terms: Vec<Expr>) -> Self {
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Add(terms)
        }
    }

    pub fn scaled(coefficient: f64, expr: Expr) -> Self {
        Expr::Mul(Box::new(Expr::Const(coefficient)), Box::new(expr))
    }

    pub fn minus(self, rhs: Expr) -> Self {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }

    pub fn divided_by(self, rhs: Expr) -> Self {
        Expr::Div(Box::new(self), Box::new(rhs))
    }

    /// Aliases referenced by this expression, in first-use order.
    pub fn aliases(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_aliases(&mut out);
        out
    }

    fn collect_aliases<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Layer(alias) => {
                if !out.contains(&alias.as_str()) {
                    out.push(alias.as_str());
                }
            }
            Expr::Const(_) => {}
            Expr::Add(terms) => terms.iter().for_each(|t| t.collect_aliases(out)),
            Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) => {
                a.collect_aliases(out);
                b.collect_aliases(out);
            }
        }
    }

    fn is_compound(&self) -> bool {
        matches!(self, Expr::Add(_) | Expr::Sub(..) | Expr::Div(..))
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_compound() {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Layer(alias) => write!(f, "\"{alias}@1\""),
            Expr::Const(value) => write!(f, "{value}"),
            Expr::Add(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" + ")?;
                    }
                    write!(f, "{term}")?;
                }
                Ok(())
            }
            Expr::Sub(a, b) => {
                write!(f, "{a} - ")?;
                b.fmt_operand(f)
            }
            Expr::Mul(a, b) => {
                a.fmt_operand(f)?;
                f.write_str(" * ")?;
                b.fmt_operand(f)
            }
            Expr::Div(a, b) => {
                a.fmt_operand(f)?;
                f.write_str(" / ")?;
                b.fmt_operand(f)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn alias_is_file_stem() {
        assert_eq!(layer_alias(&PathBuf::from("/data/pathways/grassland_ab12.tif")), "grassland_ab12");
    }

    #[test]
    fn layers_sharing_a_stem_get_distinct_aliases() {
        let mut set = LayerSet::new();
        let soc = set.bind(Path::new("/soc/carbon.tif"));
        let agb = set.bind(Path::new("/agb/carbon.tif"));
        let again = set.bind(Path::new("/soc/carbon.tif"));

        assert_eq!(soc, Expr::layer("carbon"));
        assert_eq!(agb, Expr::layer("carbon_2"));
        assert_eq!(again, soc);
        assert_eq!(set.paths().len(), 2);
        assert_eq!(
            layer_aliases(set.paths()),
            vec!["carbon".to_string(), "carbon_2".to_string()],
            "the engine derives the same aliases from the input list"
        );
    }

    #[test]
    fn suffixed_alias_skips_stems_already_in_use() {
        let layers = [
            PathBuf::from("/a/carbon_2.tif"),
            PathBuf::from("/a/carbon.tif"),
            PathBuf::from("/b/carbon.tif"),
        ];
        assert_eq!(layer_aliases(&layers), vec!["carbon_2", "carbon", "carbon_3"]);
    }

    #[test]
    fn weighted_sum_renders_calculator_syntax() {
        let carbon = Expr::sum(vec![Expr::layer("c1"), Expr::layer("c2")]).divided_by(Expr::constant(2.0));
        let expr = Expr::sum(vec![
            Expr::scaled(0.5, Expr::layer("base")),
            Expr::scaled(2.0, carbon),
        ]);
        assert_eq!(expr.to_string(), r#"0.5 * "base@1" + 2 * (("c1@1" + "c2@1") / 2)"#);
    }

    #[test]
    fn min_max_scaling_renders_with_parenthesised_range() {
        let expr = Expr::layer("model")
            .minus(Expr::constant(2.0))
            .divided_by(Expr::constant(10.0).minus(Expr::constant(2.0)));
        assert_eq!(expr.to_string(), r#"("model@1" - 2) / (10 - 2)"#);
    }

    #[test]
    fn aliases_are_deduplicated_in_first_use_order() {
        let expr = Expr::sum(vec![
            Expr::layer("b"),
            Expr::scaled(3.0, Expr::layer("a")),
            Expr::layer("b"),
        ]);
        assert_eq!(expr.aliases(), vec!["b", "a"]);
    }

    #[test]
    fn single_term_sum_collapses() {
        assert_eq!(Expr::sum(vec![Expr::layer("x")]), Expr::layer("x"));
    }
}
