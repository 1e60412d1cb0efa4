//! Diagnostic plots for a finished analysis.
//!
//! Everything here is plain data; [`crate::render`] turns it into SVG.

use crate::cluster::Hclus;
use crate::distance::FeatureColumn;
use crate::error::{HclusError, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Default number of clusters coloured in the pairwise plot.
pub const DEFAULT_PAIRWISE_CLUSTERS: usize = 3;

pub const DENDRO_ALONE_CAPTION: &str =
    "The dendrogram must be viewed alone; other plots were skipped.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotKind {
    Scree,
    Change,
    Dendro,
    #[serde(rename = "scatter")]
    Pairwise,
}

impl fmt::Display for PlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlotKind::Scree => "scree",
            PlotKind::Change => "change",
            PlotKind::Dendro => "dendro",
            PlotKind::Pairwise => "scatter",
        };
        write!(f, "{name}")
    }
}

impl FromStr for PlotKind {
    type Err = HclusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scree" => Ok(PlotKind::Scree),
            "change" => Ok(PlotKind::Change),
            "dendro" | "dendrogram" => Ok(PlotKind::Dendro),
            "scatter" | "pairwise" => Ok(PlotKind::Pairwise),
            _ => Err(HclusError::UnknownPlot(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreePoint {
    /// Number of clusters left.
    pub nr_clus: usize,
    /// Normalized merge height.
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangePoint {
    /// `"{from}-{to}"` cluster counts.
    pub label: String,
    /// Relative increase in height, `1.0` meaning 100%.
    pub change: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DendrogramPlot {
    /// Tree segments on normalized heights, clipped to `y_range`.
    pub segments: Vec<((f64, f64), (f64, f64))>,
    /// Leaf labels left to right; `None` when hidden.
    pub leaf_labels: Option<Vec<String>>,
    pub n_leaves: usize,
    pub y_range: (f64, f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairwisePlot {
    pub vars: Vec<String>,
    /// One vector per variable, aligned with `clusters`.
    pub values: Vec<Vec<f64>>,
    /// Cluster id in `1..=k` per case.
    pub clusters: Vec<usize>,
    pub k: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Plot {
    Scree(Vec<ScreePoint>),
    Change(Vec<ChangePoint>),
    Dendrogram(DendrogramPlot),
    Pairwise(PairwisePlot),
}

impl Plot {
    pub fn title(&self) -> &'static str {
        match self {
            Plot::Scree(_) => "Scree plot",
            Plot::Change(_) => "Change in within-cluster heterogeneity",
            Plot::Dendrogram(_) => "Dendrogram",
            Plot::Pairwise(_) => "Pairwise scatter plots",
        }
    }
}

/// Plots requested together.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlotSet {
    pub plots: Vec<Plot>,
    pub caption: Option<String>,
    pub warnings: Vec<String>,
}

impl PlotSet {
    pub fn is_empty(&self) -> bool {
        self.plots.is_empty()
    }

    /// A dendrogram is always drawn on its own canvas.
    pub fn is_dendrogram(&self) -> bool {
        matches!(self.plots.as_slice(), [Plot::Dendrogram(_)])
    }
}

/// Heights divided by their maximum. An all-zero sequence stays zero.
pub fn normalized_heights(heights: &[f64]) -> Vec<f64> {
    let max = heights.iter().copied().fold(0.0, f64::max);
    if max > 0.0 {
        heights.iter().map(|h| h / max).collect()
    } else {
        vec![0.0; heights.len()]
    }
}

fn retained(normalized: &[f64], cutoff: f64) -> Vec<f64> {
    normalized.iter().copied().filter(|h| *h > cutoff).collect()
}

/// Scree data: normalized heights above `cutoff` against the number of
/// clusters, counting down to one.
pub fn scree_points(heights: &[f64], cutoff: f64) -> Vec<ScreePoint> {
    let kept = retained(&normalized_heights(heights), cutoff);
    let m = kept.len();
    kept.into_iter()
        .enumerate()
        .map(|(i, height)| ScreePoint {
            nr_clus: m - i,
            height,
        })
        .collect()
}

/// Change data: relative jump between consecutive retained heights,
/// labelled by the cluster counts before and after the merge.
pub fn change_points(heights: &[f64], cutoff: f64) -> Vec<ChangePoint> {
    let kept = retained(&normalized_heights(heights), cutoff);
    let m = kept.len();
    kept.windows(2)
        .enumerate()
        .filter_map(|(i, w)| {
            let change = (w[1] - w[0]) / w[0];
            change.is_finite().then(|| ChangePoint {
                label: format!("{}-{}", m - i, m - i - 1),
                change,
            })
        })
        .collect()
}

fn dendrogram_plot(hc: &Hclus, cutoff: f64) -> Result<DendrogramPlot> {
    let layout = hc.dendrogram().layout()?;
    let max = hc.heights().iter().copied().fold(0.0, f64::max);
    let scale = |y: f64| if max > 0.0 { y / max } else { 0.0 };
    let (lo, hi) = if cutoff > 0.0 { (cutoff, 1.0) } else { (0.0, 1.0) };

    let segments = layout
        .segments
        .iter()
        .filter_map(|&((x0, y0), (x1, y1))| {
            let (y0, y1) = (scale(y0), scale(y1));
            if y0.max(y1) < lo {
                None
            } else {
                Some(((x0, y0.max(lo)), (x1, y1.max(lo))))
            }
        })
        .collect();

    let leaf_labels = (cutoff == 0.0).then(|| {
        layout
            .order
            .iter()
            .map(|&i| hc.row_labels()[i].clone())
            .collect()
    });

    Ok(DendrogramPlot {
        segments,
        leaf_labels,
        n_leaves: hc.nobs(),
        y_range: (lo, hi),
    })
}

/// The pairwise plot, or the reason it cannot be drawn.
fn pairwise_plot(hc: &Hclus, k: usize) -> std::result::Result<PairwisePlot, String> {
    let features = hc.features();
    let (vars, values): (Vec<String>, Vec<Vec<f64>>) = features
        .names
        .iter()
        .zip(&features.columns)
        .filter_map(|(name, column)| match column {
            FeatureColumn::Numeric(v) => {
                Some((name.clone(), v.iter().map(|x| x.unwrap_or(f64::NAN)).collect()))
            }
            FeatureColumn::Categorical(_) => None,
        })
        .unzip();
    if vars.len() < 2 {
        return Err("Pairwise plots require at least two numeric variables".to_string());
    }
    let clusters = hc
        .cut(k)
        .map_err(|e| format!("Pairwise plot skipped: {e}"))?;
    Ok(PairwisePlot {
        vars,
        values,
        clusters,
        k,
    })
}

/// Build the requested plots.
///
/// `cutoff` in `[0, 1)` hides merges whose normalized height does not exceed
/// it; `nr_clus` is the number of clusters coloured in the pairwise plot.
pub fn plot(hc: &Hclus, kinds: &[PlotKind], cutoff: f64, nr_clus: usize) -> Result<PlotSet> {
    if !(0.0..1.0).contains(&cutoff) {
        return Err(HclusError::InvalidParameter {
            name: "cutoff",
            message: format!("must be in [0, 1), got {cutoff}"),
        });
    }

    let mut set = PlotSet::default();
    let mut seen: Vec<PlotKind> = Vec::new();
    for kind in kinds {
        if !seen.contains(kind) {
            seen.push(*kind);
        }
    }

    if seen.contains(&PlotKind::Dendro) {
        set.plots.push(Plot::Dendrogram(dendrogram_plot(hc, cutoff)?));
        if seen.len() > 1 {
            set.caption = Some(DENDRO_ALONE_CAPTION.to_string());
        }
        return Ok(set);
    }

    let heights = hc.heights();
    for kind in seen {
        match kind {
            PlotKind::Scree => set.plots.push(Plot::Scree(scree_points(&heights, cutoff))),
            PlotKind::Change => set.plots.push(Plot::Change(change_points(&heights, cutoff))),
            PlotKind::Pairwise => match pairwise_plot(hc, nr_clus) {
                Ok(p) => set.plots.push(Plot::Pairwise(p)),
                Err(msg) => {
                    warn!("{msg}");
                    set.warnings.push(msg);
                }
            },
            PlotKind::Dendro => {}
        }
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_change_series_drops_leading_value() {
        let change = change_points(&[0.2, 0.5, 1.0], 0.0);
        assert_eq!(change.len(), 2);
        assert_eq!(change[0].label, "3-2");
        assert_abs_diff_eq!(change[0].change, 1.5, epsilon = 1e-12);
        assert_eq!(change[1].label, "2-1");
        assert_abs_diff_eq!(change[1].change, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_scree_normalizes_and_cuts() {
        let scree = scree_points(&[1.0, 2.0, 5.0, 10.0], 0.15);
        let heights: Vec<f64> = scree.iter().map(|p| p.height).collect();
        assert_eq!(heights, [0.2, 0.5, 1.0]);
        let counts: Vec<usize> = scree.iter().map(|p| p.nr_clus).collect();
        assert_eq!(counts, [3, 2, 1]);
    }

    #[test]
    fn test_zero_heights_do_not_divide() {
        assert_eq!(normalized_heights(&[0.0, 0.0]), [0.0, 0.0]);
        // zero heights never pass the cutoff, so no step divides by zero
        assert!(change_points(&[0.0, 0.0, 1.0], 0.0).is_empty());
        assert!(scree_points(&[], 0.0).is_empty());
    }

    #[test]
    fn test_plot_kind_names() {
        assert_eq!("scatter".parse::<PlotKind>().unwrap(), PlotKind::Pairwise);
        assert_eq!("dendro".parse::<PlotKind>().unwrap(), PlotKind::Dendro);
        assert!("pie".parse::<PlotKind>().is_err());
        assert_eq!(serde_json::to_value(PlotKind::Pairwise).unwrap(), "scatter");
    }
}
