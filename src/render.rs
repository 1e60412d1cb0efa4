//! SVG rendering of a [`PlotSet`].
//!
//! A dendrogram gets the whole canvas; other plots are laid out in a grid
//! of two columns.

use crate::error::{HclusError, Result};
use crate::plot::{ChangePoint, DendrogramPlot, PairwisePlot, Plot, PlotSet, ScreePoint};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::error::Error;
use std::path::Path;

type DrawResult = std::result::Result<(), Box<dyn Error>>;

const CELL: (u32, u32) = (600, 450);
const DENDRO: (u32, u32) = (1000, 600);

/// Canvas size for `set`.
pub fn canvas_size(set: &PlotSet) -> (u32, u32) {
    if set.is_dendrogram() {
        return DENDRO;
    }
    let (cols, rows) = grid(set.plots.len());
    (CELL.0 * cols as u32, CELL.1 * rows.max(1) as u32)
}

/// `(columns, rows)` for `n` plots.
fn grid(n: usize) -> (usize, usize) {
    let cols = if n > 1 { 2 } else { 1 };
    (cols, n.div_ceil(cols))
}

/// Render `set` to an SVG document.
pub fn render_svg(set: &PlotSet) -> Result<String> {
    let mut buf = String::new();
    {
        let root = SVGBackend::with_string(&mut buf, canvas_size(set)).into_drawing_area();
        draw_set(&root, set).map_err(|e| HclusError::Render(e.to_string()))?;
        root.present()
            .map_err(|e| HclusError::Render(e.to_string()))?;
    }
    Ok(buf)
}

/// Render `set` and write it to `path`.
pub fn save_svg<P: AsRef<Path>>(set: &PlotSet, path: P) -> Result<()> {
    let svg = render_svg(set)?;
    std::fs::write(path.as_ref(), svg)
        .map_err(|e| HclusError::Io(format!("Failed to write {:?}: {}", path.as_ref(), e)))
}

fn draw_set(root: &DrawingArea<SVGBackend<'_>, Shift>, set: &PlotSet) -> DrawResult {
    root.fill(&WHITE)?;
    let area = match &set.caption {
        Some(caption) => root.titled(caption, ("sans-serif", 16))?,
        None => root.clone(),
    };
    if set.plots.is_empty() {
        return Ok(());
    }

    let (cols, rows) = grid(set.plots.len());
    let cells = area.split_evenly((rows, cols));
    for (plot, cell) in set.plots.iter().zip(cells.iter()) {
        match plot {
            Plot::Scree(points) => draw_scree(cell, plot.title(), points)?,
            Plot::Change(points) => draw_change(cell, plot.title(), points)?,
            Plot::Dendrogram(d) => draw_dendrogram(cell, plot.title(), d)?,
            Plot::Pairwise(p) => draw_pairwise(cell, plot.title(), p)?,
        }
    }
    Ok(())
}

fn draw_scree(area: &DrawingArea<SVGBackend<'_>, Shift>, title: &str, points: &[ScreePoint]) -> DrawResult {
    let m = points.len();
    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(-0.5f64..(m as f64 - 0.5).max(0.5), 0f64..1.05f64)?;

    let label = |x: &f64| {
        let i = x.round();
        if (x - i).abs() < 1e-6 && i >= 0.0 && (i as usize) < m {
            points[i as usize].nr_clus.to_string()
        } else {
            String::new()
        }
    };
    chart
        .configure_mesh()
        .x_labels(m.max(1))
        .x_label_formatter(&label)
        .x_desc("# clusters")
        .y_desc("Within-cluster heterogeneity")
        .draw()?;

    let series: Vec<(f64, f64)> = points.iter().enumerate().map(|(i, p)| (i as f64, p.height)).collect();
    chart.draw_series(LineSeries::new(series.clone(), &BLUE))?;
    chart.draw_series(series.into_iter().map(|pt| Circle::new(pt, 3, BLUE.filled())))?;
    Ok(())
}

fn draw_change(area: &DrawingArea<SVGBackend<'_>, Shift>, title: &str, points: &[ChangePoint]) -> DrawResult {
    let m = points.len();
    let top = points.iter().map(|p| p.change).fold(0.0, f64::max).max(0.1) * 1.1;
    let bottom = points.iter().map(|p| p.change).fold(0.0, f64::min) * 1.1;
    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(-0.5f64..(m as f64 - 0.5).max(0.5), bottom..top)?;

    let label = |x: &f64| {
        let i = x.round();
        if (x - i).abs() < 1e-6 && i >= 0.0 && (i as usize) < m {
            points[i as usize].label.clone()
        } else {
            String::new()
        }
    };
    let percent = |y: &f64| format!("{:.0}%", y * 100.0);
    chart
        .configure_mesh()
        .x_labels(m.max(1))
        .x_label_formatter(&label)
        .y_label_formatter(&percent)
        .x_desc("# clusters")
        .y_desc("Change in within-cluster heterogeneity")
        .draw()?;

    chart.draw_series(points.iter().enumerate().map(|(i, p)| {
        let x = i as f64;
        Rectangle::new([(x - 0.4, 0.0), (x + 0.4, p.change)], BLUE.mix(0.5).filled())
    }))?;
    Ok(())
}

fn draw_dendrogram(area: &DrawingArea<SVGBackend<'_>, Shift>, title: &str, d: &DendrogramPlot) -> DrawResult {
    let n = d.n_leaves.max(1) as f64;
    let (lo, hi) = d.y_range;
    let label_space = if d.leaf_labels.is_some() { 60 } else { 10 };
    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(label_space)
        .y_label_area_size(50)
        .build_cartesian_2d(-0.5f64..n - 0.5, lo..hi)?;

    let leaf = |x: &f64| match &d.leaf_labels {
        Some(labels) => {
            let i = x.round();
            if (x - i).abs() < 1e-6 && i >= 0.0 && (i as usize) < labels.len() {
                labels[i as usize].clone()
            } else {
                String::new()
            }
        }
        None => String::new(),
    };
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(d.leaf_labels.as_ref().map_or(0, Vec::len))
        .x_label_formatter(&leaf)
        .y_desc("Heterogeneity")
        .draw()?;

    chart.draw_series(
        d.segments
            .iter()
            .map(|&(a, b)| PathElement::new(vec![a, b], BLACK.stroke_width(1))),
    )?;
    Ok(())
}

fn draw_pairwise(area: &DrawingArea<SVGBackend<'_>, Shift>, title: &str, p: &PairwisePlot) -> DrawResult {
    let area = area.titled(title, ("sans-serif", 20))?;
    let v = p.vars.len();
    let cells = area.split_evenly((v, v));
    let bounds: Vec<(f64, f64)> = p.values.iter().map(|col| finite_range(col)).collect();

    for (idx, cell) in cells.iter().enumerate() {
        let (row, col) = (idx / v, idx % v);
        let (ylo, yhi) = bounds[row];
        let (xlo, xhi) = bounds[col];
        if row == col {
            cell.draw(&Text::new(
                p.vars[row].clone(),
                (5, 5),
                ("sans-serif", 14).into_font(),
            ))?;
        }
        let mut chart = ChartBuilder::on(cell)
            .margin(4)
            .x_label_area_size(if row + 1 == v { 20 } else { 0 })
            .y_label_area_size(if col == 0 { 30 } else { 0 })
            .build_cartesian_2d(xlo..xhi, ylo..yhi)?;
        chart.configure_mesh().x_labels(3).y_labels(3).draw()?;

        let ys = &p.values[row];
        let xs = &p.values[col];
        chart.draw_series(
            xs.iter()
                .zip(ys.iter())
                .zip(p.clusters.iter())
                .filter(|((x, y), _)| x.is_finite() && y.is_finite())
                .map(|((&x, &y), &c)| {
                    let y = if row == col { ylo + (yhi - ylo) * (c as f64 / (p.k + 1) as f64) } else { y };
                    Circle::new((x, y), 2, Palette99::pick(c - 1).filled())
                }),
        )?;
    }
    Ok(())
}

fn finite_range(values: &[f64]) -> (f64, f64) {
    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        (0.0, 1.0)
    } else if hi - lo <= 0.0 {
        (lo - 0.5, hi + 0.5)
    } else {
        let pad = (hi - lo) * 0.05;
        (lo - pad, hi + pad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_has_two_columns() {
        assert_eq!(grid(1), (1, 1));
        assert_eq!(grid(2), (2, 1));
        assert_eq!(grid(3), (2, 2));
    }

    #[test]
    fn test_finite_range_pads() {
        assert_eq!(finite_range(&[f64::NAN]), (0.0, 1.0));
        assert_eq!(finite_range(&[2.0, 2.0]), (1.5, 2.5));
        let (lo, hi) = finite_range(&[0.0, 10.0]);
        assert!(lo < 0.0 && hi > 10.0);
    }

    #[test]
    fn test_canvas_size() {
        let set = PlotSet {
            plots: vec![Plot::Scree(vec![]), Plot::Change(vec![]), Plot::Scree(vec![])],
            ..PlotSet::default()
        };
        assert_eq!(canvas_size(&set), (1200, 900));
    }
}
