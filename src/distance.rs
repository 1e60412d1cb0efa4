//! Pairwise dissimilarities between cases.
//!
//! Every distance here produces a condensed upper-triangular matrix in the
//! row-major layout `kodama` expects: for `n` cases the entry for `i < j`
//! sits at `n*i - i*(i+1)/2 + j - i - 1`.

use crate::dataset::{Column, ColumnData};
use crate::error::{HclusError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Supported dissimilarity measures.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Distance {
    /// Euclidean distance squared. Not a metric but the usual input for Ward.
    #[default]
    SqEuclidean,
    Euclidean,
    Manhattan,
    /// Chebyshev distance.
    Maximum,
    Canberra,
    /// Share of positions that are non-zero in exactly one row among those
    /// non-zero in at least one.
    Binary,
    Minkowski(f64),
    /// Mixed-type dissimilarity, the only choice once categorical columns
    /// are present.
    Gower,
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distance::SqEuclidean => write!(f, "sq.euclidean"),
            Distance::Euclidean => write!(f, "euclidean"),
            Distance::Manhattan => write!(f, "manhattan"),
            Distance::Maximum => write!(f, "maximum"),
            Distance::Canberra => write!(f, "canberra"),
            Distance::Binary => write!(f, "binary"),
            Distance::Minkowski(p) => write!(f, "minkowski:{p}"),
            Distance::Gower => write!(f, "gower"),
        }
    }
}

impl Serialize for Distance {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for Distance {
    type Err = HclusError;

    /// Accepts the R `dist` method names plus `sq.euclidean` (also spelled
    /// `sq.euclidian`), `gower` and `minkowski:<p>`.
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let d = match lower.as_str() {
            "sq.euclidean" | "sq.euclidian" | "sqeuclidean" => Distance::SqEuclidean,
            "euclidean" => Distance::Euclidean,
            "manhattan" => Distance::Manhattan,
            "maximum" => Distance::Maximum,
            "canberra" => Distance::Canberra,
            "binary" => Distance::Binary,
            "minkowski" => Distance::Minkowski(2.0),
            "gower" => Distance::Gower,
            other => match other.strip_prefix("minkowski:") {
                Some(p) => match p.parse::<f64>() {
                    Ok(p) if p.is_finite() && p > 0.0 => Distance::Minkowski(p),
                    _ => return Err(HclusError::UnknownDistance(s.to_string())),
                },
                None => return Err(HclusError::UnknownDistance(s.to_string())),
            },
        };
        Ok(d)
    }
}

impl Distance {
    /// The row metric behind this distance. Gower has none: it scales by
    /// column ranges and needs the whole feature set.
    pub fn metric(&self) -> Option<Metric> {
        match *self {
            Distance::SqEuclidean => Some(Metric::SqEuclidean),
            Distance::Euclidean => Some(Metric::Euclidean),
            Distance::Manhattan => Some(Metric::Manhattan),
            Distance::Maximum => Some(Metric::Maximum),
            Distance::Canberra => Some(Metric::Canberra),
            Distance::Binary => Some(Metric::Binary),
            Distance::Minkowski(p) => Some(Metric::Minkowski(p)),
            Distance::Gower => None,
        }
    }
}

/// A distance computed from two numeric rows alone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    SqEuclidean,
    Euclidean,
    Manhattan,
    Maximum,
    Canberra,
    Binary,
    Minkowski(f64),
}

impl Metric {
    /// Dissimilarity between two numeric rows.
    pub fn between(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let diffs = a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs());
        match self {
            Metric::SqEuclidean => diffs.map(|d| d * d).sum(),
            Metric::Euclidean => diffs.map(|d| d * d).sum::<f64>().sqrt(),
            Metric::Manhattan => diffs.sum(),
            Metric::Maximum => diffs.fold(0.0, f64::max),
            Metric::Minkowski(p) => diffs.map(|d| d.powf(*p)).sum::<f64>().powf(1.0 / p),
            Metric::Canberra => {
                // 0/0 terms are left out and the sum rescaled, as R's dist() does
                let mut sum = 0.0;
                let mut used = 0usize;
                for (x, y) in a.iter().zip(b.iter()) {
                    let denom = (x + y).abs();
                    let num = (x - y).abs();
                    if denom > 0.0 {
                        sum += num / denom;
                        used += 1;
                    } else if num > 0.0 {
                        return f64::INFINITY;
                    }
                }
                if used == 0 {
                    0.0
                } else {
                    sum * a.len() as f64 / used as f64
                }
            }
            Metric::Binary => {
                let mut either = 0usize;
                let mut only_one = 0usize;
                for (x, y) in a.iter().zip(b.iter()) {
                    let (x, y) = (*x != 0.0, *y != 0.0);
                    if x || y {
                        either += 1;
                        if x != y {
                            only_one += 1;
                        }
                    }
                }
                if either == 0 {
                    0.0
                } else {
                    only_one as f64 / either as f64
                }
            }
        }
    }
}

/// One feature prepared for distance computation.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureColumn {
    /// Numbers, with dates already converted to days.
    Numeric(Vec<Option<f64>>),
    /// Level codes of a factor or logical.
    Categorical(Vec<Option<usize>>),
}

impl FeatureColumn {
    pub fn is_numeric(&self) -> bool {
        matches!(self, FeatureColumn::Numeric(_))
    }
}

/// The feature set of one analysis: selected rows of the selected columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Features {
    pub names: Vec<String>,
    pub columns: Vec<FeatureColumn>,
    n: usize,
}

impl Features {
    /// Extract `rows` of `columns`. Logical columns become two-level
    /// categoricals.
    pub fn from_columns(columns: &[&Column], rows: &[usize]) -> Self {
        let names = columns.iter().map(|c| c.name.clone()).collect();
        let columns = columns
            .iter()
            .map(|c| match &c.data {
                ColumnData::Numeric(_) | ColumnData::Date(_) => {
                    FeatureColumn::Numeric(rows.iter().map(|&r| c.data.as_f64(r)).collect())
                }
                ColumnData::Logical(v) => {
                    FeatureColumn::Categorical(rows.iter().map(|&r| v[r].map(usize::from)).collect())
                }
                ColumnData::Factor { codes, .. } => {
                    FeatureColumn::Categorical(rows.iter().map(|&r| codes[r]).collect())
                }
            })
            .collect();
        Self {
            names,
            columns,
            n: rows.len(),
        }
    }

    /// Number of cases.
    pub fn n_cases(&self) -> usize {
        self.n
    }

    pub fn has_categorical(&self) -> bool {
        self.columns.iter().any(|c| !c.is_numeric())
    }

    /// Rescale every numeric column to zero mean and unit sample standard
    /// deviation. Constant columns become all zero.
    pub fn standardize(&mut self) {
        for column in self.columns.iter_mut() {
            if let FeatureColumn::Numeric(values) = column {
                standardize_values(values);
            }
        }
    }

    /// Numeric columns as an `n x p` matrix. Missing cells are NaN.
    pub fn numeric_matrix(&self) -> Result<Array2<f64>> {
        let p = self.columns.len();
        let mut m = Array2::<f64>::zeros((self.n, p));
        for (j, column) in self.columns.iter().enumerate() {
            match column {
                FeatureColumn::Numeric(values) => {
                    for (i, v) in values.iter().enumerate() {
                        m[[i, j]] = v.unwrap_or(f64::NAN);
                    }
                }
                FeatureColumn::Categorical(_) => {
                    return Err(HclusError::InvalidParameter {
                        name: "distance",
                        message: format!(
                            "variable '{}' is not numeric; use gower distance",
                            self.names[j]
                        ),
                    })
                }
            }
        }
        Ok(m)
    }
}

fn standardize_values(values: &mut [Option<f64>]) {
    let present: Array1<f64> = values.iter().flatten().copied().collect();
    let (mean, sd) = match present.mean() {
        Some(mean) if present.len() > 1 => (mean, present.std(1.0)),
        Some(mean) => (mean, 0.0),
        None => return,
    };
    let usable = sd.is_finite() && sd > 0.0;
    for v in values.iter_mut().flatten() {
        *v = if usable { (*v - mean) / sd } else { 0.0 };
    }
}

/// Position of pair `(i, j)`, `i != j`, in a condensed matrix over `n` cases.
pub fn condensed_index(n: usize, i: usize, j: usize) -> usize {
    let (i, j) = if i < j { (i, j) } else { (j, i) };
    n * i - i * (i + 1) / 2 + j - i - 1
}

/// Symmetric dissimilarity matrix stored as its upper triangle.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    n: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    /// Compute all pairwise dissimilarities of `features` under `distance`.
    pub fn compute(distance: Distance, features: &Features) -> Result<Self> {
        let n = features.n_cases();
        let values = match distance.metric() {
            None => gower_condensed(features),
            Some(metric) => {
                let m = features.numeric_matrix()?;
                let mut values = Vec::with_capacity(n * n.saturating_sub(1) / 2);
                for i in 0..n.saturating_sub(1) {
                    for j in (i + 1)..n {
                        values.push(metric.between(m.row(i), m.row(j)));
                    }
                }
                values
            }
        };
        if let Some(bad) = values.iter().find(|d| !d.is_finite() || **d < 0.0) {
            return Err(HclusError::InvalidParameter {
                name: "distance",
                message: format!("{distance} produced an unusable dissimilarity ({bad})"),
            });
        }
        Ok(Self { n, values })
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        if i == j {
            0.0
        } else {
            self.values[condensed_index(self.n, i, j)]
        }
    }

    pub fn condensed(&self) -> &[f64] {
        &self.values
    }

    pub fn into_condensed(self) -> Vec<f64> {
        self.values
    }
}

/// Gower dissimilarity: the mean over comparable variables of
/// `|x - y| / range` for numbers and a mismatch indicator for categories.
/// Numeric variables with zero range carry no information and are skipped,
/// as are variables missing in either row.
pub fn gower_condensed(features: &Features) -> Vec<f64> {
    let n = features.n_cases();
    let ranges: Vec<Option<f64>> = features
        .columns
        .iter()
        .map(|c| match c {
            FeatureColumn::Numeric(values) => {
                let (lo, hi) = values
                    .iter()
                    .flatten()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
                let range = hi - lo;
                (range.is_finite() && range > 0.0).then_some(range)
            }
            FeatureColumn::Categorical(_) => None,
        })
        .collect();

    let mut out = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n.saturating_sub(1) {
        for j in (i + 1)..n {
            let mut sum = 0.0;
            let mut used = 0usize;
            for (column, range) in features.columns.iter().zip(&ranges) {
                let term = match column {
                    FeatureColumn::Numeric(values) => match (values[i], values[j], range) {
                        (Some(x), Some(y), Some(r)) => Some((x - y).abs() / r),
                        _ => None,
                    },
                    FeatureColumn::Categorical(codes) => match (codes[i], codes[j]) {
                        (Some(x), Some(y)) => Some(if x == y { 0.0 } else { 1.0 }),
                        _ => None,
                    },
                };
                if let Some(t) = term {
                    sum += t;
                    used += 1;
                }
            }
            out.push(if used == 0 { 0.0 } else { sum / used as f64 });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn numeric(cols: Vec<Vec<f64>>) -> Features {
        let n = cols[0].len();
        Features {
            names: (0..cols.len()).map(|i| format!("x{i}")).collect(),
            columns: cols
                .into_iter()
                .map(|c| FeatureColumn::Numeric(c.into_iter().map(Some).collect()))
                .collect(),
            n,
        }
    }

    #[test]
    fn test_parse_identifiers() {
        assert_eq!("sq.euclidian".parse::<Distance>().unwrap(), Distance::SqEuclidean);
        assert_eq!("Gower".parse::<Distance>().unwrap(), Distance::Gower);
        assert_eq!("minkowski:3".parse::<Distance>().unwrap(), Distance::Minkowski(3.0));
        assert!("minkowski:-1".parse::<Distance>().is_err());
        assert_eq!(Distance::Gower.metric(), None);
        assert_eq!(Distance::Minkowski(3.0).metric(), Some(Metric::Minkowski(3.0)));
        assert_eq!(
            serde_json::to_value(Distance::Minkowski(1.5)).unwrap(),
            serde_json::json!("minkowski:1.5")
        );
        assert_eq!(
            "cosine".parse::<Distance>(),
            Err(HclusError::UnknownDistance("cosine".into()))
        );
    }

    #[test]
    fn test_metrics() {
        let a = array![0.0, 0.0, 1.0];
        let b = array![3.0, 4.0, 1.0];
        assert_eq!(Metric::SqEuclidean.between(a.view(), b.view()), 25.0);
        assert_eq!(Metric::Euclidean.between(a.view(), b.view()), 5.0);
        assert_eq!(Metric::Manhattan.between(a.view(), b.view()), 7.0);
        assert_eq!(Metric::Maximum.between(a.view(), b.view()), 4.0);
        assert_abs_diff_eq!(Metric::Minkowski(2.0).between(a.view(), b.view()), 5.0, epsilon = 1e-12);
        // 0/0 in the first column is dropped, the other two rescaled by 3/2
        assert_abs_diff_eq!(
            Metric::Canberra.between(array![0.0, 1.0, 2.0].view(), array![0.0, 3.0, 2.0].view()),
            0.75,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            Metric::Binary.between(array![1.0, 0.0, 1.0, 0.0].view(), array![1.0, 1.0, 0.0, 0.0].view()),
            2.0 / 3.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_matrix_is_symmetric_with_zero_diagonal() {
        let f = numeric(vec![vec![0.0, 1.0, 4.0], vec![0.0, 1.0, 0.0]]);
        let d = DistanceMatrix::compute(Distance::SqEuclidean, &f).unwrap();
        assert_eq!(d.condensed(), &[2.0, 16.0, 10.0]);
        for i in 0..3 {
            assert_eq!(d.get(i, i), 0.0);
            for j in 0..3 {
                assert_eq!(d.get(i, j), d.get(j, i));
            }
        }
    }

    #[test]
    fn test_standardize_constant_column_is_zero() {
        let mut f = numeric(vec![vec![7.0, 7.0, 7.0], vec![1.0, 2.0, 3.0]]);
        f.standardize();
        assert_eq!(f.columns[0], FeatureColumn::Numeric(vec![Some(0.0); 3]));
        assert_eq!(
            f.columns[1],
            FeatureColumn::Numeric(vec![Some(-1.0), Some(0.0), Some(1.0)])
        );
    }

    #[test]
    fn test_gower_mixes_types() {
        let f = Features {
            names: vec!["x".into(), "g".into()],
            columns: vec![
                FeatureColumn::Numeric(vec![Some(0.0), Some(5.0), Some(10.0)]),
                FeatureColumn::Categorical(vec![Some(0), Some(0), None]),
            ],
            n: 3,
        };
        let d = DistanceMatrix::compute(Distance::Gower, &f).unwrap();
        // (0.5 + 0) / 2, then only the numeric term where g is missing
        assert_abs_diff_eq!(d.get(0, 1), 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(d.get(0, 2), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(d.get(1, 2), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_metric_distance_rejects_categorical() {
        let f = Features {
            names: vec!["g".into()],
            columns: vec![FeatureColumn::Categorical(vec![Some(0), Some(1)])],
            n: 2,
        };
        assert!(DistanceMatrix::compute(Distance::Euclidean, &f).is_err());
    }
}
