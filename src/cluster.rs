//! Hierarchical cluster analysis of a [`DataSet`].
//!
//! [`hclus`] resolves the requested variables, filters and cleans the rows,
//! picks the effective distance, standardizes, computes the dissimilarities
//! and runs the agglomeration. The returned [`Hclus`] carries everything
//! needed afterwards: summaries, plots, cuts and stored memberships.

use crate::dataset::{Column, DataSet};
use crate::dendrogram::Dendrogram;
use crate::distance::{Distance, DistanceMatrix, Features};
use crate::error::{HclusError, Result};
use crate::filter::RowFilter;
use crate::linkage::Linkage;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Default ceiling on the number of cases; the distance matrix grows with
/// its square.
pub const DEFAULT_MAX_CASES: usize = 5000;

/// Parameters of one analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteringRequest {
    pub vars: Vec<String>,
    pub labels: Option<String>,
    pub distance: Distance,
    pub method: Linkage,
    pub max_cases: usize,
    pub standardize: bool,
    pub filter: Option<String>,
}

impl ClusteringRequest {
    /// A request with the default distance (`sq.euclidean`), method
    /// (`ward.D`), case ceiling and standardization switched on.
    pub fn new<I, S>(vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(Into::into).collect(),
            labels: None,
            distance: Distance::default(),
            method: Linkage::default(),
            max_cases: DEFAULT_MAX_CASES,
            standardize: true,
            filter: None,
        }
    }

    pub fn with_labels(mut self, labels: impl Into<String>) -> Self {
        self.labels = Some(labels.into());
        self
    }

    pub fn with_distance(mut self, distance: Distance) -> Self {
        self.distance = distance;
        self
    }

    pub fn with_method(mut self, method: Linkage) -> Self {
        self.method = method;
        self
    }

    pub fn with_max_cases(mut self, max_cases: usize) -> Self {
        self.max_cases = max_cases;
        self
    }

    pub fn with_standardize(mut self, standardize: bool) -> Self {
        self.standardize = standardize;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Result of a hierarchical cluster analysis.
#[derive(Debug, Clone)]
pub struct Hclus {
    dataset: String,
    filter: Option<String>,
    vars: Vec<String>,
    labels_var: Option<String>,
    labels_unique: bool,
    requested_distance: Distance,
    distance: Distance,
    method: Linkage,
    standardize: bool,
    gower_override: bool,
    row_labels: Vec<String>,
    row_index: Vec<usize>,
    source_rows: usize,
    features: Features,
    dendrogram: Dendrogram,
}

/// Serializable digest of an [`Hclus`].
#[derive(Debug, Clone, Serialize)]
pub struct HclusReport {
    pub dataset: String,
    pub filter: Option<String>,
    pub vars: Vec<String>,
    pub labels: Option<String>,
    pub method: Linkage,
    pub distance: Distance,
    pub requested_distance: Distance,
    pub standardize: bool,
    pub gower_override: bool,
    pub labels_unique: bool,
    pub observations: usize,
    pub heights: Vec<f64>,
    pub merges: Vec<[usize; 2]>,
    pub order: Vec<usize>,
}

/// Run a hierarchical cluster analysis of `ds`.
pub fn hclus(ds: &DataSet, request: &ClusteringRequest) -> Result<Hclus> {
    if request.max_cases == 0 {
        return Err(HclusError::InvalidParameter {
            name: "max_cases",
            message: "must be at least 1".to_string(),
        });
    }

    let vars = ds.expand_vars(&request.vars)?;
    if vars.is_empty() {
        return Err(HclusError::NoVariables);
    }
    let labels_var = request
        .labels
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != "none");
    if let Some(l) = labels_var {
        ds.require(l)?;
        if vars.iter().any(|v| v == l) {
            return Err(HclusError::LabelInVars(l.to_string()));
        }
    }

    // parse before touching any rows
    let filter = match request.filter.as_deref().map(str::trim) {
        Some(f) if !f.is_empty() => Some(RowFilter::parse(f)?),
        _ => None,
    };
    let mask = match &filter {
        Some(f) => f.evaluate(ds)?,
        None => vec![true; ds.nrows()],
    };

    let columns: Vec<&Column> = vars.iter().map(|v| ds.require(v)).collect::<Result<_>>()?;
    let label_column = labels_var.map(|l| ds.require(l)).transpose()?;

    let rows: Vec<usize> = (0..ds.nrows())
        .filter(|&r| mask[r])
        .filter(|&r| columns.iter().all(|c| !c.data.is_missing(r)))
        .filter(|&r| label_column.map_or(true, |c| !c.data.is_missing(r)))
        .collect();
    debug!(
        dataset = %ds.name,
        selected = rows.len(),
        total = ds.nrows(),
        "resolved rows"
    );
    if rows.is_empty() {
        return Err(HclusError::NoData);
    }
    if rows.len() > request.max_cases {
        return Err(HclusError::TooManyCases {
            cases: rows.len(),
            max: request.max_cases,
        });
    }

    let raw = Features::from_columns(&columns, &rows);
    let distance = if raw.has_categorical() {
        Distance::Gower
    } else {
        request.distance
    };
    let gower_override = distance != request.distance;
    if gower_override {
        info!(requested = %request.distance, "categorical variables present, using gower distance");
    }

    let (row_labels, labels_unique) = match label_column {
        Some(c) => {
            let values: Vec<String> = rows.iter().map(|&r| c.data.display(r)).collect();
            let distinct: HashSet<&str> = values.iter().map(String::as_str).collect();
            if distinct.len() == values.len() {
                (values, true)
            } else {
                warn!(labels = %c.name, "labels are not unique, using row numbers instead");
                (positional_labels(rows.len()), false)
            }
        }
        None => (positional_labels(rows.len()), true),
    };

    let mut features = raw.clone();
    if request.standardize {
        features.standardize();
    }

    let mut condensed = DistanceMatrix::compute(distance, &features)?.into_condensed();
    let dendrogram = request.method.agglomerate(&mut condensed, rows.len())?;

    Ok(Hclus {
        dataset: ds.name.clone(),
        filter: filter.map(|f| f.source().to_string()),
        vars,
        labels_var: labels_var.map(str::to_string),
        labels_unique,
        requested_distance: request.distance,
        distance,
        method: request.method,
        standardize: request.standardize,
        gower_override,
        row_labels,
        row_index: rows,
        source_rows: ds.nrows(),
        features: raw,
        dendrogram,
    })
}

fn positional_labels(n: usize) -> Vec<String> {
    (1..=n).map(|i| i.to_string()).collect()
}

/// Summary text of a finished analysis, or the failure message verbatim.
pub fn summarize(outcome: &Result<Hclus>) -> String {
    match outcome {
        Ok(hc) => hc.summary(),
        Err(e) => e.to_string(),
    }
}

/// `1234567` -> `1,234,567`
fn format_count(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

impl Hclus {
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn vars(&self) -> &[String] {
        &self.vars
    }

    pub fn labels_var(&self) -> Option<&str> {
        self.labels_var.as_deref()
    }

    /// `false` when a labels variable was given but had duplicates.
    pub fn labels_unique(&self) -> bool {
        self.labels_unique
    }

    pub fn requested_distance(&self) -> Distance {
        self.requested_distance
    }

    /// The distance actually used.
    pub fn distance(&self) -> Distance {
        self.distance
    }

    /// Whether categorical variables forced Gower over the requested distance.
    pub fn gower_override(&self) -> bool {
        self.gower_override
    }

    pub fn method(&self) -> Linkage {
        self.method
    }

    pub fn standardize(&self) -> bool {
        self.standardize
    }

    /// Number of clustered cases.
    pub fn nobs(&self) -> usize {
        self.row_index.len()
    }

    /// Label of every clustered case, in row order.
    pub fn row_labels(&self) -> &[String] {
        &self.row_labels
    }

    /// Position in the source dataset of every clustered case.
    pub fn row_index(&self) -> &[usize] {
        &self.row_index
    }

    /// Row count of the source dataset before filtering.
    pub fn source_rows(&self) -> usize {
        self.source_rows
    }

    /// Selected variables of the clustered cases, before standardization.
    pub fn features(&self) -> &Features {
        &self.features
    }

    pub fn dendrogram(&self) -> &Dendrogram {
        &self.dendrogram
    }

    pub fn heights(&self) -> Vec<f64> {
        self.dendrogram.heights()
    }

    /// Cluster id in `1..=k` of every clustered case.
    pub fn cut(&self, k: usize) -> Result<Vec<usize>> {
        self.dendrogram.cut_to_k(k)
    }

    pub fn summary(&self) -> String {
        let mut out = String::from("Hierarchical cluster analysis\n");
        out.push_str(&format!("Data         : {}\n", self.dataset));
        if let Some(f) = &self.filter {
            out.push_str(&format!("Filter       : {}\n", f.replace('\n', " ")));
        }
        out.push_str(&format!("Variables    : {}\n", self.vars.join(", ")));
        if let Some(l) = &self.labels_var {
            out.push_str(&format!("Labels       : {l}\n"));
        }
        out.push_str(&format!("Method       : {}\n", self.method));
        out.push_str(&format!("Distance     : {}\n", self.distance));
        out.push_str(&format!(
            "Standardize  : {}\n",
            if self.standardize { "TRUE" } else { "FALSE" }
        ));
        out.push_str(&format!("Observations : {}\n", format_count(self.nobs())));
        if self.gower_override {
            out.push_str(&format!(
                "\n** When factor or logical variables are included, Gower distance is used (requested: {}) **\n",
                self.requested_distance
            ));
        }
        if !self.labels_unique {
            if let Some(l) = &self.labels_var {
                out.push_str(&format!(
                    "\n** The values of '{l}' are not unique; row numbers are used as labels **\n"
                ));
            }
        }
        out
    }

    pub fn report(&self) -> Result<HclusReport> {
        Ok(HclusReport {
            dataset: self.dataset.clone(),
            filter: self.filter.clone(),
            vars: self.vars.clone(),
            labels: self.labels_var.clone(),
            method: self.method,
            distance: self.distance,
            requested_distance: self.requested_distance,
            standardize: self.standardize,
            gower_override: self.gower_override,
            labels_unique: self.labels_unique,
            observations: self.nobs(),
            heights: self.heights(),
            merges: self
                .dendrogram
                .merges()
                .iter()
                .map(|m| [m.left, m.right])
                .collect(),
            order: self.dendrogram.order()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ColumnData;

    fn two_blobs() -> DataSet {
        DataSet::new("blobs")
            .with_column(
                "x",
                ColumnData::Numeric(vec![Some(0.0), Some(0.1), Some(10.0), Some(10.1), None]),
            )
            .unwrap()
            .with_column(
                "y",
                ColumnData::Numeric(vec![Some(0.0), Some(0.1), Some(10.0), Some(10.1), Some(3.0)]),
            )
            .unwrap()
            .with_column(
                "id",
                ColumnData::factor_from(vec![Some("a"), Some("b"), Some("c"), Some("d"), Some("e")]),
            )
            .unwrap()
    }

    #[test]
    fn test_incomplete_rows_are_left_out() {
        let hc = hclus(&two_blobs(), &ClusteringRequest::new(["x", "y"])).unwrap();
        assert_eq!(hc.nobs(), 4);
        assert_eq!(hc.row_index(), &[0, 1, 2, 3]);
        assert_eq!(hc.source_rows(), 5);
        assert_eq!(hc.dendrogram().n_merges(), 3);
        assert_eq!(hc.cut(2).unwrap(), [1, 1, 2, 2]);
    }

    #[test]
    fn test_unique_labels_are_used() {
        let req = ClusteringRequest::new(["x:y"]).with_labels("id");
        let hc = hclus(&two_blobs(), &req).unwrap();
        assert_eq!(hc.vars(), &["x".to_string(), "y".to_string()]);
        assert_eq!(hc.row_labels(), &["a", "b", "c", "d"]);
        assert!(hc.labels_unique());
    }

    #[test]
    fn test_label_errors() {
        let req = ClusteringRequest::new(["x", "id"]).with_labels("id");
        assert_eq!(
            hclus(&two_blobs(), &req).unwrap_err(),
            HclusError::LabelInVars("id".into())
        );
        let req = ClusteringRequest::new(["x"]).with_labels("nope");
        assert_eq!(
            hclus(&two_blobs(), &req).unwrap_err(),
            HclusError::UnknownColumn("nope".into())
        );
    }

    #[test]
    fn test_filter_and_empty_result() {
        let req = ClusteringRequest::new(["x", "y"]).with_filter("x > 5");
        let hc = hclus(&two_blobs(), &req).unwrap();
        assert_eq!(hc.row_index(), &[2, 3]);
        assert_eq!(hc.filter(), Some("x > 5"));

        let req = ClusteringRequest::new(["x", "y"]).with_filter("x > 500");
        assert_eq!(hclus(&two_blobs(), &req).unwrap_err(), HclusError::NoData);

        let req = ClusteringRequest::new(Vec::<String>::new());
        assert_eq!(hclus(&two_blobs(), &req).unwrap_err(), HclusError::NoVariables);
    }

    #[test]
    fn test_summary_lines() {
        let req = ClusteringRequest::new(["x", "y"]).with_filter("y < 20");
        let text = hclus(&two_blobs(), &req).unwrap().summary();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Hierarchical cluster analysis");
        assert_eq!(lines[1], "Data         : blobs");
        assert_eq!(lines[2], "Filter       : y < 20");
        assert_eq!(lines[3], "Variables    : x, y");
        assert_eq!(lines[4], "Method       : ward.D");
        assert_eq!(lines[5], "Distance     : sq.euclidean");
        assert_eq!(lines[6], "Standardize  : TRUE");
        assert_eq!(lines[7], "Observations : 4");
        assert_eq!(lines.len(), 8);
    }

    #[test]
    fn test_summarize_passes_errors_through() {
        let failed: Result<Hclus> = Err(HclusError::TooManyCases { cases: 10, max: 5 });
        assert_eq!(summarize(&failed), failed.unwrap_err().to_string());
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(7), "7");
        assert_eq!(format_count(5000), "5,000");
        assert_eq!(format_count(1234567), "1,234,567");
    }

    #[test]
    fn test_report_serializes() {
        let hc = hclus(&two_blobs(), &ClusteringRequest::new(["x", "y"])).unwrap();
        let json = serde_json::to_value(hc.report().unwrap()).unwrap();
        assert_eq!(json["observations"], 4);
        assert_eq!(json["method"], "ward.D");
        assert_eq!(json["distance"], "sq.euclidean");
        assert_eq!(json["merges"].as_array().unwrap().len(), 3);
    }
}
