//! Linkage methods for hierarchical clustering.
//!
//! | Linkage | Cluster distance | Effect |
//! |---------|------------------|--------|
//! | `single` | min d(a,b) | Chaining; elongated clusters |
//! | `complete` | max d(a,b) | Compact, spherical clusters |
//! | `average` | mean d(a,b) | Balanced compromise |
//! | `mcquitty` | mean of the two merged clusters' distances | Weighted average |
//! | `ward.D` / `ward.D2` | increase in within-cluster variance | Compact, equal-sized clusters |
//! | `centroid` / `median` | distance between (weighted) centroids | Heights may decrease |
//!
//! `kodama` implements the SciPy conventions, where Ward, centroid and
//! median expect plain Euclidean input and square it internally. `ward.D`,
//! `centroid` and `median` are defined here on the dissimilarities as given,
//! so those are square-rooted on the way in and the heights squared on the
//! way out. `ward.D2` is `kodama`'s Ward unchanged.

use crate::dendrogram::Dendrogram;
use crate::error::{HclusError, Result};
use kodama::{linkage as kodama_linkage, Method as KodamaMethod};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Linkage method for hierarchical clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Linkage {
    /// Ward's minimum variance on the dissimilarities as given.
    #[default]
    #[serde(rename = "ward.D")]
    WardD,
    /// Ward's minimum variance on squared dissimilarities.
    #[serde(rename = "ward.D2")]
    WardD2,
    #[serde(rename = "single")]
    Single,
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "average")]
    Average,
    /// WPGMA.
    #[serde(rename = "mcquitty")]
    McQuitty,
    /// WPGMC.
    #[serde(rename = "median")]
    Median,
    /// UPGMC.
    #[serde(rename = "centroid")]
    Centroid,
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Linkage::WardD => "ward.D",
            Linkage::WardD2 => "ward.D2",
            Linkage::Single => "single",
            Linkage::Complete => "complete",
            Linkage::Average => "average",
            Linkage::McQuitty => "mcquitty",
            Linkage::Median => "median",
            Linkage::Centroid => "centroid",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Linkage {
    type Err = HclusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ward.d" | "ward" => Ok(Linkage::WardD),
            "ward.d2" => Ok(Linkage::WardD2),
            "single" => Ok(Linkage::Single),
            "complete" => Ok(Linkage::Complete),
            "average" | "upgma" => Ok(Linkage::Average),
            "mcquitty" | "weighted" | "wpgma" => Ok(Linkage::McQuitty),
            "median" | "wpgmc" => Ok(Linkage::Median),
            "centroid" | "upgmc" => Ok(Linkage::Centroid),
            _ => Err(HclusError::UnknownLinkage(s.to_string())),
        }
    }
}

impl Linkage {
    fn kodama_method(&self) -> KodamaMethod {
        match self {
            Linkage::WardD | Linkage::WardD2 => KodamaMethod::Ward,
            Linkage::Single => KodamaMethod::Single,
            Linkage::Complete => KodamaMethod::Complete,
            Linkage::Average => KodamaMethod::Average,
            Linkage::McQuitty => KodamaMethod::Weighted,
            Linkage::Median => KodamaMethod::Median,
            Linkage::Centroid => KodamaMethod::Centroid,
        }
    }

    fn updates_raw_dissimilarities(&self) -> bool {
        matches!(self, Linkage::WardD | Linkage::Median | Linkage::Centroid)
    }

    /// Whether merge heights are guaranteed non-decreasing.
    pub fn is_monotone(&self) -> bool {
        !matches!(self, Linkage::Median | Linkage::Centroid)
    }

    /// Run agglomerative clustering over a condensed dissimilarity matrix of
    /// `n` cases. The matrix is used as scratch space.
    pub fn agglomerate(&self, condensed: &mut [f64], n: usize) -> Result<Dendrogram> {
        let expected = n * n.saturating_sub(1) / 2;
        if condensed.len() != expected {
            return Err(HclusError::ShapeMismatch {
                expected: format!("{expected} dissimilarities for {n} cases"),
                found: format!("{}", condensed.len()),
            });
        }

        let mut dendro = Dendrogram::new(n);
        if n < 2 {
            return Ok(dendro);
        }

        let raw = self.updates_raw_dissimilarities();
        if raw {
            condensed.iter_mut().for_each(|d| *d = d.sqrt());
        }

        debug!(n, method = %self, "running agglomeration");
        let dend = kodama_linkage(condensed, n, self.kodama_method());
        for step in dend.steps() {
            let height = if raw {
                step.dissimilarity * step.dissimilarity
            } else {
                step.dissimilarity
            };
            dendro.join(step.cluster1, step.cluster2, height);
        }

        Ok(dendro)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    // points 0, 1, 10 on a line
    fn sq_line() -> Vec<f64> {
        vec![1.0, 100.0, 81.0]
    }

    #[test]
    fn test_parse() {
        assert_eq!("ward.D".parse::<Linkage>().unwrap(), Linkage::WardD);
        assert_eq!("ward.D2".parse::<Linkage>().unwrap(), Linkage::WardD2);
        assert_eq!("mcquitty".parse::<Linkage>().unwrap(), Linkage::McQuitty);
        assert!("kmeans".parse::<Linkage>().is_err());
        assert_eq!(Linkage::default().to_string(), "ward.D");
        assert_eq!(serde_json::to_value(Linkage::McQuitty).unwrap(), "mcquitty");
    }

    #[test]
    fn test_single_and_complete_heights() {
        let mut d = sq_line();
        let single = Linkage::Single.agglomerate(&mut d, 3).unwrap();
        assert_eq!(single.heights(), [1.0, 81.0]);

        let mut d = sq_line();
        let complete = Linkage::Complete.agglomerate(&mut d, 3).unwrap();
        assert_eq!(complete.heights(), [1.0, 100.0]);
    }

    #[test]
    fn test_ward_d_updates_given_dissimilarities() {
        // Lance-Williams Ward on squared distances:
        // d({0,1}, 2) = (2*100 + 2*81 - 1*1) / 3 = 120.333..
        let mut d = sq_line();
        let ward = Linkage::WardD.agglomerate(&mut d, 3).unwrap();
        let h = ward.heights();
        assert_abs_diff_eq!(h[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(h[1], 361.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_small_inputs() {
        let mut empty: Vec<f64> = vec![];
        assert_eq!(Linkage::Average.agglomerate(&mut empty, 1).unwrap().n_merges(), 0);
        let mut wrong = vec![1.0, 2.0];
        assert!(Linkage::Average.agglomerate(&mut wrong, 3).is_err());
    }
}
