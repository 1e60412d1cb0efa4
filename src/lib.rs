//! # hclus
//!
//! Hierarchical cluster analysis over typed tabular data.
//!
//! A [`DataSet`] is clustered with [`hclus`] according to a
//! [`ClusteringRequest`]. The resulting [`Hclus`] can be summarized, cut into
//! a fixed number of clusters, plotted (scree, change, dendrogram and
//! pairwise plots) and stored back into the dataset as a membership column.
//!
//! ```no_run
//! use hclus::{hclus, ClusteringRequest, DataSet};
//!
//! let ds = DataSet::from_csv("shopping.csv")?;
//! let hc = hclus(&ds, &ClusteringRequest::new(["v1:v6"]).with_labels("id"))?;
//! println!("{}", hc.summary());
//! let ds = ds.store_membership(&hc, 3, None)?;
//! ds.to_csv("shopping_hclus.csv")?;
//! # Ok::<(), hclus::HclusError>(())
//! ```

pub mod cluster;
pub mod dataset;
pub mod dendrogram;
pub mod distance;
pub mod error;
pub mod export;
pub mod filter;
pub mod linkage;
pub mod plot;
pub mod render;

pub use cluster::{hclus, summarize, ClusteringRequest, Hclus, HclusReport, DEFAULT_MAX_CASES};
pub use dataset::{Column, ColumnData, DataSet};
pub use dendrogram::{Dendrogram, Merge};
pub use distance::{Distance, DistanceMatrix, Metric};
pub use error::{HclusError, Result};
pub use filter::RowFilter;
pub use linkage::Linkage;
pub use plot::{plot, Plot, PlotKind, PlotSet};
