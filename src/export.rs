use crate::cluster::Hclus;
use crate::error::Result;
use csv::WriterBuilder;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Write `label,cluster` for every clustered case, in row order, with the
/// tree cut at `k` clusters.
pub fn write_membership_csv<W: Write>(writer: W, hc: &Hclus, k: usize) -> Result<()> {
    let clusters = hc.cut(k)?;
    let mut wtr = WriterBuilder::new().from_writer(writer);
    wtr.write_record(["label", "cluster"])?;
    for (label, cluster) in hc.row_labels().iter().zip(clusters) {
        wtr.write_record([label.as_str(), cluster.to_string().as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn save_membership_csv<P: AsRef<Path>>(path: P, hc: &Hclus, k: usize) -> Result<()> {
    let file = File::create(path)?;
    write_membership_csv(file, hc, k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{hclus, ClusteringRequest};
    use crate::dataset::{ColumnData, DataSet};

    #[test]
    fn test_membership_rows() {
        let ds = DataSet::new("pts")
            .with_column(
                "x",
                ColumnData::Numeric(vec![Some(0.0), Some(20.0), Some(0.5), Some(21.0)]),
            )
            .unwrap()
            .with_column(
                "name",
                ColumnData::factor_from(vec![Some("p"), Some("q"), Some("r"), Some("s")]),
            )
            .unwrap();
        let hc = hclus(&ds, &ClusteringRequest::new(["x"]).with_labels("name")).unwrap();

        let mut out = Vec::new();
        write_membership_csv(&mut out, &hc, 2).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "label,cluster\np,1\nq,2\nr,1\ns,2\n");
    }
}
