use crate::cluster::Hclus;
use crate::error::{HclusError, Result};
use chrono::{Datelike, NaiveDate};
use csv::{ReaderBuilder, WriterBuilder};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Days since 1970-01-01, the numeric form dates take when clustered.
pub fn days_since_epoch(date: NaiveDate) -> f64 {
    f64::from(date.num_days_from_ce() - EPOCH_DAYS_FROM_CE)
}

/// Values of one column. Missing entries are `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Date(Vec<Option<NaiveDate>>),
    Logical(Vec<Option<bool>>),
    /// Categorical values stored as codes into `levels`.
    Factor {
        levels: Vec<String>,
        codes: Vec<Option<usize>>,
    },
}

impl ColumnData {
    /// Build a factor from string values, levels in order of first appearance.
    pub fn factor_from<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        let mut levels: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let codes: Vec<Option<usize>> = values
            .into_iter()
            .map(|v| {
                v.map(|s| {
                    let s: String = s.into();
                    *index.entry(s).or_insert_with_key(|s| {
                        levels.push(s.clone());
                        levels.len() - 1
                    })
                })
            })
            .collect();
        ColumnData::Factor { levels, codes }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Date(v) => v.len(),
            ColumnData::Logical(v) => v.len(),
            ColumnData::Factor { codes, .. } => codes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numbers and dates; everything else forces Gower distance.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnData::Numeric(_) | ColumnData::Date(_))
    }

    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            ColumnData::Numeric(v) => !matches!(v.get(row), Some(Some(x)) if !x.is_nan()),
            ColumnData::Date(v) => !matches!(v.get(row), Some(Some(_))),
            ColumnData::Logical(v) => !matches!(v.get(row), Some(Some(_))),
            ColumnData::Factor { codes, .. } => !matches!(codes.get(row), Some(Some(_))),
        }
    }

    /// Numeric value of a numeric or date cell.
    pub fn as_f64(&self, row: usize) -> Option<f64> {
        match self {
            ColumnData::Numeric(v) => v.get(row).copied().flatten().filter(|x| !x.is_nan()),
            ColumnData::Date(v) => v.get(row).copied().flatten().map(days_since_epoch),
            _ => None,
        }
    }

    /// Text form of a cell, `NA` when missing.
    pub fn display(&self, row: usize) -> String {
        match self {
            ColumnData::Numeric(v) => match v.get(row).copied().flatten() {
                Some(x) if !x.is_nan() => format_number(x),
                _ => "NA".to_string(),
            },
            ColumnData::Date(v) => v
                .get(row)
                .copied()
                .flatten()
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "NA".to_string()),
            ColumnData::Logical(v) => match v.get(row).copied().flatten() {
                Some(true) => "TRUE".to_string(),
                Some(false) => "FALSE".to_string(),
                None => "NA".to_string(),
            },
            ColumnData::Factor { levels, codes } => codes
                .get(row)
                .copied()
                .flatten()
                .and_then(|c| levels.get(c))
                .cloned()
                .unwrap_or_else(|| "NA".to_string()),
        }
    }

    /// Short type name, R style.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ColumnData::Numeric(_) => "numeric",
            ColumnData::Date(_) => "date",
            ColumnData::Logical(_) => "logical",
            ColumnData::Factor { .. } => "factor",
        }
    }
}

fn format_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        format!("{x}")
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

/// Represents a typed tabular dataset: ordered named columns of equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    pub name: String,
    pub columns: Vec<Column>,
}

impl DataSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Builder form of [`DataSet::push_column`].
    pub fn with_column(mut self, name: impl Into<String>, data: ColumnData) -> Result<Self> {
        self.push_column(name, data)?;
        Ok(self)
    }

    /// Append a column. Its length must match the existing columns and its
    /// name must be new.
    pub fn push_column(&mut self, name: impl Into<String>, data: ColumnData) -> Result<()> {
        let name = name.into();
        if let Some(first) = self.columns.first() {
            if first.data.len() != data.len() {
                return Err(HclusError::ShapeMismatch {
                    expected: format!("{} rows", first.data.len()),
                    found: format!("{} rows in column '{}'", data.len(), name),
                });
            }
        }
        if self.column(&name).is_some() {
            return Err(HclusError::InvalidParameter {
                name: "column",
                message: format!("duplicate column name '{name}'"),
            });
        }
        self.columns.push(Column { name, data });
        Ok(())
    }

    pub fn nrows(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Resolve a column or fail with [`HclusError::UnknownColumn`].
    pub fn require(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| HclusError::UnknownColumn(name.to_string()))
    }

    /// Expand `from:to` range entries into every column between and including
    /// both endpoints, in dataset order. Plain names are checked and kept.
    /// Duplicates are dropped, first occurrence wins.
    pub fn expand_vars<S: AsRef<str>>(&self, vars: &[S]) -> Result<Vec<String>> {
        let mut out: Vec<String> = Vec::new();
        for var in vars {
            let var = var.as_ref().trim();
            let names: Vec<String> = match var.split_once(':') {
                Some((from, to)) => {
                    let (from, to) = (from.trim(), to.trim());
                    let a = self
                        .column_index(from)
                        .ok_or_else(|| HclusError::UnknownColumn(from.to_string()))?;
                    let b = self
                        .column_index(to)
                        .ok_or_else(|| HclusError::UnknownColumn(to.to_string()))?;
                    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                    self.columns[lo..=hi].iter().map(|c| c.name.clone()).collect()
                }
                None => vec![self.require(var)?.name.clone()],
            };
            for name in names {
                if !out.contains(&name) {
                    out.push(name);
                }
            }
        }
        Ok(out)
    }

    /// Read a comma separated file; the dataset is named after the file stem.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_path(path, b',')
    }

    /// Read a tab separated file; the dataset is named after the file stem.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_path(path, b'\t')
    }

    fn from_path<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| HclusError::Io(format!("Failed to open {:?}: {}", path, e)))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        Self::from_reader(name, file, delimiter)
    }

    /// Read delimited text with a header row, inferring a type per column.
    pub fn from_reader<R: Read>(name: impl Into<String>, reader: R, delimiter: u8) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(|s| s.trim().to_string()).collect();
        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];

        for (i, result) in rdr.records().enumerate() {
            let record = result
                .map_err(|e| HclusError::Csv(format!("Error reading record {}: {}", i, e)))?;
            if record.len() != headers.len() {
                return Err(HclusError::ShapeMismatch {
                    expected: format!("{} fields", headers.len()),
                    found: format!("{} fields in record {}", record.len(), i),
                });
            }
            for (col, field) in cells.iter_mut().zip(record.iter()) {
                col.push(field.trim().to_string());
            }
        }

        let mut ds = DataSet::new(name);
        for (header, values) in headers.into_iter().zip(cells) {
            let data = infer_column(&values);
            debug!(column = %header, kind = data.kind_name(), "inferred column type");
            ds.push_column(header, data)?;
        }
        Ok(ds)
    }

    /// Write the dataset as CSV with a header row. Missing values become `NA`.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = WriterBuilder::new().from_writer(writer);
        wtr.write_record(self.columns.iter().map(|c| c.name.as_str()))?;
        for row in 0..self.nrows() {
            wtr.write_record(self.columns.iter().map(|c| c.data.display(row)))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())
            .map_err(|e| HclusError::Io(format!("Failed to create {:?}: {}", path.as_ref(), e)))?;
        self.write_csv(file)
    }

    /// Append cluster memberships from `result` cut at `k` clusters as a factor
    /// column. Rows that were not clustered (filtered out or incomplete) are
    /// missing. The column is called `name`, or `hclus{k}` when `name` is
    /// empty; an existing column of that name is replaced in place.
    pub fn store_membership(&self, result: &Hclus, k: usize, name: Option<&str>) -> Result<DataSet> {
        if self.nrows() != result.source_rows() {
            return Err(HclusError::ShapeMismatch {
                expected: format!("{} rows", result.source_rows()),
                found: format!("{} rows", self.nrows()),
            });
        }
        let name = match name.map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => format!("hclus{k}"),
        };

        let assignment = result.cut(k)?;
        let mut codes: Vec<Option<usize>> = vec![None; self.nrows()];
        for (&row, &cluster) in result.row_index().iter().zip(assignment.iter()) {
            codes[row] = Some(cluster - 1);
        }
        let data = ColumnData::Factor {
            levels: (1..=k).map(|c| c.to_string()).collect(),
            codes,
        };

        let mut out = self.clone();
        match out.column_index(&name) {
            Some(idx) => out.columns[idx].data = data,
            None => out.push_column(name, data)?,
        }
        Ok(out)
    }
}

fn is_na(s: &str) -> bool {
    s.is_empty() || s == "NA"
}

fn parse_logical(s: &str) -> Option<bool> {
    match s {
        "TRUE" | "true" | "True" => Some(true),
        "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Pick the narrowest type every non-missing cell parses as.
fn infer_column(values: &[String]) -> ColumnData {
    let present = || values.iter().filter(|s| !is_na(s));

    if present().all(|s| s.parse::<f64>().is_ok()) {
        return ColumnData::Numeric(
            values
                .iter()
                .map(|s| if is_na(s) { None } else { s.parse().ok() })
                .collect(),
        );
    }
    if present().all(|s| parse_logical(s).is_some()) {
        return ColumnData::Logical(
            values
                .iter()
                .map(|s| if is_na(s) { None } else { parse_logical(s) })
                .collect(),
        );
    }
    if present().all(|s| parse_date(s).is_some()) {
        return ColumnData::Date(
            values
                .iter()
                .map(|s| if is_na(s) { None } else { parse_date(s) })
                .collect(),
        );
    }
    ColumnData::factor_from(values.iter().map(|s| if is_na(s) { None } else { Some(s.as_str()) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "id,price,carat,cut,date,flag\n\
                       a,326,0.23,Ideal,2020-01-01,TRUE\n\
                       b,NA,0.21,Premium,2020-01-02,FALSE\n\
                       c,327,0.23,Good,,TRUE\n";

    fn sample() -> DataSet {
        DataSet::from_reader("diamonds", CSV.as_bytes(), b',').unwrap()
    }

    #[test]
    fn test_infers_column_types() {
        let ds = sample();
        assert_eq!(ds.nrows(), 3);
        let kinds: Vec<_> = ds.columns.iter().map(|c| c.data.kind_name()).collect();
        assert_eq!(kinds, ["factor", "numeric", "numeric", "factor", "date", "logical"]);
        assert!(ds.column("price").unwrap().data.is_missing(1));
        assert!(ds.column("date").unwrap().data.is_missing(2));
    }

    #[test]
    fn test_factor_levels_keep_first_appearance() {
        let ds = DataSet::from_reader("d", "g,x\nb,1\na,2\nb,3\nNA,4\n".as_bytes(), b',').unwrap();
        let ColumnData::Factor { levels, codes } = &ds.column("g").unwrap().data else {
            panic!("g should be a factor");
        };
        assert_eq!(levels, &["b", "a"]);
        assert_eq!(codes, &[Some(0), Some(1), Some(0), None]);
    }

    #[test]
    fn test_dates_become_days() {
        let d = NaiveDate::from_ymd_opt(1970, 1, 11).unwrap();
        assert_eq!(days_since_epoch(d), 10.0);
        let ds = sample();
        assert_eq!(ds.column("date").unwrap().data.as_f64(1), Some(18263.0));
    }

    #[test]
    fn test_expand_range() {
        let ds = sample();
        let vars = ds.expand_vars(&["price:cut"]).unwrap();
        assert_eq!(vars, ["price", "carat", "cut"]);
        let vars = ds.expand_vars(&["cut:price", "flag", "carat"]).unwrap();
        assert_eq!(vars, ["price", "carat", "cut", "flag"]);
        assert_eq!(
            ds.expand_vars(&["nope"]),
            Err(HclusError::UnknownColumn("nope".into()))
        );
    }

    #[test]
    fn test_push_column_checks_length() {
        let err = DataSet::new("x")
            .with_column("a", ColumnData::Numeric(vec![Some(1.0)]))
            .unwrap()
            .with_column("b", ColumnData::Numeric(vec![]))
            .unwrap_err();
        assert!(matches!(err, HclusError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_write_csv() {
        let mut out = Vec::new();
        sample().write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "id,price,carat,cut,date,flag");
        assert_eq!(lines[2], "b,NA,0.21,Premium,2020-01-02,FALSE");
        assert_eq!(lines[3], "c,327,0.23,Good,NA,TRUE");
    }
}
