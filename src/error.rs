use thiserror::Error;

/// Result alias for `hclus`.
pub type Result<T> = std::result::Result<T, HclusError>;

/// Everything that can stop an analysis before it produces a result.
///
/// All of these are recoverable: the caller fixes the request and tries again.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HclusError {
    #[error("No variables selected for clustering")]
    NoVariables,

    #[error("Column '{0}' not found in the dataset")]
    UnknownColumn(String),

    #[error("The labels variable '{0}' cannot also be used as a clustering variable")]
    LabelInVars(String),

    #[error("No data available after applying the filter and removing missing values")]
    NoData,

    #[error(
        "The number of cases to cluster ({cases}) exceeds the maximum set ({max}). Change the number of cases allowed using the 'max cases' option."
    )]
    TooManyCases { cases: usize, max: usize },

    #[error("Invalid filter expression: {message}")]
    Filter { message: String },

    #[error("Unknown distance '{0}'")]
    UnknownDistance(String),

    #[error("Unknown linkage method '{0}'")]
    UnknownLinkage(String),

    #[error("Unknown plot type '{0}'")]
    UnknownPlot(String),

    #[error("Cannot create {requested} clusters from {n_items} cases")]
    InvalidClusterCount { requested: usize, n_items: usize },

    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: &'static str, message: String },

    #[error("Shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Failed to render plot: {0}")]
    Render(String),
}

impl From<csv::Error> for HclusError {
    fn from(e: csv::Error) -> Self {
        HclusError::Csv(e.to_string())
    }
}

impl From<std::io::Error> for HclusError {
    fn from(e: std::io::Error) -> Self {
        HclusError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_message_names_both_counts() {
        let msg = HclusError::TooManyCases { cases: 5001, max: 5000 }.to_string();
        assert!(msg.contains("5001"));
        assert!(msg.contains("5000"));
        assert_eq!(
            msg,
            "The number of cases to cluster (5001) exceeds the maximum set (5000). \
             Change the number of cases allowed using the 'max cases' option."
        );
    }
}
