//! Error types shared by every pipeline stage

use crate::types::Metric;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SegmentationError {
    /// A single input row could not be parsed. The cleaner drops such rows.
    #[error("Malformed row {row}: {reason}")]
    Data { row: usize, reason: String },

    #[error("Input has no column for {field} (headers: {headers})")]
    MissingColumn { field: &'static str, headers: String },

    #[error("No order lines left after cleaning")]
    EmptyDataset,

    #[error("Cannot form 5 quantile bins for {metric}: {reason}")]
    Quantization { metric: Metric, reason: String },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Linfa(#[from] linfa::Error),

    #[error("K-Means failed: {0}")]
    KMeans(#[from] linfa_clustering::KMeansError),
}

impl SegmentationError {
    pub fn data(row: usize, reason: impl Into<String>) -> Self {
        Self::Data {
            row,
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }
}
