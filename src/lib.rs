//! rfmforge: customer segmentation from retail order ledgers
//!
//! The pipeline cleans raw order lines, aggregates per-customer Recency,
//! Frequency and Monetary (RFM) metrics, scores them into quintiles, assigns
//! rule-based segments and clusters the standardized metrics with K-Means.

pub mod clean;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod rfm;
pub mod scoring;
pub mod segment;
pub mod types;

// Re-export public items for easier access
pub use clean::{CleaningReport, OrderLine, RecordCleaner};
pub use cli::Args;
pub use config::PipelineConfig;
pub use data::{load_order_lines, read_order_lines, write_segments, write_segments_to, RawOrderLine};
pub use error::SegmentationError;
pub use model::{predict_cluster, ClusterAssigner, ConvergenceWarning, FittedClusters, KMeansParams};
pub use pipeline::{run_pipeline, Pipeline, PipelineOutput, SegmentedCustomer};
pub use rfm::{aggregate, CustomerMetrics, RfmTable};
pub use scoring::{QuantileFallback, RfmScorer, RfmScores};
pub use segment::{classify, Segment};
pub use types::{CustomerId, Metric};

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, SegmentationError>;
