//! Pipeline configuration

use crate::clean::DEFAULT_CANCELLATION_PREFIX;
use crate::error::SegmentationError;
use crate::model::KMeansParams;
use crate::scoring::QuantileFallback;
use chrono::NaiveDateTime;

/// Everything a pipeline run can be tuned with.
///
/// The defaults reproduce the reference analysis: `C`-prefixed invoices are
/// cancellations, the reference date is derived from the ledger, quantile
/// scoring is strict and K-Means uses 4 clusters, 10 initializations and
/// seed 42.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub cancellation_prefix: String,
    /// Overrides the derived reference date (latest order + 1 day)
    pub reference_date: Option<NaiveDateTime>,
    pub quantile_fallback: QuantileFallback,
    pub clustering: KMeansParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cancellation_prefix: DEFAULT_CANCELLATION_PREFIX.to_string(),
            reference_date: None,
            quantile_fallback: QuantileFallback::Strict,
            clustering: KMeansParams::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.cancellation_prefix.is_empty() {
            return Err(SegmentationError::config(
                "cancellation prefix must not be empty",
            ));
        }
        self.clustering.validate()
    }
}
