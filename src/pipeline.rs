//! End-to-end segmentation: clean, aggregate, score, classify, cluster

use crate::clean::{CleaningReport, RecordCleaner};
use crate::config::PipelineConfig;
use crate::data::RawOrderLine;
use crate::model::{ClusterAssigner, ConvergenceWarning, FittedClusters};
use crate::rfm::{aggregate, CustomerMetrics};
use crate::scoring::{RfmScorer, RfmScores};
use crate::segment::{classify, Segment};
use crate::types::Metric;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// One output row
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedCustomer {
    pub metrics: CustomerMetrics,
    pub scores: RfmScores,
    pub segment: Segment,
    pub cluster: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// One row per customer, ordered by customer id
    pub customers: Vec<SegmentedCustomer>,
    pub reference_date: NaiveDateTime,
    pub cleaning: CleaningReport,
    pub scorer: RfmScorer,
    pub clusters: FittedClusters,
    pub convergence_warning: Option<ConvergenceWarning>,
}

impl PipelineOutput {
    /// Customers per segment, every segment present
    pub fn segment_counts(&self) -> BTreeMap<Segment, usize> {
        let mut counts: BTreeMap<Segment, usize> = Segment::ALL.iter().map(|&s| (s, 0)).collect();
        for customer in &self.customers {
            *counts.entry(customer.segment).or_default() += 1;
        }
        counts
    }

    pub fn cluster_counts(&self) -> Vec<usize> {
        self.clusters.model.cluster_sizes()
    }

    /// Metrics scored on first-seen rank because their values were degenerate
    pub fn quantile_fallbacks(&self) -> Vec<Metric> {
        self.scorer.fallbacks()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage over one ledger.
    ///
    /// Each run is independent: the reference date, quintile edges, scaler
    /// and centroids are all fitted on this ledger alone.
    pub fn run(&self, raw: &[RawOrderLine]) -> crate::Result<PipelineOutput> {
        self.config.validate()?;

        let cleaned = RecordCleaner::new(self.config.cancellation_prefix.as_str()).clean(raw);
        let table = aggregate(&cleaned.lines, self.config.reference_date)?;

        let scorer = RfmScorer::fit(&table.customers, self.config.quantile_fallback)?;
        let scores = scorer.apply(&table.customers);

        let clusters = ClusterAssigner::new(self.config.clustering.clone()).fit(&table.raw_features())?;
        let convergence_warning = clusters.model.convergence_warning.clone();

        let customers: Vec<SegmentedCustomer> = table
            .customers
            .into_iter()
            .zip(scores)
            .zip(clusters.labels().iter().copied())
            .map(|((metrics, scores), cluster)| SegmentedCustomer {
                metrics,
                scores,
                segment: classify(&scores),
                cluster,
            })
            .collect();

        log::info!("Segmented {} customers", customers.len());

        Ok(PipelineOutput {
            customers,
            reference_date: table.reference_date,
            cleaning: cleaned.report,
            scorer,
            clusters,
            convergence_warning,
        })
    }
}

/// Run the pipeline with the given configuration
pub fn run_pipeline(raw: &[RawOrderLine], config: &PipelineConfig) -> crate::Result<PipelineOutput> {
    Pipeline::new(config.clone()).run(raw)
}
