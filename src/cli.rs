//! Command-line interface definitions and argument parsing

use crate::clean::parse_timestamp;
use crate::config::PipelineConfig;
use crate::error::SegmentationError;
use crate::model::KMeansParams;
use crate::scoring::QuantileFallback;
use clap::Parser;

/// Customer segmentation CLI: RFM scores, rule-based segments and K-Means clusters
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file of order lines
    #[arg(short, long, default_value = "data/online_retail_II.csv")]
    pub input: String,

    /// Path of the segmented customer CSV to write
    #[arg(short, long, default_value = "output/segmented_customers.csv")]
    pub output: String,

    /// Number of clusters for K-Means
    #[arg(short = 'k', long, default_value = "4")]
    pub clusters: usize,

    /// Number of K-Means initializations; the lowest-inertia run is kept
    #[arg(long, default_value = "10")]
    pub n_init: usize,

    /// Random seed for K-Means initialization
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300")]
    pub max_iters: usize,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Invoice prefix marking cancelled orders
    #[arg(long, default_value = "C")]
    pub cancellation_prefix: String,

    /// Reference date for recency (default: latest order + 1 day)
    #[arg(long)]
    pub reference_date: Option<String>,

    /// Score degenerate metrics on first-seen rank instead of failing
    #[arg(long)]
    pub rank_fallback: bool,

    /// Prediction mode: provide R,F,M values as comma-separated string
    /// Example: --predict "30,10,500.0" for Recency=30, Frequency=10, Monetary=500.0
    #[arg(short, long)]
    pub predict: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse RFM values from the predict string
    /// Expected format: "recency,frequency,monetary"
    pub fn parse_rfm_values(&self) -> crate::Result<Option<[f64; 3]>> {
        let Some(predict_str) = self.predict.as_deref() else {
            return Ok(None);
        };

        let parts: Vec<&str> = predict_str.split(',').collect();
        if parts.len() != 3 {
            return Err(SegmentationError::config(
                "Predict values must be in format 'recency,frequency,monetary'",
            ));
        }

        let mut values = [0.0; 3];
        for ((value, part), name) in values.iter_mut().zip(&parts).zip(["recency", "frequency", "monetary"]) {
            *value = part
                .trim()
                .parse()
                .map_err(|_| SegmentationError::config(format!("Invalid {} value: {}", name, part)))?;
        }

        Ok(Some(values))
    }

    /// Build the pipeline configuration from the flags
    pub fn pipeline_config(&self) -> crate::Result<PipelineConfig> {
        let reference_date = self
            .reference_date
            .as_deref()
            .map(|text| {
                parse_timestamp(0, Some(text))
                    .map_err(|_| SegmentationError::config(format!("Invalid reference date: {}", text)))
            })
            .transpose()?;

        let config = PipelineConfig {
            cancellation_prefix: self.cancellation_prefix.clone(),
            reference_date,
            quantile_fallback: if self.rank_fallback {
                QuantileFallback::RankFirst
            } else {
                QuantileFallback::Strict
            },
            clustering: KMeansParams::new(self.clusters)
                .n_init(self.n_init)
                .max_iters(self.max_iters)
                .tolerance(self.tolerance)
                .seed(self.seed),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args::parse_from(["rfmforge", "--input", "test.csv", "--output", "out.csv"])
    }

    #[test]
    fn test_parse_rfm_values() {
        let mut args = args();
        args.predict = Some("30,10,500.0".to_string());

        let result = args.parse_rfm_values().unwrap();
        assert_eq!(result, Some([30.0, 10.0, 500.0]));

        args.predict = None;
        let result = args.parse_rfm_values().unwrap();
        assert_eq!(result, None);

        args.predict = Some("invalid".to_string());
        assert!(args.parse_rfm_values().is_err());

        args.predict = Some("30,ten,500".to_string());
        assert!(args.parse_rfm_values().is_err());
    }

    #[test]
    fn test_defaults_match_pipeline_defaults() {
        let config = args().pipeline_config().unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_flags_reach_the_config() {
        let args = Args::parse_from([
            "rfmforge",
            "-k",
            "5",
            "--n-init",
            "3",
            "--seed",
            "7",
            "--cancellation-prefix",
            "X",
            "--reference-date",
            "2011-12-10",
            "--rank-fallback",
        ]);
        let config = args.pipeline_config().unwrap();

        assert_eq!(config.clustering.n_clusters, 5);
        assert_eq!(config.clustering.n_init, 3);
        assert_eq!(config.clustering.seed, 7);
        assert_eq!(config.cancellation_prefix, "X");
        assert_eq!(config.quantile_fallback, QuantileFallback::RankFirst);
        assert_eq!(
            config.reference_date.map(|d| d.to_string()),
            Some("2011-12-10 00:00:00".to_string())
        );
    }

    #[test]
    fn test_invalid_flags_are_rejected() {
        let bad_date = Args::parse_from(["rfmforge", "--reference-date", "someday"]);
        assert!(bad_date.pipeline_config().is_err());

        let no_clusters = Args::parse_from(["rfmforge", "-k", "0"]);
        assert!(no_clusters.pipeline_config().is_err());
    }
}
