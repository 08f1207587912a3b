//! Quintile scoring of the RFM metrics
//!
//! Scoring is population-relative: bin edges are fitted on the whole customer
//! population first, then applied to produce 1..=5 scores. Recency and
//! Monetary are binned on their raw values. Frequency is binned on a
//! first-seen rank of its values, which keeps five non-empty bins even when
//! most customers share the same order count.

use crate::error::SegmentationError;
use crate::rfm::CustomerMetrics;
use crate::types::Metric;

/// Number of score tiers
pub const N_TIERS: usize = 5;

/// What to do when a value-binned metric has duplicate quintile edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantileFallback {
    /// Fail with a quantization error
    #[default]
    Strict,
    /// Bin the metric on its first-seen rank instead
    RankFirst,
}

/// The quantity a metric is binned on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinBasis {
    Value,
    FirstSeenRank,
}

/// Per-metric r/f/m scores, each in 1..=5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RfmScores {
    pub r: u8,
    pub f: u8,
    pub m: u8,
}

impl RfmScores {
    pub fn new(r: u8, f: u8, m: u8) -> Self {
        Self { r, f, m }
    }
}

/// Fitted quintile edges for one metric
#[derive(Debug, Clone, PartialEq)]
pub struct QuintileBins {
    pub metric: Metric,
    pub basis: BinBasis,
    /// Six strictly increasing edges (0th to 100th percentile of the basis)
    pub edges: [f64; N_TIERS + 1],
    /// Lower values score higher (recency)
    pub inverted: bool,
}

impl QuintileBins {
    /// Tier index 0..5 for a basis value.
    ///
    /// A value belongs to the first bin whose upper edge it does not exceed;
    /// the lowest bin includes its lower edge. Values outside the fitted range
    /// clamp to the end bins.
    pub fn tier(&self, basis_value: f64) -> usize {
        self.edges[1..]
            .iter()
            .position(|&upper| basis_value <= upper)
            .unwrap_or(N_TIERS - 1)
    }

    /// Score 1..=5 for a basis value
    pub fn score(&self, basis_value: f64) -> u8 {
        let tier = self.tier(basis_value) as u8;
        if self.inverted {
            N_TIERS as u8 - tier
        } else {
            tier + 1
        }
    }
}

/// Percentiles at 0, 20, ..., 100 with linear interpolation between order
/// statistics. `sorted` must be ascending and non-empty.
pub fn quintile_edges(sorted: &[f64]) -> [f64; N_TIERS + 1] {
    let last = (sorted.len() - 1) as f64;
    let mut edges = [0.0; N_TIERS + 1];
    for (k, edge) in edges.iter_mut().enumerate() {
        let pos = k as f64 * last / N_TIERS as f64;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        *edge = sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64);
    }
    edges
}

/// 1-based ranks by ascending value; ties keep their input order
pub fn first_seen_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    for (rank, idx) in order.into_iter().enumerate() {
        ranks[idx] = (rank + 1) as f64;
    }
    ranks
}

fn basis_values(basis: BinBasis, values: &[f64]) -> Vec<f64> {
    match basis {
        BinBasis::Value => values.to_vec(),
        BinBasis::FirstSeenRank => first_seen_ranks(values),
    }
}

fn fit_edges(basis: BinBasis, values: &[f64]) -> [f64; N_TIERS + 1] {
    let mut sorted = basis_values(basis, values);
    sorted.sort_by(f64::total_cmp);
    quintile_edges(&sorted)
}

fn strictly_increasing(edges: &[f64]) -> bool {
    edges.windows(2).all(|w| w[0] < w[1])
}

impl QuintileBins {
    /// Fit edges for one metric over a population
    pub fn fit(metric: Metric, values: &[f64], fallback: QuantileFallback) -> crate::Result<Self> {
        if values.len() < N_TIERS {
            return Err(SegmentationError::Quantization {
                metric,
                reason: format!("{} customers, at least {} required", values.len(), N_TIERS),
            });
        }

        let preferred = match metric {
            Metric::Frequency => BinBasis::FirstSeenRank,
            Metric::Recency | Metric::Monetary => BinBasis::Value,
        };
        let inverted = metric == Metric::Recency;

        let edges = fit_edges(preferred, values);
        if strictly_increasing(&edges) {
            return Ok(Self {
                metric,
                basis: preferred,
                edges,
                inverted,
            });
        }

        match fallback {
            QuantileFallback::Strict => Err(SegmentationError::Quantization {
                metric,
                reason: format!("duplicate bin edges {:?}", edges),
            }),
            QuantileFallback::RankFirst => {
                log::warn!(
                    "{} has duplicate quintile edges {:?}, binning on first-seen rank",
                    metric,
                    edges
                );
                Ok(Self {
                    metric,
                    basis: BinBasis::FirstSeenRank,
                    edges: fit_edges(BinBasis::FirstSeenRank, values),
                    inverted,
                })
            }
        }
    }

    /// Scores for every member of a population, in population order
    pub fn apply(&self, values: &[f64]) -> Vec<u8> {
        basis_values(self.basis, values)
            .into_iter()
            .map(|v| self.score(v))
            .collect()
    }
}

/// Fitted quintile bins for all three metrics
#[derive(Debug, Clone, PartialEq)]
pub struct RfmScorer {
    pub recency: QuintileBins,
    pub frequency: QuintileBins,
    pub monetary: QuintileBins,
}

fn metric_values(customers: &[CustomerMetrics], metric: Metric) -> Vec<f64> {
    customers.iter().map(|c| c.value(metric)).collect()
}

impl RfmScorer {
    /// Fit quintile edges on the full population.
    ///
    /// Frequency ranks break ties by population order, which the aggregator
    /// fixes to ascending customer id.
    pub fn fit(customers: &[CustomerMetrics], fallback: QuantileFallback) -> crate::Result<Self> {
        let fit = |metric: Metric| QuintileBins::fit(metric, &metric_values(customers, metric), fallback);
        let scorer = Self {
            recency: fit(Metric::Recency)?,
            frequency: fit(Metric::Frequency)?,
            monetary: fit(Metric::Monetary)?,
        };
        log::debug!(
            "Quintile edges: recency {:?}, frequency {:?}, monetary {:?}",
            scorer.recency.edges,
            scorer.frequency.edges,
            scorer.monetary.edges
        );
        Ok(scorer)
    }

    /// Score a population with the fitted edges.
    ///
    /// Rank-binned metrics are ranked within the given population.
    pub fn apply(&self, customers: &[CustomerMetrics]) -> Vec<RfmScores> {
        let r = self.recency.apply(&metric_values(customers, Metric::Recency));
        let f = self.frequency.apply(&metric_values(customers, Metric::Frequency));
        let m = self.monetary.apply(&metric_values(customers, Metric::Monetary));

        r.into_iter()
            .zip(f)
            .zip(m)
            .map(|((r, f), m)| RfmScores { r, f, m })
            .collect()
    }

    /// Metrics that fell back to rank binning
    pub fn fallbacks(&self) -> Vec<Metric> {
        [&self.recency, &self.monetary]
            .into_iter()
            .filter(|bins| bins.basis == BinBasis::FirstSeenRank)
            .map(|bins| bins.metric)
            .collect()
    }
}
