//! K-Means clustering on standardized RFM features

use crate::error::SegmentationError;
use linfa::traits::{Fit, Predict};
use linfa::DatasetBase;
use linfa_clustering::{KMeans, KMeansError};
use linfa_nn::distance::{Distance, L2Dist};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2};
use rand::seq::index;
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use std::fmt;

/// Zero-mean, unit-variance scaling fitted on one population
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    /// Population standard deviation per feature, 1.0 where it is zero
    pub scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(features: &Array2<f64>) -> crate::Result<Self> {
        let mean = features
            .mean_axis(Axis(0))
            .ok_or(SegmentationError::EmptyDataset)?;
        let scale = features
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });
        Ok(Self { mean, scale })
    }

    pub fn transform<S: Data<Elem = f64>>(&self, features: &ArrayBase<S, Ix2>) -> Array2<f64> {
        (features - &self.mean) / &self.scale
    }
}

/// The fitted centroids had not settled when the iteration cap was reached
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceWarning {
    pub max_iters: usize,
    /// Centroid movement of one further Lloyd step
    pub shift: f64,
    pub inertia: f64,
}

impl fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "K-Means did not converge within {} iterations (centroid shift {:.3e}, inertia {:.4})",
            self.max_iters, self.shift, self.inertia
        )
    }
}

/// K-Means hyperparameters
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansParams {
    pub n_clusters: usize,
    /// Number of k-means++ initializations; the lowest-inertia run is kept
    pub n_init: usize,
    pub max_iters: usize,
    /// Convergence threshold on the Euclidean distance between successive
    /// centroid sets
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            n_clusters: 4,
            n_init: 10,
            max_iters: 300,
            tolerance: 1e-4,
            seed: 42,
        }
    }
}

impl KMeansParams {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..Self::default()
        }
    }

    pub fn n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    pub fn max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.n_clusters == 0 {
            return Err(SegmentationError::config("number of clusters must be positive"));
        }
        if self.n_init == 0 {
            return Err(SegmentationError::config("n_init must be positive"));
        }
        if self.max_iters == 0 {
            return Err(SegmentationError::config("max_iters must be positive"));
        }
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            return Err(SegmentationError::config(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// K-Means model wrapper with fitted parameters
#[derive(Debug, Clone)]
pub struct KMeansModel {
    /// Fitted K-Means model from linfa
    pub model: KMeans<f64, L2Dist>,
    pub n_clusters: usize,
    /// Cluster assignments for training data
    pub labels: Array1<usize>,
    /// Cluster centroids in scaled space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares
    pub inertia: f64,
    /// Seed of the fit, reused to draw silhouette samples
    pub seed: u64,
    pub convergence_warning: Option<ConvergenceWarning>,
}

/// Within-cluster sum of squared distances
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    features
        .outer_iter()
        .zip(labels.iter().copied())
        .filter(|(_, label)| *label < centroids.nrows())
        .map(|(point, label)| L2Dist.rdistance(point, centroids.row(label)))
        .sum()
}

/// Member means per cluster; an empty cluster keeps its centroid
fn member_means(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros(centroids.raw_dim());
    let mut counts = vec![0usize; centroids.nrows()];
    for (point, &label) in features.outer_iter().zip(labels.iter()) {
        let mut row = sums.row_mut(label);
        row += &point;
        counts[label] += 1;
    }

    for ((mut row, centroid), &count) in sums.outer_iter_mut().zip(centroids.outer_iter()).zip(&counts) {
        if count == 0 {
            row.assign(&centroid);
        } else {
            row /= count as f64;
        }
    }
    sums
}

impl<T> Fit<Array2<f64>, T, SegmentationError> for KMeansParams {
    type Object = KMeansModel;

    /// Fit linfa's K-Means with `n_init` k-means++ runs.
    ///
    /// Every run draws from one `Pcg64Mcg` stream seeded with `seed`, so a
    /// fixed seed reproduces the labels exactly. Reaching `max_iters` is not
    /// an error: if one more Lloyd step would still move the centroids by
    /// more than `tolerance`, the model carries a `ConvergenceWarning`.
    fn fit(&self, dataset: &DatasetBase<Array2<f64>, T>) -> crate::Result<KMeansModel> {
        self.validate()?;
        let features = dataset.records();
        let n_samples = features.nrows();
        if n_samples < self.n_clusters {
            return Err(SegmentationError::config(format!(
                "{} customers cannot form {} clusters",
                n_samples, self.n_clusters
            )));
        }

        let fitted: Result<KMeans<f64, L2Dist>, KMeansError> =
            KMeans::params_with(self.n_clusters, Pcg64Mcg::seed_from_u64(self.seed), L2Dist)
                .n_runs(self.n_init)
                .max_n_iterations(self.max_iters as u64)
                .tolerance(self.tolerance)
                .fit(dataset);
        let model = fitted?;

        let labels: Array1<usize> = model.predict(features);
        let centroids = model.centroids().clone();
        let inertia = compute_inertia(features, &labels, &centroids);

        let shift = L2Dist.distance(centroids.view(), member_means(features, &labels, &centroids).view());
        log::debug!(
            "K-Means fitted: inertia {:.4}, residual centroid shift {:.3e}",
            inertia,
            shift
        );
        let convergence_warning = if shift > self.tolerance {
            let warning = ConvergenceWarning {
                max_iters: self.max_iters,
                shift,
                inertia,
            };
            log::warn!("{}", warning);
            Some(warning)
        } else {
            None
        };

        Ok(KMeansModel {
            model,
            n_clusters: self.n_clusters,
            labels,
            centroids,
            inertia,
            seed: self.seed,
            convergence_warning,
        })
    }
}

impl KMeansModel {
    /// Nearest cluster for one scaled point
    pub fn predict_point(&self, features: &Array1<f64>) -> crate::Result<usize> {
        if features.len() != self.centroids.ncols() {
            return Err(SegmentationError::config(format!(
                "feature vector must have {} dimensions, got {}",
                self.centroids.ncols(),
                features.len()
            )));
        }
        Ok(self.model.predict(features))
    }

    /// Nearest cluster for every row of a scaled matrix
    pub fn predict_rows(&self, features: &Array2<f64>) -> Array1<usize> {
        self.model.predict(features)
    }

    pub fn converged(&self) -> bool {
        self.convergence_warning.is_none()
    }

    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }

    /// Mean silhouette coefficient over a seeded random sample of at most
    /// `sample_size` training points. Distances are taken within the sample.
    pub fn compute_silhouette_sample(&self, features: &Array2<f64>, sample_size: usize) -> f64 {
        let n_rows = features.nrows().min(self.labels.len());
        let mut sample: Vec<usize> = if n_rows <= sample_size {
            (0..n_rows).collect()
        } else {
            let mut rng = Pcg64Mcg::seed_from_u64(self.seed);
            index::sample(&mut rng, n_rows, sample_size).into_vec()
        };
        sample.sort_unstable();
        if sample.len() < 2 {
            return 0.0;
        }

        let total: f64 = sample
            .iter()
            .map(|&i| {
                let own = self.labels[i];
                let mut sums = vec![0.0; self.n_clusters];
                let mut counts = vec![0usize; self.n_clusters];
                for &j in sample.iter().filter(|&&j| j != i) {
                    let label = self.labels[j];
                    if label < self.n_clusters {
                        sums[label] += L2Dist.distance(features.row(i), features.row(j));
                        counts[label] += 1;
                    }
                }

                let mean = |k: usize| (counts[k] > 0).then(|| sums[k] / counts[k] as f64);
                let a = mean(own).unwrap_or(0.0);
                let b = (0..self.n_clusters)
                    .filter(|&k| k != own)
                    .filter_map(mean)
                    .fold(f64::INFINITY, f64::min);

                if b.is_infinite() || a.max(b) == 0.0 {
                    0.0
                } else {
                    (b - a) / a.max(b)
                }
            })
            .sum();

        total / sample.len() as f64
    }
}

/// Scaler and K-Means model fitted on one population
#[derive(Debug, Clone)]
pub struct FittedClusters {
    pub scaler: StandardScaler,
    pub model: KMeansModel,
    /// Training features after scaling
    pub scaled: Array2<f64>,
}

impl FittedClusters {
    pub fn labels(&self) -> &Array1<usize> {
        &self.model.labels
    }

    /// Cluster for a raw (recency, frequency, monetary) triple
    pub fn predict(&self, rfm: &[f64; 3]) -> crate::Result<usize> {
        let scaled = self.scale_new_data(rfm)?;
        self.model.predict_point(&scaled)
    }

    /// Scale a raw triple with the fitted scaler
    pub fn scale_new_data(&self, rfm: &[f64; 3]) -> crate::Result<Array1<f64>> {
        let input = Array2::from_shape_vec((1, 3), rfm.to_vec())
            .map_err(|e| SegmentationError::config(e.to_string()))?;
        Ok(self.scaler.transform(&input).row(0).to_owned())
    }

    /// Labels for any raw feature matrix
    pub fn predict_raw(&self, raw_features: &Array2<f64>) -> Array1<usize> {
        self.model.predict_rows(&self.scaler.transform(raw_features))
    }
}

/// Standardizes the raw RFM matrix and clusters it
#[derive(Debug, Clone, Default)]
pub struct ClusterAssigner {
    pub params: KMeansParams,
}

impl ClusterAssigner {
    pub fn new(params: KMeansParams) -> Self {
        Self { params }
    }

    pub fn fit(&self, raw_features: &Array2<f64>) -> crate::Result<FittedClusters> {
        let scaler = StandardScaler::fit(raw_features)?;
        let scaled = scaler.transform(raw_features);

        let n_samples = scaled.nrows();
        let dataset = DatasetBase::new(scaled.clone(), Array1::<usize>::zeros(n_samples));
        let model = self.params.fit(&dataset)?;

        log::info!(
            "Clustered {} customers into {} clusters (inertia {:.2})",
            n_samples,
            model.n_clusters,
            model.inertia
        );

        Ok(FittedClusters {
            scaler,
            model,
            scaled,
        })
    }
}

/// Predict the cluster of a raw RFM triple
pub fn predict_cluster(clusters: &FittedClusters, rfm_values: &[f64; 3]) -> crate::Result<usize> {
    clusters.predict(rfm_values)
}
