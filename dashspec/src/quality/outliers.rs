//! Outlier detection strategies.
//!
//! A detector looks at the non-null values of one numeric column and either
//! reports which of them are outliers or explains why it could not decide.
//! Declining is never an error: the engine logs the reason and leaves the
//! column untouched.
//!
//! Statistics only see the finite values. NaN is never an outlier; an
//! infinity always is.

use super::stats;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Result of running a detector over a column.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// Values outside `[lower, upper]` are outliers.
    Bounds { lower: f64, upper: f64 },
    /// Explicit per-value verdicts; `[lower, upper]` spans the inliers.
    Scored {
        lower: f64,
        upper: f64,
        outliers: Vec<bool>,
    },
    /// The detector declined.
    Skipped { reason: String },
}

impl Detection {
    /// Outlier verdict for each input value.
    pub fn mask(&self, values: &[f64]) -> Option<Vec<bool>> {
        match self {
            Detection::Bounds { lower, upper } => {
                Some(values.iter().map(|v| v < lower || v > upper).collect())
            }
            Detection::Scored { outliers, .. } => Some(outliers.clone()),
            Detection::Skipped { .. } => None,
        }
    }

    pub fn bounds(&self) -> Option<(f64, f64)> {
        match self {
            Detection::Bounds { lower, upper } | Detection::Scored { lower, upper, .. } => {
                Some((*lower, *upper))
            }
            Detection::Skipped { .. } => None,
        }
    }
}

/// Core trait for outlier detection strategies.
pub trait OutlierDetector: Send + Sync {
    /// Runs the detector over the non-null values of a column.
    fn detect(&self, values: &[f64]) -> Detection;

    /// Name reported in the data quality log.
    fn name(&self) -> &str;
}

fn too_few(values: &[f64], needed: usize) -> Option<Detection> {
    (values.len() < needed).then(|| Detection::Skipped {
        reason: format!("needs at least {needed} values, got {}", values.len()),
    })
}

/// Cuts at the `lower` and `upper` percentiles.
#[derive(Debug, Clone)]
pub struct PercentileDetector {
    /// Lower cut, in percent.
    pub lower: f64,
    /// Upper cut, in percent.
    pub upper: f64,
}

impl PercentileDetector {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }
}

impl OutlierDetector for PercentileDetector {
    fn detect(&self, values: &[f64]) -> Detection {
        let values = &stats::finite(values);
        if let Some(skipped) = too_few(values, 2) {
            return skipped;
        }
        let sorted = stats::sorted(values);
        match (
            stats::quantile_sorted(&sorted, self.lower / 100.0),
            stats::quantile_sorted(&sorted, self.upper / 100.0),
        ) {
            (Some(lower), Some(upper)) => Detection::Bounds { lower, upper },
            _ => Detection::Skipped {
                reason: "no values".to_string(),
            },
        }
    }

    fn name(&self) -> &str {
        "percentile"
    }
}

/// Flags values more than `threshold` standard deviations from the mean.
#[derive(Debug, Clone)]
pub struct ZScoreDetector {
    pub threshold: f64,
}

impl ZScoreDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl OutlierDetector for ZScoreDetector {
    fn detect(&self, values: &[f64]) -> Detection {
        let values = &stats::finite(values);
        if let Some(skipped) = too_few(values, 2) {
            return skipped;
        }
        let (Some(mean), Some(std_dev)) = (stats::mean(values), stats::sample_std(values)) else {
            return Detection::Skipped {
                reason: "no values".to_string(),
            };
        };

        // Can't calculate a z-score if the standard deviation is zero
        if std_dev == 0.0 {
            return Detection::Skipped {
                reason: format!("zero variance (every value is {mean})"),
            };
        }

        Detection::Bounds {
            lower: mean - self.threshold * std_dev,
            upper: mean + self.threshold * std_dev,
        }
    }

    fn name(&self) -> &str {
        "zscore"
    }
}

/// Tukey fences: `[Q1 − k·IQR, Q3 + k·IQR]`.
#[derive(Debug, Clone)]
pub struct IqrDetector {
    pub multiplier: f64,
}

impl IqrDetector {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }
}

impl OutlierDetector for IqrDetector {
    fn detect(&self, values: &[f64]) -> Detection {
        let values = &stats::finite(values);
        if let Some(skipped) = too_few(values, 2) {
            return skipped;
        }
        let sorted = stats::sorted(values);
        let (Some(q1), Some(q3)) = (
            stats::quantile_sorted(&sorted, 0.25),
            stats::quantile_sorted(&sorted, 0.75),
        ) else {
            return Detection::Skipped {
                reason: "no values".to_string(),
            };
        };
        let iqr = q3 - q1;
        Detection::Bounds {
            lower: q1 - self.multiplier * iqr,
            upper: q3 + self.multiplier * iqr,
        }
    }

    fn name(&self) -> &str {
        "iqr"
    }
}

/// Univariate isolation forest.
///
/// Each tree isolates a random subsample by splitting at uniform random points;
/// values that are isolated after few splits score high. The `contamination`
/// share of highest-scoring values are outliers. Randomness comes from a
/// seeded generator, so results are reproducible.
#[derive(Debug, Clone)]
pub struct IsolationForestDetector {
    pub contamination: f64,
    pub trees: usize,
    pub sample_size: usize,
    pub seed: u64,
}

enum Node {
    Leaf { size: usize },
    Split {
        at: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn grow(values: &mut [f64], depth: usize, limit: usize, rng: &mut StdRng) -> Node {
        if values.len() <= 1 || depth >= limit {
            return Node::Leaf { size: values.len() };
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if min >= max || !min.is_finite() || !max.is_finite() {
            return Node::Leaf { size: values.len() };
        }
        // interpolated so that `max - min` overflowing to infinity cannot matter
        let t: f64 = rng.random();
        let at = min * (1.0 - t) + max * t;
        let mut boundary = 0;
        for i in 0..values.len() {
            if values[i] < at {
                values.swap(i, boundary);
                boundary += 1;
            }
        }
        let (left, right) = values.split_at_mut(boundary);
        Node::Split {
            at,
            left: Box::new(Node::grow(left, depth + 1, limit, rng)),
            right: Box::new(Node::grow(right, depth + 1, limit, rng)),
        }
    }

    fn path_length(&self, value: f64, depth: usize) -> f64 {
        match self {
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
            Node::Split { at, left, right } => {
                if value < *at {
                    left.path_length(value, depth + 1)
                } else {
                    right.path_length(value, depth + 1)
                }
            }
        }
    }
}

/// Average path length of an unsuccessful search in a binary search tree of `n` nodes.
fn average_path_length(n: usize) -> f64 {
    const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

impl IsolationForestDetector {
    pub fn new(contamination: f64) -> Self {
        Self {
            contamination,
            trees: 100,
            sample_size: 256,
            seed: 42,
        }
    }

    pub fn with_trees(mut self, trees: usize) -> Self {
        self.trees = trees;
        self
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Anomaly score in `(0, 1]` for every value; higher is more isolated.
    pub fn scores(&self, values: &[f64]) -> Vec<f64> {
        let psi = self.sample_size.clamp(2, values.len().max(2)).min(values.len());
        let limit = (psi as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let forest: Vec<Node> = (0..self.trees.max(1))
            .map(|_| {
                let mut sample: Vec<f64> = rand::seq::index::sample(&mut rng, values.len(), psi)
                    .iter()
                    .map(|i| values[i])
                    .collect();
                Node::grow(&mut sample, 0, limit, &mut rng)
            })
            .collect();

        let normalizer = average_path_length(psi).max(f64::EPSILON);
        values
            .iter()
            .map(|v| {
                let mean_path = forest.iter().map(|t| t.path_length(*v, 0)).sum::<f64>()
                    / forest.len() as f64;
                2f64.powf(-mean_path / normalizer)
            })
            .collect()
    }
}

impl OutlierDetector for IsolationForestDetector {
    fn detect(&self, values: &[f64]) -> Detection {
        let finite = stats::finite(values);
        if let Some(skipped) = too_few(&finite, 2) {
            return skipped;
        }
        let scores = self.scores(&finite);
        let Some(cutoff) = stats::quantile(&scores, 1.0 - self.contamination) else {
            return Detection::Skipped {
                reason: "no values".to_string(),
            };
        };

        let mut scored = scores.iter().map(|s| *s > cutoff);
        let outliers: Vec<bool> = values
            .iter()
            .map(|v| {
                if v.is_finite() {
                    scored.next().unwrap_or(false)
                } else {
                    v.is_infinite()
                }
            })
            .collect();

        let inliers = values
            .iter()
            .zip(&outliers)
            .filter(|(v, out)| v.is_finite() && !**out)
            .map(|(v, _)| *v);
        let lower = inliers.clone().fold(f64::INFINITY, f64::min);
        let upper = inliers.fold(f64::NEG_INFINITY, f64::max);
        if !lower.is_finite() || !upper.is_finite() {
            return Detection::Skipped {
                reason: "every value scored as an outlier".to_string(),
            };
        }
        Detection::Scored {
            lower,
            upper,
            outliers,
        }
    }

    fn name(&self) -> &str {
        "isolation_forest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_bounds() {
        let values: Vec<f64> = (1..=101).map(f64::from).collect();
        let detection = PercentileDetector::new(5.0, 95.0).detect(&values);
        assert_eq!(detection.bounds(), Some((6.0, 96.0)));
        let mask = detection.mask(&values).unwrap();
        assert_eq!(mask.iter().filter(|m| **m).count(), 10);
    }

    #[test]
    fn test_zscore_skips_zero_variance() {
        let detection = ZScoreDetector::new(3.0).detect(&[4.0, 4.0, 4.0]);
        match detection {
            Detection::Skipped { reason } => assert!(reason.contains("zero variance")),
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn test_zscore_flags_far_values() {
        let mut values = vec![10.0; 20];
        values.extend([11.0, 9.0, 100.0]);
        let detection = ZScoreDetector::new(3.0).detect(&values);
        let mask = detection.mask(&values).unwrap();
        assert!(mask[values.len() - 1]);
        assert_eq!(mask.iter().filter(|m| **m).count(), 1);
    }

    #[test]
    fn test_iqr_fences() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 100.0];
        let detection = IqrDetector::new(1.5).detect(&values);
        let (lower, upper) = detection.bounds().unwrap();
        assert_eq!((lower, upper), (-3.0, 13.0));
        assert!(detection.mask(&values).unwrap()[8]);
    }

    #[test]
    fn test_single_value_is_skipped() {
        assert!(matches!(
            IqrDetector::new(1.5).detect(&[1.0]),
            Detection::Skipped { .. }
        ));
    }

    #[test]
    fn test_isolation_forest_isolates_extreme_value() {
        let mut values: Vec<f64> = (0..300).map(|i| f64::from(i % 50)).collect();
        values.push(10_000.0);
        let detector = IsolationForestDetector::new(0.05).with_trees(50);
        let detection = detector.detect(&values);
        let mask = detection.mask(&values).unwrap();
        assert!(mask[300]);
        assert!(mask.iter().filter(|m| **m).count() < values.len() / 2);

        // reproducible
        assert_eq!(detector.detect(&values), detection);
    }

    fn with_non_finite(mut values: Vec<f64>) -> Vec<f64> {
        values.extend([f64::NAN, f64::INFINITY, f64::NEG_INFINITY]);
        values
    }

    #[test]
    fn test_bound_detectors_ignore_non_finite() {
        let values = with_non_finite((1..=101).map(f64::from).collect());
        let detectors: Vec<Box<dyn OutlierDetector>> = vec![
            Box::new(PercentileDetector::new(5.0, 95.0)),
            Box::new(ZScoreDetector::new(3.0)),
            Box::new(IqrDetector::new(1.5)),
        ];
        for detector in detectors {
            let detection = detector.detect(&values);
            let (lower, upper) = detection.bounds().unwrap();
            assert!(lower.is_finite() && upper.is_finite(), "{}", detector.name());
            let mask = detection.mask(&values).unwrap();
            assert!(!mask[101], "{} flagged NaN", detector.name());
            assert!(mask[102] && mask[103], "{} missed an infinity", detector.name());
        }
        assert_eq!(
            PercentileDetector::new(5.0, 95.0).detect(&values).bounds(),
            Some((6.0, 96.0))
        );
    }

    #[test]
    fn test_percentile_with_every_third_value_nan() {
        let values: Vec<f64> = (0..200)
            .map(|i| if i % 3 == 0 { f64::NAN } else { f64::from(i) })
            .collect();
        let (lower, upper) = PercentileDetector::new(1.0, 99.0)
            .detect(&values)
            .bounds()
            .unwrap();
        assert!(lower >= 1.0 && upper <= 199.0);
        assert!(upper.is_finite());
    }

    #[test]
    fn test_only_non_finite_values_are_skipped() {
        let values = [f64::NAN, f64::INFINITY, f64::NAN];
        assert!(matches!(
            ZScoreDetector::new(3.0).detect(&values),
            Detection::Skipped { .. }
        ));
        assert!(matches!(
            IsolationForestDetector::new(0.1).detect(&values),
            Detection::Skipped { .. }
        ));
    }

    #[test]
    fn test_isolation_forest_survives_infinity() {
        let mut values: Vec<f64> = (0..300).map(f64::from).collect();
        values[7] = f64::INFINITY;
        values[8] = f64::NAN;
        let detection = IsolationForestDetector::new(0.05).with_trees(20).detect(&values);
        let mask = detection.mask(&values).unwrap();
        assert_eq!(mask.len(), values.len());
        assert!(mask[7]);
        assert!(!mask[8]);
        let (lower, upper) = detection.bounds().unwrap();
        assert!(lower.is_finite() && upper.is_finite());

        // infinities handed straight to the trees end in a leaf
        let scores = IsolationForestDetector::new(0.05)
            .with_trees(5)
            .scores(&[f64::NEG_INFINITY, 1.0, f64::INFINITY]);
        assert_eq!(scores.len(), 3);
    }

    #[test]
    fn test_isolation_forest_handles_extreme_spread() {
        let mut values: Vec<f64> = (0..300).map(f64::from).collect();
        values[0] = -f64::MAX;
        values[1] = f64::MAX;
        let detection = IsolationForestDetector::new(0.05).with_trees(10).detect(&values);
        assert!(detection.mask(&values).is_some());
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!(average_path_length(256) > average_path_length(16));
    }
}
