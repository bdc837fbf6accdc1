//! Metrics.
//!
//! Metrics are evaluation helpers (they do not participate in backprop):
//! argmax accuracy for the classifier, and summary statistics of a tensor
//! for the summary writer.

use serde::Serialize;

/// Number of equal-width buckets in a [`Histogram`].
pub const HISTOGRAM_BUCKETS: usize = 30;

/// Index of the largest value; ties resolve to the first maximum.
///
/// Returns 0 for an empty slice.
#[inline]
pub fn argmax(xs: &[f32]) -> usize {
    let mut best = 0;
    for (i, &x) in xs.iter().enumerate().skip(1) {
        if x > xs[best] {
            best = i;
        }
    }
    best
}

/// Fraction of rows where `argmax(predictions) == argmax(targets)`.
///
/// Both buffers are row-major `(rows, classes)`. Returns 0 for an empty batch.
pub fn accuracy(predictions: &[f32], targets: &[f32], classes: usize) -> f32 {
    assert_eq!(
        predictions.len(),
        targets.len(),
        "predictions len {} does not match targets len {}",
        predictions.len(),
        targets.len()
    );
    if classes == 0 || predictions.is_empty() {
        return 0.0;
    }

    let rows = predictions.len() / classes;
    let correct = predictions
        .chunks_exact(classes)
        .zip(targets.chunks_exact(classes))
        .filter(|(p, t)| argmax(p) == argmax(t))
        .count();
    correct as f32 / rows as f32
}

/// Mean, standard deviation, extrema and histogram of a tensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableStats {
    pub mean: f32,
    pub stddev: f32,
    pub min: f32,
    pub max: f32,
    pub histogram: Histogram,
}

impl VariableStats {
    pub fn of(values: &[f32]) -> Self {
        let n = values.len().max(1) as f64;
        let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
        let var = values
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        let histogram = Histogram::of(values);

        Self {
            mean: mean as f32,
            stddev: var.sqrt() as f32,
            min: histogram.min as f32,
            max: histogram.max as f32,
            histogram,
        }
    }
}

/// Bucketed distribution of a tensor's values.
///
/// `bucket_limits[i]` is the right edge of bucket `i`; the last limit equals
/// `max`. An empty tensor yields zero counts and no buckets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub min: f64,
    pub max: f64,
    pub num: u64,
    pub sum: f64,
    pub sum_squares: f64,
    pub bucket_limits: Vec<f64>,
    pub buckets: Vec<u64>,
}

impl Histogram {
    pub fn of(values: &[f32]) -> Self {
        if values.is_empty() {
            return Self {
                min: 0.0,
                max: 0.0,
                num: 0,
                sum: 0.0,
                sum_squares: 0.0,
                bucket_limits: Vec::new(),
                buckets: Vec::new(),
            };
        }

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut sum_squares = 0.0;
        for &v in values {
            let v = v as f64;
            min = min.min(v);
            max = max.max(v);
            sum += v;
            sum_squares += v * v;
        }

        let width = (max - min) / HISTOGRAM_BUCKETS as f64;
        let mut buckets = vec![0_u64; HISTOGRAM_BUCKETS];
        for &v in values {
            let idx = if width > 0.0 {
                (((v as f64 - min) / width) as usize).min(HISTOGRAM_BUCKETS - 1)
            } else {
                HISTOGRAM_BUCKETS - 1
            };
            buckets[idx] += 1;
        }
        let bucket_limits = (1..=HISTOGRAM_BUCKETS)
            .map(|i| {
                if i == HISTOGRAM_BUCKETS {
                    max
                } else {
                    min + width * i as f64
                }
            })
            .collect();

        Self {
            min,
            max,
            num: values.len() as u64,
            sum,
            sum_squares,
            bucket_limits,
            buckets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_prefers_first_of_ties() {
        assert_eq!(argmax(&[0.2, 0.5, 0.5, 0.1]), 1);
        assert_eq!(argmax(&[1.0, 1.0]), 0);
        assert_eq!(argmax(&[]), 0);
    }

    #[test]
    fn accuracy_counts_matching_rows() {
        let preds = [0.9_f32, 0.1, 0.3, 0.7, 0.6, 0.4];
        let targets = [1.0_f32, 0.0, 1.0, 0.0, 1.0, 0.0];
        let acc = accuracy(&preds, &targets, 2);
        assert!((acc - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn stats_of_known_values() {
        let stats = VariableStats::of(&[1.0, 2.0, 3.0, 4.0]);
        assert!((stats.mean - 2.5).abs() < 1e-6);
        assert!((stats.stddev - 1.25_f32.sqrt()).abs() < 1e-6);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.histogram.num, 4);
        assert_eq!(stats.histogram.buckets.iter().sum::<u64>(), 4);
        assert_eq!(stats.histogram.buckets.len(), HISTOGRAM_BUCKETS);
        assert_eq!(*stats.histogram.bucket_limits.last().unwrap(), 4.0);
    }

    #[test]
    fn constant_tensor_lands_in_one_bucket() {
        let h = Histogram::of(&[0.1; 5]);
        assert_eq!(h.buckets.iter().filter(|&&c| c > 0).count(), 1);
        assert_eq!(h.buckets.iter().sum::<u64>(), 5);
    }
}
