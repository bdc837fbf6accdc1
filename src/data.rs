//! Contiguous dataset helpers.
//!
//! The training loop operates on slices to avoid per-step allocations.
//! `Dataset` provides validated, row-major storage for a feature matrix plus
//! one `u8` class label per sample; `Batch` is a borrowed contiguous window
//! of it.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::{Error, Result};

/// A labelled classification dataset.
///
/// Stored as contiguous buffers:
/// - `features.len() == len * num_features` (row-major)
/// - `labels.len() == len`
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Vec<f32>,
    labels: Vec<u8>,
    num_features: usize,
}

/// A contiguous minibatch borrowed from a [`Dataset`].
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub offset: usize,
    pub features: &'a [f32],
    pub labels: &'a [u8],
}

impl Batch<'_> {
    /// Number of samples in the batch.
    #[inline]
    pub fn rows(&self) -> usize {
        self.labels.len()
    }
}

impl Dataset {
    /// Build a dataset from a flat feature buffer with shape `(len, num_features)`.
    pub fn from_flat(features: Vec<f32>, labels: Vec<u8>, num_features: usize) -> Result<Self> {
        if num_features == 0 {
            return Err(Error::InvalidData("num_features must be > 0".to_owned()));
        }
        if features.len() != labels.len() * num_features {
            return Err(Error::InvalidData(format!(
                "features length {} does not match labels * num_features ({} * {num_features})",
                features.len(),
                labels.len()
            )));
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "features must contain only finite values".to_owned(),
            ));
        }

        Ok(Self {
            features,
            labels,
            num_features,
        })
    }

    /// Build a dataset from per-sample rows.
    ///
    /// This is a convenience constructor (it copies into contiguous storage).
    pub fn from_rows(rows: &[Vec<f32>], labels: &[u8]) -> Result<Self> {
        if rows.len() != labels.len() {
            return Err(Error::InvalidData(format!(
                "rows/labels length mismatch: {} vs {}",
                rows.len(),
                labels.len()
            )));
        }
        let num_features = rows.first().map(|r| r.len()).unwrap_or(0);
        if num_features == 0 {
            return Err(Error::InvalidData("num_features must be > 0".to_owned()));
        }

        let mut features = Vec::with_capacity(rows.len() * num_features);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != num_features {
                return Err(Error::InvalidData(format!(
                    "row {i} has len {}, expected {num_features}",
                    row.len()
                )));
            }
            features.extend_from_slice(row);
        }

        Self::from_flat(features, labels.to_vec(), num_features)
    }

    #[inline]
    /// Returns the number of samples.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    /// Returns true if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    #[inline]
    pub fn features(&self) -> &[f32] {
        &self.features
    }

    #[inline]
    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Ensure every label is a valid class index for `num_classes` classes.
    pub fn check_labels(&self, num_classes: usize) -> Result<()> {
        if let Some((i, &label)) = self
            .labels
            .iter()
            .enumerate()
            .find(|&(_, &l)| l as usize >= num_classes)
        {
            return Err(Error::InvalidData(format!(
                "label {label} at sample {i} is out of range for {num_classes} classes"
            )));
        }
        Ok(())
    }

    /// The window `[offset, offset + batch_size)`, truncated at the end of the data.
    ///
    /// Panics if `offset > len`.
    pub fn batch(&self, offset: usize, batch_size: usize) -> Batch<'_> {
        assert!(
            offset <= self.len(),
            "batch offset {offset} is past the end of a dataset of {} samples",
            self.len()
        );
        let end = offset.saturating_add(batch_size).min(self.len());
        Batch {
            offset,
            features: &self.features[offset * self.num_features..end * self.num_features],
            labels: &self.labels[offset..end],
        }
    }

    /// The batch used at `step` when cycling through the data with a fixed stride.
    ///
    /// `offset = (step * batch_size) % len`.
    pub fn batch_at_step(&self, step: usize, batch_size: usize) -> Batch<'_> {
        self.batch(step_offset(step, batch_size, self.len()), batch_size)
    }
}

/// `(step * batch_size) % len`, or 0 for an empty dataset.
#[inline]
pub fn step_offset(step: usize, batch_size: usize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    ((step % len) * (batch_size % len)) % len
}

/// Number of optimisation steps for `num_epochs` passes: `num_epochs * len / batch_size`.
#[inline]
pub fn num_steps(num_epochs: usize, len: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    num_epochs.saturating_mul(len) / batch_size
}

/// Write the one-hot encoding of `labels` into `out` (shape `(labels.len(), num_classes)`).
pub fn one_hot_into(labels: &[u8], num_classes: usize, out: &mut [f32]) -> Result<()> {
    if out.len() != labels.len() * num_classes {
        return Err(Error::InvalidShape(format!(
            "one-hot buffer len {} does not match labels * num_classes ({} * {num_classes})",
            out.len(),
            labels.len()
        )));
    }
    out.fill(0.0);
    for (row, &label) in out.chunks_exact_mut(num_classes.max(1)).zip(labels) {
        let idx = label as usize;
        if idx >= num_classes {
            return Err(Error::InvalidData(format!(
                "label {label} is out of range for {num_classes} classes"
            )));
        }
        row[idx] = 1.0;
    }
    Ok(())
}

/// Allocating variant of [`one_hot_into`].
pub fn one_hot(labels: &[u8], num_classes: usize) -> Result<Vec<f32>> {
    let mut out = vec![0.0; labels.len() * num_classes];
    one_hot_into(labels, num_classes, &mut out)?;
    Ok(out)
}

/// Synthetic dataset: one isotropic Gaussian blob per class.
///
/// Class `c` is centred at `3 * e_(c mod num_features)`, shifted by
/// `c / num_features` along every axis so classes stay distinct when there
/// are more classes than features. Labels cycle `0, 1, ..., num_classes - 1`.
pub fn gaussian_blobs(
    len: usize,
    num_features: usize,
    num_classes: usize,
    spread: f32,
    seed: u64,
) -> Result<Dataset> {
    if num_classes == 0 || num_classes > 256 {
        return Err(Error::InvalidConfig(format!(
            "num_classes must be in 1..=256, got {num_classes}"
        )));
    }
    let noise = Normal::new(0.0_f32, spread)
        .map_err(|e| Error::InvalidConfig(format!("invalid blob spread {spread}: {e}")))?;
    let mut rng = StdRng::seed_from_u64(seed);

    let mut features = Vec::with_capacity(len * num_features);
    let mut labels = Vec::with_capacity(len);
    for i in 0..len {
        let class = i % num_classes;
        let shift = (class / num_features.max(1)) as f32;
        for f in 0..num_features {
            let centre = if f == class % num_features { 3.0 } else { 0.0 } + shift;
            features.push(centre + noise.sample(&mut rng));
        }
        labels.push(class as u8);
    }
    Dataset::from_flat(features, labels, num_features)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn five_samples() -> Dataset {
        let features = (0..10).map(|v| v as f32).collect();
        Dataset::from_flat(features, vec![0, 1, 2, 1, 0], 2).unwrap()
    }

    #[test]
    fn from_flat_validates_shapes() {
        assert!(Dataset::from_flat(vec![0.0, 1.0, 2.0, 3.0], vec![0, 1], 2).is_ok());
        assert!(Dataset::from_flat(vec![0.0, 1.0, 2.0], vec![0], 2).is_err());
        assert!(Dataset::from_flat(vec![f32::NAN, 1.0], vec![0], 2).is_err());
        assert!(Dataset::from_rows(&[vec![1.0], vec![1.0, 2.0]], &[0, 1]).is_err());
    }

    #[test]
    fn last_batch_is_truncated() {
        let ds = five_samples();
        let b = ds.batch(4, 2);
        assert_eq!(b.rows(), 1);
        assert_eq!(b.features, &[8.0_f32, 9.0]);
        assert_eq!(b.labels, &[0_u8]);
    }

    #[test]
    fn step_offsets_wrap_around_the_data() {
        let ds = five_samples();
        let offsets: Vec<usize> = (0..6).map(|s| ds.batch_at_step(s, 2).offset).collect();
        assert_eq!(offsets, vec![0, 2, 4, 1, 3, 0]);
        assert_eq!(num_steps(3, 5, 2), 7);
        assert_eq!(num_steps(1, 5, 8), 0);
    }

    #[test]
    fn one_hot_marks_label_column() {
        let oh = one_hot(&[2, 0], 3).unwrap();
        assert_eq!(oh, vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
        assert!(one_hot(&[3], 3).is_err());
    }

    #[test]
    fn check_labels_reports_out_of_range() {
        let ds = five_samples();
        assert!(ds.check_labels(3).is_ok());
        let err = ds.check_labels(2).unwrap_err();
        assert!(err.to_string().contains("label 2"));
    }

    #[test]
    fn blobs_are_labelled_round_robin() {
        let ds = gaussian_blobs(9, 4, 3, 0.1, 1).unwrap();
        assert_eq!(ds.len(), 9);
        assert_eq!(ds.num_features(), 4);
        assert_eq!(&ds.labels()[..4], &[0_u8, 1, 2, 0]);
        // Sample 1 belongs to class 1, whose centre sits on feature 1.
        let row = &ds.features()[4..8];
        assert!(row[1] > 2.0 && row[0].abs() < 1.0);
        assert!(gaussian_blobs(4, 2, 0, 0.1, 1).is_err());
    }
}
