//! Per-step label dumps.
//!
//! Each evaluation step stores its softmax predictions next to the one-hot
//! actual labels as one `(rows, 2 * num_classes)` float64 array, so the two
//! halves can be split back apart column-wise.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, npy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Which pass produced a set of predictions.
pub enum Phase {
    Training,
    Validation,
    Testing,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Training => "training",
            Phase::Validation => "validation",
            Phase::Testing => "testing",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `<result_path>/<phase>-mlp-<step>.npy`
pub fn labels_path(result_path: &Path, phase: Phase, step: usize) -> PathBuf {
    result_path.join(format!("{phase}-mlp-{step}.npy"))
}

/// Save predicted and actual labels for one step.
///
/// `predictions` and `actual` are row-major `(rows, num_classes)`. The
/// result directory is created on demand. Returns the written file path.
pub fn save_labels(
    predictions: &[f32],
    actual: &[f32],
    num_classes: usize,
    result_path: &Path,
    phase: Phase,
    step: usize,
) -> Result<PathBuf> {
    if num_classes == 0 {
        return Err(Error::InvalidShape("num_classes must be > 0".to_owned()));
    }
    if predictions.len() != actual.len() || predictions.len() % num_classes != 0 {
        return Err(Error::InvalidShape(format!(
            "predictions len {} and actual len {} must both be rows * {num_classes}",
            predictions.len(),
            actual.len()
        )));
    }

    fs::create_dir_all(result_path).map_err(|e| Error::io(result_path, e))?;

    let rows = predictions.len() / num_classes;
    let cols = 2 * num_classes;
    let mut labels = Vec::with_capacity(rows * cols);
    for (p, a) in predictions
        .chunks_exact(num_classes)
        .zip(actual.chunks_exact(num_classes))
    {
        labels.extend(p.iter().map(|&v| v as f64));
        labels.extend(a.iter().map(|&v| v as f64));
    }

    let path = labels_path(result_path, phase, step);
    npy::save_f64_2d(&path, rows, cols, &labels)?;
    debug!("saved {rows}x{cols} labels to {}", path.display());
    Ok(path)
}
