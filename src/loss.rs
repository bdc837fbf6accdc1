//! Softmax cross-entropy over a batch of logits.
//!
//! Used like:
//!
//! - run `model.forward_batch(...)` to get logits
//! - `softmax_cross_entropy_batch` writes `dL/dlogits` and returns the loss
//! - run `model.backward_batch(...)` and apply the optimizer
//!
//! All buffers are row-major `(rows, classes)`.

/// Numerically stable softmax of every row of `logits` into `probs`.
pub fn softmax_rows(logits: &[f32], classes: usize, probs: &mut [f32]) {
    assert!(classes > 0, "softmax requires at least 1 class");
    assert_eq!(
        logits.len(),
        probs.len(),
        "logits len {} does not match probs len {}",
        logits.len(),
        probs.len()
    );

    for (row, out) in logits
        .chunks_exact(classes)
        .zip(probs.chunks_exact_mut(classes))
    {
        let max = row_max(row);
        let mut sum = 0.0_f32;
        for (p, &x) in out.iter_mut().zip(row) {
            *p = (x - max).exp();
            sum += *p;
        }
        let inv = 1.0 / sum;
        for p in out.iter_mut() {
            *p *= inv;
        }
    }
}

/// Mean softmax cross-entropy over the batch.
///
/// Each row contributes `-Σ_k t_k · log softmax(z)_k`; the result is averaged
/// over rows. `d_logits` receives `(softmax(z) - t) / rows`.
///
/// Shape contract: `logits`, `targets`, `d_logits` all have `rows * classes`
/// elements.
pub fn softmax_cross_entropy_batch(
    logits: &[f32],
    targets: &[f32],
    classes: usize,
    d_logits: &mut [f32],
) -> f32 {
    assert_eq!(
        logits.len(),
        targets.len(),
        "logits len {} does not match targets len {}",
        logits.len(),
        targets.len()
    );

    let rows = logits.len() / classes.max(1);
    if rows == 0 {
        return 0.0;
    }

    // Softmax into d_logits, then turn it into a gradient in place.
    softmax_rows(logits, classes, d_logits);

    let inv_rows = 1.0 / rows as f32;
    let mut total = 0.0_f32;
    for ((z, t), d) in logits
        .chunks_exact(classes)
        .zip(targets.chunks_exact(classes))
        .zip(d_logits.chunks_exact_mut(classes))
    {
        let lse = log_sum_exp(z);
        for k in 0..classes {
            if t[k] != 0.0 {
                total -= t[k] * (z[k] - lse);
            }
            d[k] = (d[k] - t[k]) * inv_rows;
        }
    }

    total * inv_rows
}

/// Mean softmax cross-entropy without a gradient.
pub fn softmax_cross_entropy(logits: &[f32], targets: &[f32], classes: usize) -> f32 {
    assert_eq!(
        logits.len(),
        targets.len(),
        "logits len {} does not match targets len {}",
        logits.len(),
        targets.len()
    );
    let rows = logits.len() / classes.max(1);
    if rows == 0 {
        return 0.0;
    }

    let mut total = 0.0_f32;
    for (z, t) in logits.chunks_exact(classes).zip(targets.chunks_exact(classes)) {
        let lse = log_sum_exp(z);
        for k in 0..classes {
            if t[k] != 0.0 {
                total -= t[k] * (z[k] - lse);
            }
        }
    }
    total / rows as f32
}

#[inline]
fn row_max(xs: &[f32]) -> f32 {
    xs.iter().copied().fold(f32::NEG_INFINITY, f32::max)
}

#[inline]
fn log_sum_exp(xs: &[f32]) -> f32 {
    let max = row_max(xs);
    let sum: f32 = xs.iter().map(|&x| (x - max).exp()).sum();
    max + sum.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_rows_sum_to_one_and_survive_large_logits() {
        let logits = [1000.0_f32, 1001.0, 999.0, -5.0, 0.0, 5.0];
        let mut probs = [0.0_f32; 6];
        softmax_rows(&logits, 3, &mut probs);
        for row in probs.chunks_exact(3) {
            assert!(row.iter().all(|p| p.is_finite()));
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        }
        assert!(probs[1] > probs[0] && probs[0] > probs[2]);
    }

    #[test]
    fn uniform_logits_give_ln_k() {
        let logits = [0.0_f32; 8];
        let targets = [1.0_f32, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        let loss = softmax_cross_entropy(&logits, &targets, 4);
        assert!((loss - 4.0_f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn batch_gradient_is_softmax_minus_target_over_rows() {
        let logits = [0.0_f32, 0.0, 0.0, 0.0];
        let targets = [1.0_f32, 0.0, 0.0, 1.0];
        let mut d = [0.0_f32; 4];
        let loss = softmax_cross_entropy_batch(&logits, &targets, 2, &mut d);

        assert!((loss - std::f32::consts::LN_2).abs() < 1e-6);
        assert_eq!(d, [-0.25, 0.25, 0.25, -0.25]);
        assert!((softmax_cross_entropy(&logits, &targets, 2) - loss).abs() < 1e-7);
    }

    #[test]
    fn correct_class_has_lower_loss() {
        let target = [1.0_f32, 0.0, 0.0];
        let good = softmax_cross_entropy(&[5.0, 0.0, -1.0], &target, 3);
        let bad = softmax_cross_entropy(&[-1.0, 0.0, 5.0], &target, 3);
        assert!(good < bad);
    }
}
