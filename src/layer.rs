use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::matmul::{View, gemm};
use crate::{Activation, Error, Result};

/// Constant every bias starts from.
pub const DEFAULT_BIAS: f32 = 0.1;

/// Standard deviation of the weight initializer.
pub const DEFAULT_WEIGHT_STDDEV: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
/// Weight initialization scheme.
pub enum Init {
    /// Zero-mean normal distribution.
    Normal { stddev: f32 },
    /// All zeros. Mostly useful in tests.
    Zeros,
}

impl Default for Init {
    fn default() -> Self {
        Init::Normal {
            stddev: DEFAULT_WEIGHT_STDDEV,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Layer {
    in_dim: usize,
    out_dim: usize,
    activation: Activation,
    /// Row-major matrix with shape (out_dim, in_dim).
    weights: Vec<f32>,
    biases: Vec<f32>,
}

impl Layer {
    pub fn new_with_rng<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        init: Init,
        bias: f32,
        activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }
        if !bias.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "initial bias must be finite, got {bias}"
            )));
        }

        let len = weight_len(in_dim, out_dim)?;
        let weights = match init {
            Init::Normal { stddev } => {
                let dist = Normal::new(0.0_f32, stddev).map_err(|e| {
                    Error::InvalidConfig(format!("invalid weight stddev {stddev}: {e}"))
                })?;
                (0..len).map(|_| dist.sample(rng)).collect()
            }
            Init::Zeros => vec![0.0; len],
        };

        Ok(Self {
            in_dim,
            out_dim,
            activation,
            weights,
            biases: vec![bias; out_dim],
        })
    }

    /// Build a layer from explicit parameters.
    ///
    /// Validates shapes and that every parameter is finite.
    pub fn from_parts(
        in_dim: usize,
        out_dim: usize,
        activation: Activation,
        weights: Vec<f32>,
        biases: Vec<f32>,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidShape(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }
        let expected = weight_len(in_dim, out_dim)?;
        if weights.len() != expected {
            return Err(Error::InvalidShape(format!(
                "weights length {} does not match out_dim * in_dim ({out_dim} * {in_dim})",
                weights.len()
            )));
        }
        if biases.len() != out_dim {
            return Err(Error::InvalidShape(format!(
                "biases length {} does not match out_dim {out_dim}",
                biases.len()
            )));
        }
        if weights.iter().chain(&biases).any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "layer parameters must be finite".to_owned(),
            ));
        }

        Ok(Self {
            in_dim,
            out_dim,
            activation,
            weights,
            biases,
        })
    }

    #[inline]
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[inline]
    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    #[inline]
    pub fn weights_mut(&mut self) -> &mut [f32] {
        &mut self.weights
    }

    #[inline]
    pub fn biases_mut(&mut self) -> &mut [f32] {
        &mut self.biases
    }

    /// Forward pass for a batch of `rows` samples.
    ///
    /// Computes `outputs = activation(inputs · Wᵀ + b)`.
    ///
    /// Shape contract:
    /// - `inputs.len() == rows * self.in_dim`
    /// - `outputs.len() == rows * self.out_dim`
    pub fn forward_batch(&self, inputs: &[f32], rows: usize, outputs: &mut [f32]) {
        debug_assert_eq!(inputs.len(), rows * self.in_dim);
        debug_assert_eq!(outputs.len(), rows * self.out_dim);

        gemm(
            rows,
            self.out_dim,
            self.in_dim,
            View::row_major(inputs, self.in_dim),
            View::transposed(&self.weights, self.in_dim),
            0.0,
            outputs,
        );

        for row in outputs.chunks_exact_mut(self.out_dim) {
            for (v, &b) in row.iter_mut().zip(&self.biases) {
                *v = self.activation.forward(*v + b);
            }
        }
    }

    /// Backward pass for a batch of `rows` samples.
    ///
    /// `d_outputs` holds `dL/d(outputs)` on entry and is turned into `dL/dz` in
    /// place. Weight and bias gradients are overwritten with the sums over the
    /// batch. `d_inputs` is filled only when provided (the first layer has no
    /// use for it).
    ///
    /// Shape contract:
    /// - `inputs.len() == rows * self.in_dim`
    /// - `outputs.len() == d_outputs.len() == rows * self.out_dim`
    /// - `d_weights.len() == self.weights.len()`, `d_biases.len() == self.out_dim`
    #[allow(clippy::too_many_arguments)]
    pub fn backward_batch(
        &self,
        inputs: &[f32],
        outputs: &[f32],
        rows: usize,
        d_outputs: &mut [f32],
        d_inputs: Option<&mut [f32]>,
        d_weights: &mut [f32],
        d_biases: &mut [f32],
    ) {
        debug_assert_eq!(inputs.len(), rows * self.in_dim);
        debug_assert_eq!(outputs.len(), rows * self.out_dim);
        debug_assert_eq!(d_outputs.len(), rows * self.out_dim);
        debug_assert_eq!(d_weights.len(), self.weights.len());
        debug_assert_eq!(d_biases.len(), self.out_dim);

        for (d, &y) in d_outputs.iter_mut().zip(outputs) {
            *d *= self.activation.grad_from_output(y);
        }

        d_biases.fill(0.0);
        for row in d_outputs.chunks_exact(self.out_dim) {
            for (db, &dz) in d_biases.iter_mut().zip(row) {
                *db += dz;
            }
        }

        // dW = dZᵀ · X
        gemm(
            self.out_dim,
            self.in_dim,
            rows,
            View::transposed(d_outputs, self.out_dim),
            View::row_major(inputs, self.in_dim),
            0.0,
            d_weights,
        );

        if let Some(d_inputs) = d_inputs {
            debug_assert_eq!(d_inputs.len(), rows * self.in_dim);
            // dX = dZ · W
            gemm(
                rows,
                self.in_dim,
                self.out_dim,
                View::row_major(d_outputs, self.out_dim),
                View::row_major(&self.weights, self.in_dim),
                0.0,
                d_inputs,
            );
        }
    }

    /// `param -= lr * grad` for every weight and bias.
    #[inline]
    pub fn sgd_step(&mut self, d_weights: &[f32], d_biases: &[f32], lr: f32) {
        debug_assert_eq!(d_weights.len(), self.weights.len());
        debug_assert_eq!(d_biases.len(), self.biases.len());

        for (w, &g) in self.weights.iter_mut().zip(d_weights) {
            *w -= lr * g;
        }
        for (b, &g) in self.biases.iter_mut().zip(d_biases) {
            *b -= lr * g;
        }
    }
}

/// `in_dim * out_dim`, or `InvalidShape` if it does not fit in `usize`.
fn weight_len(in_dim: usize, out_dim: usize) -> Result<usize> {
    in_dim.checked_mul(out_dim).ok_or_else(|| {
        Error::InvalidShape(format!(
            "layer weight shape overflow: out_dim {out_dim} * in_dim {in_dim}"
        ))
    })
}
