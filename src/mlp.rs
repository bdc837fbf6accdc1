use crate::Layer;

#[derive(Debug, Clone)]
pub struct Mlp {
    layers: Vec<Layer>,
}

/// Reusable buffers for `Mlp::forward_batch`.
///
/// Sized for at most `max_rows` samples; smaller batches use a prefix of each
/// buffer. The logits of the most recent forward pass live inside the scratch.
#[derive(Debug, Clone)]
pub struct BatchScratch {
    max_rows: usize,
    rows: usize,
    layer_outputs: Vec<Vec<f32>>,
}

/// Parameter gradients for an `Mlp` (overwrite semantics).
///
/// Allocate once via `Mlp::gradients()` and reuse across training steps.
#[derive(Debug, Clone)]
pub struct Gradients {
    max_rows: usize,
    d_weights: Vec<Vec<f32>>,
    d_biases: Vec<Vec<f32>>,

    // Backprop intermediate: gradient w.r.t each layer output, batch-major.
    // The last entry is where the loss writes dL/dlogits.
    d_layer_outputs: Vec<Vec<f32>>,
}

impl Mlp {
    /// Assemble a model from already-built layers.
    ///
    /// Panics if `layers` is empty or adjacent dims do not chain.
    pub fn from_layers(layers: Vec<Layer>) -> Self {
        assert!(!layers.is_empty(), "mlp must have at least one layer");
        for pair in layers.windows(2) {
            assert_eq!(
                pair[0].out_dim(),
                pair[1].in_dim(),
                "layer out_dim {} does not match next in_dim {}",
                pair[0].out_dim(),
                pair[1].in_dim()
            );
        }
        Self { layers }
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.layers[0].in_dim()
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].out_dim()
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    #[inline]
    pub fn layer(&self, idx: usize) -> Option<&Layer> {
        self.layers.get(idx)
    }

    #[inline]
    pub fn layer_mut(&mut self, idx: usize) -> Option<&mut Layer> {
        self.layers.get_mut(idx)
    }

    /// Total number of trainable scalars.
    pub fn param_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.weights().len() + l.biases().len())
            .sum()
    }

    pub fn batch_scratch(&self, max_rows: usize) -> BatchScratch {
        BatchScratch::new(self, max_rows)
    }

    pub fn gradients(&self, max_rows: usize) -> Gradients {
        Gradients::new(self, max_rows)
    }

    /// Forward pass for `rows` samples stored row-major in `inputs`.
    ///
    /// Writes intermediate activations into `scratch` and returns the logits,
    /// shape `(rows, output_dim)`.
    ///
    /// Shape contract:
    /// - `inputs.len() == rows * self.input_dim()`
    /// - `rows <= scratch.max_rows()` and `scratch` was built for this model
    pub fn forward_batch<'a>(
        &self,
        inputs: &[f32],
        rows: usize,
        scratch: &'a mut BatchScratch,
    ) -> &'a [f32] {
        assert_eq!(
            inputs.len(),
            rows * self.input_dim(),
            "inputs len {} does not match rows * input_dim ({rows} * {})",
            inputs.len(),
            self.input_dim()
        );
        assert!(
            rows <= scratch.max_rows,
            "batch of {rows} rows exceeds scratch capacity {}",
            scratch.max_rows
        );
        assert_eq!(
            scratch.layer_outputs.len(),
            self.layers.len(),
            "scratch has {} layer outputs, model has {} layers",
            scratch.layer_outputs.len(),
            self.layers.len()
        );

        scratch.rows = rows;
        for (idx, layer) in self.layers.iter().enumerate() {
            let out_len = rows * layer.out_dim();
            if idx == 0 {
                layer.forward_batch(inputs, rows, &mut scratch.layer_outputs[0][..out_len]);
            } else {
                let (left, right) = scratch.layer_outputs.split_at_mut(idx);
                let prev = &left[idx - 1][..rows * layer.in_dim()];
                layer.forward_batch(prev, rows, &mut right[0][..out_len]);
            }
        }

        scratch.output()
    }

    /// Backward pass for the batch last run through `forward_batch`.
    ///
    /// Before calling this, write `dL/dlogits` into `grads.d_output_mut(rows)`.
    /// Afterwards `grads` holds the parameter gradients for this batch.
    pub fn backward_batch(
        &self,
        inputs: &[f32],
        rows: usize,
        scratch: &BatchScratch,
        grads: &mut Gradients,
    ) {
        assert_eq!(
            scratch.rows, rows,
            "scratch holds a forward pass of {} rows, backward asked for {rows}",
            scratch.rows
        );
        assert_eq!(
            inputs.len(),
            rows * self.input_dim(),
            "inputs len {} does not match rows * input_dim ({rows} * {})",
            inputs.len(),
            self.input_dim()
        );
        assert!(
            rows <= grads.max_rows,
            "batch of {rows} rows exceeds gradient capacity {}",
            grads.max_rows
        );
        assert_eq!(
            grads.d_weights.len(),
            self.layers.len(),
            "grads has {} d_weights entries, model has {} layers",
            grads.d_weights.len(),
            self.layers.len()
        );

        for idx in (0..self.layers.len()).rev() {
            let layer = &self.layers[idx];
            let out_len = rows * layer.out_dim();
            let in_len = rows * layer.in_dim();

            let layer_input: &[f32] = if idx == 0 {
                inputs
            } else {
                &scratch.layer_outputs[idx - 1][..in_len]
            };
            let layer_output = &scratch.layer_outputs[idx][..out_len];

            // `d_outputs` of this layer and `d_inputs` (= previous layer's
            // `d_outputs`) live in neighbouring buffers.
            let (left, right) = grads.d_layer_outputs.split_at_mut(idx);
            let d_outputs = &mut right[0][..out_len];
            let d_inputs = if idx == 0 {
                None
            } else {
                Some(&mut left[idx - 1][..in_len])
            };

            layer.backward_batch(
                layer_input,
                layer_output,
                rows,
                d_outputs,
                d_inputs,
                &mut grads.d_weights[idx],
                &mut grads.d_biases[idx],
            );
        }
    }

    /// Applies a gradient-descent update to all layers.
    #[inline]
    pub fn sgd_step(&mut self, grads: &Gradients, lr: f32) {
        assert!(
            lr.is_finite() && lr > 0.0,
            "learning rate must be finite and > 0"
        );
        assert_eq!(
            self.layers.len(),
            grads.d_weights.len(),
            "grads has {} d_weights entries, model has {} layers",
            grads.d_weights.len(),
            self.layers.len()
        );

        for (i, layer) in self.layers.iter_mut().enumerate() {
            layer.sgd_step(&grads.d_weights[i], &grads.d_biases[i], lr);
        }
    }
}

impl BatchScratch {
    pub fn new(mlp: &Mlp, max_rows: usize) -> Self {
        let layer_outputs = mlp
            .layers
            .iter()
            .map(|layer| vec![0.0; max_rows * layer.out_dim()])
            .collect();
        Self {
            max_rows,
            rows: 0,
            layer_outputs,
        }
    }

    #[inline]
    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Logits of the most recent forward pass, shape `(rows, output_dim)`.
    #[inline]
    pub fn output(&self) -> &[f32] {
        let last = &self.layer_outputs[self.layer_outputs.len() - 1];
        let width = last.len() / self.max_rows.max(1);
        &last[..self.rows * width]
    }
}

impl Gradients {
    pub fn new(mlp: &Mlp, max_rows: usize) -> Self {
        let n = mlp.layers.len();
        let mut d_weights = Vec::with_capacity(n);
        let mut d_biases = Vec::with_capacity(n);
        let mut d_layer_outputs = Vec::with_capacity(n);

        for layer in &mlp.layers {
            d_weights.push(vec![0.0; layer.in_dim() * layer.out_dim()]);
            d_biases.push(vec![0.0; layer.out_dim()]);
            d_layer_outputs.push(vec![0.0; max_rows * layer.out_dim()]);
        }

        Self {
            max_rows,
            d_weights,
            d_biases,
            d_layer_outputs,
        }
    }

    /// Mutable view of the upstream gradient buffer for the logits of a
    /// `rows`-sample batch.
    ///
    /// Typical training flow:
    /// - `mlp.forward_batch(inputs, rows, &mut scratch)`
    /// - the loss writes `dL/dlogits` into `grads.d_output_mut(rows)`
    /// - `mlp.backward_batch(inputs, rows, &scratch, &mut grads)`
    #[inline]
    pub fn d_output_mut(&mut self, rows: usize) -> &mut [f32] {
        let last = self.d_layer_outputs.len() - 1;
        let buf = &mut self.d_layer_outputs[last];
        let width = buf.len() / self.max_rows.max(1);
        &mut buf[..rows * width]
    }

    #[inline]
    pub fn d_weights(&self, layer_idx: usize) -> &[f32] {
        &self.d_weights[layer_idx]
    }

    #[inline]
    pub fn d_biases(&self, layer_idx: usize) -> &[f32] {
        &self.d_biases[layer_idx]
    }

    #[inline]
    pub fn d_weights_mut(&mut self, layer_idx: usize) -> &mut [f32] {
        &mut self.d_weights[layer_idx]
    }

    #[inline]
    pub fn d_biases_mut(&mut self, layer_idx: usize) -> &mut [f32] {
        &mut self.d_biases[layer_idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::softmax_cross_entropy_batch;
    use crate::{Activation, MlpBuilder};

    fn small_mlp() -> Mlp {
        // Wide weights and a large bias keep every ReLU unit well away from its
        // kink, so central differences stay on one linear piece.
        MlpBuilder::new(3)
            .unwrap()
            .hidden_layer(4)
            .unwrap()
            .hidden_layer(3)
            .unwrap()
            .output_layer(2)
            .unwrap()
            .weight_stddev(0.5)
            .initial_bias(1.0)
            .build_with_seed(3)
            .unwrap()
    }

    fn batch_loss(mlp: &Mlp, inputs: &[f32], targets: &[f32], rows: usize) -> f32 {
        let mut scratch = mlp.batch_scratch(rows);
        let logits = mlp.forward_batch(inputs, rows, &mut scratch).to_vec();
        let mut d = vec![0.0; logits.len()];
        softmax_cross_entropy_batch(&logits, targets, mlp.output_dim(), &mut d)
    }

    fn assert_close(analytic: f32, numeric: f32) {
        let diff = (analytic - numeric).abs();
        let scale = analytic.abs().max(numeric.abs()).max(1.0);
        assert!(
            diff <= 2e-3 || diff / scale <= 2e-2,
            "analytic={analytic} numeric={numeric} diff={diff}"
        );
    }

    #[test]
    fn seeded_init_is_deterministic() {
        let a = small_mlp();
        let b = small_mlp();
        for (la, lb) in a.layers().iter().zip(b.layers()) {
            assert_eq!(la.weights(), lb.weights());
            assert_eq!(la.biases(), lb.biases());
        }
    }

    #[test]
    fn hidden_layers_use_relu_and_output_is_linear() {
        let mlp = small_mlp();
        assert_eq!(mlp.num_layers(), 3);
        assert_eq!(mlp.layers()[0].activation(), Activation::ReLU);
        assert_eq!(mlp.layers()[1].activation(), Activation::ReLU);
        assert_eq!(mlp.layers()[2].activation(), Activation::Identity);
        assert_eq!(mlp.param_count(), 3 * 4 + 4 + 4 * 3 + 3 + 3 * 2 + 2);
    }

    #[test]
    fn backward_matches_numeric_gradients() {
        let mut mlp = small_mlp();
        let rows = 2;
        let inputs = [0.3_f32, -0.7, 1.1, -0.2, 0.4, 0.9];
        let targets = [1.0_f32, 0.0, 0.0, 1.0];

        let mut scratch = mlp.batch_scratch(rows);
        let mut grads = mlp.gradients(rows);
        let logits = mlp.forward_batch(&inputs, rows, &mut scratch).to_vec();
        softmax_cross_entropy_batch(&logits, &targets, 2, grads.d_output_mut(rows));
        mlp.backward_batch(&inputs, rows, &scratch, &mut grads);

        let eps = 1e-3_f32;
        for layer_idx in 0..mlp.num_layers() {
            let w_len = mlp.layers()[layer_idx].weights().len();
            for p in 0..w_len {
                let orig = mlp.layers()[layer_idx].weights()[p];
                mlp.layer_mut(layer_idx).unwrap().weights_mut()[p] = orig + eps;
                let plus = batch_loss(&mlp, &inputs, &targets, rows);
                mlp.layer_mut(layer_idx).unwrap().weights_mut()[p] = orig - eps;
                let minus = batch_loss(&mlp, &inputs, &targets, rows);
                mlp.layer_mut(layer_idx).unwrap().weights_mut()[p] = orig;

                assert_close(grads.d_weights(layer_idx)[p], (plus - minus) / (2.0 * eps));
            }

            let b_len = mlp.layers()[layer_idx].biases().len();
            for p in 0..b_len {
                let orig = mlp.layers()[layer_idx].biases()[p];
                mlp.layer_mut(layer_idx).unwrap().biases_mut()[p] = orig + eps;
                let plus = batch_loss(&mlp, &inputs, &targets, rows);
                mlp.layer_mut(layer_idx).unwrap().biases_mut()[p] = orig - eps;
                let minus = batch_loss(&mlp, &inputs, &targets, rows);
                mlp.layer_mut(layer_idx).unwrap().biases_mut()[p] = orig;

                assert_close(grads.d_biases(layer_idx)[p], (plus - minus) / (2.0 * eps));
            }
        }
    }

    #[test]
    fn smaller_batches_reuse_the_same_scratch() {
        let mlp = small_mlp();
        let mut scratch = mlp.batch_scratch(4);
        let inputs = [0.1_f32; 3 * 4];

        assert_eq!(mlp.forward_batch(&inputs, 4, &mut scratch).len(), 8);
        assert_eq!(mlp.forward_batch(&inputs[..6], 2, &mut scratch).len(), 4);
    }

    #[test]
    #[should_panic]
    fn forward_panics_on_input_shape_mismatch() {
        let mlp = small_mlp();
        let mut scratch = mlp.batch_scratch(1);
        let input = [0.0_f32; 4];
        mlp.forward_batch(&input, 1, &mut scratch);
    }

    #[test]
    #[should_panic]
    fn forward_panics_when_batch_exceeds_scratch() {
        let mlp = small_mlp();
        let mut scratch = mlp.batch_scratch(1);
        let inputs = [0.0_f32; 6];
        mlp.forward_batch(&inputs, 2, &mut scratch);
    }
}
