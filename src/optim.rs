//! Optimizer.
//!
//! The classifier trains with plain gradient descent at a fixed learning rate.

use crate::{Error, Gradients, Mlp, Result};

#[derive(Debug, Clone, Copy)]
/// Stochastic gradient descent with a fixed learning rate.
pub struct Sgd {
    lr: f32,
}

impl Sgd {
    #[inline]
    /// Construct an SGD optimizer.
    ///
    /// Returns an error if `lr` is not finite or `lr <= 0`.
    pub fn new(lr: f32) -> Result<Self> {
        if !(lr.is_finite() && lr > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be finite and > 0, got {lr}"
            )));
        }
        Ok(Self { lr })
    }

    #[inline]
    pub fn lr(&self) -> f32 {
        self.lr
    }

    #[inline]
    /// Apply one optimizer step: `param -= lr * d_param`.
    pub fn step(&self, model: &mut Mlp, grads: &Gradients) {
        model.sgd_step(grads, self.lr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Init, MlpBuilder};

    #[test]
    fn sgd_requires_positive_finite_lr() {
        assert!(Sgd::new(0.0).is_err());
        assert!(Sgd::new(-1.0).is_err());
        assert!(Sgd::new(f32::NAN).is_err());
        assert!(Sgd::new(0.5).is_ok());
    }

    #[test]
    fn step_moves_params_against_gradient() {
        let mut mlp = MlpBuilder::new(1)
            .unwrap()
            .output_layer(1)
            .unwrap()
            .init(Init::Zeros)
            .initial_bias(2.0)
            .build_with_seed(0)
            .unwrap();

        let mut grads = mlp.gradients(1);
        grads.d_weights_mut(0)[0] = 3.0;
        grads.d_biases_mut(0)[0] = 4.0;

        Sgd::new(0.1).unwrap().step(&mut mlp, &grads);

        let layer = mlp.layer(0).unwrap();
        assert!((layer.weights()[0] - (0.0 - 0.1 * 3.0)).abs() < 1e-6);
        assert!((layer.biases()[0] - (2.0 - 0.1 * 4.0)).abs() < 1e-6);
    }
}
