//! Model builder.
//!
//! `MlpBuilder` makes the classifier topology explicit: any number of ReLU
//! hidden layers followed by one linear output layer that produces logits.
//!
//! Weights are drawn from `Normal(0, 0.01)` and biases start at `0.1` unless
//! overridden.

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::layer::DEFAULT_BIAS;
use crate::{Activation, Error, Init, Layer, Mlp, MlpConfig, Result};

#[derive(Debug, Clone)]
/// Builder for an `Mlp`.
///
/// Example:
///
/// ```rust
/// use mlp_classifier::MlpBuilder;
///
/// # fn main() -> mlp_classifier::Result<()> {
/// let mlp = MlpBuilder::new(4)?
///     .hidden_layer(16)?
///     .hidden_layer(8)?
///     .output_layer(3)?
///     .build_with_seed(0)?;
/// assert_eq!(mlp.output_dim(), 3);
/// # Ok(())
/// # }
/// ```
pub struct MlpBuilder {
    input_dim: usize,
    hidden: Vec<usize>,
    output_dim: Option<usize>,
    init: Init,
    bias: f32,
}

impl MlpBuilder {
    /// Start building an MLP that accepts inputs of length `input_dim`.
    pub fn new(input_dim: usize) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidConfig("input_dim must be > 0".to_owned()));
        }
        Ok(Self {
            input_dim,
            hidden: Vec::new(),
            output_dim: None,
            init: Init::default(),
            bias: DEFAULT_BIAS,
        })
    }

    /// Builder matching a validated [`MlpConfig`].
    pub fn from_config(cfg: &MlpConfig) -> Result<Self> {
        cfg.validate()?;
        let mut b = Self::new(cfg.num_features)?;
        for &width in &cfg.node_size {
            b = b.hidden_layer(width)?;
        }
        b.output_layer(cfg.num_classes)
    }

    /// Append a ReLU hidden layer with `width` units.
    pub fn hidden_layer(mut self, width: usize) -> Result<Self> {
        if width == 0 {
            return Err(Error::InvalidConfig(
                "hidden layer width must be > 0".to_owned(),
            ));
        }
        if self.output_dim.is_some() {
            return Err(Error::InvalidConfig(
                "hidden layers must be added before the output layer".to_owned(),
            ));
        }
        self.hidden.push(width);
        Ok(self)
    }

    /// Set the number of classes (width of the logits layer).
    pub fn output_layer(mut self, num_classes: usize) -> Result<Self> {
        if num_classes == 0 {
            return Err(Error::InvalidConfig("num_classes must be > 0".to_owned()));
        }
        self.output_dim = Some(num_classes);
        Ok(self)
    }

    /// Override the standard deviation of the weight initializer.
    pub fn weight_stddev(mut self, stddev: f32) -> Self {
        self.init = Init::Normal { stddev };
        self
    }

    /// Override the weight initializer.
    pub fn init(mut self, init: Init) -> Self {
        self.init = init;
        self
    }

    /// Override the constant every bias starts from.
    pub fn initial_bias(mut self, bias: f32) -> Self {
        self.bias = bias;
        self
    }

    /// Build using a deterministic seed.
    pub fn build_with_seed(self, seed: u64) -> Result<Mlp> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.build_with_rng(&mut rng)
    }

    /// Build using the provided RNG.
    pub fn build_with_rng<R: Rng + ?Sized>(self, rng: &mut R) -> Result<Mlp> {
        let output_dim = self.output_dim.ok_or_else(|| {
            Error::InvalidConfig("mlp needs an output layer".to_owned())
        })?;

        let mut layers = Vec::with_capacity(self.hidden.len() + 1);
        let mut in_dim = self.input_dim;
        for &width in &self.hidden {
            layers.push(Layer::new_with_rng(
                in_dim,
                width,
                self.init,
                self.bias,
                Activation::ReLU,
                rng,
            )?);
            in_dim = width;
        }
        layers.push(Layer::new_with_rng(
            in_dim,
            output_dim,
            self.init,
            self.bias,
            Activation::Identity,
            rng,
        )?);

        let mlp = Mlp::from_layers(layers);
        info!(
            "built mlp {} -> {:?} ({}) -> {} ({}), {} params",
            self.input_dim,
            self.hidden,
            Activation::ReLU.name(),
            output_dim,
            Activation::Identity.name(),
            mlp.param_count()
        );
        Ok(mlp)
    }
}
