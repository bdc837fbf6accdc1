//! A feed-forward multilayer perceptron classifier.
//!
//! `mlp-classifier` builds an MLP with ReLU hidden layers and a linear output
//! layer, trains it with minibatch gradient descent on softmax cross-entropy,
//! evaluates it on a held-out set, and dumps the predicted and actual labels of
//! every evaluation step as NumPy `.npy` arrays.
//!
//! # Panics vs `Result`
//!
//! - Low-level hot path (panics on misuse):
//!   [`mlp::Mlp::forward_batch`], [`mlp::Mlp::backward_batch`].
//!   Shape mismatches are programmer error and panic via `assert!`.
//! - High-level APIs ([`Classifier::train`], [`Classifier::evaluate`],
//!   [`results::save_labels`], config loading) validate inputs and return
//!   [`Result`].
//!
//! # Data layout
//!
//! - Scalars are `f32`; saved label arrays are `float64`.
//! - Features, logits and one-hot targets are flat row-major buffers of shape
//!   `(rows, width)`.
//! - Layer weights are row-major with shape `(out_dim, in_dim)`.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::atomic::AtomicBool;
//!
//! use mlp_classifier::{Classifier, Dataset, MlpConfig, TrainConfig, TrainOutcome};
//!
//! # fn main() -> mlp_classifier::Result<()> {
//! let xs = vec![vec![0.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]];
//! let data = Dataset::from_rows(&xs, &[0, 1, 1, 0])?;
//!
//! let mut clf = Classifier::new(MlpConfig {
//!     alpha: 0.1,
//!     batch_size: 4,
//!     node_size: vec![16, 16, 16],
//!     num_classes: 2,
//!     num_features: 2,
//!     seed: 0,
//! })?;
//!
//! let cfg = TrainConfig { num_epochs: 500, ..TrainConfig::default() };
//! if let TrainOutcome::Completed { eval, .. } =
//!     clf.train(&data, &data, &cfg, &AtomicBool::new(false))?
//! {
//!     println!("test accuracy {}", eval.mean_accuracy);
//! }
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod builder;
pub mod config;
pub mod data;
pub mod error;
pub mod layer;
pub mod loss;
pub(crate) mod matmul;
pub mod metrics;
pub mod mlp;
pub mod npy;
pub mod optim;
pub mod results;
pub mod serde_model;
pub mod summary;
pub mod train;

pub use activation::Activation;
pub use builder::MlpBuilder;
pub use config::{Config, MlpConfig, TrainConfig};
pub use data::{Batch, Dataset};
pub use error::{Error, Result};
pub use layer::{Init, Layer};
pub use mlp::{BatchScratch, Gradients, Mlp};
pub use optim::Sgd;
pub use results::{Phase, save_labels};
pub use summary::{Summary, SummaryWriter};
pub use train::{CancelFlag, Classifier, EvalReport, StepReport, TrainOutcome, TrainReport};
