//! Training and evaluation loops.
//!
//! Both loops walk the data with a fixed stride: step `s` uses the window
//! starting at `(s * batch_size) % len`, truncated at the end of the data, for
//! `num_epochs * len / batch_size` steps.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};

use crate::data::{Batch, num_steps, one_hot_into};
use crate::loss::{softmax_cross_entropy, softmax_cross_entropy_batch, softmax_rows};
use crate::metrics::{Histogram, accuracy};
use crate::results::{Phase, save_labels};
use crate::summary::{Summary, SummaryWriter, run_dir, run_timestamp};
use crate::{
    BatchScratch, Dataset, Error, Gradients, Mlp, MlpBuilder, MlpConfig, Result, Sgd, TrainConfig,
};

/// Loss and accuracy recorded at a logged step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub step: usize,
    pub loss: f32,
    pub accuracy: f32,
}

#[derive(Debug, Clone, Default)]
pub struct TrainReport {
    /// Steps the loop was asked to run.
    pub steps: usize,
    /// Last step that completed, if any.
    pub last_step: Option<usize>,
    /// Loss of the last completed step (before its update).
    pub final_loss: Option<f32>,
    /// One entry per logged step.
    pub log: Vec<StepReport>,
    /// Step at which a cancel request stopped the loop.
    pub interrupted_at: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct EvalReport {
    pub steps: usize,
    pub last_step: Option<usize>,
    /// Mean of the per-step losses.
    pub mean_loss: f32,
    /// Mean of the per-step accuracies.
    pub mean_accuracy: f32,
    pub log: Vec<StepReport>,
    /// `.npy` files written, in step order.
    pub files: Vec<std::path::PathBuf>,
    pub interrupted_at: Option<usize>,
}

/// How a full train-then-evaluate session ended.
#[derive(Debug, Clone)]
pub enum TrainOutcome {
    Completed {
        train: TrainReport,
        eval: EvalReport,
    },
    /// A cancel request arrived; nothing after `step` of `phase` ran.
    Interrupted { phase: Phase, step: usize },
}

/// Polled before every step of the training and evaluation loops.
pub trait CancelFlag {
    fn is_cancelled(&self) -> bool;
}

impl CancelFlag for AtomicBool {
    #[inline]
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// Buffers reused by every step of a loop.
struct Workspace {
    scratch: BatchScratch,
    grads: Gradients,
    targets: Vec<f32>,
    probs: Vec<f32>,
}

impl Workspace {
    /// Sized for the largest batch `data` can yield, which is `len` when
    /// `batch_size` exceeds it.
    fn new(mlp: &Mlp, batch_size: usize, data: &Dataset) -> Self {
        let rows = batch_size.min(data.len());
        let classes = mlp.output_dim();
        Self {
            scratch: mlp.batch_scratch(rows),
            grads: mlp.gradients(rows),
            targets: vec![0.0; rows * classes],
            probs: vec![0.0; rows * classes],
        }
    }
}

/// An MLP classifier together with its hyper-parameters.
#[derive(Debug, Clone)]
pub struct Classifier {
    config: MlpConfig,
    mlp: Mlp,
    optimizer: Sgd,
}

impl Classifier {
    /// Build a freshly initialised classifier.
    pub fn new(config: MlpConfig) -> Result<Self> {
        info!("building graph");
        let mlp = MlpBuilder::from_config(&config)?.build_with_seed(config.seed)?;
        Self::from_parts(config, mlp)
    }

    /// Wrap an existing model (e.g. one loaded from JSON).
    pub fn from_parts(config: MlpConfig, mlp: Mlp) -> Result<Self> {
        config.validate()?;
        if mlp.input_dim() != config.num_features || mlp.output_dim() != config.num_classes {
            return Err(Error::InvalidConfig(format!(
                "model maps {} -> {} but config expects {} -> {}",
                mlp.input_dim(),
                mlp.output_dim(),
                config.num_features,
                config.num_classes
            )));
        }
        let optimizer = Sgd::new(config.alpha)?;
        Ok(Self {
            config,
            mlp,
            optimizer,
        })
    }

    pub fn config(&self) -> &MlpConfig {
        &self.config
    }

    pub fn mlp(&self) -> &Mlp {
        &self.mlp
    }

    /// Train on `train_data`, then evaluate on `test_data`.
    ///
    /// Summaries go to `<log_path><timestamp>-training` and
    /// `<log_path><timestamp>-test`; label dumps to `result_path`. If `cancel`
    /// is set during training, the session stops without evaluating.
    pub fn train<C: CancelFlag + ?Sized>(
        &mut self,
        train_data: &Dataset,
        test_data: &Dataset,
        cfg: &TrainConfig,
        cancel: &C,
    ) -> Result<TrainOutcome> {
        cfg.validate()?;
        self.check_dataset(train_data, "train")?;
        self.check_dataset(test_data, "test")?;

        let timestamp = run_timestamp();
        let mut train_writer = SummaryWriter::create(run_dir(&cfg.log_path, timestamp, "training"))?;
        let mut test_writer = SummaryWriter::create(run_dir(&cfg.log_path, timestamp, "test"))?;

        let train = self.fit(train_data, cfg, &mut train_writer, cancel)?;
        if let Some(step) = train.interrupted_at {
            return Ok(TrainOutcome::Interrupted {
                phase: Phase::Training,
                step,
            });
        }
        info!(
            "EOF -- training done at step {}",
            train.last_step.unwrap_or(0)
        );
        self.parameter_summaries(&mut train_writer, train.last_step.unwrap_or(0))?;

        let eval = self.evaluate(test_data, cfg, &mut test_writer, cancel)?;
        if let Some(step) = eval.interrupted_at {
            return Ok(TrainOutcome::Interrupted {
                phase: Phase::Testing,
                step,
            });
        }
        info!(
            "EOF -- testing done at step {}",
            eval.last_step.unwrap_or(0)
        );

        Ok(TrainOutcome::Completed { train, eval })
    }

    /// The minibatch gradient-descent loop.
    ///
    /// The summary written at a logged step describes the batch before its
    /// update; the logged accuracy is re-measured on the same batch after it.
    pub fn fit<C: CancelFlag + ?Sized>(
        &mut self,
        data: &Dataset,
        cfg: &TrainConfig,
        writer: &mut SummaryWriter,
        cancel: &C,
    ) -> Result<TrainReport> {
        self.check_dataset(data, "train")?;
        let batch_size = self.config.batch_size;
        let classes = self.config.num_classes;
        let steps = num_steps(cfg.num_epochs, data.len(), batch_size);
        let mut ws = Workspace::new(&self.mlp, batch_size, data);
        let mut report = TrainReport {
            steps,
            ..TrainReport::default()
        };

        for step in 0..steps {
            if cancel.is_cancelled() {
                warn!("interrupted at step {step}");
                report.interrupted_at = Some(step);
                return Ok(report);
            }

            let batch = data.batch_at_step(step, batch_size);
            let rows = batch.rows();
            let targets = &mut ws.targets[..rows * classes];
            one_hot_into(batch.labels, classes, targets)?;

            let logits = self.mlp.forward_batch(batch.features, rows, &mut ws.scratch);
            let step_loss =
                softmax_cross_entropy_batch(logits, targets, classes, ws.grads.d_output_mut(rows));

            let logged = step > 0 && step.is_multiple_of(cfg.log_every);
            let summary = if logged {
                let probs = &mut ws.probs[..rows * classes];
                softmax_rows(logits, classes, probs);
                Some(Summary {
                    loss: step_loss,
                    accuracy: accuracy(probs, targets, classes),
                    pre_activations: Histogram::of(logits),
                })
            } else {
                None
            };

            self.mlp
                .backward_batch(batch.features, rows, &ws.scratch, &mut ws.grads);
            self.optimizer.step(&mut self.mlp, &ws.grads);

            if let Some(summary) = summary {
                let train_accuracy = self.batch_accuracy(&batch, &mut ws);
                info!("step [{step}] train -- loss : {step_loss}, accuracy : {train_accuracy}");
                report.log.push(StepReport {
                    step,
                    loss: step_loss,
                    accuracy: train_accuracy,
                });
                writer.add_summary(&summary, step)?;
            }

            report.last_step = Some(step);
            report.final_loss = Some(step_loss);
        }

        Ok(report)
    }

    /// Run the evaluation loop without updating parameters, saving the
    /// predictions of every step under `cfg.result_path`.
    pub fn evaluate<C: CancelFlag + ?Sized>(
        &self,
        data: &Dataset,
        cfg: &TrainConfig,
        writer: &mut SummaryWriter,
        cancel: &C,
    ) -> Result<EvalReport> {
        self.check_dataset(data, "test")?;
        let batch_size = self.config.batch_size;
        let classes = self.config.num_classes;
        let steps = num_steps(cfg.num_epochs, data.len(), batch_size);
        let mut ws = Workspace::new(&self.mlp, batch_size, data);
        let mut report = EvalReport {
            steps,
            ..EvalReport::default()
        };
        let mut loss_sum = 0.0_f64;
        let mut acc_sum = 0.0_f64;

        for step in 0..steps {
            if cancel.is_cancelled() {
                warn!("interrupted at test step {step}");
                report.interrupted_at = Some(step);
                return Ok(report);
            }

            let batch = data.batch_at_step(step, batch_size);
            let rows = batch.rows();
            let targets = &mut ws.targets[..rows * classes];
            let probs = &mut ws.probs[..rows * classes];
            one_hot_into(batch.labels, classes, targets)?;

            let logits = self.mlp.forward_batch(batch.features, rows, &mut ws.scratch);
            let test_loss = softmax_cross_entropy(logits, targets, classes);
            softmax_rows(logits, classes, probs);
            let test_accuracy = accuracy(probs, targets, classes);

            if step > 0 && step.is_multiple_of(cfg.log_every) {
                info!("step [{step}] test -- loss : {test_loss}, accuracy : {test_accuracy}");
                report.log.push(StepReport {
                    step,
                    loss: test_loss,
                    accuracy: test_accuracy,
                });
                let summary = Summary {
                    loss: test_loss,
                    accuracy: test_accuracy,
                    pre_activations: Histogram::of(logits),
                };
                writer.add_summary(&summary, step)?;
            }

            let path = save_labels(
                probs,
                targets,
                classes,
                &cfg.result_path,
                Phase::Testing,
                step,
            )?;
            report.files.push(path);

            loss_sum += test_loss as f64;
            acc_sum += test_accuracy as f64;
            report.last_step = Some(step);
        }

        if steps > 0 {
            report.mean_loss = (loss_sum / steps as f64) as f32;
            report.mean_accuracy = (acc_sum / steps as f64) as f32;
        }
        Ok(report)
    }

    /// Softmax class probabilities for every sample, shape `(len, num_classes)`.
    pub fn predict_proba(&self, data: &Dataset) -> Result<Vec<f32>> {
        if data.num_features() != self.config.num_features {
            return Err(Error::InvalidData(format!(
                "dataset num_features {} does not match model num_features {}",
                data.num_features(),
                self.config.num_features
            )));
        }
        let batch_size = self.config.batch_size;
        let classes = self.config.num_classes;
        let mut scratch = self.mlp.batch_scratch(batch_size.min(data.len()));
        let mut probs = vec![0.0_f32; data.len() * classes];

        let mut offset = 0;
        while offset < data.len() {
            let batch = data.batch(offset, batch_size);
            let rows = batch.rows();
            let logits = self.mlp.forward_batch(batch.features, rows, &mut scratch);
            softmax_rows(
                logits,
                classes,
                &mut probs[offset * classes..(offset + rows) * classes],
            );
            offset += rows;
        }
        Ok(probs)
    }

    fn batch_accuracy(&self, batch: &Batch<'_>, ws: &mut Workspace) -> f32 {
        let rows = batch.rows();
        let classes = self.config.num_classes;
        let logits = self.mlp.forward_batch(batch.features, rows, &mut ws.scratch);
        let probs = &mut ws.probs[..rows * classes];
        softmax_rows(logits, classes, probs);
        accuracy(probs, &ws.targets[..rows * classes], classes)
    }

    /// Statistics of every weight and bias tensor, tagged `h1_w_layer`,
    /// `h1_b_layer`, ..., `output_w_layer`, `output_b_layer`.
    fn parameter_summaries(&self, writer: &mut SummaryWriter, step: usize) -> Result<()> {
        let last = self.mlp.num_layers() - 1;
        for (i, layer) in self.mlp.layers().iter().enumerate() {
            let name = if i == last {
                "output".to_owned()
            } else {
                format!("h{}", i + 1)
            };
            writer.variable_summaries(&format!("{name}_w_layer"), layer.weights(), step)?;
            writer.variable_summaries(&format!("{name}_b_layer"), layer.biases(), step)?;
        }
        writer.flush()
    }

    fn check_dataset(&self, data: &Dataset, name: &str) -> Result<()> {
        if data.is_empty() {
            return Err(Error::InvalidData(format!(
                "{name} dataset must not be empty"
            )));
        }
        if data.num_features() != self.config.num_features {
            return Err(Error::InvalidData(format!(
                "{name} dataset num_features {} does not match model num_features {}",
                data.num_features(),
                self.config.num_features
            )));
        }
        data.check_labels(self.config.num_classes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> MlpConfig {
        MlpConfig {
            alpha: 0.5,
            batch_size: 4,
            node_size: vec![8, 8],
            num_classes: 2,
            num_features: 2,
            seed: 0,
        }
    }

    #[test]
    fn from_parts_rejects_mismatched_model() {
        let mlp = MlpBuilder::new(3)
            .unwrap()
            .hidden_layer(4)
            .unwrap()
            .output_layer(2)
            .unwrap()
            .build_with_seed(0)
            .unwrap();
        assert!(Classifier::from_parts(tiny_config(), mlp).is_err());
    }

    #[test]
    fn predict_proba_covers_every_sample() {
        let clf = Classifier::new(tiny_config()).unwrap();
        let data = Dataset::from_flat(vec![0.5; 2 * 7], vec![0; 7], 2).unwrap();
        let probs = clf.predict_proba(&data).unwrap();
        assert_eq!(probs.len(), 7 * 2);
        for row in probs.chunks_exact(2) {
            assert!((row[0] + row[1] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn out_of_range_labels_are_rejected_before_training() {
        let mut clf = Classifier::new(tiny_config()).unwrap();
        let data = Dataset::from_flat(vec![0.0; 4], vec![0, 5], 2).unwrap();
        let dir = std::env::temp_dir().join("mlp-classifier-train-unit");
        let cfg = TrainConfig {
            log_path: dir.join("logs/"),
            result_path: dir.join("results"),
            ..TrainConfig::default()
        };
        let err = clf
            .train(&data, &data, &cfg, &AtomicBool::new(false))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn oversized_batch_is_bounded_by_the_data() {
        let config = MlpConfig {
            batch_size: 1 << 60,
            ..tiny_config()
        };
        let mut clf = Classifier::new(config).unwrap();
        let data = Dataset::from_flat(vec![0.5; 2 * 10], vec![1; 10], 2).unwrap();

        assert_eq!(clf.predict_proba(&data).unwrap().len(), 10 * 2);

        let dir = std::env::temp_dir().join(format!(
            "mlp-classifier-train-oversized-{}",
            std::process::id()
        ));
        let mut writer = SummaryWriter::create(&dir).unwrap();
        let cfg = TrainConfig {
            log_path: dir.join("logs/"),
            result_path: dir.join("results"),
            ..TrainConfig::default()
        };
        let report = clf
            .fit(&data, &cfg, &mut writer, &AtomicBool::new(false))
            .unwrap();
        assert_eq!(report.steps, 0);
        assert_eq!(report.last_step, None);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
