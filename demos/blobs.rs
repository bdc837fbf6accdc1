use std::sync::atomic::AtomicBool;

use mlp_classifier::data::gaussian_blobs;
use mlp_classifier::{Classifier, MlpConfig, TrainConfig, TrainOutcome, npy};

fn main() -> mlp_classifier::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Three well separated blobs in 4D.
    let train = gaussian_blobs(1536, 4, 3, 0.4, 0)?;
    let test = gaussian_blobs(384, 4, 3, 0.4, 1)?;

    let mut clf = Classifier::new(MlpConfig {
        alpha: 0.1,
        batch_size: 64,
        node_size: vec![32, 32, 32],
        num_classes: 3,
        num_features: 4,
        seed: 0,
    })?;

    let out = std::env::temp_dir().join("mlp-classifier-blobs");
    let cfg = TrainConfig {
        num_epochs: 20,
        log_path: out.join("logs/"),
        result_path: out.join("results"),
        log_every: 100,
    };

    match clf.train(&train, &test, &cfg, &AtomicBool::new(false))? {
        TrainOutcome::Completed { train, eval } => {
            println!(
                "train: {} steps, final loss {:?}",
                train.steps, train.final_loss
            );
            println!(
                "test: loss={} accuracy={}",
                eval.mean_loss, eval.mean_accuracy
            );
            if let Some(first) = eval.files.first() {
                let labels = npy::load_f64(first)?;
                println!("{} -> shape {:?}", first.display(), labels.shape);
            }
        }
        TrainOutcome::Interrupted { phase, step } => {
            println!("interrupted during {phase} at step {step}");
        }
    }

    Ok(())
}
