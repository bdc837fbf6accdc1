use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::{env, fs, io};

use log::{error, info, warn};
use tokio::{signal, task};

use mlp_classifier::{Classifier, Config, TrainOutcome, data::gaussian_blobs};

const TRAIN_SIZE: usize = 4096;
const TEST_SIZE: usize = 1024;
const BLOB_SPREAD: f32 = 1.0;
const MODEL_FILE: &str = "mlp-model.json";

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // The SIGINT handler is installed on the first poll, so poll once before
    // training starts.
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    tokio::select! {
        biased;
        res = &mut ctrl_c => {
            res?;
            error!("interrupted by user before training started");
            std::process::exit(1);
        }
        _ = std::future::ready(()) => {}
    }

    let config = match env::args().nth(1) {
        Some(path) => Config::load(&path).map_err(io::Error::other)?,
        None => {
            info!("no config given, using defaults");
            Config::default()
        }
    };
    config.validate().map_err(io::Error::other)?;

    let model = &config.model;
    let train_data = gaussian_blobs(
        TRAIN_SIZE,
        model.num_features,
        model.num_classes,
        BLOB_SPREAD,
        model.seed,
    )
    .map_err(io::Error::other)?;
    let test_data = gaussian_blobs(
        TEST_SIZE,
        model.num_features,
        model.num_classes,
        BLOB_SPREAD,
        model.seed.wrapping_add(1),
    )
    .map_err(io::Error::other)?;
    info!(
        "generated {} train and {} test samples",
        train_data.len(),
        test_data.len()
    );

    let mut clf = Classifier::new(config.model.clone()).map_err(io::Error::other)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let train_cfg = config.train.clone();
    let mut training = {
        let cancel = Arc::clone(&cancel);
        task::spawn_blocking(move || {
            let outcome = clf.train(&train_data, &test_data, &train_cfg, cancel.as_ref());
            (clf, outcome)
        })
    };

    let (clf, outcome) = tokio::select! {
        joined = &mut training => joined.map_err(io::Error::other)?,
        res = &mut ctrl_c => {
            res?;
            warn!("received SIGINT");
            cancel.store(true, Ordering::Relaxed);
            training.await.map_err(io::Error::other)?
        }
    };

    match outcome.map_err(io::Error::other)? {
        TrainOutcome::Completed { train, eval } => {
            info!(
                "trained {} steps, final loss {:?}; test loss {}, test accuracy {}",
                train.steps, train.final_loss, eval.mean_loss, eval.mean_accuracy
            );
            let dir = &config.train.result_path;
            fs::create_dir_all(dir)?;
            clf.mlp()
                .save_json(dir.join(MODEL_FILE))
                .map_err(io::Error::other)?;
            Ok(())
        }
        TrainOutcome::Interrupted { phase, step } => {
            error!("training interrupted by user during {phase} at step {step}");
            std::process::exit(1);
        }
    }
}
