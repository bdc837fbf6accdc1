//! Summary files for an external viewer.
//!
//! Each writer owns one run directory containing `events.jsonl`: one JSON
//! object per line, either a scalar
//!
//! ```json
//! {"wall_time": 1760000000.5, "step": 100, "tag": "loss", "scalar": 0.69}
//! ```
//!
//! or a histogram (`"histogram": {min, max, num, sum, sum_squares, bucket_limits, buckets}`).

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use serde::Serialize;

use crate::metrics::{Histogram, VariableStats};
use crate::{Error, Result};

pub const EVENTS_FILE: &str = "events.jsonl";

/// The values merged into one summary record per logged step.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub loss: f32,
    pub accuracy: f32,
    /// Distribution of the output-layer logits.
    pub pre_activations: Histogram,
}

#[derive(Serialize)]
struct Event<'a> {
    wall_time: f64,
    step: u64,
    tag: &'a str,
    #[serde(flatten)]
    value: EventValue<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum EventValue<'a> {
    Scalar(f32),
    Histogram(&'a Histogram),
}

#[derive(Debug)]
pub struct SummaryWriter {
    dir: PathBuf,
    out: BufWriter<File>,
}

impl SummaryWriter {
    /// Create `dir` (and parents) and open its event file for appending.
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        let path = dir.join(EVENTS_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;
        debug!("writing summaries to {}", path.display());
        Ok(Self {
            dir,
            out: BufWriter::new(file),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn add_scalar(&mut self, tag: &str, value: f32, step: usize) -> Result<()> {
        self.write(tag, EventValue::Scalar(value), step)
    }

    pub fn add_histogram(&mut self, tag: &str, histogram: &Histogram, step: usize) -> Result<()> {
        self.write(tag, EventValue::Histogram(histogram), step)
    }

    /// Write the merged `loss`, `accuracy` and `pre-activations` values.
    pub fn add_summary(&mut self, summary: &Summary, step: usize) -> Result<()> {
        self.add_histogram("pre-activations", &summary.pre_activations, step)?;
        self.add_scalar("loss", summary.loss, step)?;
        self.add_scalar("accuracy", summary.accuracy, step)?;
        self.flush()
    }

    /// Mean, stddev, max, min and histogram of a tensor under `<tag>/...`.
    pub fn variable_summaries(&mut self, tag: &str, values: &[f32], step: usize) -> Result<()> {
        let stats = VariableStats::of(values);
        self.add_scalar(&format!("{tag}/mean"), stats.mean, step)?;
        self.add_scalar(&format!("{tag}/stddev"), stats.stddev, step)?;
        self.add_scalar(&format!("{tag}/max"), stats.max, step)?;
        self.add_scalar(&format!("{tag}/min"), stats.min, step)?;
        self.add_histogram(&format!("{tag}/histogram"), &stats.histogram, step)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().map_err(|e| Error::io(&self.dir, e))
    }

    fn write(&mut self, tag: &str, value: EventValue<'_>, step: usize) -> Result<()> {
        let event = Event {
            wall_time: wall_time(),
            step: step as u64,
            tag,
            value,
        };
        serde_json::to_writer(&mut self.out, &event)?;
        self.out
            .write_all(b"\n")
            .map_err(|e| Error::io(&self.dir, e))
    }
}

fn wall_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Seconds since the Unix epoch, shared by both run directories of a session.
pub fn run_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// `<log_path><timestamp>-<suffix>`, concatenated textually so a `log_path`
/// ending in a separator yields a directory inside it.
pub fn run_dir(log_path: &Path, timestamp: u64, suffix: &str) -> PathBuf {
    let mut s = OsString::from(log_path.as_os_str());
    s.push(format!("{timestamp}-{suffix}"));
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_dir_concatenates_prefix() {
        assert_eq!(
            run_dir(Path::new("logs/"), 17, "training"),
            PathBuf::from("logs/17-training")
        );
        assert_eq!(
            run_dir(Path::new("logs/mlp-"), 17, "test"),
            PathBuf::from("logs/mlp-17-test")
        );
    }

    #[test]
    fn events_are_json_lines() {
        let dir = std::env::temp_dir().join(format!("mlp-classifier-summary-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let mut w = SummaryWriter::create(&dir).unwrap();
        w.add_summary(
            &Summary {
                loss: 0.5,
                accuracy: 0.75,
                pre_activations: Histogram::of(&[0.0, 1.0]),
            },
            100,
        )
        .unwrap();
        w.variable_summaries("h1_w_layer", &[1.0, 2.0, 3.0], 100).unwrap();
        w.flush().unwrap();

        let text = fs::read_to_string(dir.join(EVENTS_FILE)).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0]["tag"], "pre-activations");
        assert_eq!(lines[0]["histogram"]["num"], 2);
        assert_eq!(lines[1]["tag"], "loss");
        assert_eq!(lines[1]["scalar"], 0.5);
        assert_eq!(lines[1]["step"], 100);
        assert_eq!(lines[3]["tag"], "h1_w_layer/mean");
        assert_eq!(lines[3]["scalar"], 2.0);

        fs::remove_dir_all(&dir).unwrap();
    }
}
