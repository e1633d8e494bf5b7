//! Epoch-level progress logging.
//!
//! Every dump appends a tab-separated row to the progress file in the
//! experiment directory and mirrors numeric values into burn-train file
//! loggers (`train/` for training statistics, `valid/` for test episodes) so
//! the runs can be inspected with burn's tooling.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use burn_train::logger::{FileMetricLogger, MetricLogger};
use burn_train::metric::MetricEntry;
use serde::{Deserialize, Serialize};

pub const PROGRESS_FILE: &str = "progress.txt";
pub const RESUMED_PROGRESS_FILE: &str = "resumed_progress.txt";

/// Where an experiment writes its logs and checkpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerConfig {
    pub output_dir: PathBuf,
    pub exp_name: String,
    pub output_fname: String,
}

impl LoggerConfig {
    /// `<data_dir>/<exp_name>/<exp_name>_s<seed>/`.
    pub fn new(data_dir: impl AsRef<Path>, exp_name: &str, seed: u64) -> Self {
        let output_dir = data_dir
            .as_ref()
            .join(exp_name)
            .join(format!("{exp_name}_s{seed}"));
        Self {
            output_dir,
            exp_name: exp_name.to_string(),
            output_fname: PROGRESS_FILE.to_string(),
        }
    }

    pub fn with_output_fname(mut self, fname: impl Into<String>) -> Self {
        self.output_fname = fname.into();
        self
    }

    pub fn progress_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_fname)
    }
}

/// Which statistics `log_tabular` reports for a stored key.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stats {
    /// Average, Std, Max and Min.
    Full,
    /// Average and Std.
    MeanStd,
    /// Average only.
    AverageOnly,
}

/// Mean, standard deviation, min and max of a slice. NaN when empty.
pub fn statistics(values: &[f32]) -> (f64, f64, f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN, f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|v| *v as f64).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|v| (*v as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    let min = values.iter().fold(f64::INFINITY, |acc, v| acc.min(*v as f64));
    let max = values
        .iter()
        .fold(f64::NEG_INFINITY, |acc, v| acc.max(*v as f64));
    (mean, var.sqrt(), min, max)
}

pub struct EpochLogger {
    config: LoggerConfig,
    progress: File,
    headers: Vec<String>,
    row: Vec<(String, f64)>,
    epoch_store: HashMap<String, Vec<f32>>,
    train_logger: FileMetricLogger,
    valid_logger: FileMetricLogger,
}

impl EpochLogger {
    /// Creates the output directory and a fresh progress file.
    pub fn new(config: LoggerConfig) -> io::Result<Self> {
        fs::create_dir_all(&config.output_dir)?;
        let train_dir = config.output_dir.join("train");
        let valid_dir = config.output_dir.join("valid");
        fs::create_dir_all(&train_dir)?;
        fs::create_dir_all(&valid_dir)?;
        let progress = File::create(config.progress_path())?;
        println!("Logging data to {}", config.progress_path().display());
        Ok(Self {
            progress,
            headers: Vec::new(),
            row: Vec::new(),
            epoch_store: HashMap::new(),
            train_logger: FileMetricLogger::new_train(&train_dir),
            valid_logger: FileMetricLogger::new_train(&valid_dir),
            config,
        })
    }

    /// Continue burn-train epoch numbering after `epoch` completed epochs.
    pub fn resume_from(&mut self, epoch: usize) {
        if epoch > 0 {
            self.train_logger.end_epoch(epoch);
            self.valid_logger.end_epoch(epoch);
        }
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    /// Append a value to the per-epoch store under `key`.
    pub fn store(&mut self, key: &str, value: f32) {
        self.epoch_store.entry(key.to_string()).or_default().push(value);
    }

    /// Log a single value for the current row.
    pub fn log_value(&mut self, key: &str, value: f64) {
        if !self.headers.is_empty() && !self.headers.iter().any(|h| h == key) {
            println!("Warning: `{key}` was not logged in the first row and is dropped");
            return;
        }
        self.row.push((key.to_string(), value));
    }

    /// Reduce the stored values of `key` into the current row and clear them.
    pub fn log_tabular(&mut self, key: &str, stats: Stats) {
        let values = self.epoch_store.remove(key).unwrap_or_default();
        let (mean, std, min, max) = statistics(&values);
        match stats {
            Stats::AverageOnly => self.log_value(&format!("Average{key}"), mean),
            Stats::MeanStd => {
                self.log_value(&format!("Average{key}"), mean);
                self.log_value(&format!("Std{key}"), std);
            }
            Stats::Full => {
                self.log_value(&format!("Average{key}"), mean);
                self.log_value(&format!("Std{key}"), std);
                self.log_value(&format!("Max{key}"), max);
                self.log_value(&format!("Min{key}"), min);
            }
        }
    }

    /// Print the current row, append it to the progress file and close the
    /// burn-train epoch. Returns the row in header order.
    pub fn dump_tabular(&mut self, epoch: usize) -> io::Result<Vec<(String, f64)>> {
        if self.headers.is_empty() {
            self.headers = self.row.iter().map(|(key, _)| key.clone()).collect();
            writeln!(self.progress, "{}", self.headers.join("\t"))?;
        }
        let row: Vec<(String, f64)> = self
            .headers
            .iter()
            .map(|header| {
                let value = self
                    .row
                    .iter()
                    .find(|(key, _)| key == header)
                    .map(|(_, value)| *value)
                    .unwrap_or(f64::NAN);
                (header.clone(), value)
            })
            .collect();
        self.row.clear();

        print_table(&row);
        let line: Vec<String> = row.iter().map(|(_, value)| format_value(*value)).collect();
        writeln!(self.progress, "{}", line.join("\t"))?;
        self.progress.flush()?;

        for (key, value) in &row {
            if !value.is_finite() {
                continue;
            }
            let entry = MetricEntry::new(
                key.clone().into(),
                format!("{value:.4}"),
                format!("{value:.8},1"),
            );
            if is_test_key(key) {
                self.valid_logger.log(&entry);
            } else {
                self.train_logger.log(&entry);
            }
        }
        self.train_logger.end_epoch(epoch);
        self.valid_logger.end_epoch(epoch);
        self.epoch_store.clear();
        Ok(row)
    }
}

/// Test-episode columns, with or without a statistic prefix.
fn is_test_key(key: &str) -> bool {
    ["", "Average", "Std", "Max", "Min"]
        .iter()
        .any(|prefix| key.strip_prefix(prefix).is_some_and(|rest| rest.starts_with("Test")))
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.6}")
    }
}

fn print_table(row: &[(String, f64)]) {
    let key_width = row.iter().map(|(key, _)| key.len()).max().unwrap_or(8).max(15);
    let rule = "-".repeat(key_width + 22);
    println!("{rule}");
    for (key, value) in row {
        println!("| {key:>key_width$} | {:>15} |", format_value(*value));
    }
    println!("{rule}");
}

/// A parsed progress file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProgressTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl ProgressTable {
    pub fn read(path: impl AsRef<Path>) -> io::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut lines = reader.lines();
        let headers = match lines.next() {
            Some(line) => line?.split('\t').map(str::to_string).collect(),
            None => return Ok(Self::default()),
        };
        let mut rows = Vec::new();
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let row = line
                .split('\t')
                .map(|cell| cell.trim().parse::<f64>().unwrap_or(f64::NAN))
                .collect();
            rows.push(row);
        }
        Ok(Self { headers, rows })
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.headers.iter().position(|h| h == name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(index).copied().unwrap_or(f64::NAN))
                .collect(),
        )
    }

    /// Rows of `other` appended below these, matched by header name.
    pub fn concat(mut self, other: &ProgressTable) -> Self {
        for row in &other.rows {
            let mapped = self
                .headers
                .iter()
                .map(|header| {
                    other
                        .headers
                        .iter()
                        .position(|h| h == header)
                        .and_then(|i| row.get(i).copied())
                        .unwrap_or(f64::NAN)
                })
                .collect();
            self.rows.push(mapped);
        }
        self
    }
}

/// Appends `text` to `<output_dir>/config.txt`.
pub fn save_config_text(output_dir: &Path, text: &str) -> io::Result<()> {
    fs::create_dir_all(output_dir)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(output_dir.join("config.txt"))?;
    writeln!(file, "{text}")
}
