//! On-disk training artifacts
//!
//! Checkpoints and full training traces are JSON documents. Both are written
//! to a sibling temporary file first and renamed into place, so an
//! interrupted write never leaves a truncated artifact behind.

use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::machine_learning::core::Result;

/// How input rows are partitioned into backend jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSize {
    /// All rows in a single job
    Full,
    /// At most this many rows per job
    Fixed(usize),
}

impl JobSize {
    pub fn from_option(job_size: Option<usize>) -> Self {
        job_size.map_or(JobSize::Full, JobSize::Fixed)
    }

    pub fn as_option(self) -> Option<usize> {
        match self {
            JobSize::Full => None,
            JobSize::Fixed(size) => Some(size),
        }
    }
}

/// Model metadata recorded alongside the parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Backend description of the bound circuit
    pub circuit: String,
    /// Shot budget, `None` for exact probabilities
    pub nbshots: Option<usize>,
    pub nbshots_increment: String,
    pub nbshots_incr_delay: usize,
    /// Class outcomes as zero-padded binary strings
    pub bitstr: Vec<String>,
    pub job_size: JobSize,
    /// Circuit evaluations so far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nfev: Option<usize>,
    /// Iterations completed by the last `fit`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_iter: Option<usize>,
}

/// Snapshot of a classifier's parameters and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub name: String,
    pub parameters: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss_progress: Option<Vec<f64>>,
    pub info: ModelInfo,
}

impl Checkpoint {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json_atomic(self, path.as_ref())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }
}

/// Everything recorded during a `fit` with output tracking enabled
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputTrace {
    /// Class probabilities of the training set, one matrix per iteration
    pub output: Vec<Vec<Vec<f64>>>,
    /// Training labels in row order of `output`
    pub labels: Vec<usize>,
    pub loss_value: Vec<f64>,
    /// Parameters after each iteration
    pub params: Vec<Vec<f64>>,
}

impl OutputTrace {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json_atomic(self, path.as_ref())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }
}

/// Path of the temporary file a save goes through
fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_json_atomic<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temporary_path(path);
    let write = || -> Result<()> {
        let mut writer = BufWriter::new(fs::File::create(&tmp_path)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
        Ok(())
    };

    if let Err(e) = write() {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let reader = BufReader::new(fs::File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
