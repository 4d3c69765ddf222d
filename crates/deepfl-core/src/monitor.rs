//! Monitoring summary stream for external visualization.
//!
//! Appends JSONL records (scalars and value histograms with a near-zero
//! fraction) to a file inside the log directory. The stream is append-only
//! and consumed by tooling outside this crate; nothing here reads it back.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use candle_core::Tensor;
use chrono::Utc;
use serde::Serialize;

use crate::error::DeepFlResult;

/// Number of histogram buckets per record.
pub const HISTOGRAM_BINS: usize = 30;

/// Values with magnitude below this count as zero for the sparsity stat.
pub const NEAR_ZERO_EPS: f32 = 1e-8;

/// One summary record, tagged by kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SummaryRecord {
    Scalar {
        name: String,
        step: usize,
        value: f32,
    },
    Histogram {
        name: String,
        step: usize,
        min: f32,
        max: f32,
        counts: Vec<u64>,
        zero_fraction: f32,
    },
}

/// Append-only writer for summary records.
pub struct SummaryWriter {
    out: BufWriter<File>,
    path: PathBuf,
}

impl SummaryWriter {
    /// Open (or create) the summary stream under `dir`. The file name
    /// carries the run's start timestamp; concurrent runs get distinct
    /// streams.
    pub fn new(dir: &Path) -> DeepFlResult<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "summary-{}.jsonl",
            Utc::now().format("%Y%m%dT%H%M%S")
        ));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            out: BufWriter::new(file),
            path,
        })
    }

    /// Path of the stream file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a scalar record.
    pub fn scalar(&mut self, name: &str, step: usize, value: f32) -> DeepFlResult<()> {
        self.append(&SummaryRecord::Scalar {
            name: name.to_string(),
            step,
            value,
        })
    }

    /// Append a histogram record for the tensor's values, including the
    /// fraction of near-zero entries (the sparsity statistic).
    pub fn histogram(&mut self, name: &str, step: usize, tensor: &Tensor) -> DeepFlResult<()> {
        let values: Vec<f32> = tensor.flatten_all()?.to_vec1()?;
        let (min, max, counts) = bucketize(&values);
        self.append(&SummaryRecord::Histogram {
            name: name.to_string(),
            step,
            min,
            max,
            counts,
            zero_fraction: zero_fraction(&values),
        })
    }

    /// Flush buffered records to disk.
    pub fn flush(&mut self) -> DeepFlResult<()> {
        self.out.flush()?;
        Ok(())
    }

    fn append(&mut self, record: &SummaryRecord) -> DeepFlResult<()> {
        let line = serde_json::to_string(record)?;
        writeln!(self.out, "{}", line)?;
        Ok(())
    }
}

/// Fraction of values with magnitude below [`NEAR_ZERO_EPS`]. Meaningful
/// for post-activation tensors; for raw weights it is diagnostic only.
pub fn zero_fraction(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let zeros = values.iter().filter(|v| v.abs() < NEAR_ZERO_EPS).count();
    zeros as f32 / values.len() as f32
}

fn bucketize(values: &[f32]) -> (f32, f32, Vec<u64>) {
    let mut counts = vec![0u64; HISTOGRAM_BINS];
    if values.is_empty() {
        return (0.0, 0.0, counts);
    }
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if min == max {
        counts[0] = values.len() as u64;
        return (min, max, counts);
    }
    let width = (max - min) / HISTOGRAM_BINS as f32;
    for &v in values {
        let bin = (((v - min) / width) as usize).min(HISTOGRAM_BINS - 1);
        counts[bin] += 1;
    }
    (min, max, counts)
}
