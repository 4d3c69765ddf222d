//! Dataset loading and batching: CSV feature/label files plus a group file.
//!
//! Produces the in-memory train/test split consumed by the trainer. Every
//! feature row is validated against the declared partition width at load
//! time, so a malformed file fails here rather than deep inside a forward
//! pass.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::error::{DeepFlError, DeepFlResult};
use crate::features::{validate_width, FEATURE_WIDTH, NUM_CLASSES};

/// One training batch: fixed-size row-major slices of the training set.
#[derive(Debug, Clone)]
pub struct Batch {
    features: Vec<f32>,
    labels: Vec<f32>,
    groups: Vec<u32>,
    len: usize,
}

impl Batch {
    /// Number of instances in the batch.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Group id per instance, consumed by the grouping-aware loss.
    pub fn groups(&self) -> &[u32] {
        &self.groups
    }

    /// Feature matrix `[len, FEATURE_WIDTH]`.
    pub fn features_tensor(&self, device: &Device) -> DeepFlResult<Tensor> {
        Ok(Tensor::from_slice(
            &self.features,
            (self.len, FEATURE_WIDTH),
            device,
        )?)
    }

    /// One-hot label matrix `[len, NUM_CLASSES]`. Labels are constants:
    /// they are never wrapped in a `Var`, so no gradient can flow into
    /// them.
    pub fn labels_tensor(&self, device: &Device) -> DeepFlResult<Tensor> {
        Ok(Tensor::from_slice(
            &self.labels,
            (self.len, NUM_CLASSES),
            device,
        )?)
    }
}

/// Training set: instances + one-hot labels + group ids, with a stateful
/// batch cursor that reshuffles once an epoch's worth of batches has been
/// consumed.
#[derive(Debug)]
pub struct TrainSet {
    features: Vec<f32>,
    labels: Vec<f32>,
    groups: Vec<u32>,
    num_instances: usize,
    indices: Vec<usize>,
    position: usize,
    rng: StdRng,
}

impl TrainSet {
    fn new(features: Vec<f32>, labels: Vec<f32>, groups: Vec<u32>, seed: u64) -> Self {
        let num_instances = features.len() / FEATURE_WIDTH;
        let mut indices: Vec<usize> = (0..num_instances).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);
        Self {
            features,
            labels,
            groups,
            num_instances,
            indices,
            position: 0,
            rng,
        }
    }

    /// Total number of instances.
    pub fn num_instances(&self) -> usize {
        self.num_instances
    }

    /// Batches per epoch: `floor(n / batch_size)`. Trailing remainder
    /// instances are dropped each epoch.
    pub fn num_batches(&self, batch_size: usize) -> usize {
        self.num_instances / batch_size
    }

    /// Take the next batch from the cursor, reshuffling when fewer than
    /// `batch_size` instances remain in the current pass.
    pub fn next_batch(&mut self, batch_size: usize) -> Batch {
        let take = batch_size.min(self.num_instances);
        if self.position + take > self.num_instances {
            self.indices.shuffle(&mut self.rng);
            self.position = 0;
        }
        let picked = &self.indices[self.position..self.position + take];
        self.position += take;

        let mut features = Vec::with_capacity(take * FEATURE_WIDTH);
        let mut labels = Vec::with_capacity(take * NUM_CLASSES);
        let mut groups = Vec::with_capacity(take);
        for &idx in picked {
            let f = idx * FEATURE_WIDTH;
            features.extend_from_slice(&self.features[f..f + FEATURE_WIDTH]);
            let l = idx * NUM_CLASSES;
            labels.extend_from_slice(&self.labels[l..l + NUM_CLASSES]);
            groups.push(self.groups[idx]);
        }
        Batch {
            features,
            labels,
            groups,
            len: take,
        }
    }
}

/// Test set: instances + labels, no batching. Tensorized whole for one
/// forward pass per dump.
#[derive(Debug)]
pub struct TestSet {
    features: Vec<f32>,
    labels: Vec<f32>,
    num_instances: usize,
}

impl TestSet {
    /// Total number of instances.
    pub fn num_instances(&self) -> usize {
        self.num_instances
    }

    /// Full feature matrix `[n, FEATURE_WIDTH]`.
    pub fn features_tensor(&self, device: &Device) -> DeepFlResult<Tensor> {
        Ok(Tensor::from_slice(
            &self.features,
            (self.num_instances, FEATURE_WIDTH),
            device,
        )?)
    }

    /// Full one-hot label matrix `[n, NUM_CLASSES]`.
    pub fn labels_tensor(&self, device: &Device) -> DeepFlResult<Tensor> {
        Ok(Tensor::from_slice(
            &self.labels,
            (self.num_instances, NUM_CLASSES),
            device,
        )?)
    }
}

/// The train/test split read from the five input files.
#[derive(Debug)]
pub struct Datasets {
    pub train: TrainSet,
    pub test: TestSet,
}

impl Datasets {
    /// Load CSV feature and label files plus the group-assignment file.
    pub fn load(
        train_file: &Path,
        train_label_file: &Path,
        test_file: &Path,
        test_label_file: &Path,
        group_file: &Path,
        seed: u64,
    ) -> DeepFlResult<Self> {
        let (train_features, train_n) = read_feature_file(train_file)?;
        let train_labels = read_label_file(train_label_file, train_n)?;
        let groups = read_group_file(group_file, train_n)?;

        let (test_features, test_n) = read_feature_file(test_file)?;
        let test_labels = read_label_file(test_label_file, test_n)?;

        debug!(
            train_instances = train_n,
            test_instances = test_n,
            width = FEATURE_WIDTH,
            "datasets loaded"
        );

        Ok(Self {
            train: TrainSet::new(train_features, train_labels, groups, seed),
            test: TestSet {
                features: test_features,
                labels: test_labels,
                num_instances: test_n,
            },
        })
    }
}

/// Parse a CSV feature file, validating every row against the declared
/// width. Returns the flat row-major buffer and the instance count.
fn read_feature_file(path: &Path) -> DeepFlResult<(Vec<f32>, usize)> {
    let reader = BufReader::new(File::open(path)?);
    let mut features = Vec::new();
    let mut n = 0usize;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row = parse_float_row(&line, path, line_no)?;
        validate_width(row.len())?;
        features.extend_from_slice(&row);
        n += 1;
    }
    Ok((features, n))
}

/// Parse a label file into one-hot pairs. A row may be a single class
/// index (`0`/`1`) or an explicit two-column one-hot row.
fn read_label_file(path: &Path, expected_instances: usize) -> DeepFlResult<Vec<f32>> {
    let reader = BufReader::new(File::open(path)?);
    let mut labels = Vec::with_capacity(expected_instances * NUM_CLASSES);
    let mut n = 0usize;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row = parse_float_row(&line, path, line_no)?;
        match row.len() {
            1 => {
                let class = row[0] as usize;
                if row[0] < 0.0 || row[0].fract() != 0.0 || class >= NUM_CLASSES {
                    return Err(DeepFlError::InvalidInput(format!(
                        "{}:{}: label must be a class index in 0..{}, got {}",
                        path.display(),
                        line_no + 1,
                        NUM_CLASSES,
                        row[0]
                    )));
                }
                let mut one_hot = [0.0f32; NUM_CLASSES];
                one_hot[class] = 1.0;
                labels.extend_from_slice(&one_hot);
            }
            len if len == NUM_CLASSES => labels.extend_from_slice(&row),
            len => {
                return Err(DeepFlError::InvalidInput(format!(
                    "{}:{}: label row must have 1 or {} columns, got {}",
                    path.display(),
                    line_no + 1,
                    NUM_CLASSES,
                    len
                )))
            }
        }
        n += 1;
    }
    if n != expected_instances {
        return Err(DeepFlError::InvalidInput(format!(
            "{}: {} label rows for {} instances",
            path.display(),
            n,
            expected_instances
        )));
    }
    Ok(labels)
}

/// Parse the group-assignment file: one integer per training instance.
fn read_group_file(path: &Path, expected_instances: usize) -> DeepFlResult<Vec<u32>> {
    let reader = BufReader::new(File::open(path)?);
    let mut groups = Vec::with_capacity(expected_instances);
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let id: u32 = trimmed.parse().map_err(|_| {
            DeepFlError::InvalidInput(format!(
                "{}:{}: group id must be a non-negative integer, got {:?}",
                path.display(),
                line_no + 1,
                trimmed
            ))
        })?;
        groups.push(id);
    }
    if groups.len() != expected_instances {
        return Err(DeepFlError::InvalidInput(format!(
            "{}: {} group rows for {} instances",
            path.display(),
            groups.len(),
            expected_instances
        )));
    }
    Ok(groups)
}

fn parse_float_row(line: &str, path: &Path, line_no: usize) -> DeepFlResult<Vec<f32>> {
    line.split(',')
        .map(|field| {
            field.trim().parse::<f32>().map_err(|_| {
                DeepFlError::InvalidInput(format!(
                    "{}:{}: cannot parse {:?} as a float",
                    path.display(),
                    line_no + 1,
                    field.trim()
                ))
            })
        })
        .collect()
}
