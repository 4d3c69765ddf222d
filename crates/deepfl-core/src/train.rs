//! Training orchestrator: builds the model, runs the epoch/batch loop,
//! and periodically dumps test-set suspiciousness scores.
//!
//! The loop is strictly sequential: the optimizer step for batch *i+1*
//! never begins before batch *i* completes, and evaluation only runs
//! after the triggering epoch's last update. A full run is the unit of
//! work; there is no early stopping, no learning-rate schedule, and no
//! parameter checkpointing. The only durable outputs are the per-dump
//! score files and the monitoring stream.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use candle_core::Device;
use candle_nn::ops::softmax;
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use tracing::{info, warn};

use crate::config::TrainingConfig;
use crate::dataset::{Datasets, TestSet};
use crate::error::DeepFlResult;
use crate::features::{BranchInputs, FAULTY_CLASS, FEATURE_WIDTH};
use crate::loss::{loss_func, LossMode};
use crate::model::{BuildContext, DeepFlModel};
use crate::monitor::SummaryWriter;

/// Invocation arguments: the six filesystem paths, the loss-mode
/// selector, and two sizing integers.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub train_file: PathBuf,
    pub train_label_file: PathBuf,
    pub test_file: PathBuf,
    pub test_label_file: PathBuf,
    pub group_file: PathBuf,
    /// Base name for score dumps; epoch `e` writes `<susp_file>-<e+1>`.
    pub susp_file: PathBuf,
    pub loss: LossMode,
    /// Declared input width. Accepted for interface compatibility with
    /// the original harness; branch widths are fixed by the partition in
    /// [`crate::features`], so a disagreement is only warned about.
    pub feature_num: usize,
    /// Declared hidden-node count. Accepted but unused: layer widths are
    /// hard-coded per branch.
    pub node_num: usize,
}

/// What a completed run did, for the harness and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainReport {
    /// Epochs executed.
    pub epochs: usize,
    /// Optimizer steps applied.
    pub updates: usize,
    /// Score files written.
    pub dumps: usize,
}

/// Train for the configured epoch count and dump scores every
/// `dump_step` epochs.
pub fn run(args: &RunArgs, config: &TrainingConfig) -> DeepFlResult<TrainReport> {
    config.validate()?;
    if args.feature_num != FEATURE_WIDTH {
        warn!(
            declared = args.feature_num,
            actual = FEATURE_WIDTH,
            "feature_num disagrees with the fixed partition; the declared value is ignored"
        );
    }

    let device = Device::Cpu;
    let mut datasets = Datasets::load(
        &args.train_file,
        &args.train_label_file,
        &args.test_file,
        &args.test_label_file,
        &args.group_file,
        config.seed,
    )?;

    // BUILD: parameters are created once and shared by the training and
    // evaluation passes; only the optimizer mutates them.
    let mut ctx = BuildContext::new(config.l2_value, &device);
    let model = DeepFlModel::new(&mut ctx)?;
    let params = ParamsAdamW {
        lr: config.learning_rate,
        // L2 enters the loss through the BuildContext term, not as
        // optimizer-side weight decay.
        weight_decay: 0.0,
        ..Default::default()
    };
    let mut optimizer = AdamW::new(model.trainable_vars(), params)?;
    let mut summaries = SummaryWriter::new(Path::new(&config.log_dir))?;

    info!(
        train_instances = datasets.train.num_instances(),
        test_instances = datasets.test.num_instances(),
        epochs = config.training_epochs,
        batch_size = config.batch_size,
        "starting training"
    );

    let mut updates = 0usize;
    let mut dumps = 0usize;
    for epoch in 0..config.training_epochs {
        let total_batch = datasets.train.num_batches(config.batch_size);
        if total_batch == 0 {
            warn!(
                epoch = epoch + 1,
                instances = datasets.train.num_instances(),
                batch_size = config.batch_size,
                "training set smaller than batch size; epoch trains nothing"
            );
        }

        // Batch-size-weighted running average of the data loss. All
        // batches share one size, so this reduces to a plain mean.
        let mut avg_cost = 0.0f64;
        for _ in 0..total_batch {
            let batch = datasets.train.next_batch(config.batch_size);
            let x = batch.features_tensor(&device)?;
            let y = batch.labels_tensor(&device)?;
            let inputs = BranchInputs::split(&x)?;

            let logits = model.forward(&inputs, config.dropout_rate, true)?;
            let data_loss = loss_func(&logits, &y, args.loss, batch.groups())?;
            let total_loss = data_loss.add(&ctx.regularization_loss()?)?;
            optimizer.backward_step(&total_loss)?;
            updates += 1;

            avg_cost += data_loss.to_scalar::<f32>()? as f64 / total_batch as f64;
        }

        let regu_loss: f32 = ctx.regularization_loss()?.to_scalar()?;
        if epoch % config.display_step == 0 {
            info!(
                "epoch {:04} cost={:.9} l2_loss={:.6}",
                epoch + 1,
                avg_cost,
                regu_loss
            );
        }

        if epoch % config.dump_step == config.dump_step - 1 {
            dump_scores(&model, &datasets.test, &args.susp_file, epoch, &device)?;
            for hook in ctx.monitored() {
                summaries.histogram(&hook.name, epoch, hook.var.as_tensor())?;
            }
            summaries.scalar("train/avg_cost", epoch, avg_cost as f32)?;
            summaries.scalar("train/l2_loss", epoch, regu_loss)?;
            summaries.flush()?;
            dumps += 1;
        }
    }

    Ok(TrainReport {
        epochs: config.training_epochs,
        updates,
        dumps,
    })
}

/// Full forward pass over the test set with dropout disabled, writing one
/// class-0 softmax score per line to `<susp_file>-<epoch+1>`. Each dump
/// is an independent snapshot file: opened, fully written, flushed, and
/// closed here, so a failure cannot corrupt earlier snapshots.
fn dump_scores(
    model: &DeepFlModel,
    test: &TestSet,
    susp_file: &Path,
    epoch: usize,
    device: &Device,
) -> DeepFlResult<()> {
    let x = test.features_tensor(device)?;
    let inputs = BranchInputs::split(&x)?;
    let logits = model.forward(&inputs, 1.0, false)?;
    let scores: Vec<f32> = softmax(&logits, 1)?
        .narrow(1, FAULTY_CLASS, 1)?
        .squeeze(1)?
        .to_vec1()?;

    let path = susp_path(susp_file, epoch);
    let mut out = BufWriter::new(File::create(&path)?);
    for score in &scores {
        writeln!(out, "{}", score)?;
    }
    out.flush()?;
    info!(path = %path.display(), instances = scores.len(), "scores dumped");
    Ok(())
}

/// Snapshot path for a dump at `epoch`: `<base>-<epoch+1>` (1-indexed for
/// display, matching the epoch logging).
fn susp_path(base: &Path, epoch: usize) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(format!("-{}", epoch + 1));
    PathBuf::from(name)
}
