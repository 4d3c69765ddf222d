//! Command-line entry point for DeepFL training runs.
//!
//! Usage:
//!     deepfl --train-file train.csv --train-label-file train_labels.csv \
//!            --test-file test.csv --test-label-file test_labels.csv \
//!            --group-file groups.txt --susp-file out/susp \
//!            [--loss softmax] [--config train.toml]

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use deepfl_core::features::FEATURE_WIDTH;
use deepfl_core::loss::LossMode;
use deepfl_core::{run, DeepFlError, RunArgs, TrainingConfig};

#[derive(Debug, Parser)]
#[command(name = "deepfl", about = "Train a multi-branch fault-localization model")]
struct Cli {
    /// CSV file of training feature vectors.
    #[arg(long)]
    train_file: PathBuf,

    /// CSV file of training labels (class index or one-hot pair per line).
    #[arg(long)]
    train_label_file: PathBuf,

    /// CSV file of test feature vectors.
    #[arg(long)]
    test_file: PathBuf,

    /// CSV file of test labels.
    #[arg(long)]
    test_label_file: PathBuf,

    /// Group-assignment file: one integer per training instance.
    #[arg(long)]
    group_file: PathBuf,

    /// Base name for suspiciousness dumps; epoch e writes <susp-file>-<e+1>.
    #[arg(long)]
    susp_file: PathBuf,

    /// Loss mode: "softmax" or "pairwise".
    #[arg(long, default_value = "softmax")]
    loss: String,

    /// Declared input feature count (informational; the partition is fixed).
    #[arg(long, default_value_t = FEATURE_WIDTH)]
    feature_num: usize,

    /// Declared hidden-node count (informational; layer widths are fixed).
    #[arg(long, default_value_t = 128)]
    node_num: usize,

    /// Optional TOML file of training hyperparameters.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), DeepFlError> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => TrainingConfig::from_file(path)?,
        None => TrainingConfig::default(),
    };
    let loss: LossMode = cli.loss.parse()?;

    let args = RunArgs {
        train_file: cli.train_file,
        train_label_file: cli.train_label_file,
        test_file: cli.test_file,
        test_label_file: cli.test_label_file,
        group_file: cli.group_file,
        susp_file: cli.susp_file,
        loss,
        feature_num: cli.feature_num,
        node_num: cli.node_num,
    };

    let report = run(&args, &config)?;
    info!(
        epochs = report.epochs,
        updates = report.updates,
        dumps = report.dumps,
        "training finished"
    );
    Ok(())
}
