//! Deep-learning-based fault localization (DeepFL).
//!
//! Trains a multi-branch feed-forward network over per-program-entity
//! feature vectors (spectrum-based, mutation-based, complexity, textual
//! similarity, and learned auxiliary features) and predicts a
//! suspiciousness score for each entity: the probability that it is the
//! fault location.
//!
//! # Architecture
//!
//! ```text
//! feature vector [259] ──split──> named slices
//!    │
//!    ├─ mut1..mut4 ─┬─> concat ─> fuse ─┐
//!    ├─ spectrum ───┤                   │
//!    ├─ auxiliary ──┴───────> concat ─> fuse ─┐
//!    ├─ complexity ───────────────────────────┤
//!    └─ similarity ──────────────> concat ─> fuse ─> logits [2]
//! ```
//!
//! Each branch is an independently parameterized dense block; fusion
//! stages concatenate sibling outputs and compress them. Training runs a
//! fixed number of epochs with AdamW and periodically dumps ranked
//! class-0 softmax scores for external evaluation.
//!
//! # Modules
//!
//! - [`features`]: the named feature-group partition (one place of record)
//! - [`dataset`]: CSV loading, train/test split, batch cursor
//! - [`model`]: dense blocks, branch sub-networks, fusion network
//! - [`loss`]: softmax cross-entropy and grouping-aware pairwise ranking
//! - [`monitor`]: JSONL summary stream (histograms, scalars)
//! - [`train`]: the epoch/batch orchestrator and score dumps

pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod loss;
pub mod model;
pub mod monitor;
pub mod train;

pub use config::TrainingConfig;
pub use error::{DeepFlError, DeepFlResult};
pub use train::{run, RunArgs, TrainReport};
