//! Multi-branch model: per-feature-group embeddings fused into class logits.
//!
//! Parameters are an explicit object graph: every branch owns its own
//! [`DenseLayer`] and the [`BuildContext`] records which weights are
//! regularized and monitored. No ambient global state is involved; the
//! context is created before model construction and consulted afterwards
//! for the L2 term and the monitoring hooks.

pub mod context;
pub mod layer;
pub mod network;

pub use context::{BuildContext, MonitoredVar};
pub use layer::DenseLayer;
pub use network::DeepFlModel;
