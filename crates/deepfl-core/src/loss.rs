//! Loss functions: softmax cross-entropy and grouping-aware pairwise
//! ranking.
//!
//! Labels enter both losses as plain tensors, never `Var`s, so gradients
//! cannot flow into them; they are constants by construction.

use std::collections::BTreeMap;
use std::str::FromStr;

use candle_core::Tensor;
use candle_nn::ops::{log_softmax, softmax};

use crate::error::{DeepFlError, DeepFlResult};
use crate::features::FAULTY_CLASS;

/// Which loss the training loop minimizes, selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossMode {
    /// One-hot softmax cross-entropy over the two classes.
    Softmax,
    /// Intra-group ranking: faulty entities must outscore non-faulty
    /// entities from the same test group.
    Pairwise,
}

impl FromStr for LossMode {
    type Err = DeepFlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "softmax" => Ok(Self::Softmax),
            "pairwise" | "epairs" => Ok(Self::Pairwise),
            other => Err(DeepFlError::InvalidInput(format!(
                "unknown loss mode {:?} (expected \"softmax\" or \"pairwise\")",
                other
            ))),
        }
    }
}

/// Compute the selected data loss.
///
/// * `logits` - raw class scores `[N, 2]`
/// * `labels` - one-hot targets `[N, 2]`
/// * `groups` - group id per instance, used only by the pairwise mode
pub fn loss_func(
    logits: &Tensor,
    labels: &Tensor,
    mode: LossMode,
    groups: &[u32],
) -> DeepFlResult<Tensor> {
    match mode {
        LossMode::Softmax => softmax_cross_entropy(logits, labels),
        LossMode::Pairwise => pairwise_group_loss(logits, labels, groups),
    }
}

/// Differentiable one-hot cross-entropy: `-mean(Σ y ⊙ log_softmax(logits))`.
fn softmax_cross_entropy(logits: &Tensor, labels: &Tensor) -> DeepFlResult<Tensor> {
    let log_probs = log_softmax(logits, 1)?;
    let nll = labels.mul(&log_probs)?.sum(1)?.neg()?;
    Ok(nll.mean_all()?)
}

/// Intra-group pairwise ranking loss on the class-0 (faulty) softmax
/// score. For every (faulty, non-faulty) pair inside a group the penalty
/// is `softplus(-(s_faulty - s_clean))`; pairs are averaged per group and
/// groups averaged overall. Groups without both kinds of instance
/// contribute nothing; if no group yields a pair the loss falls back to
/// softmax cross-entropy so the step still has a gradient.
fn pairwise_group_loss(
    logits: &Tensor,
    labels: &Tensor,
    groups: &[u32],
) -> DeepFlResult<Tensor> {
    let n = logits.dim(0)?;
    if groups.len() != n {
        return Err(DeepFlError::InvalidInput(format!(
            "{} group ids for {} instances",
            groups.len(),
            n
        )));
    }

    let scores = softmax(logits, 1)?
        .narrow(1, FAULTY_CLASS, 1)?
        .squeeze(1)?
        .contiguous()?;
    let label_rows: Vec<Vec<f32>> = labels.to_vec2()?;

    // Partition instance indices by group, then by class.
    let mut by_group: BTreeMap<u32, (Vec<u32>, Vec<u32>)> = BTreeMap::new();
    for (i, (&g, row)) in groups.iter().zip(label_rows.iter()).enumerate() {
        let entry = by_group.entry(g).or_default();
        if row[FAULTY_CLASS] > 0.5 {
            entry.0.push(i as u32);
        } else {
            entry.1.push(i as u32);
        }
    }

    let device = logits.device();
    let mut group_losses: Vec<Tensor> = Vec::new();
    for (faulty, clean) in by_group.values() {
        if faulty.is_empty() || clean.is_empty() {
            continue;
        }
        let f_idx = Tensor::from_slice(faulty, faulty.len(), device)?;
        let c_idx = Tensor::from_slice(clean, clean.len(), device)?;
        let s_faulty = scores.index_select(&f_idx, 0)?;
        let s_clean = scores.index_select(&c_idx, 0)?;

        // diff[i, j] = s_faulty[i] - s_clean[j]
        let diff = s_faulty
            .unsqueeze(1)?
            .broadcast_sub(&s_clean.unsqueeze(0)?)?;
        // softplus(-diff) = log(1 + exp(-diff)); scores live in [0, 1] so
        // the naive form is numerically safe here.
        let penalty = diff.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
        group_losses.push(penalty.mean_all()?);
    }

    if group_losses.is_empty() {
        return softmax_cross_entropy(logits, labels);
    }
    Ok(Tensor::stack(&group_losses, 0)?.mean_all()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn logits_and_labels() -> (Tensor, Tensor) {
        let device = Device::Cpu;
        let logits = Tensor::from_slice(
            &[2.0f32, -1.0, -0.5, 1.5, 1.0, 0.0, -2.0, 2.0],
            (4, 2),
            &device,
        )
        .unwrap();
        // Instances 0 and 2 are faulty (class 0), 1 and 3 are not.
        let labels = Tensor::from_slice(
            &[1.0f32, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0],
            (4, 2),
            &device,
        )
        .unwrap();
        (logits, labels)
    }

    #[test]
    fn test_loss_mode_parsing() {
        assert_eq!("softmax".parse::<LossMode>().unwrap(), LossMode::Softmax);
        assert_eq!("pairwise".parse::<LossMode>().unwrap(), LossMode::Pairwise);
        assert_eq!("epairs".parse::<LossMode>().unwrap(), LossMode::Pairwise);
        assert!("hinge".parse::<LossMode>().is_err());
    }

    #[test]
    fn test_softmax_cross_entropy_positive() {
        let (logits, labels) = logits_and_labels();
        let loss: f32 = loss_func(&logits, &labels, LossMode::Softmax, &[])
            .unwrap()
            .to_scalar()
            .unwrap();
        assert!(loss > 0.0, "cross-entropy should be positive, got {}", loss);
    }

    #[test]
    fn test_softmax_cross_entropy_rewards_correct_logits() {
        let device = Device::Cpu;
        let labels =
            Tensor::from_slice(&[1.0f32, 0.0, 0.0, 1.0], (2, 2), &device).unwrap();
        let good =
            Tensor::from_slice(&[5.0f32, -5.0, -5.0, 5.0], (2, 2), &device).unwrap();
        let bad =
            Tensor::from_slice(&[-5.0f32, 5.0, 5.0, -5.0], (2, 2), &device).unwrap();

        let good_loss: f32 = softmax_cross_entropy(&good, &labels)
            .unwrap()
            .to_scalar()
            .unwrap();
        let bad_loss: f32 = softmax_cross_entropy(&bad, &labels)
            .unwrap()
            .to_scalar()
            .unwrap();
        assert!(good_loss < bad_loss);
    }

    #[test]
    fn test_pairwise_prefers_faulty_outscoring_clean() {
        let device = Device::Cpu;
        let labels = Tensor::from_slice(
            &[1.0f32, 0.0, 0.0, 1.0],
            (2, 2),
            &device,
        )
        .unwrap();
        let groups = [0u32, 0];

        // Faulty instance 0 outscores clean instance 1 on class 0.
        let ranked =
            Tensor::from_slice(&[3.0f32, -3.0, -3.0, 3.0], (2, 2), &device).unwrap();
        // Inverted ranking.
        let inverted =
            Tensor::from_slice(&[-3.0f32, 3.0, 3.0, -3.0], (2, 2), &device).unwrap();

        let good: f32 = pairwise_group_loss(&ranked, &labels, &groups)
            .unwrap()
            .to_scalar()
            .unwrap();
        let bad: f32 = pairwise_group_loss(&inverted, &labels, &groups)
            .unwrap()
            .to_scalar()
            .unwrap();
        assert!(good < bad, "ranked {} should beat inverted {}", good, bad);
        assert!(good > 0.0);
    }

    #[test]
    fn test_pairwise_ignores_groups_without_pairs() {
        let (logits, labels) = logits_and_labels();
        // Group 0 holds both faulty instances, group 1 both clean ones:
        // no intra-group pair exists, so the softmax fallback kicks in.
        let groups = [0u32, 1, 0, 1];
        let fallback: f32 = pairwise_group_loss(&logits, &labels, &groups)
            .unwrap()
            .to_scalar()
            .unwrap();
        let ce: f32 = softmax_cross_entropy(&logits, &labels)
            .unwrap()
            .to_scalar()
            .unwrap();
        assert!((fallback - ce).abs() < 1e-6);
    }

    #[test]
    fn test_pairwise_rejects_group_count_mismatch() {
        let (logits, labels) = logits_and_labels();
        let err = pairwise_group_loss(&logits, &labels, &[0, 1]).unwrap_err();
        assert!(matches!(err, DeepFlError::InvalidInput(_)));
    }
}
