//! Named feature-group partition of the input vector.
//!
//! Every feature vector is a fixed-width row logically partitioned into
//! contiguous sub-ranges. This module is the single place of record for
//! that layout: slice offsets, branch input widths, and the total width
//! are all derived from the constants below. The trainer slices batches
//! with these offsets and the model sizes its branches with the same
//! widths, so the two can never disagree.

use candle_core::Tensor;

use crate::error::{DeepFlError, DeepFlResult};

/// Spectrum-based features.
pub const SPECTRUM_DIM: usize = 34;
/// Width of each of the four mutation-based feature groups.
pub const MUTATION_DIM: usize = 35;
/// Number of parallel mutation feature groups.
pub const NUM_MUTATION_GROUPS: usize = 4;
/// Code-complexity features.
pub const COMPLEXITY_DIM: usize = 37;
/// Textual-similarity features.
pub const SIMILARITY_DIM: usize = 15;
/// Learned auxiliary ("new") features, stored at the tail of the row.
pub const AUXILIARY_DIM: usize = 33;

/// Total feature-vector width: the sum of all group widths, never a
/// second literal.
pub const FEATURE_WIDTH: usize = SPECTRUM_DIM
    + NUM_MUTATION_GROUPS * MUTATION_DIM
    + COMPLEXITY_DIM
    + SIMILARITY_DIM
    + AUXILIARY_DIM;

/// Output classes: faulty (0) vs non-faulty (1).
pub const NUM_CLASSES: usize = 2;

/// Index of the faulty class; its softmax probability is the
/// suspiciousness score.
pub const FAULTY_CLASS: usize = 0;

pub const SPECTRUM_OFFSET: usize = 0;
pub const MUTATION_OFFSET: usize = SPECTRUM_OFFSET + SPECTRUM_DIM;
pub const COMPLEXITY_OFFSET: usize = MUTATION_OFFSET + NUM_MUTATION_GROUPS * MUTATION_DIM;
pub const SIMILARITY_OFFSET: usize = COMPLEXITY_OFFSET + COMPLEXITY_DIM;
pub const AUXILIARY_OFFSET: usize = FEATURE_WIDTH - AUXILIARY_DIM;

/// Reject any row whose flattened width differs from the declared
/// partition. Called at the data-load boundary so a malformed file fails
/// before any forward-pass computation is attempted.
pub fn validate_width(actual: usize) -> DeepFlResult<()> {
    if actual != FEATURE_WIDTH {
        return Err(DeepFlError::DimensionMismatch {
            expected: FEATURE_WIDTH,
            actual,
        });
    }
    Ok(())
}

/// A `[N, FEATURE_WIDTH]` batch split into the named branch inputs.
#[derive(Debug)]
pub struct BranchInputs {
    pub spectrum: Tensor,
    pub mutation: [Tensor; NUM_MUTATION_GROUPS],
    pub complexity: Tensor,
    pub similarity: Tensor,
    pub auxiliary: Tensor,
}

impl BranchInputs {
    /// Slice a batch into the named sub-ranges using the fixed offsets.
    ///
    /// The batch must be a rank-2 tensor of width [`FEATURE_WIDTH`].
    pub fn split(batch: &Tensor) -> DeepFlResult<Self> {
        let (_, width) = batch.dims2()?;
        validate_width(width)?;

        let mut_slice = |i: usize| batch.narrow(1, MUTATION_OFFSET + i * MUTATION_DIM, MUTATION_DIM);
        Ok(Self {
            spectrum: batch.narrow(1, SPECTRUM_OFFSET, SPECTRUM_DIM)?,
            mutation: [mut_slice(0)?, mut_slice(1)?, mut_slice(2)?, mut_slice(3)?],
            complexity: batch.narrow(1, COMPLEXITY_OFFSET, COMPLEXITY_DIM)?,
            similarity: batch.narrow(1, SIMILARITY_OFFSET, SIMILARITY_DIM)?,
            auxiliary: batch.narrow(1, AUXILIARY_OFFSET, AUXILIARY_DIM)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_partition_sums_to_total() {
        assert_eq!(34 + 35 * 4 + 37 + 15 + 33, FEATURE_WIDTH);
        assert_eq!(FEATURE_WIDTH, 259);
    }

    #[test]
    fn test_offsets_match_declared_layout() {
        assert_eq!(SPECTRUM_OFFSET, 0);
        assert_eq!(MUTATION_OFFSET, 34);
        assert_eq!(COMPLEXITY_OFFSET, 174);
        assert_eq!(SIMILARITY_OFFSET, 211);
        assert_eq!(AUXILIARY_OFFSET, 226);
    }

    #[test]
    fn test_validate_width_rejects_off_by_one() {
        assert!(validate_width(FEATURE_WIDTH).is_ok());
        let err = validate_width(FEATURE_WIDTH - 1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Feature width mismatch: expected 259, got 258"
        );
    }

    #[test]
    fn test_split_produces_branch_widths() {
        let device = Device::Cpu;
        let data: Vec<f32> = (0..2 * FEATURE_WIDTH).map(|i| i as f32).collect();
        let batch = Tensor::from_slice(&data, (2, FEATURE_WIDTH), &device).unwrap();

        let inputs = BranchInputs::split(&batch).unwrap();
        assert_eq!(inputs.spectrum.dims(), &[2, SPECTRUM_DIM]);
        for m in &inputs.mutation {
            assert_eq!(m.dims(), &[2, MUTATION_DIM]);
        }
        assert_eq!(inputs.complexity.dims(), &[2, COMPLEXITY_DIM]);
        assert_eq!(inputs.similarity.dims(), &[2, SIMILARITY_DIM]);
        assert_eq!(inputs.auxiliary.dims(), &[2, AUXILIARY_DIM]);

        // The auxiliary slice is the tail of the row.
        let aux: Vec<Vec<f32>> = inputs.auxiliary.to_vec2().unwrap();
        assert_eq!(aux[0][AUXILIARY_DIM - 1], (FEATURE_WIDTH - 1) as f32);
    }

    #[test]
    fn test_split_rejects_short_rows() {
        let device = Device::Cpu;
        let data: Vec<f32> = vec![0.0; 2 * (FEATURE_WIDTH - 1)];
        let batch = Tensor::from_slice(&data, (2, FEATURE_WIDTH - 1), &device).unwrap();

        let err = BranchInputs::split(&batch).unwrap_err();
        assert!(matches!(
            err,
            DeepFlError::DimensionMismatch {
                expected: 259,
                actual: 258
            }
        ));
    }
}
