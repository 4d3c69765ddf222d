//! Branch sub-networks and the hierarchical fusion network.
//!
//! Each named feature group gets its own independently parameterized
//! dense block whose output width is double its input width. Fusion then
//! runs three concatenate-and-compress stages; the concatenation order is
//! load-bearing, since it determines which fusion weights pair with which
//! branch features.

use candle_core::{DType, Tensor, Var};

use crate::error::DeepFlResult;
use crate::features::{
    BranchInputs, AUXILIARY_DIM, COMPLEXITY_DIM, MUTATION_DIM, NUM_CLASSES, NUM_MUTATION_GROUPS,
    SIMILARITY_DIM, SPECTRUM_DIM,
};
use crate::model::context::BuildContext;
use crate::model::layer::DenseLayer;

/// Fixed expansion factor: every branch doubles its input width.
pub const MODEL_SIZE_MULTIPLIER: usize = 2;

/// Width of the spectrum-stage compression (before the multiplier).
const SPECTRUM_FUSE_DIM: usize = 32;

/// Hidden width of the top fusion stage feeding the output projection.
pub const FUSED_HIDDEN_DIM: usize = 128;

/// The multi-branch fault-localization model.
pub struct DeepFlModel {
    mutation: [DenseLayer; NUM_MUTATION_GROUPS],
    mutation_fuse: DenseLayer,
    spectrum: DenseLayer,
    auxiliary: DenseLayer,
    spectrum_fuse: DenseLayer,
    complexity: DenseLayer,
    similarity: DenseLayer,
    top_fuse: DenseLayer,
    out_weight: Var,
    out_bias: Var,
}

impl DeepFlModel {
    /// Build all branch and fusion layers, registering every weight with
    /// the context. Weights are created once and shared by the training
    /// and evaluation passes.
    pub fn new(ctx: &mut BuildContext) -> DeepFlResult<Self> {
        let m = MODEL_SIZE_MULTIPLIER;

        let mutation = [
            DenseLayer::new(ctx, "mut/mut1", MUTATION_DIM, MUTATION_DIM * m)?,
            DenseLayer::new(ctx, "mut/mut2", MUTATION_DIM, MUTATION_DIM * m)?,
            DenseLayer::new(ctx, "mut/mut3", MUTATION_DIM, MUTATION_DIM * m)?,
            DenseLayer::new(ctx, "mut/mut4", MUTATION_DIM, MUTATION_DIM * m)?,
        ];
        let mutation_fuse = DenseLayer::new(
            ctx,
            "mut/concat",
            NUM_MUTATION_GROUPS * MUTATION_DIM * m,
            MUTATION_DIM * m,
        )?;

        let spectrum = DenseLayer::new(ctx, "spec/spec", SPECTRUM_DIM, SPECTRUM_DIM * m)?;
        let auxiliary = DenseLayer::new(ctx, "spec/new", AUXILIARY_DIM, AUXILIARY_DIM * m)?;
        let spectrum_fuse = DenseLayer::new(
            ctx,
            "spec/fc1",
            (SPECTRUM_DIM + AUXILIARY_DIM + MUTATION_DIM) * m,
            SPECTRUM_FUSE_DIM * m,
        )?;

        let complexity = DenseLayer::new(ctx, "fc/complex", COMPLEXITY_DIM, COMPLEXITY_DIM * m)?;
        let similarity = DenseLayer::new(ctx, "fc/similar", SIMILARITY_DIM, SIMILARITY_DIM * m)?;
        let top_fuse = DenseLayer::new(
            ctx,
            "fc/fc1",
            (SPECTRUM_FUSE_DIM + COMPLEXITY_DIM + SIMILARITY_DIM) * m,
            FUSED_HIDDEN_DIM,
        )?;

        let out_weight = ctx.create_weight("final_weight", FUSED_HIDDEN_DIM, NUM_CLASSES)?;
        let out_bias = Var::zeros(NUM_CLASSES, DType::F32, ctx.device())?;

        Ok(Self {
            mutation,
            mutation_fuse,
            spectrum,
            auxiliary,
            spectrum_fuse,
            complexity,
            similarity,
            top_fuse,
            out_weight,
            out_bias,
        })
    }

    /// Forward pass: branch embeddings → three fusion stages → raw logits
    /// `[N, 2]`. No activation on the output projection.
    pub fn forward(
        &self,
        inputs: &BranchInputs,
        keep_prob: f32,
        training: bool,
    ) -> DeepFlResult<Tensor> {
        let mut1 = self.mutation[0].forward(&inputs.mutation[0], keep_prob, training)?;
        let mut2 = self.mutation[1].forward(&inputs.mutation[1], keep_prob, training)?;
        let mut3 = self.mutation[2].forward(&inputs.mutation[2], keep_prob, training)?;
        let mut4 = self.mutation[3].forward(&inputs.mutation[3], keep_prob, training)?;
        let mut_cat = Tensor::cat(&[&mut1, &mut2, &mut3, &mut4], 1)?;
        let mut_fused = self.mutation_fuse.forward(&mut_cat, keep_prob, training)?;

        let spec = self.spectrum.forward(&inputs.spectrum, keep_prob, training)?;
        let aux = self.auxiliary.forward(&inputs.auxiliary, keep_prob, training)?;
        let spec_cat = Tensor::cat(&[&spec, &aux, &mut_fused], 1)?;
        let spec_fused = self.spectrum_fuse.forward(&spec_cat, keep_prob, training)?;

        let complexity = self
            .complexity
            .forward(&inputs.complexity, keep_prob, training)?;
        let similarity = self
            .similarity
            .forward(&inputs.similarity, keep_prob, training)?;
        let top_cat = Tensor::cat(&[&spec_fused, &complexity, &similarity], 1)?;
        let hidden = self.top_fuse.forward(&top_cat, keep_prob, training)?;

        Ok(hidden
            .matmul(self.out_weight.as_tensor())?
            .broadcast_add(self.out_bias.as_tensor())?)
    }

    /// All trainable variables, for the optimizer.
    pub fn trainable_vars(&self) -> Vec<Var> {
        let mut vars = Vec::new();
        for layer in &self.mutation {
            vars.extend(layer.vars());
        }
        for layer in [
            &self.mutation_fuse,
            &self.spectrum,
            &self.auxiliary,
            &self.spectrum_fuse,
            &self.complexity,
            &self.similarity,
            &self.top_fuse,
        ] {
            vars.extend(layer.vars());
        }
        vars.push(self.out_weight.clone());
        vars.push(self.out_bias.clone());
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FEATURE_WIDTH;
    use candle_core::Device;

    fn test_batch(n: usize, scale: f32) -> Tensor {
        let data: Vec<f32> = (0..n * FEATURE_WIDTH)
            .map(|i| ((i as f32 * 0.17).sin() * scale).abs())
            .collect();
        Tensor::from_slice(&data, (n, FEATURE_WIDTH), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_forward_shape_and_param_count() {
        let mut ctx = BuildContext::new(0.001, &Device::Cpu);
        let model = DeepFlModel::new(&mut ctx).unwrap();

        // 11 branch/fusion weights plus the output projection.
        assert_eq!(ctx.num_regularized(), 12);
        // Each dense layer has weight + bias; plus output weight + bias.
        assert_eq!(model.trainable_vars().len(), 11 * 2 + 2);

        let inputs = BranchInputs::split(&test_batch(3, 1.0)).unwrap();
        let logits = model.forward(&inputs, 1.0, false).unwrap();
        assert_eq!(logits.dims(), &[3, NUM_CLASSES]);
    }

    #[test]
    fn test_eval_forward_deterministic() {
        let mut ctx = BuildContext::new(0.001, &Device::Cpu);
        let model = DeepFlModel::new(&mut ctx).unwrap();
        let inputs = BranchInputs::split(&test_batch(4, 1.0)).unwrap();

        let a: Vec<Vec<f32>> = model
            .forward(&inputs, 1.0, false)
            .unwrap()
            .to_vec2()
            .unwrap();
        let b: Vec<Vec<f32>> = model
            .forward(&inputs, 1.0, false)
            .unwrap()
            .to_vec2()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_mutation_order_is_load_bearing() {
        let mut ctx = BuildContext::new(0.001, &Device::Cpu);
        let model = DeepFlModel::new(&mut ctx).unwrap();

        let batch = test_batch(2, 1.0);
        let inputs = BranchInputs::split(&batch).unwrap();
        let baseline: Vec<Vec<f32>> = model
            .forward(&inputs, 1.0, false)
            .unwrap()
            .to_vec2()
            .unwrap();

        // Swap mutation slices 1 and 2 while holding weights fixed: the
        // output must change, because each slot has its own parameters.
        let mut swapped = BranchInputs::split(&batch).unwrap();
        swapped.mutation.swap(0, 1);
        let permuted: Vec<Vec<f32>> = model
            .forward(&swapped, 1.0, false)
            .unwrap()
            .to_vec2()
            .unwrap();

        let differs = baseline
            .iter()
            .flatten()
            .zip(permuted.iter().flatten())
            .any(|(a, b)| (a - b).abs() > 1e-6);
        assert!(differs, "permuting mutation inputs should change the output");
    }

    #[test]
    fn test_identical_mutation_inputs_are_order_invariant_per_instance() {
        // With all four mutation slices identical, swapping them is a
        // no-op and the output must not change.
        let mut ctx = BuildContext::new(0.001, &Device::Cpu);
        let model = DeepFlModel::new(&mut ctx).unwrap();

        let batch = test_batch(2, 1.0);
        let mut inputs = BranchInputs::split(&batch).unwrap();
        let first = inputs.mutation[0].clone();
        inputs.mutation = [first.clone(), first.clone(), first.clone(), first];

        let a: Vec<Vec<f32>> = model
            .forward(&inputs, 1.0, false)
            .unwrap()
            .to_vec2()
            .unwrap();
        inputs.mutation.swap(1, 3);
        let b: Vec<Vec<f32>> = model
            .forward(&inputs, 1.0, false)
            .unwrap()
            .to_vec2()
            .unwrap();
        assert_eq!(a, b);
    }
}
