//! Single fully connected block: affine → dropout → relu.

use candle_core::{Tensor, Var};
use candle_nn::ops::dropout;

use crate::error::DeepFlResult;
use crate::model::context::BuildContext;

/// One dense layer. The weight comes from the [`BuildContext`] factory
/// (regularized, monitored); the bias is drawn from a standard normal
/// distribution and is deliberately outside the regularized set.
pub struct DenseLayer {
    weight: Var,
    bias: Var,
}

impl DenseLayer {
    /// Create a layer named `<name>/weight` in the context's registry.
    pub fn new(
        ctx: &mut BuildContext,
        name: &str,
        input_dim: usize,
        output_dim: usize,
    ) -> DeepFlResult<Self> {
        let weight = ctx.create_weight(&format!("{}/weight", name), input_dim, output_dim)?;
        let bias = Var::randn(0f32, 1f32, output_dim, ctx.device())?;
        Ok(Self { weight, bias })
    }

    /// `relu(dropout(x·W + b))`. The ordering is fixed: dropout applies to
    /// the pre-activation values. Dropout is active only during training
    /// with `keep_prob < 1.0`; evaluation passes `keep_prob = 1.0` and the
    /// layer reduces to affine + relu exactly.
    pub fn forward(&self, input: &Tensor, keep_prob: f32, training: bool) -> DeepFlResult<Tensor> {
        let pre = input
            .matmul(self.weight.as_tensor())?
            .broadcast_add(self.bias.as_tensor())?;
        let pre = if training && keep_prob < 1.0 {
            dropout(&pre, 1.0 - keep_prob)?
        } else {
            pre
        };
        Ok(pre.relu()?)
    }

    /// Trainable variables of this layer.
    pub fn vars(&self) -> Vec<Var> {
        vec![self.weight.clone(), self.bias.clone()]
    }

    /// Weight matrix view (for tests and monitoring).
    pub fn weight(&self) -> &Tensor {
        self.weight.as_tensor()
    }

    /// Bias vector view.
    pub fn bias(&self) -> &Tensor {
        self.bias.as_tensor()
    }
}
