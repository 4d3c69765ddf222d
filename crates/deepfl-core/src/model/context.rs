//! Build-time state threaded through model construction.
//!
//! Replaces process-wide collections with an explicit object: every
//! weight created here is recorded for (a) the L2 regularization term and
//! (b) monitoring (value histogram plus near-zero fraction), and both
//! lists are read back explicitly by the trainer.

use candle_core::{DType, Device, Tensor, Var};

use crate::error::DeepFlResult;

/// A weight registered for monitoring, identified by its hierarchical
/// path-like name (e.g. `mut/mut1/weight`).
#[derive(Debug, Clone)]
pub struct MonitoredVar {
    pub name: String,
    pub var: Var,
}

/// Weight factory and accumulator for regularization and monitoring.
pub struct BuildContext {
    l2_value: f64,
    device: Device,
    regularized: Vec<Var>,
    monitored: Vec<MonitoredVar>,
}

impl BuildContext {
    /// Create a context with the given L2 strength on the given device.
    pub fn new(l2_value: f64, device: &Device) -> Self {
        Self {
            l2_value,
            device: device.clone(),
            regularized: Vec::new(),
            monitored: Vec::new(),
        }
    }

    /// Device all weights are created on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Create a trainable weight matrix with Xavier-uniform (variance
    /// scaling) initialization, registered for regularization and
    /// monitoring.
    pub fn create_weight(
        &mut self,
        name: &str,
        fan_in: usize,
        fan_out: usize,
    ) -> DeepFlResult<Var> {
        let bound = (6.0 / (fan_in + fan_out) as f64).sqrt() as f32;
        let var = Var::rand(-bound, bound, (fan_in, fan_out), &self.device)?;
        self.register(name, var.clone());
        Ok(var)
    }

    /// Create a trainable weight from an explicit initializer tensor,
    /// registered the same way as [`create_weight`](Self::create_weight).
    pub fn create_weight_from(&mut self, name: &str, init: &Tensor) -> DeepFlResult<Var> {
        let var = Var::from_tensor(init)?;
        self.register(name, var.clone());
        Ok(var)
    }

    fn register(&mut self, name: &str, var: Var) {
        self.regularized.push(var.clone());
        self.monitored.push(MonitoredVar {
            name: name.to_string(),
            var,
        });
    }

    /// Differentiable L2 penalty over all registered weights:
    /// `0.5 * l2_value * Σ ||W_i||²`, recomputed from the live weights so
    /// each optimizer step sees the current values.
    pub fn regularization_loss(&self) -> DeepFlResult<Tensor> {
        let mut total: Option<Tensor> = None;
        for var in &self.regularized {
            let sq = var.as_tensor().sqr()?.sum_all()?;
            total = Some(match total {
                Some(t) => t.add(&sq)?,
                None => sq,
            });
        }
        match total {
            Some(t) => Ok(t.affine(0.5 * self.l2_value, 0.0)?),
            None => Ok(Tensor::zeros((), DType::F32, &self.device)?),
        }
    }

    /// Weights registered for monitoring, in creation order.
    pub fn monitored(&self) -> &[MonitoredVar] {
        &self.monitored
    }

    /// Number of regularized weight tensors.
    pub fn num_regularized(&self) -> usize {
        self.regularized.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context_has_zero_penalty() {
        let ctx = BuildContext::new(0.01, &Device::Cpu);
        let loss: f32 = ctx.regularization_loss().unwrap().to_scalar().unwrap();
        assert_eq!(loss, 0.0);
    }

    #[test]
    fn test_regularization_accumulates_over_weights() {
        let device = Device::Cpu;
        let l2 = 0.1f64;
        let mut ctx = BuildContext::new(l2, &device);

        // Three weights with known squared norms: 4*1, 4*4, 4*9.
        let mut expected = 0.0f64;
        for (i, fill) in [1.0f32, 2.0, 3.0].iter().enumerate() {
            let init = Tensor::from_slice(&[*fill; 4], (2, 2), &device).unwrap();
            ctx.create_weight_from(&format!("w{}", i), &init).unwrap();
            expected += 0.5 * l2 * (4.0 * (*fill as f64) * (*fill as f64));
        }
        assert_eq!(ctx.num_regularized(), 3);

        let loss: f32 = ctx.regularization_loss().unwrap().to_scalar().unwrap();
        assert!(
            (loss as f64 - expected).abs() < 1e-5,
            "expected {}, got {}",
            expected,
            loss
        );
    }

    #[test]
    fn test_created_weights_are_monitored() {
        let mut ctx = BuildContext::new(0.01, &Device::Cpu);
        ctx.create_weight("a/weight", 4, 8).unwrap();
        ctx.create_weight("b/weight", 8, 2).unwrap();

        let names: Vec<&str> = ctx.monitored().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a/weight", "b/weight"]);
        assert_eq!(ctx.monitored()[0].var.as_tensor().dims(), &[4, 8]);
    }

    #[test]
    fn test_xavier_bound() {
        let mut ctx = BuildContext::new(0.0, &Device::Cpu);
        let var = ctx.create_weight("w", 10, 20).unwrap();
        let bound = (6.0f64 / 30.0).sqrt() as f32;
        let values: Vec<f32> = var.as_tensor().flatten_all().unwrap().to_vec1().unwrap();
        assert!(values.iter().all(|v| v.abs() <= bound));
    }
}
