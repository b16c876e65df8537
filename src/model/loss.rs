use burn::prelude::*;
use burn::tensor::activation::log_softmax;

/// Softmax cross entropy against one-hot (or soft) targets
#[derive(Clone, Debug, Default)]
pub struct SoftmaxCrossEntropy;

impl SoftmaxCrossEntropy {
    pub fn new() -> Self {
        Self
    }

    /// Mean cross entropy over the batch
    ///
    /// # Arguments
    /// * `logits` - Pre-softmax scores `[batch_size, num_classes]`
    /// * `targets` - Target distributions `[batch_size, num_classes]`
    pub fn forward<B: Backend>(&self, logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
        let log_probs = log_softmax(logits, 1);
        targets.mul(log_probs).sum_dim(1).neg().mean()
    }
}

/// Metrics for evaluation
pub mod metrics {
    use burn::prelude::*;
    use burn::tensor::ElementConversion;

    /// Fraction of samples whose most probable class matches the target
    pub fn accuracy<B: Backend>(probabilities: Tensor<B, 2>, targets: Tensor<B, 2>) -> f32 {
        let total = probabilities.dims()[0];
        if total == 0 {
            return 0.0;
        }

        let predicted = probabilities.argmax(1);
        let expected = targets.argmax(1);
        let correct = predicted.equal(expected).int().sum().into_scalar().elem::<f32>();

        correct / total as f32
    }
}
