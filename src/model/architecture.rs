use anyhow::{bail, ensure, Result};
use burn::module::Ignored;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::{relu, softmax};
use burn::tensor::Distribution;
use tracing::{debug, info};

use crate::geometry::TensorShape;
use crate::model::conv::{BandedDisjointConv, BandedDisjointConvConfig};
use crate::model::factory::CubedSphereGeometry;
use crate::model::graph::{build_network, Activation, Network};
use crate::model::loss::SoftmaxCrossEntropy;
use crate::model::pool::{CubedSphereAvgPool, CubedSphereAvgPoolConfig};
use crate::model::ModelConfig;
use crate::utils::{format_number, validation};

/// Probability of keeping a unit during dropout, in `(0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DropoutKeepProb(f64);

impl DropoutKeepProb {
    /// Disables dropout
    pub const KEEP_ALL: Self = Self(1.0);

    pub fn new(keep_prob: f64) -> Result<Self> {
        validation::unit_interval(keep_prob, "dropout_keep_prob")?;
        Ok(Self(keep_prob))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

/// Keep each unit with probability `keep_prob`, scaling kept units by `1 / keep_prob`
fn dropout<B: Backend, const D: usize>(x: Tensor<B, D>, keep_prob: DropoutKeepProb) -> Tensor<B, D> {
    let p = keep_prob.value();
    if p >= 1.0 {
        return x;
    }
    let mask = x.random_like(Distribution::Bernoulli(p));
    x.mul(mask).div_scalar(p)
}

/// Convolution, ReLU and pooling
#[derive(Module, Debug)]
pub struct ConvPoolBlock<B: Backend> {
    conv: BandedDisjointConv<B>,
    pool: CubedSphereAvgPool,
}

impl<B: Backend> ConvPoolBlock<B> {
    pub fn forward(&self, x: Tensor<B, 6>) -> Tensor<B, 6> {
        let x = relu(self.conv.forward(x));
        self.pool.forward(x)
    }
}

/// Cubed-sphere classifier with banded disjoint radial convolutions
#[derive(Module, Debug)]
pub struct CubedSphereBandedDisjointModel<B: Backend> {
    /// Layers 1-4
    blocks: Vec<ConvPoolBlock<B>>,
    /// Layers 5-6, each followed by ReLU and dropout
    hidden: Vec<Linear<B>>,
    /// Layer 7, class logits
    output: Linear<B>,
    network: Ignored<Network>,
}

/// Values bound to the network placeholders for one evaluation
#[derive(Debug, Clone)]
pub struct ModelInputs<B: Backend> {
    /// `[batch, patches, r, xi, eta, channels]`
    pub x_high_res: Tensor<B, 6>,
    /// One-hot targets `[batch, output_size]`
    pub y: Option<Tensor<B, 2>>,
    pub dropout_keep_prob: DropoutKeepProb,
}

/// Model output
#[derive(Debug, Clone)]
pub struct CubedSphereOutput<B: Backend> {
    /// Class probabilities `[batch, output_size]`
    pub probabilities: Tensor<B, 2>,
    /// Most probable class per sample
    pub predictions: Tensor<B, 1, Int>,
    /// Cross entropy against `y`, when bound
    pub loss: Option<Tensor<B, 1>>,
}

impl<B: Backend> CubedSphereBandedDisjointModel<B> {
    /// Class logits for a channels-last batch `[batch, patches, r, xi, eta, channels]`
    pub fn forward(&self, x_high_res: Tensor<B, 6>, keep_prob: DropoutKeepProb) -> Tensor<B, 2> {
        // [batch, patch, channels, r, xi, eta]
        let mut x = x_high_res.permute([0, 1, 5, 2, 3, 4]);
        for block in &self.blocks {
            x = block.forward(x);
        }

        let [batch, patches, channels, r, xi, eta] = x.dims();
        let mut x = x.reshape([batch, patches * channels * r * xi * eta]);

        for dense in &self.hidden {
            x = dropout(relu(dense.forward(x)), keep_prob);
        }

        self.output.forward(x)
    }

    /// Class probabilities and predictions without dropout
    pub fn predict(&self, x_high_res: Tensor<B, 6>) -> CubedSphereOutput<B> {
        let logits = self.forward(x_high_res, DropoutKeepProb::KEEP_ALL);
        Self::output_from_logits(logits, None)
    }

    /// Evaluate the network on bound placeholder values
    pub fn run(&self, inputs: ModelInputs<B>) -> Result<CubedSphereOutput<B>> {
        let placeholders = &self.network.0.placeholders;

        let x_dims = inputs.x_high_res.dims();
        ensure!(
            placeholders.x_high_res.accepts(&x_dims),
            "input shape {:?} does not fit {}",
            x_dims,
            placeholders.x_high_res
        );

        if let Some(y) = &inputs.y {
            let y_dims = y.dims();
            ensure!(
                placeholders.y.accepts(&y_dims),
                "target shape {:?} does not fit {}",
                y_dims,
                placeholders.y
            );
            ensure!(
                y_dims[0] == x_dims[0],
                "batch size mismatch: {} inputs, {} targets",
                x_dims[0],
                y_dims[0]
            );
        }

        debug!(
            "Evaluating batch of {} with keep probability {}",
            x_dims[0],
            inputs.dropout_keep_prob.value()
        );

        let logits = self.forward(inputs.x_high_res, inputs.dropout_keep_prob);
        Ok(Self::output_from_logits(logits, inputs.y))
    }

    fn output_from_logits(logits: Tensor<B, 2>, y: Option<Tensor<B, 2>>) -> CubedSphereOutput<B> {
        let loss = y.map(|y| SoftmaxCrossEntropy::new().forward(logits.clone(), y));
        let probabilities = softmax(logits, 1);
        let predictions = probabilities.clone().argmax(1).squeeze::<1>(1);

        CubedSphereOutput {
            probabilities,
            predictions,
            loss,
        }
    }

    /// Layer graph the model was built from
    pub fn network(&self) -> &Network {
        &self.network.0
    }
}

/// Initialize the model from configuration
pub fn init_model<B: Backend>(
    config: &ModelConfig,
    device: &B::Device,
) -> Result<CubedSphereBandedDisjointModel<B>> {
    let network = build_network(&mut CubedSphereGeometry::new(), &config.input, config.output_size)?;
    model_from_network(network, config.init_std, device)
}

/// Instantiate modules for every layer of a built network
pub fn model_from_network<B: Backend>(
    network: Network,
    init_std: f64,
    device: &B::Device,
) -> Result<CubedSphereBandedDisjointModel<B>> {
    let mut blocks = Vec::new();
    for record in network.conv_pool_records() {
        let TensorShape::Volume { r: r_out, .. } = record.conv else {
            bail!("layer {} convolution output is not a volume", record.index);
        };

        let conv = BandedDisjointConvConfig::new(record.input.channels(), r_out, record.conv_params)
            .with_init_std(init_std)
            .init(device);
        let pool = CubedSphereAvgPoolConfig::new(record.pool_params).init();

        blocks.push(ConvPoolBlock { conv, pool });
    }

    let mut hidden = Vec::new();
    let mut output = None;
    for record in network.dense_records() {
        let [input_width, output_width] = record.weights;
        let linear = LinearConfig::new(input_width, output_width)
            .with_bias(true)
            .init(device);

        match record.activation_kind {
            Activation::Relu => hidden.push(linear),
            Activation::Softmax => output = Some(linear),
        }
    }

    let Some(output) = output else {
        bail!("network has no softmax output layer");
    };

    let model = CubedSphereBandedDisjointModel {
        blocks,
        hidden,
        output,
        network: Ignored(network),
    };

    info!(
        "Initialized cubed-sphere model with {} parameters",
        format_number(model.num_params())
    );

    Ok(model)
}
