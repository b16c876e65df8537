//! Layer graph of the banded disjoint cubed-sphere network.
//!
//! [`build_network`] wires seven layers together through a [`LayerFactory`]:
//! four convolution + pooling blocks, two hidden dense layers with dropout
//! and a softmax classifier. The resulting [`Network`] is immutable and only
//! records shapes; numerical modules are instantiated from it by
//! [`init_model`](crate::model::architecture::init_model).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::geometry::TensorShape;
use crate::model::factory::LayerFactory;
use crate::model::{ConvParams, DenseWidth, InputShape, PoolParams, BANDED_DISJOINT};

/// Number of layers after the input
pub const NUM_LAYERS: usize = 7;

/// Nonlinearity applied after a transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Relu,
    Softmax,
}

/// Named stage within a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerField {
    /// Network input, reported as layer 0
    Input,
    Conv,
    Activation,
    Pool,
    Dense,
    Weights,
    Dropout,
}

impl fmt::Display for LayerField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerField::Input => "input",
            LayerField::Conv => "conv",
            LayerField::Activation => "activation",
            LayerField::Pool => "pool",
            LayerField::Dense => "dense",
            LayerField::Weights => "W",
            LayerField::Dropout => "dropout",
        };
        f.write_str(name)
    }
}

/// Value stored under a [`LayerField`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    Tensor(TensorShape),
    Weights([usize; 2]),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Tensor(shape) => write!(f, "{}", shape),
            FieldValue::Weights([rows, cols]) => write!(f, "[{}, {}]", rows, cols),
        }
    }
}

/// Convolution, ReLU and pooling stages of one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvPoolRecord {
    pub index: usize,
    pub conv_params: ConvParams,
    pub pool_params: PoolParams,
    pub input: TensorShape,
    pub conv: TensorShape,
    pub activation: TensorShape,
    pub pool: TensorShape,
}

/// Dense transform, activation and optional dropout of one layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenseRecord {
    pub index: usize,
    pub width: DenseWidth,
    pub input: TensorShape,
    pub weights: [usize; 2],
    pub dense: TensorShape,
    pub activation_kind: Activation,
    pub activation: TensorShape,
    pub dropout: Option<TensorShape>,
}

/// One layer of the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layer {
    ConvPool(ConvPoolRecord),
    Dense(DenseRecord),
}

impl Layer {
    /// Position in the network, starting at 1
    pub fn index(&self) -> usize {
        match self {
            Layer::ConvPool(record) => record.index,
            Layer::Dense(record) => record.index,
        }
    }

    /// Tensor consumed by the next layer
    pub fn output(&self) -> TensorShape {
        match self {
            Layer::ConvPool(record) => record.pool,
            Layer::Dense(record) => record.dropout.unwrap_or(record.activation),
        }
    }

    /// Tensor after this layer's nonlinearity
    pub fn activation(&self) -> TensorShape {
        match self {
            Layer::ConvPool(record) => record.activation,
            Layer::Dense(record) => record.activation,
        }
    }

    /// Look up a stage by name, `None` when this kind of layer lacks it
    pub fn field(&self, field: LayerField) -> Option<FieldValue> {
        match (self, field) {
            (Layer::ConvPool(r), LayerField::Conv) => Some(FieldValue::Tensor(r.conv)),
            (Layer::ConvPool(r), LayerField::Activation) => Some(FieldValue::Tensor(r.activation)),
            (Layer::ConvPool(r), LayerField::Pool) => Some(FieldValue::Tensor(r.pool)),
            (Layer::Dense(r), LayerField::Dense) => Some(FieldValue::Tensor(r.dense)),
            (Layer::Dense(r), LayerField::Weights) => Some(FieldValue::Weights(r.weights)),
            (Layer::Dense(r), LayerField::Activation) => Some(FieldValue::Tensor(r.activation)),
            (Layer::Dense(r), LayerField::Dropout) => r.dropout.map(FieldValue::Tensor),
            _ => None,
        }
    }
}

/// Value of `field` at layer `index`, where layer 0 is the network input
pub fn field_value(
    input: &TensorShape,
    layers: &[Layer],
    index: usize,
    field: LayerField,
) -> Option<FieldValue> {
    match (index, field) {
        (0, LayerField::Input) => Some(FieldValue::Tensor(*input)),
        (0, _) | (_, LayerField::Input) => None,
        _ => layers.iter().find(|l| l.index() == index)?.field(field),
    }
}

/// Declared shape of a value bound at evaluation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholder {
    pub name: String,
    /// `None` marks an axis sized at binding time
    pub dims: Vec<Option<usize>>,
}

impl Placeholder {
    fn new(name: &str, dims: Vec<Option<usize>>) -> Self {
        Self { name: name.to_string(), dims }
    }

    /// Whether concrete dimensions fit this declaration
    pub fn accepts(&self, dims: &[usize]) -> bool {
        self.dims.len() == dims.len()
            && self.dims.iter().zip(dims).all(|(declared, &actual)| declared.map_or(true, |d| d == actual))
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self
            .dims
            .iter()
            .map(|d| d.map_or_else(|| "?".to_string(), |d| d.to_string()))
            .collect();
        write!(f, "{}[{}]", self.name, dims.join(", "))
    }
}

/// Entry points of the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placeholders {
    /// High resolution input, `[batch, patches, r, xi, eta, channels]`
    pub x_high_res: Placeholder,
    /// One-hot targets, `[batch, output_size]`
    pub y: Placeholder,
    /// Scalar probability of keeping a unit in dropout
    pub dropout_keep_prob: Placeholder,
}

impl Placeholders {
    fn new(input: &InputShape, output_size: usize) -> Self {
        Self {
            x_high_res: Placeholder::new(
                "x_high_res",
                vec![
                    None,
                    Some(input.patches),
                    Some(input.r),
                    Some(input.xi),
                    Some(input.eta),
                    Some(input.channels),
                ],
            ),
            y: Placeholder::new("y", vec![None, Some(output_size)]),
            dropout_keep_prob: Placeholder::new("dropout_keep_prob", vec![]),
        }
    }
}

/// Immutable layer graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub placeholders: Placeholders,
    pub input: TensorShape,
    pub layers: Vec<Layer>,
    pub output_size: usize,
}

impl Network {
    /// Final softmax activation
    pub fn output(&self) -> TensorShape {
        self.layers
            .last()
            .map(Layer::activation)
            .unwrap_or(self.input)
    }

    /// Layer at a 1-based position
    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.iter().find(|l| l.index() == index)
    }

    pub fn conv_pool_records(&self) -> impl Iterator<Item = &ConvPoolRecord> {
        self.layers.iter().filter_map(|l| match l {
            Layer::ConvPool(record) => Some(record),
            Layer::Dense(_) => None,
        })
    }

    pub fn dense_records(&self) -> impl Iterator<Item = &DenseRecord> {
        self.layers.iter().filter_map(|l| match l {
            Layer::Dense(record) => Some(record),
            Layer::ConvPool(_) => None,
        })
    }

    /// Pretty JSON description of every layer
    pub fn summary_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize network summary")
    }
}

/// Assemble the banded disjoint cubed-sphere network.
///
/// Layers are numbered from 1; each consumes the output of the previous one,
/// layer 1 the input placeholder, which diagnostics report as layer 0. Errors come from `factory` and are returned
/// as is.
pub fn build_network<F: LayerFactory>(
    factory: &mut F,
    input: &InputShape,
    output_size: usize,
) -> Result<Network> {
    let placeholders = Placeholders::new(input, output_size);
    let input_shape = input.volume();
    let mut layers: Vec<Layer> = Vec::with_capacity(NUM_LAYERS);
    factory.print_layer(&input_shape, &layers, 0, LayerField::Input);

    let mut current = input_shape;

    for spec in BANDED_DISJOINT.conv_pool.iter() {
        let index = layers.len() + 1;

        let conv = factory.conv_banded_disjoint(index, &current, &spec.conv)?;
        let activation = conv;
        let pool = factory.avgpool(index, &activation, &spec.pool)?;

        layers.push(Layer::ConvPool(ConvPoolRecord {
            index,
            conv_params: spec.conv,
            pool_params: spec.pool,
            input: current,
            conv,
            activation,
            pool,
        }));
        factory.print_layer(&input_shape, &layers, index, LayerField::Activation);
        factory.print_layer(&input_shape, &layers, index, LayerField::Pool);

        current = pool;
    }

    for width in BANDED_DISJOINT.hidden {
        let index = layers.len() + 1;

        if width == DenseWidth::PreserveInput {
            warn!(
                "layer {} keeps its input width {}; intended width is unconfirmed",
                index,
                current.width()
            );
        }

        let dense = factory.dense(index, &current, width)?;
        layers.push(Layer::Dense(DenseRecord {
            index,
            width,
            input: current,
            weights: dense.weights,
            dense: dense.dense,
            activation_kind: Activation::Relu,
            activation: dense.dense,
            dropout: Some(dense.dense),
        }));
        factory.print_layer(&input_shape, &layers, index, LayerField::Weights);
        factory.print_layer(&input_shape, &layers, index, LayerField::Activation);

        current = dense.dense;
    }

    let index = layers.len() + 1;
    let width = DenseWidth::Fixed(output_size);
    let dense = factory.dense(index, &current, width)?;
    layers.push(Layer::Dense(DenseRecord {
        index,
        width,
        input: current,
        weights: dense.weights,
        dense: dense.dense,
        activation_kind: Activation::Softmax,
        activation: dense.dense,
        dropout: None,
    }));
    factory.print_layer(&input_shape, &layers, index, LayerField::Weights);
    factory.print_layer(&input_shape, &layers, index, LayerField::Activation);

    Ok(Network {
        placeholders,
        input: input_shape,
        layers,
        output_size,
    })
}
