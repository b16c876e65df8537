use anyhow::{bail, Result};
use tracing::info;

use crate::geometry::{windowed_shape, TensorShape};
use crate::model::graph::{field_value, Layer, LayerField};
use crate::model::{ConvParams, DenseWidth, PoolParams};

/// Output of a dense layer construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DenseOutput {
    /// Transformed tensor
    pub dense: TensorShape,
    /// Weight matrix shape `[in, out]`
    pub weights: [usize; 2],
}

/// Builds the individual layers of a cubed-sphere network.
///
/// Implementations decide how a layer maps an input tensor to its output;
/// the network assembly only wires them together.
pub trait LayerFactory {
    /// Convolution with one filter band per output radial shell
    fn conv_banded_disjoint(
        &mut self,
        layer_index: usize,
        input: &TensorShape,
        params: &ConvParams,
    ) -> Result<TensorShape>;

    /// Average pooling over the cubed-sphere grid
    fn avgpool(
        &mut self,
        layer_index: usize,
        input: &TensorShape,
        params: &PoolParams,
    ) -> Result<TensorShape>;

    /// Fully connected layer over the flattened input
    fn dense(&mut self, layer_index: usize, input: &TensorShape, width: DenseWidth) -> Result<DenseOutput>;

    /// Report one field of a built layer, or the network input at index 0
    fn print_layer(&self, input: &TensorShape, layers: &[Layer], index: usize, field: LayerField) {
        if let Some(value) = field_value(input, layers, index, field) {
            info!("layer {} {}: {}", index, field, value);
        }
    }
}

/// Shape-level layer factory following the cubed-sphere grid rules
#[derive(Debug, Default, Clone)]
pub struct CubedSphereGeometry;

impl CubedSphereGeometry {
    pub fn new() -> Self {
        Self
    }
}

impl LayerFactory for CubedSphereGeometry {
    fn conv_banded_disjoint(
        &mut self,
        _layer_index: usize,
        input: &TensorShape,
        params: &ConvParams,
    ) -> Result<TensorShape> {
        if params.channels_out == 0 {
            bail!("convolution must produce at least one channel");
        }
        windowed_shape(input, &params.window(), Some(params.channels_out))
    }

    fn avgpool(
        &mut self,
        _layer_index: usize,
        input: &TensorShape,
        params: &PoolParams,
    ) -> Result<TensorShape> {
        windowed_shape(input, &params.window(), None)
    }

    fn dense(&mut self, _layer_index: usize, input: &TensorShape, width: DenseWidth) -> Result<DenseOutput> {
        let input_width = input.width();
        if input_width == 0 {
            bail!("dense layer input {} is empty", input);
        }

        let output_width = width.resolve(input_width);
        if output_width == 0 {
            bail!("dense layer must produce at least one unit");
        }

        Ok(DenseOutput {
            dense: TensorShape::Flat { width: output_width },
            weights: [input_width, output_width],
        })
    }
}
