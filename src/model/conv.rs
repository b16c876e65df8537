use burn::module::{Ignored, Param};
use burn::nn::Initializer;
use burn::prelude::*;
use burn::tensor::module::conv3d;
use burn::tensor::ops::ConvOptions;

use crate::geometry::padding::{pad_cubed_sphere, pad_radial};
use crate::model::ConvParams;

/// Cubed-sphere convolution with banded disjoint radial filters.
///
/// Each output radial shell owns its own filter band, applied to the window
/// of input shells starting at `shell * stride_r`. Bands are shared by all
/// six patches but never across shells.
#[derive(Module, Debug)]
pub struct BandedDisjointConv<B: Backend> {
    /// Filters `[r_out, channels_out, channels_in, ksize_r, ksize_xi, ksize_eta]`
    weight: Param<Tensor<B, 6>>,
    /// Biases `[r_out, channels_out]`
    bias: Param<Tensor<B, 2>>,
    params: Ignored<ConvParams>,
}

/// Banded disjoint convolution configuration
#[derive(Config, Debug)]
pub struct BandedDisjointConvConfig {
    /// Input channels
    pub channels_in: usize,
    /// Output radial shells, one filter band each
    pub r_out: usize,
    /// Kernel, stride and padding
    pub params: ConvParams,
    /// Standard deviation of initial filters and initial bias value
    #[config(default = "0.1")]
    pub init_std: f64,
}

impl BandedDisjointConvConfig {
    /// Initialize the convolution
    pub fn init<B: Backend>(&self, device: &B::Device) -> BandedDisjointConv<B> {
        let p = &self.params;

        let weight = Initializer::Normal { mean: 0.0, std: self.init_std }.init(
            [
                self.r_out,
                p.channels_out,
                self.channels_in,
                p.ksize_r,
                p.ksize_xi,
                p.ksize_eta,
            ],
            device,
        );
        let bias = Initializer::Constant { value: self.init_std }.init([self.r_out, p.channels_out], device);

        BandedDisjointConv {
            weight,
            bias,
            params: Ignored(*p),
        }
    }
}

impl<B: Backend> BandedDisjointConv<B> {
    /// Convolve `[batch, patch, channels, r, xi, eta]` into
    /// `[batch, patch, channels_out, r_out, xi_out, eta_out]`
    pub fn forward(&self, x: Tensor<B, 6>) -> Tensor<B, 6> {
        let p = &self.params.0;
        let [pad_r, pad_xi, pad_eta] = p.window().padding();

        let x = pad_radial(pad_cubed_sphere(x, pad_xi, pad_eta), pad_r);
        let [batch, patches, channels, r, xi, eta] = x.dims();
        let x = x.reshape([batch * patches, channels, r, xi, eta]);

        let [r_out, channels_out, channels_in, ksize_r, ksize_xi, ksize_eta] = self.weight.val().dims();
        let options = ConvOptions::new([1, p.stride_xi, p.stride_eta], [0, 0, 0], [1, 1, 1], 1);

        let shells: Vec<Tensor<B, 5>> = (0..r_out)
            .map(|shell| {
                let window = x.clone().narrow(2, shell * p.stride_r, ksize_r);
                let weight = self
                    .weight
                    .val()
                    .narrow(0, shell, 1)
                    .reshape([channels_out, channels_in, ksize_r, ksize_xi, ksize_eta]);
                let bias = self.bias.val().narrow(0, shell, 1).reshape([channels_out]);

                conv3d(window, weight, Some(bias), options.clone())
            })
            .collect();

        let out = Tensor::cat(shells, 2);
        let [_, _, _, xi_out, eta_out] = out.dims();
        out.reshape([batch, patches, channels_out, r_out, xi_out, eta_out])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::TensorShape;
    use crate::model::factory::{CubedSphereGeometry, LayerFactory};
    use crate::model::BANDED_DISJOINT;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_forward_matches_geometry() {
        let device = <TestBackend as Backend>::Device::default();
        let params = BANDED_DISJOINT.conv_pool[0].conv;

        let input = TensorShape::Volume { patches: 6, channels: 2, r: 5, xi: 8, eta: 8 };
        let expected = CubedSphereGeometry::new()
            .conv_banded_disjoint(1, &input, &params)
            .unwrap();
        let TensorShape::Volume { r: r_out, xi, eta, channels, .. } = expected else {
            panic!("conv output should be a volume");
        };

        let conv = BandedDisjointConvConfig::new(2, r_out, params).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 6>::ones([2, 6, 2, 5, 8, 8], &device);
        let out = conv.forward(x);

        assert_eq!(out.dims(), [2, 6, channels, r_out, xi, eta]);
    }

    #[test]
    fn test_shells_use_their_own_band() {
        let device = <TestBackend as Backend>::Device::default();
        let params = ConvParams {
            ksize_r: 1,
            ksize_xi: 1,
            ksize_eta: 1,
            channels_out: 1,
            stride_r: 1,
            stride_xi: 1,
            stride_eta: 1,
            use_r_padding: false,
        };

        let weight = Tensor::<TestBackend, 1>::from_floats([2.0, 3.0], &device).reshape([2, 1, 1, 1, 1, 1]);
        let conv = BandedDisjointConv {
            weight: Param::from_tensor(weight),
            bias: Param::from_tensor(Tensor::zeros([2, 1], &device)),
            params: Ignored(params),
        };

        let x = Tensor::<TestBackend, 6>::ones([1, 6, 1, 2, 2, 2], &device);
        let out = conv.forward(x);
        assert_eq!(out.dims(), [1, 6, 1, 2, 2, 2]);

        let inner = out.clone().narrow(3, 0, 1).into_data().to_vec::<f32>().unwrap();
        let outer = out.narrow(3, 1, 1).into_data().to_vec::<f32>().unwrap();
        assert!(inner.iter().all(|&v| v == 2.0));
        assert!(outer.iter().all(|&v| v == 3.0));
    }

    #[test]
    fn test_edge_windows_read_neighbour_patch() {
        let device = <TestBackend as Backend>::Device::default();
        let params = ConvParams {
            ksize_r: 1,
            ksize_xi: 3,
            ksize_eta: 3,
            channels_out: 1,
            stride_r: 1,
            stride_xi: 1,
            stride_eta: 1,
            use_r_padding: false,
        };
        let conv = BandedDisjointConv {
            weight: Param::from_tensor(Tensor::ones([1, 1, 1, 1, 3, 3], &device)),
            bias: Param::from_tensor(Tensor::zeros([1, 1], &device)),
            params: Ignored(params),
        };

        let cell = |p: usize, i: usize, j: usize| (1 + 1000 * p + 10 * i + j) as f32;
        let mut values = Vec::new();
        for p in 0..6 {
            for i in 0..3 {
                for j in 0..3 {
                    values.push(cell(p, i, j));
                }
            }
        }
        let x = Tensor::<TestBackend, 1>::from_floats(values.as_slice(), &device).reshape([1, 6, 1, 1, 3, 3]);

        let out = conv.forward(x).into_data().to_vec::<f32>().unwrap();
        assert_eq!(out.len(), 6 * 9);

        // patch 0 at xi = 2, eta = 1: its window crosses into the first xi row of patch 1
        let own: f32 = (1..3).flat_map(|i| (0..3).map(move |j| cell(0, i, j))).sum();
        let ghosts: f32 = (0..3).map(|j| cell(1, 0, j)).sum();
        assert_eq!(out[2 * 3 + 1], own + ghosts);

        // the interior cell only sees patch 0
        let interior: f32 = (0..3).flat_map(|i| (0..3).map(move |j| cell(0, i, j))).sum();
        assert_eq!(out[3 + 1], interior);
    }

    #[test]
    fn test_radial_padding_keeps_shell_count() {
        let device = <TestBackend as Backend>::Device::default();
        let params = ConvParams {
            use_r_padding: true,
            ..BANDED_DISJOINT.conv_pool[1].conv
        };

        let conv = BandedDisjointConvConfig::new(3, 4, params).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 6>::ones([1, 6, 3, 4, 3, 3], &device);
        assert_eq!(conv.forward(x).dims(), [1, 6, 32, 4, 3, 3]);
    }
}
