use burn::module::Ignored;
use burn::prelude::*;
use burn::tensor::module::conv3d;
use burn::tensor::ops::ConvOptions;

use crate::geometry::padding::{pad_cubed_sphere, pad_radial};
use crate::model::PoolParams;

/// Average pooling over a cubed-sphere volume.
///
/// Windows reach across patch boundaries through ghost cells; each channel
/// of each patch is pooled on its own.
#[derive(Module, Clone, Debug)]
pub struct CubedSphereAvgPool {
    params: Ignored<PoolParams>,
}

/// Cubed-sphere average pooling configuration
#[derive(Config, Debug)]
pub struct CubedSphereAvgPoolConfig {
    pub params: PoolParams,
}

impl CubedSphereAvgPoolConfig {
    pub fn init(&self) -> CubedSphereAvgPool {
        CubedSphereAvgPool {
            params: Ignored(self.params),
        }
    }
}

impl CubedSphereAvgPool {
    /// Pool `[batch, patch, channels, r, xi, eta]`
    pub fn forward<B: Backend>(&self, x: Tensor<B, 6>) -> Tensor<B, 6> {
        let p = &self.params.0;
        let [pad_r, pad_xi, pad_eta] = p.window().padding();

        let x = pad_radial(pad_cubed_sphere(x, pad_xi, pad_eta), pad_r);
        let [batch, patches, channels, r, xi, eta] = x.dims();
        let x = x.reshape([batch * patches * channels, 1, r, xi, eta]);

        let cells = p.ksize_r * p.ksize_xi * p.ksize_eta;
        let kernel = Tensor::ones([1, 1, p.ksize_r, p.ksize_xi, p.ksize_eta], &x.device())
            .div_scalar(cells as f64);
        let options = ConvOptions::new(
            [p.stride_r, p.stride_xi, p.stride_eta],
            [0, 0, 0],
            [1, 1, 1],
            1,
        );

        let out = conv3d(x, kernel, None, options);
        let [_, _, r_out, xi_out, eta_out] = out.dims();
        out.reshape([batch, patches, channels, r_out, xi_out, eta_out])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BANDED_DISJOINT;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn pool(ksize: [usize; 3], stride: [usize; 3]) -> CubedSphereAvgPool {
        CubedSphereAvgPoolConfig::new(PoolParams {
            ksize_r: ksize[0],
            ksize_xi: ksize[1],
            ksize_eta: ksize[2],
            stride_r: stride[0],
            stride_xi: stride[1],
            stride_eta: stride[2],
            use_r_padding: false,
        })
        .init()
    }

    #[test]
    fn test_windows_cross_patch_edges() {
        let device = <TestBackend as Backend>::Device::default();
        let x = Tensor::<TestBackend, 6>::ones([1, 6, 1, 1, 3, 3], &device);

        let out = pool([1, 3, 3], [1, 1, 1]).forward(x);
        assert_eq!(out.dims(), [1, 6, 1, 1, 3, 3]);

        let values = out.into_data().to_vec::<f32>().unwrap();
        for p in 0..6 {
            let at = |i: usize, j: usize| values[p * 9 + i * 3 + j];
            assert!((at(1, 1) - 1.0).abs() < 1e-6);
            // edge windows are filled by the neighbouring patch
            assert!((at(0, 1) - 1.0).abs() < 1e-6);
            // corner windows include one empty corner cell
            assert!((at(0, 0) - 8.0 / 9.0).abs() < 1e-6);
            assert!((at(2, 2) - 8.0 / 9.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_radial_average() {
        let device = <TestBackend as Backend>::Device::default();
        let shells = Tensor::<TestBackend, 1>::from_floats([1.0, 3.0, 5.0, 7.0], &device)
            .reshape([1, 1, 1, 4, 1, 1])
            .repeat_dim(1, 6);

        let out = pool([2, 1, 1], [2, 1, 1]).forward(shells);
        assert_eq!(out.dims(), [1, 6, 1, 2, 1, 1]);

        let values = out.into_data().to_vec::<f32>().unwrap();
        for p in 0..6 {
            assert!((values[p * 2] - 2.0).abs() < 1e-6);
            assert!((values[p * 2 + 1] - 6.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_strided_pool_shape() {
        let device = <TestBackend as Backend>::Device::default();
        let x = Tensor::<TestBackend, 6>::ones([2, 6, 4, 11, 2, 2], &device);

        let layer = CubedSphereAvgPoolConfig::new(BANDED_DISJOINT.conv_pool[1].pool).init();
        assert_eq!(layer.forward(x).dims(), [2, 6, 4, 5, 1, 1]);
    }
}
