pub mod architecture;
pub mod conv;
pub mod factory;
pub mod graph;
pub mod loss;
pub mod pool;

use anyhow::{Context, Result};
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::geometry::{TensorShape, Window};

/// Shape of one high resolution sample, channels last
#[derive(Config, Debug, PartialEq, Eq)]
pub struct InputShape {
    /// Number of cubed-sphere patches
    pub patches: usize,
    /// Radial shells
    pub r: usize,
    /// Cells along xi
    pub xi: usize,
    /// Cells along eta
    pub eta: usize,
    /// Input channels
    pub channels: usize,
}

impl InputShape {
    /// Symbolic shape of the input volume
    pub fn volume(&self) -> TensorShape {
        TensorShape::Volume {
            patches: self.patches,
            channels: self.channels,
            r: self.r,
            xi: self.xi,
            eta: self.eta,
        }
    }
}

/// Model configuration
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// Shape of each input sample
    pub input: InputShape,

    /// Number of target classes
    pub output_size: usize,

    /// Standard deviation of the initial convolution filters; also the
    /// initial bias value
    #[config(default = "0.1")]
    pub init_std: f64,
}

impl ModelConfig {
    /// Load a configuration saved as JSON
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        Self::load(path).with_context(|| format!("Failed to load model config from {:?}", path))
    }

    /// Save the configuration as JSON
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.save(path)
            .with_context(|| format!("Failed to save model config to {:?}", path))
    }
}

/// Hyperparameters of a banded disjoint convolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvParams {
    pub ksize_r: usize,
    pub ksize_xi: usize,
    pub ksize_eta: usize,
    pub channels_out: usize,
    pub stride_r: usize,
    pub stride_xi: usize,
    pub stride_eta: usize,
    pub use_r_padding: bool,
}

impl ConvParams {
    pub fn window(&self) -> Window {
        Window {
            ksize: [self.ksize_r, self.ksize_xi, self.ksize_eta],
            stride: [self.stride_r, self.stride_xi, self.stride_eta],
            use_r_padding: self.use_r_padding,
        }
    }
}

/// Hyperparameters of a cubed-sphere average pooling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolParams {
    pub ksize_r: usize,
    pub ksize_xi: usize,
    pub ksize_eta: usize,
    pub stride_r: usize,
    pub stride_xi: usize,
    pub stride_eta: usize,
    pub use_r_padding: bool,
}

impl PoolParams {
    pub fn window(&self) -> Window {
        Window {
            ksize: [self.ksize_r, self.ksize_xi, self.ksize_eta],
            stride: [self.stride_r, self.stride_xi, self.stride_eta],
            use_r_padding: self.use_r_padding,
        }
    }
}

/// Output width of a dense layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenseWidth {
    /// Fixed number of units
    Fixed(usize),
    /// Same width as the flattened input.
    ///
    /// Encoded as `-1` in integer width lists.
    PreserveInput,
}

impl DenseWidth {
    /// Width produced for an input of `input_width` values
    pub fn resolve(&self, input_width: usize) -> usize {
        match *self {
            DenseWidth::Fixed(width) => width,
            DenseWidth::PreserveInput => input_width,
        }
    }
}

/// One convolution + pooling block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvPoolSpec {
    pub conv: ConvParams,
    pub pool: PoolParams,
}

/// Fixed layer hyperparameters of a network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Architecture {
    pub conv_pool: [ConvPoolSpec; 4],
    pub hidden: [DenseWidth; 2],
}

const fn conv(ksize: [usize; 3], channels_out: usize, stride: [usize; 3]) -> ConvParams {
    ConvParams {
        ksize_r: ksize[0],
        ksize_xi: ksize[1],
        ksize_eta: ksize[2],
        channels_out,
        stride_r: stride[0],
        stride_xi: stride[1],
        stride_eta: stride[2],
        use_r_padding: false,
    }
}

const fn pool(ksize: [usize; 3], stride: [usize; 3]) -> PoolParams {
    PoolParams {
        ksize_r: ksize[0],
        ksize_xi: ksize[1],
        ksize_eta: ksize[2],
        stride_r: stride[0],
        stride_xi: stride[1],
        stride_eta: stride[2],
        use_r_padding: false,
    }
}

/// Cubed-sphere network with banded disjoint radial layers
pub const BANDED_DISJOINT: Architecture = Architecture {
    conv_pool: [
        ConvPoolSpec {
            conv: conv([3, 5, 5], 16, [1, 2, 2]),
            pool: pool([1, 3, 3], [1, 2, 2]),
        },
        ConvPoolSpec {
            conv: conv([3, 3, 3], 32, [1, 1, 1]),
            pool: pool([3, 3, 3], [2, 2, 2]),
        },
        ConvPoolSpec {
            conv: conv([3, 3, 3], 64, [1, 1, 1]),
            pool: pool([1, 3, 3], [1, 2, 2]),
        },
        ConvPoolSpec {
            conv: conv([3, 3, 3], 128, [1, 1, 1]),
            pool: pool([1, 3, 3], [1, 1, 1]),
        },
    ],
    hidden: [DenseWidth::Fixed(2048), DenseWidth::PreserveInput],
};

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("model.json");

        let config = ModelConfig::new(InputShape::new(6, 24, 38, 38, 2), 21).with_init_std(0.05);
        config.to_file(&path).unwrap();

        let loaded = ModelConfig::from_file(&path).unwrap();
        assert_eq!(loaded.input, config.input);
        assert_eq!(loaded.output_size, 21);
        assert_eq!(loaded.init_std, 0.05);
    }

    #[test]
    fn test_missing_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = ModelConfig::from_file(temp_dir.path().join("absent.json"));
        assert!(result.is_err());
    }

    #[test]
    fn test_dense_width_resolve() {
        assert_eq!(DenseWidth::PreserveInput.resolve(768), 768);
        assert_eq!(DenseWidth::Fixed(2048).resolve(768), 2048);
    }

    #[test]
    fn test_banded_disjoint_channels() {
        let channels: Vec<usize> = BANDED_DISJOINT
            .conv_pool
            .iter()
            .map(|block| block.conv.channels_out)
            .collect();
        assert_eq!(channels, vec![16, 32, 64, 128]);
        assert!(BANDED_DISJOINT.conv_pool.iter().all(|b| !b.conv.use_r_padding && !b.pool.use_r_padding));
    }
}
