//! # Cubed-sphere banded disjoint network
//!
//! A convolutional classifier for signals sampled on a cubed-sphere grid:
//! six square patches, each with a radial axis and two angular axes.
//!
//! ## Features
//!
//! - Cubed-sphere topology with ghost-cell padding across patch edges
//! - Convolutions with an independent filter band per radial shell
//! - Average pooling that respects the patch layout
//! - A fixed seven layer network assembled through a swappable layer factory
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cubed_sphere_net::model::{InputShape, ModelConfig};
//! use cubed_sphere_net::model::architecture::init_model;
//! use cubed_sphere_net::utils::random::random_input;
//! use cubed_sphere_net::DefaultBackend;
//!
//! let config = ModelConfig::new(InputShape::new(6, 24, 38, 38, 2), 21);
//! let device = Default::default();
//! let model = init_model::<DefaultBackend>(&config, &device).unwrap();
//!
//! let x = random_input::<DefaultBackend>([4, 6, 24, 38, 38, 2], 0, &device);
//! let output = model.predict(x);
//! assert_eq!(output.probabilities.dims(), [4, 21]);
//! ```

pub mod geometry;
pub mod model;
pub mod utils;

use burn_ndarray::NdArray;

/// Default backend type
pub type DefaultBackend = NdArray<f32>;

/// Re-export commonly used types
pub use geometry::TensorShape;
pub use model::architecture::{init_model, CubedSphereBandedDisjointModel, DropoutKeepProb, ModelInputs};
pub use model::factory::{CubedSphereGeometry, LayerFactory};
pub use model::graph::{build_network, Layer, Network};
pub use model::{InputShape, ModelConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{} - cubed-sphere convolutional classifier", NAME, VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info() {
        let info_str = info();
        assert!(info_str.contains("cubed-sphere-net"));
        assert!(info_str.contains(VERSION));
    }
}
