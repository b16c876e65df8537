//! Cubed-sphere grid topology and shape arithmetic.
//!
//! The sphere is covered by six square patches. Patches 0-3 form the
//! equatorial ring (each patch's `XiHigh` side touches the next patch's
//! `XiLow` side), patch 4 caps the top and patch 5 the bottom. Every patch
//! carries a radial axis `r` and two angular axes `xi` and `eta`.

pub mod padding;

use anyhow::{bail, ensure, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of patches on a cubed sphere
pub const NUM_PATCHES: usize = 6;

/// One of the four sides of a patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    XiLow,
    XiHigh,
    EtaLow,
    EtaHigh,
}

impl Side {
    /// All sides, in adjacency table order
    pub const ALL: [Side; 4] = [Side::XiLow, Side::XiHigh, Side::EtaLow, Side::EtaHigh];

    fn index(self) -> usize {
        match self {
            Side::XiLow => 0,
            Side::XiHigh => 1,
            Side::EtaLow => 2,
            Side::EtaHigh => 3,
        }
    }
}

/// The side of a neighbouring patch that shares an edge.
///
/// `reversed` is set when the coordinate running along the shared edge
/// increases in opposite directions on the two patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub patch: usize,
    pub side: Side,
    pub reversed: bool,
}

const fn edge(patch: usize, side: Side, reversed: bool) -> Edge {
    Edge { patch, side, reversed }
}

// Rows are patches, columns follow `Side::ALL`.
const ADJACENCY: [[Edge; 4]; NUM_PATCHES] = [
    [
        edge(3, Side::XiHigh, false),
        edge(1, Side::XiLow, false),
        edge(5, Side::EtaHigh, false),
        edge(4, Side::EtaLow, false),
    ],
    [
        edge(0, Side::XiHigh, false),
        edge(2, Side::XiLow, false),
        edge(5, Side::XiHigh, true),
        edge(4, Side::XiHigh, false),
    ],
    [
        edge(1, Side::XiHigh, false),
        edge(3, Side::XiLow, false),
        edge(5, Side::EtaLow, true),
        edge(4, Side::EtaHigh, true),
    ],
    [
        edge(2, Side::XiHigh, false),
        edge(0, Side::XiLow, false),
        edge(5, Side::XiLow, false),
        edge(4, Side::XiLow, true),
    ],
    [
        edge(3, Side::EtaHigh, true),
        edge(1, Side::EtaHigh, false),
        edge(0, Side::EtaHigh, false),
        edge(2, Side::EtaHigh, true),
    ],
    [
        edge(3, Side::EtaLow, false),
        edge(1, Side::EtaLow, true),
        edge(2, Side::EtaLow, true),
        edge(0, Side::EtaLow, false),
    ],
];

/// Look up the patch edge adjacent to `side` of `patch`
pub fn neighbour(patch: usize, side: Side) -> Edge {
    ADJACENCY[patch][side.index()]
}

/// Symbolic shape of a tensor in the layer graph.
///
/// The batch axis is never part of the shape; it is bound at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TensorShape {
    /// Cubed-sphere volume, one `[channels, r, xi, eta]` block per patch
    Volume {
        patches: usize,
        channels: usize,
        r: usize,
        xi: usize,
        eta: usize,
    },
    /// Flat feature vector
    Flat { width: usize },
}

impl TensorShape {
    /// Number of values per sample once flattened
    pub fn width(&self) -> usize {
        match *self {
            TensorShape::Volume { patches, channels, r, xi, eta } => {
                patches * channels * r * xi * eta
            }
            TensorShape::Flat { width } => width,
        }
    }

    /// Channel count of a volume, or the width of a flat tensor
    pub fn channels(&self) -> usize {
        match *self {
            TensorShape::Volume { channels, .. } => channels,
            TensorShape::Flat { width } => width,
        }
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TensorShape::Volume { patches, channels, r, xi, eta } => {
                write!(f, "[?, {}, {}, {}, {}, {}]", patches, r, xi, eta, channels)
            }
            TensorShape::Flat { width } => write!(f, "[?, {}]", width),
        }
    }
}

/// Kernel and stride of a windowed operation along `(r, xi, eta)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub ksize: [usize; 3],
    pub stride: [usize; 3],
    pub use_r_padding: bool,
}

impl Window {
    /// Padding applied on each side of `(r, xi, eta)`.
    ///
    /// Angular axes are always padded across patch boundaries; the radial
    /// axis only when `use_r_padding` is set.
    pub fn padding(&self) -> [usize; 3] {
        let r = if self.use_r_padding { self.ksize[0] / 2 } else { 0 };
        [r, self.ksize[1] / 2, self.ksize[2] / 2]
    }
}

/// Output length along one axis for a padded, strided window
pub fn output_len(len: usize, ksize: usize, stride: usize, pad: usize, axis: &str) -> Result<usize> {
    ensure!(ksize > 0, "kernel size along {} must be positive", axis);
    ensure!(stride > 0, "stride along {} must be positive", axis);
    let padded = len + 2 * pad;
    if padded < ksize {
        bail!(
            "kernel size {} along {} exceeds padded length {} (input {})",
            ksize,
            axis,
            padded,
            len
        );
    }
    Ok((padded - ksize) / stride + 1)
}

/// Shape of a cubed-sphere volume after a windowed operation.
///
/// `channels_out` replaces the channel count (convolutions); `None` keeps it
/// (pooling).
pub fn windowed_shape(
    input: &TensorShape,
    window: &Window,
    channels_out: Option<usize>,
) -> Result<TensorShape> {
    let (patches, channels, r, xi, eta) = match *input {
        TensorShape::Volume { patches, channels, r, xi, eta } => (patches, channels, r, xi, eta),
        TensorShape::Flat { width } => {
            bail!("cubed-sphere operation needs a volume input, got flat width {}", width)
        }
    };

    ensure!(
        patches == NUM_PATCHES,
        "cubed-sphere input must have {} patches, got {}",
        NUM_PATCHES,
        patches
    );
    ensure!(channels > 0 && r > 0 && xi > 0, "cubed-sphere input has an empty axis: {}", input);
    ensure!(xi == eta, "cubed-sphere patches must be square, got xi={} eta={}", xi, eta);

    let pad = window.padding();
    ensure!(
        pad[1] <= xi && pad[2] <= eta,
        "padding ({}, {}) exceeds patch size {}",
        pad[1],
        pad[2],
        xi
    );

    Ok(TensorShape::Volume {
        patches,
        channels: channels_out.unwrap_or(channels),
        r: output_len(r, window.ksize[0], window.stride[0], pad[0], "r")?,
        xi: output_len(xi, window.ksize[1], window.stride[1], pad[1], "xi")?,
        eta: output_len(eta, window.ksize[2], window.stride[2], pad[2], "eta")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume(channels: usize, r: usize, n: usize) -> TensorShape {
        TensorShape::Volume { patches: 6, channels, r, xi: n, eta: n }
    }

    #[test]
    fn test_adjacency_is_symmetric() {
        for patch in 0..NUM_PATCHES {
            for side in Side::ALL {
                let there = neighbour(patch, side);
                let back = neighbour(there.patch, there.side);
                assert_eq!(back.patch, patch, "patch {} side {:?}", patch, side);
                assert_eq!(back.side, side);
                assert_eq!(back.reversed, there.reversed);
                assert_ne!(there.patch, patch);
            }
        }
    }

    #[test]
    fn test_each_patch_touches_four_others() {
        for patch in 0..NUM_PATCHES {
            let mut touching: Vec<usize> = Side::ALL.iter().map(|&s| neighbour(patch, s).patch).collect();
            touching.sort_unstable();
            touching.dedup();
            assert_eq!(touching.len(), 4);
        }
    }

    #[test]
    fn test_output_len() {
        assert_eq!(output_len(8, 5, 2, 2, "xi").unwrap(), 4);
        assert_eq!(output_len(15, 3, 1, 0, "r").unwrap(), 13);
        assert_eq!(output_len(11, 3, 2, 0, "r").unwrap(), 5);
        assert!(output_len(2, 3, 1, 0, "r").is_err());
        assert!(output_len(4, 3, 0, 0, "r").is_err());
    }

    #[test]
    fn test_windowed_shape() {
        let window = Window { ksize: [3, 5, 5], stride: [1, 2, 2], use_r_padding: false };
        let out = windowed_shape(&volume(2, 15, 8), &window, Some(16)).unwrap();
        assert_eq!(out, volume(16, 13, 4));

        let window = Window { ksize: [3, 3, 3], stride: [1, 1, 1], use_r_padding: true };
        let out = windowed_shape(&volume(4, 5, 4), &window, None).unwrap();
        assert_eq!(out, volume(4, 5, 4));
    }

    #[test]
    fn test_windowed_shape_rejects_malformed_input() {
        let window = Window { ksize: [3, 3, 3], stride: [1, 1, 1], use_r_padding: false };

        let wrong_patches = TensorShape::Volume { patches: 5, channels: 1, r: 4, xi: 4, eta: 4 };
        assert!(windowed_shape(&wrong_patches, &window, None).is_err());

        let not_square = TensorShape::Volume { patches: 6, channels: 1, r: 4, xi: 4, eta: 5 };
        assert!(windowed_shape(&not_square, &window, None).is_err());

        let flat = TensorShape::Flat { width: 10 };
        assert!(windowed_shape(&flat, &window, None).is_err());

        let too_thin = volume(1, 2, 4);
        assert!(windowed_shape(&too_thin, &window, None).is_err());
    }

    #[test]
    fn test_shape_display_and_width() {
        let shape = volume(16, 13, 4);
        assert_eq!(shape.to_string(), "[?, 6, 13, 4, 4, 16]");
        assert_eq!(shape.width(), 6 * 16 * 13 * 4 * 4);
        assert_eq!(TensorShape::Flat { width: 2048 }.to_string(), "[?, 2048]");
    }
}
