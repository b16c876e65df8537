use burn::prelude::*;

use super::{neighbour, Side, NUM_PATCHES};

// Axes of a single patch tensor [batch, channels, r, xi, eta]
const XI: usize = 3;
const ETA: usize = 4;

/// Pad the angular axes of a cubed-sphere tensor with ghost cells.
///
/// `x` has layout `[batch, patch, channels, r, xi, eta]`. Every side of
/// every patch is extended by cells copied from the adjacent patch, so a
/// window sliding over the padded patch sees the true neighbourhood on the
/// sphere. Corners, which touch three patches, are zero.
///
/// Padding depths must not exceed the patch size.
pub fn pad_cubed_sphere<B: Backend>(x: Tensor<B, 6>, pad_xi: usize, pad_eta: usize) -> Tensor<B, 6> {
    if pad_xi == 0 && pad_eta == 0 {
        return x;
    }

    let patches: Vec<Tensor<B, 5>> = (0..NUM_PATCHES).map(|p| patch(&x, p)).collect();

    let padded: Vec<Tensor<B, 6>> = (0..NUM_PATCHES)
        .map(|p| pad_patch(&patches, p, pad_xi, pad_eta).unsqueeze_dim::<6>(1))
        .collect();

    Tensor::cat(padded, 1)
}

/// Zero-pad the radial axis on both ends
pub fn pad_radial<B: Backend>(x: Tensor<B, 6>, pad: usize) -> Tensor<B, 6> {
    if pad == 0 {
        return x;
    }

    let [batch, patches, channels, _, xi, eta] = x.dims();
    let zeros = Tensor::zeros([batch, patches, channels, pad, xi, eta], &x.device());
    Tensor::cat(vec![zeros.clone(), x, zeros], 3)
}

fn patch<B: Backend>(x: &Tensor<B, 6>, index: usize) -> Tensor<B, 5> {
    let [batch, _, channels, r, xi, eta] = x.dims();
    x.clone().narrow(1, index, 1).reshape([batch, channels, r, xi, eta])
}

fn pad_patch<B: Backend>(
    patches: &[Tensor<B, 5>],
    index: usize,
    pad_xi: usize,
    pad_eta: usize,
) -> Tensor<B, 5> {
    let mut out = patches[index].clone();

    if pad_xi > 0 {
        let low = ghost(patches, index, Side::XiLow, pad_xi);
        let high = ghost(patches, index, Side::XiHigh, pad_xi);
        out = Tensor::cat(vec![low, out, high], XI);
    }

    if pad_eta > 0 {
        let low = zero_corners(ghost(patches, index, Side::EtaLow, pad_eta), pad_xi);
        let high = zero_corners(ghost(patches, index, Side::EtaHigh, pad_eta), pad_xi);
        out = Tensor::cat(vec![low, out, high], ETA);
    }

    out
}

/// Ghost cells for `side` of patch `index`, laid out in that patch's frame
fn ghost<B: Backend>(patches: &[Tensor<B, 5>], index: usize, side: Side, depth: usize) -> Tensor<B, 5> {
    let from = neighbour(index, side);

    let mut strip = edge_strip(&patches[from.patch], from.side, depth);
    if from.reversed {
        strip = strip.flip([4]);
    }

    // strip is [.., depth, along] with depth 0 on the shared edge
    match side {
        Side::XiLow => strip.flip([3]),
        Side::XiHigh => strip,
        Side::EtaLow => strip.swap_dims(XI, ETA).flip([4]),
        Side::EtaHigh => strip.swap_dims(XI, ETA),
    }
}

/// Cells within `depth` of `side`, as `[batch, channels, r, depth, along]`.
///
/// Depth index 0 is the row on the edge; `along` follows the other angular
/// axis in increasing order.
fn edge_strip<B: Backend>(patch: &Tensor<B, 5>, side: Side, depth: usize) -> Tensor<B, 5> {
    let [_, _, _, xi, eta] = patch.dims();
    match side {
        Side::XiLow => patch.clone().narrow(XI, 0, depth),
        Side::XiHigh => patch.clone().narrow(XI, xi - depth, depth).flip([3]),
        Side::EtaLow => patch.clone().narrow(ETA, 0, depth).swap_dims(XI, ETA),
        Side::EtaHigh => patch
            .clone()
            .narrow(ETA, eta - depth, depth)
            .flip([4])
            .swap_dims(XI, ETA),
    }
}

fn zero_corners<B: Backend>(ghost: Tensor<B, 5>, width: usize) -> Tensor<B, 5> {
    if width == 0 {
        return ghost;
    }

    let [batch, channels, r, _, depth] = ghost.dims();
    let zeros = Tensor::zeros([batch, channels, r, width, depth], &ghost.device());
    Tensor::cat(vec![zeros.clone(), ghost, zeros], XI)
}
