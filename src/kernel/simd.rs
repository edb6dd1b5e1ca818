//! SIMD-accelerated line convolution using the `wide` crate.
//!
//! Interior outputs are produced 8 at a time with `f32x8`; the border taps
//! that need clamping fall back to the scalar loop.

use super::scalar::{convolve_line_scalar, convolve_range_scalar};
use wide::f32x8;

const LANES: usize = 8;

/// Load 8 f32 values into f32x8.
#[inline]
fn load_f32x8(slice: &[f32]) -> f32x8 {
    f32x8::from([
        slice[0], slice[1], slice[2], slice[3], slice[4], slice[5], slice[6], slice[7],
    ])
}

/// SIMD line convolution with clamp-to-edge borders.
pub fn convolve_line_simd(src: &[f32], dst: &mut [f32], weights: &[f32]) {
    let n = src.len();
    let radius = weights.len() / 2;
    if n < 2 * radius + LANES {
        convolve_line_scalar(src, dst, weights);
        return;
    }

    convolve_range_scalar(src, dst, weights, 0..radius);

    let mut i = radius;
    while i + LANES <= n - radius {
        let mut acc = f32x8::splat(0.0);
        for (k, &w) in weights.iter().enumerate() {
            let start = i + k - radius;
            acc += f32x8::splat(w) * load_f32x8(&src[start..start + LANES]);
        }
        dst[i..i + LANES].copy_from_slice(&acc.to_array());
        i += LANES;
    }
    // Remainder of the interior plus the right border.
    convolve_range_scalar(src, dst, weights, i..n);
}
