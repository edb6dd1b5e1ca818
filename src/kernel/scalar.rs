//! Baseline scalar kernels.

use super::{Accumulator, SAMPLE_CHUNK};

/// Scalar line convolution with clamp-to-edge borders.
pub fn convolve_line_scalar(src: &[f32], dst: &mut [f32], weights: &[f32]) {
    convolve_range_scalar(src, dst, weights, 0..src.len());
}

/// Computes only the outputs in `range`, clamping taps to the line.
pub fn convolve_range_scalar(
    src: &[f32],
    dst: &mut [f32],
    weights: &[f32],
    range: std::ops::Range<usize>,
) {
    let n = src.len();
    if n == 0 {
        return;
    }
    let radius = weights.len() / 2;
    let end = range.end.min(n).min(dst.len());
    for i in range.start..end {
        let mut acc = 0.0f32;
        for (k, &w) in weights.iter().enumerate() {
            let j = (i + k).saturating_sub(radius).min(n - 1);
            acc += w * src[j];
        }
        dst[i] = acc;
    }
}

/// Sequential chunked accumulation.
///
/// Chunks are folded in order so the result does not depend on scheduling.
pub fn accumulate_seq<T, A, I, F>(items: &[T], init: I, f: F) -> A
where
    A: Accumulator,
    I: Fn() -> A,
    F: Fn(&mut A, &T),
{
    let mut total = init();
    for chunk in items.chunks(SAMPLE_CHUNK) {
        let mut partial = init();
        for item in chunk {
            f(&mut partial, item);
        }
        total.merge(partial);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::convolve_line_scalar;

    #[test]
    fn box_kernel_clamps_borders() {
        let src = [3.0f32, 6.0, 9.0];
        let mut dst = [0.0f32; 3];
        let w = [1.0 / 3.0; 3];
        convolve_line_scalar(&src, &mut dst, &w);
        assert!((dst[0] - 4.0).abs() < 1e-5);
        assert!((dst[1] - 6.0).abs() < 1e-5);
        assert!((dst[2] - 8.0).abs() < 1e-5);
    }
}
