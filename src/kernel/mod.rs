//! Numeric kernels shared by pyramids and metrics.
//!
//! Line convolution backs the separable Gaussian smoothing of the image
//! pyramids (SIMD inner loop with the `simd` feature). Sample accumulation
//! backs every metric evaluation: samples are split into disjoint chunks,
//! each chunk fills a private accumulator, and the partial results are merged
//! once all chunks are done (chunks run on the rayon pool with the `rayon`
//! feature).

pub mod scalar;

#[cfg(feature = "simd")]
pub mod simd;

#[cfg(feature = "rayon")]
pub mod rayon;

/// Number of samples handled by one accumulation task.
pub const SAMPLE_CHUNK: usize = 1024;

/// Gaussian smoothing widths below this (in voxels) leave a line unchanged.
const MIN_SIGMA_VOXELS: f64 = 1e-6;

/// Partial result of a position-wise accumulation.
pub trait Accumulator: Send {
    /// Folds another partial result into this one.
    fn merge(&mut self, other: Self);
}

/// Accumulates `f` over `items`, one private accumulator per chunk.
pub fn accumulate<T, A, I, F>(items: &[T], init: I, f: F) -> A
where
    T: Sync,
    A: Accumulator,
    I: Fn() -> A + Sync + Send,
    F: Fn(&mut A, &T) + Sync + Send,
{
    #[cfg(feature = "rayon")]
    {
        rayon::accumulate_par(items, init, f)
    }
    #[cfg(not(feature = "rayon"))]
    {
        scalar::accumulate_seq(items, init, f)
    }
}

/// Normalized, symmetric Gaussian weights for `sigma` given in voxels.
///
/// The kernel is truncated at three standard deviations and always has at
/// least one tap on each side of the center.
pub fn gaussian_weights(sigma: f64) -> Vec<f32> {
    if sigma < MIN_SIGMA_VOXELS {
        return vec![1.0];
    }
    let radius = (3.0 * sigma).ceil().max(1.0) as usize;
    let mut weights: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-0.5 * (x / sigma) * (x / sigma)).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights.into_iter().map(|w| w as f32).collect()
}

/// Convolves `src` with odd-length `weights`, clamping at the borders.
pub fn convolve_line(src: &[f32], dst: &mut [f32], weights: &[f32]) {
    #[cfg(feature = "simd")]
    {
        simd::convolve_line_simd(src, dst, weights)
    }
    #[cfg(not(feature = "simd"))]
    {
        scalar::convolve_line_scalar(src, dst, weights)
    }
}
