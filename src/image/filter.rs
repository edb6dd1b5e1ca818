//! Separable Gaussian smoothing and shrinking used by the image pyramids.

use crate::image::{Geometry, Image};
use crate::kernel::{convolve_line, gaussian_weights};
use crate::util::{MultiRegError, MultiRegResult};

/// Smooths `image` with per-axis standard deviations given in physical units.
pub fn gaussian_smooth(image: &Image, sigmas: &[f64]) -> MultiRegResult<Image> {
    let geometry = image.geometry().clone();
    if sigmas.len() != geometry.dimension() {
        return Err(MultiRegError::DimensionMismatch {
            expected: geometry.dimension(),
            got: sigmas.len(),
        });
    }
    let mut data = image.data().to_vec();
    for (axis, (&sigma, &spacing)) in sigmas.iter().zip(geometry.spacing()).enumerate() {
        let weights = gaussian_weights(sigma / spacing);
        if weights.len() == 1 {
            continue;
        }
        smooth_axis(&mut data, geometry.size(), axis, &weights);
    }
    Image::from_geometry(geometry, data)
}

fn smooth_axis(data: &mut [f32], size: &[usize], axis: usize, weights: &[f32]) {
    let len = size[axis];
    let stride: usize = size[..axis].iter().product();
    let outer: usize = size[axis + 1..].iter().product();
    let mut line = vec![0.0f32; len];
    let mut out = vec![0.0f32; len];
    for o in 0..outer {
        for inner in 0..stride {
            let base = o * stride * len + inner;
            for (i, v) in line.iter_mut().enumerate() {
                *v = data[base + i * stride];
            }
            convolve_line(&line, &mut out, weights);
            for (i, &v) in out.iter().enumerate() {
                data[base + i * stride] = v;
            }
        }
    }
}

/// Shrinks `image` by integer per-axis factors, sampling voxel block centers.
///
/// Factors of 0 or 1 keep the axis unchanged. Spacing grows by the factor and
/// the origin moves to the first sampled voxel, so every output voxel keeps
/// the physical position of the input voxel it was taken from.
pub fn shrink(image: &Image, factors: &[u32]) -> MultiRegResult<Image> {
    let src = image.geometry();
    if factors.len() != src.dimension() {
        return Err(MultiRegError::DimensionMismatch {
            expected: src.dimension(),
            got: factors.len(),
        });
    }
    let factors: Vec<usize> = factors.iter().map(|&f| (f as usize).max(1)).collect();
    let size: Vec<usize> = src
        .size()
        .iter()
        .zip(&factors)
        .map(|(&s, &f)| (s / f).max(1))
        .collect();
    let spacing: Vec<f64> = src
        .spacing()
        .iter()
        .zip(&factors)
        .map(|(&sp, &f)| sp * f as f64)
        .collect();
    let origin: Vec<f64> = src
        .origin()
        .iter()
        .zip(src.spacing().iter().zip(&factors))
        .map(|(&o, (&sp, &f))| o + ((f - 1) / 2) as f64 * sp)
        .collect();
    let geometry = Geometry::with_spacing(size, spacing, origin)?;
    let mut src_index = vec![0usize; src.dimension()];
    Ok(Image::from_fn(geometry, |index| {
        for ((s, &i), (&f, &n)) in src_index
            .iter_mut()
            .zip(index)
            .zip(factors.iter().zip(src.size()))
        {
            *s = (i * f + (f - 1) / 2).min(n - 1);
        }
        image.get(&src_index).unwrap_or(0.0)
    }))
}
