//! Image interpolators.
//!
//! Interpolators evaluate the moving image at physical points produced by the
//! transform. A point outside the sampled extent has no value, which the
//! metrics count as an invalid sample.

use crate::component::Component;
use crate::image::Image;

/// Continuous evaluation of an image.
pub trait Interpolator: Component + Sync {
    /// Value at `point`, or `None` outside the image.
    fn evaluate(&self, image: &Image, point: &[f64]) -> Option<f64>;

    /// Value at `point` and its spatial gradient in physical units.
    fn evaluate_with_gradient(
        &self,
        image: &Image,
        point: &[f64],
        gradient: &mut [f64],
    ) -> Option<f64>;
}

/// Multilinear interpolation.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinearInterpolator;

/// Lower corner index and fractional offset along each axis.
fn cell(image: &Image, cindex: &[f64]) -> (Vec<usize>, Vec<f64>) {
    cindex
        .iter()
        .zip(image.size())
        .map(|(&c, &s)| {
            if s < 2 {
                return (0, 0.0);
            }
            let base = (c.floor() as usize).min(s - 2);
            (base, c - base as f64)
        })
        .unzip()
}

impl LinearInterpolator {
    fn interpolate(&self, image: &Image, point: &[f64], mut gradient: Option<&mut [f64]>) -> Option<f64> {
        let geometry = image.geometry();
        let cindex = geometry.point_to_index(point);
        if !geometry.contains_index(&cindex) {
            return None;
        }
        let dim = cindex.len();
        let (base, frac) = cell(image, &cindex);
        let size = image.size();
        if let Some(g) = gradient.as_deref_mut() {
            g.iter_mut().for_each(|v| *v = 0.0);
        }

        let mut value = 0.0;
        let mut corner = vec![0usize; dim];
        for mask in 0..(1usize << dim) {
            let mut weight = 1.0;
            for axis in 0..dim {
                let upper = mask >> axis & 1 == 1;
                corner[axis] = if upper && size[axis] > 1 {
                    base[axis] + 1
                } else {
                    base[axis]
                };
                weight *= if upper { frac[axis] } else { 1.0 - frac[axis] };
            }
            let v = image.get(&corner)? as f64;
            value += weight * v;

            if let Some(g) = gradient.as_deref_mut() {
                for axis in 0..dim {
                    if size[axis] < 2 {
                        continue;
                    }
                    let mut w = if mask >> axis & 1 == 1 { 1.0 } else { -1.0 };
                    for other in (0..dim).filter(|&o| o != axis) {
                        w *= if mask >> other & 1 == 1 {
                            frac[other]
                        } else {
                            1.0 - frac[other]
                        };
                    }
                    g[axis] += w * v;
                }
            }
        }
        if let Some(g) = gradient {
            for (g, &sp) in g.iter_mut().zip(image.spacing()) {
                *g /= sp;
            }
        }
        Some(value)
    }
}

impl Component for LinearInterpolator {
    fn name(&self) -> &'static str {
        "LinearInterpolator"
    }
}

impl Interpolator for LinearInterpolator {
    fn evaluate(&self, image: &Image, point: &[f64]) -> Option<f64> {
        self.interpolate(image, point, None)
    }

    fn evaluate_with_gradient(
        &self,
        image: &Image,
        point: &[f64],
        gradient: &mut [f64],
    ) -> Option<f64> {
        self.interpolate(image, point, Some(gradient))
    }
}

/// Nearest-voxel lookup; gradients are zero.
#[derive(Clone, Copy, Debug, Default)]
pub struct NearestNeighborInterpolator;

impl Component for NearestNeighborInterpolator {
    fn name(&self) -> &'static str {
        "NearestNeighborInterpolator"
    }
}

impl Interpolator for NearestNeighborInterpolator {
    fn evaluate(&self, image: &Image, point: &[f64]) -> Option<f64> {
        let cindex = image.geometry().point_to_index(point);
        if !image.geometry().contains_index(&cindex) {
            return None;
        }
        let index = image.geometry().nearest_index(point)?;
        image.get(&index).map(f64::from)
    }

    fn evaluate_with_gradient(
        &self,
        image: &Image,
        point: &[f64],
        gradient: &mut [f64],
    ) -> Option<f64> {
        gradient.iter_mut().for_each(|g| *g = 0.0);
        self.evaluate(image, point)
    }
}

#[cfg(test)]
mod tests {
    use super::{Interpolator, LinearInterpolator, NearestNeighborInterpolator};
    use crate::image::{Geometry, Image};

    fn ramp() -> Image {
        let geometry = Geometry::with_spacing(vec![4, 3], vec![2.0, 1.0], vec![0.0, 0.0]).unwrap();
        Image::from_fn(geometry, |idx| (idx[0] * 10 + idx[1]) as f32)
    }

    #[test]
    fn linear_reproduces_a_ramp_with_physical_gradient() {
        let image = ramp();
        let mut g = [0.0; 2];
        let v = LinearInterpolator
            .evaluate_with_gradient(&image, &[3.0, 0.5], &mut g)
            .unwrap();
        assert!((v - 15.5).abs() < 1e-9);
        assert!((g[0] - 5.0).abs() < 1e-9);
        assert!((g[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn linear_handles_the_last_voxel_and_rejects_outside() {
        let image = ramp();
        assert_eq!(LinearInterpolator.evaluate(&image, &[6.0, 2.0]), Some(32.0));
        assert_eq!(LinearInterpolator.evaluate(&image, &[6.1, 2.0]), None);
        assert_eq!(LinearInterpolator.evaluate(&image, &[-0.1, 0.0]), None);
    }

    #[test]
    fn nearest_rounds_to_closest_voxel() {
        let image = ramp();
        let mut g = [1.0; 2];
        let v = NearestNeighborInterpolator
            .evaluate_with_gradient(&image, &[2.9, 1.6], &mut g)
            .unwrap();
        assert_eq!(v, 12.0);
        assert_eq!(g, [0.0, 0.0]);
    }
}
