//! Resampling of the moving image onto the fixed grid.

use crate::image::{Geometry, Image};
use crate::interpolator::Interpolator;
use crate::transform::Transform;

/// Evaluates `moving` at `T(x)` for every voxel `x` of `fixed`; voxels that
/// map outside the moving image get `default_value`.
pub fn resample(
    moving: &Image,
    fixed: &Geometry,
    transform: &dyn Transform,
    interpolator: &dyn Interpolator,
    default_value: f32,
) -> Image {
    let mut mapped = vec![0.0; fixed.dimension()];
    Image::from_fn(fixed.clone(), |index| {
        let cindex: Vec<f64> = index.iter().map(|&i| i as f64).collect();
        let point = fixed.index_to_point(&cindex);
        transform.transform_point(&point, &mut mapped);
        interpolator
            .evaluate(moving, &mapped)
            .map_or(default_value, |v| v as f32)
    })
}
