//! Similarity metrics.
//!
//! Metrics are evaluated over the samples of an [`ImageSampler`]. A metric
//! that draws its positions from a sampler exposes that through
//! [`Metric::sampler_aware`]; the [`SamplingCoordinator`] uses it to enforce
//! the valid-sample ratio and to compute exact values.

pub mod mean_squares;
pub mod normalized_correlation;
pub mod sampling;

pub use mean_squares::AdvancedMeanSquares;
pub use normalized_correlation::AdvancedNormalizedCorrelation;
pub use sampling::SamplingCoordinator;

use crate::component::Component;
use crate::image::{Image, Mask};
use crate::interpolator::Interpolator;
use crate::sampler::{ImageSample, ImageSampler};
use crate::transform::Differentiable;
use crate::util::{MultiRegError, MultiRegResult};

/// Default value of `RequiredRatioOfValidSamples`.
pub const DEFAULT_REQUIRED_RATIO: f64 = 0.25;

/// Everything a metric evaluation reads besides its own samples.
#[derive(Clone, Copy)]
pub struct MetricInput<'a> {
    pub moving: &'a Image,
    pub moving_mask: Option<&'a Mask>,
    /// The stage transform, already combined with the initial transform.
    pub transform: &'a dyn Differentiable,
    pub interpolator: &'a dyn Interpolator,
}

/// A cost over transform parameters; lower is better.
pub trait Metric: Component {
    fn value(&mut self, input: &MetricInput<'_>) -> MultiRegResult<f64>;

    /// Value and derivative with respect to the transform parameters.
    fn value_and_derivative(
        &mut self,
        input: &MetricInput<'_>,
        derivative: &mut [f64],
    ) -> MultiRegResult<f64>;

    /// The sampler capability, if the metric has one.
    fn sampler_aware(&mut self) -> Option<&mut dyn SamplerAware> {
        None
    }
}

/// Capability of metrics that evaluate over an exchangeable sampler.
pub trait SamplerAware {
    fn image_sampler(&self) -> Option<&dyn ImageSampler>;

    fn image_sampler_mut(&mut self) -> Option<&mut dyn ImageSampler>;

    /// Installs `sampler` and returns the one it replaces.
    fn set_image_sampler(
        &mut self,
        sampler: Option<Box<dyn ImageSampler>>,
    ) -> Option<Box<dyn ImageSampler>>;

    fn required_ratio_of_valid_samples(&self) -> f64;

    fn set_required_ratio_of_valid_samples(&mut self, ratio: f64);
}

/// Sampler slot and validity threshold shared by the sampler-aware metrics.
pub struct SamplerCore {
    sampler: Option<Box<dyn ImageSampler>>,
    required_ratio: f64,
}

impl Default for SamplerCore {
    fn default() -> Self {
        Self {
            sampler: None,
            required_ratio: DEFAULT_REQUIRED_RATIO,
        }
    }
}

impl std::fmt::Debug for SamplerCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplerCore")
            .field("sampler", &self.sampler.as_ref().map(|s| s.name()))
            .field("required_ratio", &self.required_ratio)
            .finish()
    }
}

impl SamplerCore {
    /// Brings the sampler up to date and returns its samples.
    pub fn samples(&mut self) -> MultiRegResult<&[ImageSample]> {
        let sampler = self
            .sampler
            .as_mut()
            .ok_or(MultiRegError::MissingInput("image sampler"))?;
        sampler.update()?;
        Ok(sampler.samples())
    }

    pub fn check(&self, valid: usize, total: usize) -> MultiRegResult<()> {
        check_number_of_samples(valid, total, self.required_ratio)
    }
}

impl SamplerAware for SamplerCore {
    fn image_sampler(&self) -> Option<&dyn ImageSampler> {
        self.sampler.as_deref()
    }

    fn image_sampler_mut(&mut self) -> Option<&mut dyn ImageSampler> {
        match &mut self.sampler {
            Some(sampler) => Some(sampler.as_mut()),
            None => None,
        }
    }

    fn set_image_sampler(
        &mut self,
        sampler: Option<Box<dyn ImageSampler>>,
    ) -> Option<Box<dyn ImageSampler>> {
        std::mem::replace(&mut self.sampler, sampler)
    }

    fn required_ratio_of_valid_samples(&self) -> f64 {
        self.required_ratio
    }

    fn set_required_ratio_of_valid_samples(&mut self, ratio: f64) {
        self.required_ratio = ratio;
    }
}

/// Fails when fewer than `ratio * total` samples were valid.
///
/// A ratio of zero accepts any count, including no samples at all.
pub fn check_number_of_samples(valid: usize, total: usize, ratio: f64) -> MultiRegResult<()> {
    if ratio > 0.0 && (total == 0 || (valid as f64) < ratio * total as f64) {
        return Err(MultiRegError::SampleValidity {
            valid,
            total,
            required: ratio,
        });
    }
    Ok(())
}

/// Per-task buffers reused across the samples of one chunk.
#[derive(Debug)]
pub(crate) struct Scratch {
    mapped: Vec<f64>,
    gradient: Vec<f64>,
    jacobian: Vec<f64>,
    /// `d moving / d mu` of the last mapped sample.
    pub(crate) dmoving: Vec<f64>,
}

impl Scratch {
    pub(crate) fn new(dimension: usize, parameters: usize) -> Self {
        Self {
            mapped: vec![0.0; dimension],
            gradient: vec![0.0; dimension],
            jacobian: vec![0.0; dimension * parameters],
            dmoving: vec![0.0; parameters],
        }
    }

    pub(crate) fn for_input(input: &MetricInput<'_>) -> Self {
        Self::new(
            input.transform.dimension(),
            input.transform.number_of_parameters(),
        )
    }

    /// Moving intensity at `T(sample)`, or `None` if the mapped point falls
    /// outside the moving image or mask. With `derivative`, also fills
    /// [`Scratch::dmoving`].
    pub(crate) fn moving_value(
        &mut self,
        input: &MetricInput<'_>,
        sample: &ImageSample,
        derivative: bool,
    ) -> Option<f64> {
        input.transform.transform_point(&sample.point, &mut self.mapped);
        if let Some(mask) = input.moving_mask {
            if !mask.is_inside(&self.mapped) {
                return None;
            }
        }
        if !derivative {
            return input.interpolator.evaluate(input.moving, &self.mapped);
        }
        let value =
            input
                .interpolator
                .evaluate_with_gradient(input.moving, &self.mapped, &mut self.gradient)?;
        input.transform.jacobian(&sample.point, &mut self.jacobian);
        let n = self.dmoving.len();
        self.dmoving.iter_mut().for_each(|d| *d = 0.0);
        for (axis, &g) in self.gradient.iter().enumerate() {
            let row = &self.jacobian[axis * n..(axis + 1) * n];
            for (d, &j) in self.dmoving.iter_mut().zip(row) {
                *d += g * j;
            }
        }
        Some(value)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{check_number_of_samples, MetricInput};
    use crate::image::{Geometry, Image};
    use crate::interpolator::LinearInterpolator;
    use crate::sampler::{FullSampler, ImageSampler, SamplerInput};
    use crate::transform::TranslationTransform;
    use crate::util::MultiRegError;
    use std::sync::Arc;

    /// Smooth 2-D blob centered at `(cx, cy)`.
    pub(crate) fn blob(size: usize, cx: f64, cy: f64) -> Arc<Image> {
        let geometry = Geometry::new(vec![size, size]).unwrap();
        Arc::new(Image::from_fn(geometry, |idx| {
            let dx = idx[0] as f64 - cx;
            let dy = idx[1] as f64 - cy;
            (100.0 * (-(dx * dx + dy * dy) / 18.0).exp()) as f32
        }))
    }

    pub(crate) fn full_sampler(image: Arc<Image>) -> Box<dyn ImageSampler> {
        let mut sampler = FullSampler::default();
        sampler.set_input(SamplerInput::new(image));
        Box::new(sampler)
    }

    pub(crate) fn input<'a>(
        moving: &'a Image,
        transform: &'a TranslationTransform,
    ) -> MetricInput<'a> {
        MetricInput {
            moving,
            moving_mask: None,
            transform,
            interpolator: &LinearInterpolator,
        }
    }

    #[test]
    fn ratio_check_boundaries() {
        assert!(check_number_of_samples(0, 0, 0.0).is_ok());
        assert!(check_number_of_samples(0, 10, 0.0).is_ok());
        assert!(check_number_of_samples(5, 10, 0.5).is_ok());
        assert_eq!(
            check_number_of_samples(4, 10, 0.5).unwrap_err(),
            MultiRegError::SampleValidity {
                valid: 4,
                total: 10,
                required: 0.5,
            }
        );
        assert!(check_number_of_samples(0, 0, 0.25).is_err());
    }
}
