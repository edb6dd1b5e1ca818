//! Components shipped with the crate.

use crate::component::{ComponentModule, ComponentRegistry};
use crate::interpolator::{LinearInterpolator, NearestNeighborInterpolator};
use crate::metric::{AdvancedMeanSquares, AdvancedNormalizedCorrelation};
use crate::optimizer::{GradientDescent, RegularStepGradientDescent};
use crate::pyramid::{RecursiveImagePyramid, SmoothingImagePyramid};
use crate::registration::MultiResolutionRegistration;
use crate::sampler::{FullSampler, GridSampler, RandomSampler};
use crate::transform::{AffineTransform, TranslationTransform};
use crate::util::MultiRegResult;

/// Name of the module holding the built-in components.
pub const BUILTIN_MODULE: &str = "builtin";

/// Modules loaded by [`ComponentRegistry::with_builtins`].
pub fn modules() -> Vec<Box<dyn ComponentModule>> {
    vec![Box::new(Builtins)]
}

struct Builtins;

impl ComponentModule for Builtins {
    fn name(&self) -> &str {
        BUILTIN_MODULE
    }

    fn register(&self, registry: &mut ComponentRegistry) -> MultiRegResult<()> {
        registry.register_registration("MultiResolutionRegistration", || {
            Box::new(MultiResolutionRegistration::default())
        })?;

        registry.register_metric("AdvancedMeanSquares", || Box::new(AdvancedMeanSquares::default()))?;
        registry.register_metric("AdvancedNormalizedCorrelation", || {
            Box::new(AdvancedNormalizedCorrelation::default())
        })?;

        registry.register_transform("TranslationTransform", || {
            Box::new(TranslationTransform::default())
        })?;
        registry.register_transform("AffineTransform", || Box::new(AffineTransform::default()))?;

        registry.register_optimizer("GradientDescent", || Box::new(GradientDescent::default()))?;
        registry.register_optimizer("RegularStepGradientDescent", || {
            Box::new(RegularStepGradientDescent::default())
        })?;

        registry.register_interpolator("LinearInterpolator", || Box::new(LinearInterpolator))?;
        registry.register_interpolator("NearestNeighborInterpolator", || {
            Box::new(NearestNeighborInterpolator)
        })?;

        registry.register_pyramid("SmoothingImagePyramid", || {
            Box::new(SmoothingImagePyramid::default())
        })?;
        registry.register_pyramid("RecursiveImagePyramid", || {
            Box::new(RecursiveImagePyramid::default())
        })?;

        registry.register_sampler("Full", || Box::new(FullSampler::default()))?;
        registry.register_sampler("Random", || Box::new(RandomSampler::default()))?;
        registry.register_sampler("Grid", || Box::new(GridSampler::default()))
    }
}
