//! Image samplers: which fixed-image positions a metric evaluates.
//!
//! A sampler is configured with a [`SamplerInput`] (image, optional mask,
//! region) and produces a list of [`ImageSample`]s on [`ImageSampler::update`].
//! Only voxels inside the region and the mask are ever selected.

mod full;
mod grid;
mod random;

pub use full::FullSampler;
pub use grid::GridSampler;
pub use random::RandomSampler;

use crate::component::Component;
use crate::image::{Image, Mask, Region};
use crate::util::{MultiRegError, MultiRegResult};
use std::sync::Arc;

/// A fixed-image position and its intensity.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageSample {
    pub point: Vec<f64>,
    pub value: f64,
}

/// What a sampler draws from.
#[derive(Clone, Debug)]
pub struct SamplerInput {
    pub image: Arc<Image>,
    pub mask: Option<Arc<Mask>>,
    pub region: Region,
}

impl SamplerInput {
    /// Samples from the whole of `image`.
    pub fn new(image: Arc<Image>) -> Self {
        let region = image.geometry().full_region();
        Self {
            image,
            mask: None,
            region,
        }
    }

    pub fn with_mask(mut self, mask: Option<Arc<Mask>>) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_region(mut self, region: Region) -> MultiRegResult<Self> {
        if !region.fits(self.image.geometry()) {
            return Err(MultiRegError::InvalidInput("sampling region exceeds the image"));
        }
        self.region = region;
        Ok(self)
    }

    /// Returns true if both inputs refer to the same image, mask and region.
    pub fn same_as(&self, other: &SamplerInput) -> bool {
        let same_mask = match (&self.mask, &other.mask) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        Arc::ptr_eq(&self.image, &other.image) && same_mask && self.region == other.region
    }

    /// The sample at the `n`th voxel of the region, if inside the mask.
    fn sample(&self, n: usize) -> Option<ImageSample> {
        let index = self.region.nth(n);
        let cindex: Vec<f64> = index.iter().map(|&i| i as f64).collect();
        let point = self.image.geometry().index_to_point(&cindex);
        if let Some(mask) = &self.mask {
            if !mask.is_inside(&point) {
                return None;
            }
        }
        let value = self.image.get(&index)? as f64;
        Some(ImageSample { point, value })
    }
}

/// Strategy selecting sample positions.
pub trait ImageSampler: Component {
    fn set_input(&mut self, input: SamplerInput);

    fn input(&self) -> Option<&SamplerInput>;

    /// Returns true for a sampler that always yields every valid voxel.
    fn is_full(&self) -> bool {
        false
    }

    /// Requests a fresh selection on the next [`update`](Self::update).
    fn select_new_samples(&mut self);

    /// Generates the sample list if it is out of date.
    fn update(&mut self) -> MultiRegResult<()>;

    fn samples(&self) -> &[ImageSample];
}

fn require_input(input: Option<&SamplerInput>) -> MultiRegResult<&SamplerInput> {
    input.ok_or(MultiRegError::MissingInput("sampler input"))
}
