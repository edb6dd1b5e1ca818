use crate::component::Component;
use crate::sampler::{require_input, ImageSample, ImageSampler, SamplerInput};
use crate::util::MultiRegResult;

/// Every voxel of the region inside the mask.
#[derive(Debug, Default)]
pub struct FullSampler {
    input: Option<SamplerInput>,
    generated_for: Option<SamplerInput>,
    samples: Vec<ImageSample>,
}

impl Component for FullSampler {
    fn name(&self) -> &'static str {
        "Full"
    }
}

impl ImageSampler for FullSampler {
    fn set_input(&mut self, input: SamplerInput) {
        self.input = Some(input);
    }

    fn input(&self) -> Option<&SamplerInput> {
        self.input.as_ref()
    }

    fn is_full(&self) -> bool {
        true
    }

    // The full sample set does not change between selections.
    fn select_new_samples(&mut self) {}

    fn update(&mut self) -> MultiRegResult<()> {
        let input = require_input(self.input.as_ref())?;
        if self
            .generated_for
            .as_ref()
            .is_some_and(|done| done.same_as(input))
        {
            return Ok(());
        }
        self.samples = (0..input.region.len())
            .filter_map(|n| input.sample(n))
            .collect();
        self.generated_for = Some(input.clone());
        Ok(())
    }

    fn samples(&self) -> &[ImageSample] {
        &self.samples
    }
}
