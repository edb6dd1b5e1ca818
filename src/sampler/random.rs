use crate::component::{Component, HookContext};
use crate::sampler::{require_input, ImageSample, ImageSampler, SamplerInput};
use crate::util::MultiRegResult;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DEFAULT_NUMBER_OF_SAMPLES: usize = 5000;
const DEFAULT_SEED: u64 = 121_212;

/// Uniformly drawn voxels (with replacement) of the region inside the mask.
///
/// Reads `NumberOfSpatialSamples` per resolution and `RandomSeed`; the
/// generator is reseeded at every resolution so runs are reproducible.
#[derive(Debug)]
pub struct RandomSampler {
    input: Option<SamplerInput>,
    number_of_samples: usize,
    rng: StdRng,
    stale: bool,
    candidates: Option<(SamplerInput, Vec<ImageSample>)>,
    samples: Vec<ImageSample>,
}

impl Default for RandomSampler {
    fn default() -> Self {
        Self {
            input: None,
            number_of_samples: DEFAULT_NUMBER_OF_SAMPLES,
            rng: StdRng::seed_from_u64(DEFAULT_SEED),
            stale: true,
            candidates: None,
            samples: Vec::new(),
        }
    }
}

impl RandomSampler {
    pub fn new(number_of_samples: usize, seed: u64) -> Self {
        Self {
            number_of_samples,
            rng: StdRng::seed_from_u64(seed),
            ..Self::default()
        }
    }

    pub fn number_of_samples(&self) -> usize {
        self.number_of_samples
    }
}

impl Component for RandomSampler {
    fn name(&self) -> &'static str {
        "Random"
    }

    fn before_each_resolution(&mut self, ctx: &HookContext<'_>) -> MultiRegResult<()> {
        self.number_of_samples =
            ctx.read_for_level("NumberOfSpatialSamples", DEFAULT_NUMBER_OF_SAMPLES)?;
        let seed: u64 = ctx.read_or("RandomSeed", DEFAULT_SEED)?;
        self.rng = StdRng::seed_from_u64(seed.wrapping_add(ctx.level as u64));
        self.stale = true;
        Ok(())
    }
}

impl ImageSampler for RandomSampler {
    fn set_input(&mut self, input: SamplerInput) {
        self.input = Some(input);
        self.stale = true;
    }

    fn input(&self) -> Option<&SamplerInput> {
        self.input.as_ref()
    }

    fn select_new_samples(&mut self) {
        self.stale = true;
    }

    fn update(&mut self) -> MultiRegResult<()> {
        let input = require_input(self.input.as_ref())?;
        let cached = self
            .candidates
            .as_ref()
            .is_some_and(|(done, _)| done.same_as(input));
        if !cached {
            let all = (0..input.region.len())
                .filter_map(|n| input.sample(n))
                .collect();
            self.candidates = Some((input.clone(), all));
            self.stale = true;
        }
        if !self.stale {
            return Ok(());
        }
        let candidates = self.candidates.as_ref().map(|(_, c)| c.as_slice()).unwrap_or(&[]);
        self.samples.clear();
        if !candidates.is_empty() {
            for _ in 0..self.number_of_samples {
                let pick = self.rng.random_range(0..candidates.len());
                self.samples.push(candidates[pick].clone());
            }
        }
        self.stale = false;
        Ok(())
    }

    fn samples(&self) -> &[ImageSample] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::RandomSampler;
    use crate::sampler::tests::input;
    use crate::sampler::ImageSampler;

    #[test]
    fn draws_the_requested_count_and_reselects_on_demand() {
        let mut sampler = RandomSampler::new(50, 7);
        sampler.set_input(input(8, true));
        sampler.update().unwrap();
        let first = sampler.samples().to_vec();
        assert_eq!(first.len(), 50);
        assert!(first.iter().all(|s| s.point[0] < 4.0));

        sampler.update().unwrap();
        assert_eq!(sampler.samples(), first.as_slice());

        sampler.select_new_samples();
        sampler.update().unwrap();
        assert_ne!(sampler.samples(), first.as_slice());
    }

    #[test]
    fn same_seed_same_samples() {
        let shared = input(8, false);
        let mut a = RandomSampler::new(20, 3);
        let mut b = RandomSampler::new(20, 3);
        a.set_input(shared.clone());
        b.set_input(shared);
        a.update().unwrap();
        b.update().unwrap();
        assert_eq!(a.samples(), b.samples());
    }
}
