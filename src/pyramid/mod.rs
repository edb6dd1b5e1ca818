//! Image pyramids.
//!
//! A pyramid turns one input image into one image per resolution level
//! according to its [`Schedule`]. The schedule is read in
//! `BeforeRegistration` from `FixedImagePyramidSchedule` or
//! `MovingImagePyramidSchedule` (falling back to `ImagePyramidSchedule`),
//! or built with the default halving rule for `NumberOfResolutions` levels.

pub mod schedule;

pub use schedule::{smoothing_sigma, Schedule};

use crate::component::{Component, HookContext};
use crate::image::filter::{gaussian_smooth, shrink};
use crate::image::Image;
use crate::trace::trace_span;
use crate::util::{MultiRegError, MultiRegResult};
use std::sync::Arc;

/// Default value of `NumberOfResolutions`.
pub const DEFAULT_NUMBER_OF_RESOLUTIONS: usize = 3;

/// Which image a pyramid serves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PyramidRole {
    #[default]
    Fixed,
    Moving,
}

impl PyramidRole {
    pub fn schedule_key(self) -> &'static str {
        match self {
            PyramidRole::Fixed => "FixedImagePyramidSchedule",
            PyramidRole::Moving => "MovingImagePyramidSchedule",
        }
    }

    /// Stage configuration key selecting the pyramid component.
    pub fn component_key(self) -> &'static str {
        match self {
            PyramidRole::Fixed => "FixedImagePyramid",
            PyramidRole::Moving => "MovingImagePyramid",
        }
    }
}

/// Per-level images derived from one input.
pub trait ImagePyramid: Component {
    fn set_role(&mut self, role: PyramidRole);

    fn set_input(&mut self, image: Arc<Image>);

    fn schedule(&self) -> Option<&Schedule>;

    /// Replaces the schedule; it must match the input dimension.
    fn set_schedule(&mut self, schedule: Schedule) -> MultiRegResult<()>;

    /// Image of `level`, computed on first request.
    fn output(&mut self, level: usize) -> MultiRegResult<Arc<Image>>;
}

/// Reads or builds the schedule for `role` at the current stage.
///
/// The role key wins over `ImagePyramidSchedule`. A value list of
/// `levels * dimension` factors is taken as is, one of `dimension` factors
/// is the first row of a halving schedule.
pub fn read_schedule(
    ctx: &HookContext<'_>,
    role: PyramidRole,
    dimension: usize,
) -> MultiRegResult<Schedule> {
    let levels: usize = ctx
        .config
        .read_or("NumberOfResolutions", "", 0, 0, DEFAULT_NUMBER_OF_RESOLUTIONS)?;
    let explicit = match ctx.config.read_vector::<u32>(role.schedule_key(), "", 0)? {
        Some(values) => Some(values),
        None => ctx.config.read_vector::<u32>("ImagePyramidSchedule", "", 0)?,
    };
    match explicit {
        // A single row seeds the halving rule for the remaining levels.
        Some(values) if values.len() == dimension => {
            Schedule::build_default(levels, dimension, Some(&values))
        }
        Some(values) => Schedule::from_flat(&values, levels, dimension),
        None => Schedule::build_default(levels, dimension, None),
    }
}

/// Which filters a level applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Filtering {
    Smooth,
    SmoothAndShrink,
}

/// State shared by the pyramid variants.
#[derive(Debug)]
struct PyramidCore {
    role: PyramidRole,
    input: Option<Arc<Image>>,
    schedule: Option<Schedule>,
    outputs: Vec<Option<Arc<Image>>>,
}

impl PyramidCore {
    fn new() -> Self {
        Self {
            role: PyramidRole::default(),
            input: None,
            schedule: None,
            outputs: Vec::new(),
        }
    }

    fn set_input(&mut self, image: Arc<Image>) {
        self.input = Some(image);
        self.outputs.clear();
    }

    fn set_schedule(&mut self, schedule: Schedule) -> MultiRegResult<()> {
        if let Some(input) = &self.input {
            schedule.validate(schedule.levels(), input.dimension())?;
        }
        self.outputs = vec![None; schedule.levels()];
        self.schedule = Some(schedule);
        Ok(())
    }

    fn before_registration(&mut self, ctx: &HookContext<'_>) -> MultiRegResult<()> {
        let dimension = self
            .input
            .as_ref()
            .ok_or(MultiRegError::MissingInput("pyramid input"))?
            .dimension();
        let schedule = read_schedule(ctx, self.role, dimension)?;
        ctx.sink.info(format!(
            "{} schedule: {:?}",
            ctx.label,
            schedule.rows().collect::<Vec<_>>()
        ));
        self.set_schedule(schedule)
    }

    fn output(&mut self, level: usize, filtering: Filtering) -> MultiRegResult<Arc<Image>> {
        let input = self
            .input
            .clone()
            .ok_or(MultiRegError::MissingInput("pyramid input"))?;
        let schedule = self
            .schedule
            .as_ref()
            .ok_or(MultiRegError::MissingInput("pyramid schedule"))?;
        let row = schedule
            .row(level)
            .ok_or(MultiRegError::InvalidInput("resolution level beyond the schedule"))?
            .to_vec();
        if let Some(Some(done)) = self.outputs.get(level) {
            return Ok(Arc::clone(done));
        }

        let _span = trace_span!("pyramid_level", level = level).entered();
        let image = if row.iter().all(|&f| f == 1) && level + 1 == schedule.levels() {
            input
        } else {
            let sigmas: Vec<f64> = row
                .iter()
                .zip(input.spacing())
                .map(|(&f, &sp)| smoothing_sigma(f, sp))
                .collect();
            let smoothed = gaussian_smooth(&input, &sigmas)?;
            let out = match filtering {
                Filtering::Smooth => smoothed,
                Filtering::SmoothAndShrink => shrink(&smoothed, &row)?,
            };
            Arc::new(out)
        };
        if let Some(slot) = self.outputs.get_mut(level) {
            *slot = Some(Arc::clone(&image));
        }
        Ok(image)
    }
}

macro_rules! pyramid_component {
    ($ty:ident, $name:literal, $filtering:expr) => {
        impl Component for $ty {
            fn name(&self) -> &'static str {
                $name
            }

            fn before_registration(&mut self, ctx: &HookContext<'_>) -> MultiRegResult<()> {
                self.core.before_registration(ctx)
            }
        }

        impl ImagePyramid for $ty {
            fn set_role(&mut self, role: PyramidRole) {
                self.core.role = role;
            }

            fn set_input(&mut self, image: Arc<Image>) {
                self.core.set_input(image);
            }

            fn schedule(&self) -> Option<&Schedule> {
                self.core.schedule.as_ref()
            }

            fn set_schedule(&mut self, schedule: Schedule) -> MultiRegResult<()> {
                self.core.set_schedule(schedule)
            }

            fn output(&mut self, level: usize) -> MultiRegResult<Arc<Image>> {
                self.core.output(level, $filtering)
            }
        }
    };
}

/// Gaussian smoothing per level, without downsampling.
#[derive(Debug)]
pub struct SmoothingImagePyramid {
    core: PyramidCore,
}

impl Default for SmoothingImagePyramid {
    fn default() -> Self {
        Self {
            core: PyramidCore::new(),
        }
    }
}

/// Gaussian smoothing followed by shrinking by the schedule factors.
#[derive(Debug)]
pub struct RecursiveImagePyramid {
    core: PyramidCore,
}

impl Default for RecursiveImagePyramid {
    fn default() -> Self {
        Self {
            core: PyramidCore::new(),
        }
    }
}

pyramid_component!(SmoothingImagePyramid, "SmoothingImagePyramid", Filtering::Smooth);
pyramid_component!(RecursiveImagePyramid, "RecursiveImagePyramid", Filtering::SmoothAndShrink);

#[cfg(test)]
mod tests {
    use super::{ImagePyramid, PyramidRole, RecursiveImagePyramid, Schedule, SmoothingImagePyramid};
    use crate::component::{Component, HookContext};
    use crate::config::{Configuration, ParameterMap};
    use crate::image::{Geometry, Image};
    use crate::sink::LogSink;
    use std::sync::Arc;

    fn checker() -> Arc<Image> {
        let geometry = Geometry::new(vec![16, 16]).unwrap();
        Arc::new(Image::from_fn(geometry, |idx| ((idx[0] / 2 + idx[1] / 2) % 2) as f32))
    }

    fn variance(image: &Image) -> f64 {
        let n = image.data().len() as f64;
        let mean = image.data().iter().map(|&v| v as f64).sum::<f64>() / n;
        image.data().iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n
    }

    #[test]
    fn smoothing_levels_keep_size_and_lose_detail() {
        let mut pyramid = SmoothingImagePyramid::default();
        pyramid.set_input(checker());
        pyramid
            .set_schedule(Schedule::build_default(3, 2, None).unwrap())
            .unwrap();
        let coarse = pyramid.output(0).unwrap();
        let fine = pyramid.output(2).unwrap();
        assert_eq!(coarse.size(), &[16, 16]);
        assert!(variance(&coarse) < variance(&fine));
        assert!(Arc::ptr_eq(&fine, &pyramid.output(2).unwrap()));
        assert!(pyramid.output(3).is_err());
    }

    #[test]
    fn recursive_levels_shrink() {
        let mut pyramid = RecursiveImagePyramid::default();
        pyramid.set_input(checker());
        pyramid
            .set_schedule(Schedule::from_rows(&[vec![4, 4], vec![2, 1], vec![1, 1]]).unwrap())
            .unwrap();
        assert_eq!(pyramid.output(0).unwrap().size(), &[4, 4]);
        assert_eq!(pyramid.output(1).unwrap().size(), &[8, 16]);
        assert_eq!(pyramid.output(2).unwrap().size(), &[16, 16]);
    }

    #[test]
    fn schedule_comes_from_role_key_then_common_key() {
        let config = Configuration::from_parameters(
            ParameterMap::parse(
                "(NumberOfResolutions 2)\n(ImagePyramidSchedule 2 2 1 1)\n(MovingImagePyramidSchedule 4 4 2 2)",
            )
            .unwrap(),
        );
        let sink = LogSink::in_memory();
        let ctx = HookContext::new(&config, &sink, 0);

        let mut fixed = SmoothingImagePyramid::default();
        fixed.set_input(checker());
        fixed.before_registration(&ctx).unwrap();
        assert_eq!(fixed.schedule().unwrap().row(0), Some(&[2, 2][..]));

        let mut moving = SmoothingImagePyramid::default();
        moving.set_role(PyramidRole::Moving);
        moving.set_input(checker());
        moving.before_registration(&ctx).unwrap();
        assert_eq!(moving.schedule().unwrap().row(0), Some(&[4, 4][..]));
    }

    #[test]
    fn single_row_schedule_seeds_the_halving_rule() {
        let config = Configuration::from_parameters(
            ParameterMap::parse("(NumberOfResolutions 4)\n(ImagePyramidSchedule 8 4)").unwrap(),
        );
        let sink = LogSink::in_memory();
        let ctx = HookContext::new(&config, &sink, 0);

        let mut pyramid = SmoothingImagePyramid::default();
        pyramid.set_input(checker());
        pyramid.before_registration(&ctx).unwrap();
        let rows: Vec<&[u32]> = pyramid.schedule().unwrap().rows().collect();
        assert_eq!(rows, vec![&[8, 4][..], &[4, 2], &[2, 1], &[1, 1]]);
    }
}
