//! One registration stage.
//!
//! A [`StageRunner`] builds fresh components from the stage configuration,
//! runs the lifecycle hooks in a fixed order, iterates the optimizer at each
//! resolution level, and returns the resulting transform chain. Hooks are
//! called on, in order: registration, fixed pyramid, moving pyramid, image
//! sampler, interpolator, metric (followed by its sampling coordinator),
//! transform and optimizer. The first failing hook aborts the stage.

pub mod resample;

use crate::component::{
    ComponentBinding, ComponentKind, ComponentRegistry, Hook, HookContext, Slot,
};
use crate::config::Configuration;
use crate::driver::ImageWriter;
use crate::image::{Image, ImageContainers, Mask};
use crate::interpolator::Interpolator;
use crate::metric::{Metric, MetricInput, SamplingCoordinator};
use crate::optimizer::{CostFunction, Optimizer, StepOutcome};
use crate::pyramid::{ImagePyramid, PyramidRole};
use crate::registration::RegistrationMethod;
use crate::sampler::SamplerInput;
use crate::sink::LogSink;
use crate::trace::{trace_event, trace_span};
use crate::transform::parameters_file::{to_parameter_map, write_parameter_map};
use crate::transform::{
    CombinationMode, CombinedTransform, TransformChain, TransformComponent, TransformSetup,
};
use crate::util::math::format_dhms;
use crate::util::{MultiRegError, MultiRegResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Iteration table columns every stage writes.
pub const ITERATION_COLUMNS: [&str; 4] = ["1:ItNr", "2:Metric", "3:StepSize", "4:||Gradient||"];

/// Component selected when the configuration names none.
pub fn default_component(key: &str) -> Option<&'static str> {
    Some(match key {
        "Registration" => "MultiResolutionRegistration",
        "Metric" => "AdvancedMeanSquares",
        "Transform" => "TranslationTransform",
        "Optimizer" => "RegularStepGradientDescent",
        "Interpolator" => "LinearInterpolator",
        "FixedImagePyramid" | "MovingImagePyramid" => "SmoothingImagePyramid",
        "ImageSampler" => "Full",
        _ => return None,
    })
}

/// Where a stage is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageState {
    Initialized,
    BeforeRegistration,
    BeforeEachResolution(usize),
    Iterating(usize),
    AfterEachResolution(usize),
    AfterRegistration,
    Finished,
    Aborted,
}

/// What a finished stage hands to the next one.
#[derive(Clone, Debug)]
pub struct StageOutput {
    pub transform: Arc<TransformChain>,
    pub images: ImageContainers,
    pub transform_file: Option<PathBuf>,
    pub result_image: Option<PathBuf>,
    /// Metric value of the last iteration.
    pub final_value: f64,
    /// Iterations over all levels.
    pub iterations: usize,
}

/// Components of a running stage.
struct Components {
    registration: Slot<dyn RegistrationMethod>,
    fixed_pyramid: Slot<dyn ImagePyramid>,
    moving_pyramid: Slot<dyn ImagePyramid>,
    /// The sampler itself lives inside the metric.
    sampler: Option<ComponentBinding>,
    interpolator: Slot<dyn Interpolator>,
    metric: Slot<dyn Metric>,
    coordinator: SamplingCoordinator,
    transform: Slot<dyn TransformComponent>,
    optimizer: Slot<dyn Optimizer>,
}

fn selection(config: &Configuration, key: &str) -> MultiRegResult<String> {
    let default = default_component(key).unwrap_or_default().to_string();
    config.read_or(key, "", 0, 0, default)
}

fn binding(kind: ComponentKind, name: String, label: &str) -> ComponentBinding {
    ComponentBinding::new(kind, name, format!("{label}0"))
}

impl Components {
    fn create(
        config: &Configuration,
        registry: &ComponentRegistry,
        sink: &LogSink,
    ) -> MultiRegResult<Self> {
        let name = selection(config, "Registration")?;
        let registration = Slot::new(
            binding(ComponentKind::Registration, name.clone(), "Registration"),
            registry.create_registration(&name)?,
        );

        let pyramid = |role: PyramidRole| -> MultiRegResult<Slot<dyn ImagePyramid>> {
            let key = role.component_key();
            let name = selection(config, key)?;
            let mut component = registry.create_pyramid(&name)?;
            component.set_role(role);
            Ok(Slot::new(binding(ComponentKind::Pyramid, name, key), component))
        };
        let fixed_pyramid = pyramid(PyramidRole::Fixed)?;
        let moving_pyramid = pyramid(PyramidRole::Moving)?;

        let name = selection(config, "Interpolator")?;
        let interpolator = Slot::new(
            binding(ComponentKind::Interpolator, name.clone(), "Interpolator"),
            registry.create_interpolator(&name)?,
        );

        let name = selection(config, "Metric")?;
        let mut metric = Slot::new(
            binding(ComponentKind::Metric, name.clone(), "Metric"),
            registry.create_metric(&name)?,
        );
        let coordinator = SamplingCoordinator::new(metric.label());

        let name = selection(config, "ImageSampler")?;
        let sampler_component = registry.create_sampler(&name)?;
        let sampler = match metric.component.sampler_aware() {
            Some(aware) => {
                aware.set_image_sampler(Some(sampler_component));
                Some(binding(ComponentKind::Sampler, name, "ImageSampler"))
            }
            None => {
                sink.warn(format!(
                    "{} does not use an image sampler; ImageSampler \"{name}\" is ignored",
                    metric.binding.name
                ));
                None
            }
        };

        let name = selection(config, "Transform")?;
        let transform = Slot::new(
            binding(ComponentKind::Transform, name.clone(), "Transform"),
            registry.create_transform(&name)?,
        );

        let name = selection(config, "Optimizer")?;
        let optimizer = Slot::new(
            binding(ComponentKind::Optimizer, name.clone(), "Optimizer"),
            registry.create_optimizer(&name)?,
        );

        Ok(Self {
            registration,
            fixed_pyramid,
            moving_pyramid,
            sampler,
            interpolator,
            metric,
            coordinator,
            transform,
            optimizer,
        })
    }

    fn bindings(&self) -> Vec<&ComponentBinding> {
        let mut all = vec![
            &self.registration.binding,
            &self.fixed_pyramid.binding,
            &self.moving_pyramid.binding,
        ];
        all.extend(self.sampler.as_ref());
        all.extend([
            &self.interpolator.binding,
            &self.metric.binding,
            &self.transform.binding,
            &self.optimizer.binding,
        ]);
        all
    }

    fn run_hook(&mut self, hook: Hook, ctx: &HookContext<'_>) -> MultiRegResult<()> {
        trace_event!("hook", name = hook.as_str(), level = ctx.level);
        self.registration.run_hook(hook, ctx)?;
        self.fixed_pyramid.run_hook(hook, ctx)?;
        self.moving_pyramid.run_hook(hook, ctx)?;
        if let Some(binding) = &self.sampler {
            if let Some(sampler) = self
                .metric
                .component
                .sampler_aware()
                .and_then(|a| a.image_sampler_mut())
            {
                hook.invoke(sampler, &ctx.for_label(&binding.label))?;
            }
        }
        self.interpolator.run_hook(hook, ctx)?;
        self.metric.run_hook(hook, ctx)?;
        if hook == Hook::BeforeEachResolution {
            self.coordinator
                .before_each_resolution(ctx, &mut *self.metric.component)?;
        }
        self.transform.run_hook(hook, ctx)?;
        self.optimizer.run_hook(hook, ctx)
    }
}

/// The optimizer's view of a stage: parameters go into the transform and the
/// metric is evaluated through the combined transform.
struct StageCost<'s> {
    metric: &'s mut dyn Metric,
    transform: &'s mut dyn TransformComponent,
    initial: Option<&'s TransformChain>,
    mode: CombinationMode,
    moving: &'s Image,
    moving_mask: Option<&'s Mask>,
    interpolator: &'s dyn Interpolator,
}

impl StageCost<'_> {
    fn evaluate(&mut self, parameters: &[f64], derivative: Option<&mut [f64]>) -> MultiRegResult<f64> {
        self.transform.set_parameters(parameters)?;
        let combined = CombinedTransform::new(self.initial, self.mode, &*self.transform);
        let input = MetricInput {
            moving: self.moving,
            moving_mask: self.moving_mask,
            transform: &combined,
            interpolator: self.interpolator,
        };
        match derivative {
            Some(d) => self.metric.value_and_derivative(&input, d),
            None => self.metric.value(&input),
        }
    }
}

impl CostFunction for StageCost<'_> {
    fn number_of_parameters(&self) -> usize {
        self.transform.number_of_parameters()
    }

    fn value(&mut self, parameters: &[f64]) -> MultiRegResult<f64> {
        self.evaluate(parameters, None)
    }

    fn value_and_derivative(
        &mut self,
        parameters: &[f64],
        derivative: &mut [f64],
    ) -> MultiRegResult<f64> {
        self.evaluate(parameters, Some(derivative))
    }
}

/// Runs one configured stage.
pub struct StageRunner<'a> {
    config: Configuration,
    registry: &'a ComponentRegistry,
    sink: &'a LogSink,
    stage: usize,
    initial: Option<Arc<TransformChain>>,
    images: ImageContainers,
    writer: Option<&'a dyn ImageWriter>,
    output_directory: Option<PathBuf>,
    state: StageState,
}

impl<'a> StageRunner<'a> {
    pub fn new(
        config: Configuration,
        registry: &'a ComponentRegistry,
        sink: &'a LogSink,
        stage: usize,
    ) -> Self {
        let output_directory = config.arguments().output_directory();
        Self {
            config,
            registry,
            sink,
            stage,
            initial: None,
            images: ImageContainers::default(),
            writer: None,
            output_directory,
            state: StageState::Initialized,
        }
    }

    pub fn set_initial_transform(&mut self, initial: Option<Arc<TransformChain>>) {
        self.initial = initial;
    }

    pub fn set_images(&mut self, images: ImageContainers) {
        self.images = images;
    }

    pub fn set_writer(&mut self, writer: Option<&'a dyn ImageWriter>) {
        self.writer = writer;
    }

    /// Overrides the output directory taken from `-out`.
    pub fn set_output_directory(&mut self, dir: Option<PathBuf>) {
        self.output_directory = dir;
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn stage(&self) -> usize {
        self.stage
    }

    /// Runs the stage to completion. On failure the state is
    /// [`StageState::Aborted`] and no further hooks run.
    pub fn run(&mut self) -> MultiRegResult<StageOutput> {
        let _span = trace_span!("stage", stage = self.stage).entered();
        match self.execute() {
            Ok(output) => {
                self.state = StageState::Finished;
                Ok(output)
            }
            Err(err) => {
                self.state = StageState::Aborted;
                self.sink
                    .error(format!("stage {} aborted: {err}", self.stage));
                Err(err)
            }
        }
    }

    fn execute(&mut self) -> MultiRegResult<StageOutput> {
        let config = &self.config;
        let sink = self.sink;
        let mut c = Components::create(config, self.registry, sink)?;
        for b in c.bindings() {
            sink.info(format!("{:<14} {} ({})", b.kind.as_str(), b.name, b.label));
        }

        let fixed = self
            .images
            .fixed_images
            .first()
            .cloned()
            .ok_or(MultiRegError::MissingInput("fixed image"))?;
        let moving = self
            .images
            .moving_images
            .first()
            .cloned()
            .ok_or(MultiRegError::MissingInput("moving image"))?;
        if fixed.dimension() != moving.dimension() {
            return Err(MultiRegError::DimensionMismatch {
                expected: fixed.dimension(),
                got: moving.dimension(),
            });
        }
        let fixed_mask = self.images.fixed_masks.first().cloned();
        let moving_mask = self.images.moving_masks.first().cloned();

        let mode: CombinationMode =
            config.read_or("HowToCombineTransforms", c.transform.label(), 0, 0, CombinationMode::default())?;
        c.fixed_pyramid.component.set_input(Arc::clone(&fixed));
        c.moving_pyramid.component.set_input(Arc::clone(&moving));
        c.transform.component.set_setup(TransformSetup {
            fixed: fixed.geometry().clone(),
            moving: moving.geometry().clone(),
            initial: self.initial.clone(),
            mode,
        });

        let ctx = HookContext::new(config, sink, self.stage);
        self.state = StageState::BeforeRegistration;
        c.run_hook(Hook::BeforeRegistration, &ctx)?;

        let levels = c.registration.component.number_of_resolutions();
        for pyramid in [&c.fixed_pyramid, &c.moving_pyramid] {
            if let Some(schedule) = pyramid.component.schedule() {
                schedule.validate(levels, fixed.dimension())?;
            }
        }

        {
            let mut table = sink.iteration();
            for column in ITERATION_COLUMNS {
                table.add_column(column);
            }
        }

        let mut final_value = 0.0;
        let mut iterations = 0;
        for level in 0..levels {
            let started = Instant::now();
            let ctx = ctx.at_level(level);
            let _level_span = trace_span!("resolution", level = level).entered();

            self.state = StageState::BeforeEachResolution(level);
            let fixed_level = c.fixed_pyramid.component.output(level)?;
            let moving_level = c.moving_pyramid.component.output(level)?;
            if let Some(sampler) = c
                .metric
                .component
                .sampler_aware()
                .and_then(|a| a.image_sampler_mut())
            {
                sampler.set_input(SamplerInput::new(fixed_level).with_mask(fixed_mask.clone()));
            }
            c.run_hook(Hook::BeforeEachResolution, &ctx)?;
            let new_samples: bool = config.read_for_level(
                "NewSamplesEveryIteration",
                c.optimizer.label(),
                level,
                false,
            )?;

            self.state = StageState::Iterating(level);
            let start = c.transform.component.parameters().to_vec();
            let scales = c.transform.component.scales();
            c.optimizer.component.start(&start, &scales)?;
            sink.write_iteration_header();

            let stop = loop {
                let outcome = {
                    let mut cost = StageCost {
                        metric: &mut *c.metric.component,
                        transform: &mut *c.transform.component,
                        initial: self.initial.as_deref(),
                        mode,
                        moving: &moving_level,
                        moving_mask: moving_mask.as_deref(),
                        interpolator: &*c.interpolator.component,
                    };
                    c.optimizer.component.step(&mut cost)?
                };
                let position = c.optimizer.component.current_position().to_vec();
                c.transform.component.set_parameters(&position)?;

                let report = c.optimizer.component.report();
                final_value = report.value;
                iterations += 1;
                {
                    let mut table = sink.iteration();
                    table.set(ITERATION_COLUMNS[0], report.iteration);
                    table.set(ITERATION_COLUMNS[1], format!("{:.6}", report.value));
                    table.set(ITERATION_COLUMNS[2], format!("{:.6}", report.step_size));
                    table.set(ITERATION_COLUMNS[3], format!("{:.6}", report.gradient_magnitude));
                }

                c.run_hook(Hook::AfterEachIteration, &ctx)?;
                {
                    let combined = CombinedTransform::new(
                        self.initial.as_deref(),
                        mode,
                        &*c.transform.component,
                    );
                    let input = MetricInput {
                        moving: &moving_level,
                        moving_mask: moving_mask.as_deref(),
                        transform: &combined,
                        interpolator: &*c.interpolator.component,
                    };
                    c.coordinator
                        .after_each_iteration(sink, &mut *c.metric.component, &input)?;
                }
                if new_samples {
                    c.coordinator
                        .select_new_samples(&mut *c.metric.component, sink);
                }
                sink.write_iteration_row();

                if let StepOutcome::Stop(condition) = outcome {
                    break condition;
                }
            };

            self.state = StageState::AfterEachResolution(level);
            sink.info(format!("Stopping condition: {stop}."));
            c.run_hook(Hook::AfterEachResolution, &ctx)?;
            sink.info(format!(
                "Time spent in resolution {level}: {}",
                format_dhms(started.elapsed())
            ));
        }

        self.state = StageState::AfterRegistration;
        c.run_hook(Hook::AfterRegistration, &ctx.at_level(levels.saturating_sub(1)))?;

        let transform = &*c.transform.component;
        let mut chain = TransformChain::new(
            transform.name(),
            transform.snapshot(),
            transform.parameters().to_vec(),
            self.initial.clone(),
            mode,
        );

        let mut transform_file = None;
        if let Some(dir) = &self.output_directory {
            if config.read_or("WriteTransformParametersEachStage", "", 0, 0, true)? {
                let path = dir.join(format!("TransformParameters.{}.txt", self.stage));
                let map = to_parameter_map(transform, self.initial.as_deref(), mode, fixed.geometry());
                write_parameter_map(&map, &path)?;
                sink.info(format!("Transform parameters written to \"{}\"", path.display()));
                chain = chain.with_source(&path);
                transform_file = Some(path);
            }
        }
        let chain = Arc::new(chain);

        let result_image = match (self.writer, &self.output_directory) {
            (Some(writer), Some(dir))
                if config.read_or("WriteResultImage", "", 0, 0, true)? =>
            {
                Some(self.write_result(
                    writer,
                    dir,
                    &moving,
                    &fixed,
                    &chain,
                    &*c.interpolator.component,
                )?)
            }
            _ => None,
        };

        Ok(StageOutput {
            transform: chain,
            images: self.images.clone(),
            transform_file,
            result_image,
            final_value,
            iterations,
        })
    }

    fn write_result(
        &self,
        writer: &dyn ImageWriter,
        dir: &Path,
        moving: &Image,
        fixed: &Image,
        chain: &TransformChain,
        interpolator: &dyn Interpolator,
    ) -> MultiRegResult<PathBuf> {
        let default_value: f32 = self.config.read_or("DefaultPixelValue", "", 0, 0, 0.0)?;
        let image = resample::resample(moving, fixed.geometry(), chain, interpolator, default_value);
        let path = dir.join(format!("result.{}.{}", self.stage, writer.extension()));
        writer.write_image(&image, &path)?;
        self.sink
            .info(format!("Result image written to \"{}\"", path.display()));
        Ok(path)
    }
}
