use multireg::component::{Component, ComponentRegistry, HookContext};
use multireg::interpolator::{Interpolator, LinearInterpolator};
use multireg::optimizer::{CostFunction, IterationReport, Optimizer, StepOutcome, StopCondition};
use multireg::registration::RegistrationMethod;
use multireg::{
    Configuration, Geometry, Image, ImageContainers, LogSink, MultiRegError, MultiRegResult,
    ParameterMap, StageRunner, StageState,
};
use std::sync::{Arc, Mutex};

/// Shared record of `label:hook:level` events.
#[derive(Clone, Default)]
struct Log {
    events: Arc<Mutex<Vec<String>>>,
    fail_at: Option<&'static str>,
}

impl Log {
    fn failing_at(mut self, event: &'static str) -> Self {
        self.fail_at = Some(event);
        self
    }

    fn record(&self, ctx: &HookContext<'_>, hook: &str) -> MultiRegResult<()> {
        let event = format!("{}:{hook}:{}", ctx.label, ctx.level);
        let fail = self.fail_at == Some(event.as_str());
        self.events.lock().unwrap().push(event);
        if fail {
            return Err(MultiRegError::InvalidInput("injected hook failure"));
        }
        Ok(())
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

macro_rules! recording_component {
    ($ty:ty, $name:literal) => {
        impl Component for $ty {
            fn name(&self) -> &'static str {
                $name
            }
            fn before_registration(&mut self, ctx: &HookContext<'_>) -> MultiRegResult<()> {
                self.log.record(ctx, "BeforeRegistration")
            }
            fn before_each_resolution(&mut self, ctx: &HookContext<'_>) -> MultiRegResult<()> {
                self.log.record(ctx, "BeforeEachResolution")
            }
            fn after_each_iteration(&mut self, ctx: &HookContext<'_>) -> MultiRegResult<()> {
                self.log.record(ctx, "AfterEachIteration")
            }
            fn after_each_resolution(&mut self, ctx: &HookContext<'_>) -> MultiRegResult<()> {
                self.log.record(ctx, "AfterEachResolution")
            }
            fn after_registration(&mut self, ctx: &HookContext<'_>) -> MultiRegResult<()> {
                self.log.record(ctx, "AfterRegistration")
            }
        }
    };
}

struct TwoLevels {
    log: Log,
}
recording_component!(TwoLevels, "TwoLevels");

impl RegistrationMethod for TwoLevels {
    fn number_of_resolutions(&self) -> usize {
        2
    }
}

struct RecordingInterpolator {
    log: Log,
}
recording_component!(RecordingInterpolator, "RecordingInterpolator");

impl Interpolator for RecordingInterpolator {
    fn evaluate(&self, image: &Image, point: &[f64]) -> Option<f64> {
        LinearInterpolator.evaluate(image, point)
    }

    fn evaluate_with_gradient(
        &self,
        image: &Image,
        point: &[f64],
        gradient: &mut [f64],
    ) -> Option<f64> {
        LinearInterpolator.evaluate_with_gradient(image, point, gradient)
    }
}

/// Evaluates the cost a fixed number of times without moving.
struct FixedSteps {
    log: Log,
    position: Vec<f64>,
    steps: usize,
    value: f64,
}
recording_component!(FixedSteps, "FixedSteps");

impl Optimizer for FixedSteps {
    fn start(&mut self, initial: &[f64], _scales: &[f64]) -> MultiRegResult<()> {
        self.position = initial.to_vec();
        self.steps = 0;
        Ok(())
    }

    fn step(&mut self, cost: &mut dyn CostFunction) -> MultiRegResult<StepOutcome> {
        let position = self.position.clone();
        self.value = cost.value(&position)?;
        self.steps += 1;
        Ok(if self.steps >= 2 {
            StepOutcome::Stop(StopCondition::MaximumNumberOfIterations)
        } else {
            StepOutcome::Continue
        })
    }

    fn current_position(&self) -> &[f64] {
        &self.position
    }

    fn report(&self) -> IterationReport {
        IterationReport {
            iteration: self.steps.saturating_sub(1),
            value: self.value,
            ..IterationReport::default()
        }
    }
}

fn registry(log: &Log) -> ComponentRegistry {
    let mut registry = ComponentRegistry::with_builtins().unwrap();
    let l = log.clone();
    registry
        .register_registration("TwoLevels", move || Box::new(TwoLevels { log: l.clone() }))
        .unwrap();
    let l = log.clone();
    registry
        .register_interpolator("RecordingInterpolator", move || {
            Box::new(RecordingInterpolator { log: l.clone() })
        })
        .unwrap();
    let l = log.clone();
    registry
        .register_optimizer("FixedSteps", move || {
            Box::new(FixedSteps {
                log: l.clone(),
                position: Vec::new(),
                steps: 0,
                value: 0.0,
            })
        })
        .unwrap();
    registry
}

fn images() -> ImageContainers {
    let blob = |cx: f64| {
        let geometry = Geometry::new(vec![16, 16]).unwrap();
        Image::from_fn(geometry, move |idx| {
            let dx = idx[0] as f64 - cx;
            let dy = idx[1] as f64 - 8.0;
            (50.0 * (-(dx * dx + dy * dy) / 12.0).exp()) as f32
        })
    };
    ImageContainers::pair(blob(8.0), blob(9.0))
}

fn config() -> Configuration {
    Configuration::from_parameters(
        ParameterMap::parse(
            "(Registration \"TwoLevels\")\n\
             (Interpolator \"RecordingInterpolator\")\n\
             (Optimizer \"FixedSteps\")\n\
             (NumberOfResolutions 2)",
        )
        .unwrap(),
    )
}

fn expected_events() -> Vec<String> {
    let labels = ["Registration0", "Interpolator0", "Optimizer0"];
    let all = |hook: &str, level: usize| -> Vec<String> {
        labels.iter().map(|l| format!("{l}:{hook}:{level}")).collect()
    };
    let mut events = all("BeforeRegistration", 0);
    for level in 0..2 {
        events.extend(all("BeforeEachResolution", level));
        events.extend(all("AfterEachIteration", level));
        events.extend(all("AfterEachIteration", level));
        events.extend(all("AfterEachResolution", level));
    }
    events.extend(all("AfterRegistration", 1));
    events
}

#[test]
fn hooks_run_in_component_order_at_every_transition() {
    let log = Log::default();
    let registry = registry(&log);
    let sink = LogSink::in_memory();
    let mut runner = StageRunner::new(config(), &registry, &sink, 0);
    runner.set_images(images());

    assert_eq!(runner.state(), StageState::Initialized);
    let output = runner.run().unwrap();
    assert_eq!(runner.state(), StageState::Finished);
    assert_eq!(output.iterations, 4);
    assert_eq!(log.events(), expected_events());
}

#[test]
fn a_failing_hook_aborts_the_stage() {
    let log = Log::default().failing_at("Interpolator0:BeforeEachResolution:1");
    let registry = registry(&log);
    let sink = LogSink::in_memory();
    let mut runner = StageRunner::new(config(), &registry, &sink, 0);
    runner.set_images(images());

    let err = runner.run().unwrap_err();
    assert_eq!(err, MultiRegError::InvalidInput("injected hook failure"));
    assert_eq!(runner.state(), StageState::Aborted);

    let events = log.events();
    assert_eq!(events.last().unwrap(), "Interpolator0:BeforeEachResolution:1");
    assert!(events.contains(&"Optimizer0:AfterEachResolution:0".to_string()));
    assert!(!events.contains(&"Optimizer0:BeforeEachResolution:1".to_string()));
    assert!(!events.iter().any(|e| e.contains("AfterRegistration")));
}

#[test]
fn fresh_components_for_every_stage() {
    let log = Log::default();
    let registry = registry(&log);
    let sink = LogSink::in_memory();
    for stage in 0..2 {
        let mut runner = StageRunner::new(config(), &registry, &sink, stage);
        runner.set_images(images());
        runner.run().unwrap();
    }
    let before_registration = log
        .events()
        .iter()
        .filter(|e| e.starts_with("Optimizer0:BeforeRegistration"))
        .count();
    assert_eq!(before_registration, 2);
}

#[test]
fn sampler_less_metric_warns_and_still_runs() {
    let sink = LogSink::in_memory();
    let mut registry = ComponentRegistry::with_builtins().unwrap();
    registry
        .register_metric("ConstantMetric", || Box::new(ConstantMetric))
        .unwrap();
    let config = Configuration::from_parameters(
        ParameterMap::parse(
            "(Metric \"ConstantMetric\")\n(NumberOfResolutions 1)\n(MaximumNumberOfIterations 3)\n\
             (Optimizer \"GradientDescent\")",
        )
        .unwrap(),
    );
    let mut runner = StageRunner::new(config, &registry, &sink, 0);
    runner.set_images(images());
    let output = runner.run().unwrap();
    assert_eq!(output.iterations, 3);
    assert_eq!(output.final_value, 1.0);
    assert!(sink
        .lines(multireg::sink::LogLevel::Warning)
        .iter()
        .any(|l| l.contains("ImageSampler")));
}

struct ConstantMetric;

impl Component for ConstantMetric {
    fn name(&self) -> &'static str {
        "ConstantMetric"
    }
}

impl multireg::metric::Metric for ConstantMetric {
    fn value(&mut self, _input: &multireg::metric::MetricInput<'_>) -> MultiRegResult<f64> {
        Ok(1.0)
    }

    fn value_and_derivative(
        &mut self,
        _input: &multireg::metric::MetricInput<'_>,
        derivative: &mut [f64],
    ) -> MultiRegResult<f64> {
        derivative.iter_mut().for_each(|d| *d = 0.0);
        Ok(1.0)
    }
}
