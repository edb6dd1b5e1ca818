//! Regular step gradient descent.
//!
//! Steps of fixed length along the scaled gradient direction; the length is
//! multiplied by `RelaxationFactor` whenever the direction reverses, and the
//! level ends when it drops below `MinimumStepLength`.

use crate::component::{Component, HookContext};
use crate::optimizer::{
    checked_scales, CostFunction, IterationReport, Optimizer, StepOutcome, StopCondition,
};
use crate::util::math::{dot, norm};
use crate::util::{MultiRegError, MultiRegResult};

#[derive(Clone, Debug)]
pub struct RegularStepGradientDescent {
    max_iterations: usize,
    max_step: f64,
    min_step: f64,
    relaxation: f64,
    min_gradient: f64,
    position: Vec<f64>,
    scales: Vec<f64>,
    gradient: Vec<f64>,
    previous: Vec<f64>,
    step_length: f64,
    iteration: usize,
    report: IterationReport,
}

impl Default for RegularStepGradientDescent {
    fn default() -> Self {
        Self {
            max_iterations: 250,
            max_step: 1.0,
            min_step: 0.001,
            relaxation: 0.5,
            min_gradient: 1e-8,
            position: Vec::new(),
            scales: Vec::new(),
            gradient: Vec::new(),
            previous: Vec::new(),
            step_length: 1.0,
            iteration: 0,
            report: IterationReport::default(),
        }
    }
}

impl RegularStepGradientDescent {
    pub fn new(max_iterations: usize, max_step: f64, min_step: f64) -> Self {
        Self {
            max_iterations,
            max_step,
            min_step,
            step_length: max_step,
            ..Self::default()
        }
    }

    pub fn step_length(&self) -> f64 {
        self.step_length
    }
}

impl Component for RegularStepGradientDescent {
    fn name(&self) -> &'static str {
        "RegularStepGradientDescent"
    }

    fn before_each_resolution(&mut self, ctx: &HookContext<'_>) -> MultiRegResult<()> {
        let defaults = Self::default();
        self.max_iterations = ctx.read_for_level("MaximumNumberOfIterations", defaults.max_iterations)?;
        self.max_step = ctx.read_for_level("MaximumStepLength", defaults.max_step)?;
        self.min_step = ctx.read_for_level("MinimumStepLength", defaults.min_step)?;
        self.relaxation = ctx.read_for_level("RelaxationFactor", defaults.relaxation)?;
        self.min_gradient =
            ctx.read_for_level("MinimumGradientMagnitude", defaults.min_gradient)?;
        if !(self.relaxation > 0.0 && self.relaxation < 1.0) {
            return Err(MultiRegError::InvalidParameter {
                key: "RelaxationFactor".into(),
                value: self.relaxation.to_string(),
                expected: "a factor between 0 and 1",
            });
        }
        Ok(())
    }
}

impl Optimizer for RegularStepGradientDescent {
    fn start(&mut self, initial: &[f64], scales: &[f64]) -> MultiRegResult<()> {
        self.scales = checked_scales(initial, scales)?;
        self.position = initial.to_vec();
        self.gradient = vec![0.0; initial.len()];
        self.previous = vec![0.0; initial.len()];
        self.step_length = self.max_step;
        self.iteration = 0;
        self.report = IterationReport::default();
        Ok(())
    }

    fn step(&mut self, cost: &mut dyn CostFunction) -> MultiRegResult<StepOutcome> {
        if self.iteration >= self.max_iterations {
            return Ok(StepOutcome::Stop(StopCondition::MaximumNumberOfIterations));
        }
        let value = cost.value_and_derivative(&self.position, &mut self.gradient)?;
        for (g, s) in self.gradient.iter_mut().zip(&self.scales) {
            *g /= s;
        }
        let magnitude = norm(&self.gradient);
        self.report = IterationReport {
            iteration: self.iteration,
            value,
            step_size: self.step_length,
            gradient_magnitude: magnitude,
        };
        if magnitude < self.min_gradient {
            return Ok(StepOutcome::Stop(StopCondition::GradientMagnitudeTolerance));
        }
        if self.iteration > 0 && dot(&self.gradient, &self.previous) < 0.0 {
            self.step_length *= self.relaxation;
        }
        if self.step_length < self.min_step {
            return Ok(StepOutcome::Stop(StopCondition::StepTooSmall));
        }

        let factor = self.step_length / magnitude;
        for ((p, g), s) in self.position.iter_mut().zip(&self.gradient).zip(&self.scales) {
            *p -= factor * g / s;
        }
        self.report.step_size = self.step_length;
        self.previous.copy_from_slice(&self.gradient);
        self.iteration += 1;
        if self.iteration >= self.max_iterations {
            return Ok(StepOutcome::Stop(StopCondition::MaximumNumberOfIterations));
        }
        Ok(StepOutcome::Continue)
    }

    fn current_position(&self) -> &[f64] {
        &self.position
    }

    fn report(&self) -> IterationReport {
        self.report
    }
}
