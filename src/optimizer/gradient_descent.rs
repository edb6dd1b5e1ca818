//! Gradient descent with a decaying gain `a / (A + k + 1)^alpha`.

use crate::component::{Component, HookContext};
use crate::optimizer::{
    checked_scales, CostFunction, IterationReport, Optimizer, StepOutcome, StopCondition,
};
use crate::util::math::norm;
use crate::util::MultiRegResult;

#[derive(Clone, Debug)]
pub struct GradientDescent {
    max_iterations: usize,
    a: f64,
    big_a: f64,
    alpha: f64,
    position: Vec<f64>,
    scales: Vec<f64>,
    gradient: Vec<f64>,
    iteration: usize,
    report: IterationReport,
}

impl Default for GradientDescent {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            a: 400.0,
            big_a: 50.0,
            alpha: 0.602,
            position: Vec::new(),
            scales: Vec::new(),
            gradient: Vec::new(),
            iteration: 0,
            report: IterationReport::default(),
        }
    }
}

impl GradientDescent {
    pub fn with_gain(max_iterations: usize, a: f64, big_a: f64, alpha: f64) -> Self {
        Self {
            max_iterations,
            a,
            big_a,
            alpha,
            ..Self::default()
        }
    }

    fn gain(&self, k: usize) -> f64 {
        self.a / (self.big_a + k as f64 + 1.0).powf(self.alpha)
    }
}

impl Component for GradientDescent {
    fn name(&self) -> &'static str {
        "GradientDescent"
    }

    fn before_each_resolution(&mut self, ctx: &HookContext<'_>) -> MultiRegResult<()> {
        let defaults = Self::default();
        self.max_iterations = ctx.read_for_level("MaximumNumberOfIterations", defaults.max_iterations)?;
        self.a = ctx.read_for_level("SP_a", defaults.a)?;
        self.big_a = ctx.read_for_level("SP_A", defaults.big_a)?;
        self.alpha = ctx.read_for_level("SP_alpha", defaults.alpha)?;
        Ok(())
    }
}

impl Optimizer for GradientDescent {
    fn start(&mut self, initial: &[f64], scales: &[f64]) -> MultiRegResult<()> {
        self.scales = checked_scales(initial, scales)?;
        self.position = initial.to_vec();
        self.gradient = vec![0.0; initial.len()];
        self.iteration = 0;
        self.report = IterationReport::default();
        Ok(())
    }

    fn step(&mut self, cost: &mut dyn CostFunction) -> MultiRegResult<StepOutcome> {
        if self.iteration >= self.max_iterations {
            return Ok(StepOutcome::Stop(StopCondition::MaximumNumberOfIterations));
        }
        let value = cost.value_and_derivative(&self.position, &mut self.gradient)?;
        let gain = self.gain(self.iteration);
        for ((p, g), s) in self.position.iter_mut().zip(&self.gradient).zip(&self.scales) {
            *p -= gain * g / s;
        }
        self.report = IterationReport {
            iteration: self.iteration,
            value,
            step_size: gain,
            gradient_magnitude: norm(&self.gradient),
        };
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
