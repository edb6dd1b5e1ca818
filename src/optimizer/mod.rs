//! Optimizers.
//!
//! An optimizer is restarted at every resolution level with the current
//! transform parameters and advanced one iteration per [`Optimizer::step`],
//! so the stage can report and run its per-iteration hooks in between.

pub mod gradient_descent;
pub mod regular_step;

pub use gradient_descent::GradientDescent;
pub use regular_step::RegularStepGradientDescent;

use crate::component::Component;
use crate::util::MultiRegResult;
use std::fmt;

/// The function an optimizer minimizes.
pub trait CostFunction {
    fn number_of_parameters(&self) -> usize;

    fn value(&mut self, parameters: &[f64]) -> MultiRegResult<f64>;

    fn value_and_derivative(
        &mut self,
        parameters: &[f64],
        derivative: &mut [f64],
    ) -> MultiRegResult<f64>;
}

/// Why an optimizer stopped at a level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopCondition {
    MaximumNumberOfIterations,
    GradientMagnitudeTolerance,
    StepTooSmall,
}

impl fmt::Display for StopCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopCondition::MaximumNumberOfIterations => "maximum number of iterations reached",
            StopCondition::GradientMagnitudeTolerance => "gradient magnitude below tolerance",
            StopCondition::StepTooSmall => "step length below minimum",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Stop(StopCondition),
}

/// Numbers of the last iteration, as written to the iteration table.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct IterationReport {
    pub iteration: usize,
    pub value: f64,
    pub step_size: f64,
    pub gradient_magnitude: f64,
}

pub trait Optimizer: Component {
    /// Starts a level at `initial` with per-parameter `scales`.
    fn start(&mut self, initial: &[f64], scales: &[f64]) -> MultiRegResult<()>;

    /// Runs one iteration.
    fn step(&mut self, cost: &mut dyn CostFunction) -> MultiRegResult<StepOutcome>;

    fn current_position(&self) -> &[f64];

    fn report(&self) -> IterationReport;
}

/// Validates the scales handed to `start`.
fn checked_scales(initial: &[f64], scales: &[f64]) -> MultiRegResult<Vec<f64>> {
    use crate::util::MultiRegError;
    if scales.is_empty() {
        return Ok(vec![1.0; initial.len()]);
    }
    if scales.len() != initial.len() {
        return Err(MultiRegError::DimensionMismatch {
            expected: initial.len(),
            got: scales.len(),
        });
    }
    if scales.iter().any(|&s| !(s > 0.0)) {
        return Err(MultiRegError::InvalidInput("optimizer scales must be positive"));
    }
    Ok(scales.to_vec())
}
