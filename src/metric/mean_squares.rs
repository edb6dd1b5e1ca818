//! Mean squared intensity difference.

use crate::component::Component;
use crate::kernel::{accumulate, Accumulator};
use crate::metric::{Metric, MetricInput, SamplerAware, SamplerCore, Scratch};
use crate::util::{MultiRegError, MultiRegResult};

/// `(1/N) sum (M(T(x)) - F(x))^2` over the valid samples.
#[derive(Debug, Default)]
pub struct AdvancedMeanSquares {
    core: SamplerCore,
}

struct Sums {
    scratch: Scratch,
    derivative: bool,
    total: usize,
    valid: usize,
    sum: f64,
    gradient: Vec<f64>,
}

impl Accumulator for Sums {
    fn merge(&mut self, other: Self) {
        self.total += other.total;
        self.valid += other.valid;
        self.sum += other.sum;
        for (a, b) in self.gradient.iter_mut().zip(&other.gradient) {
            *a += b;
        }
    }
}

impl AdvancedMeanSquares {
    fn evaluate(&mut self, input: &MetricInput<'_>, derivative: Option<&mut [f64]>) -> MultiRegResult<f64> {
        let parameters = input.transform.number_of_parameters();
        if let Some(d) = &derivative {
            if d.len() != parameters {
                return Err(MultiRegError::DimensionMismatch {
                    expected: parameters,
                    got: d.len(),
                });
            }
        }
        let with_derivative = derivative.is_some();
        let samples = self.core.samples()?;
        let sums = accumulate(
            samples,
            || Sums {
                scratch: Scratch::for_input(input),
                derivative: with_derivative,
                total: 0,
                valid: 0,
                sum: 0.0,
                gradient: vec![0.0; if with_derivative { parameters } else { 0 }],
            },
            |acc, sample| {
                acc.total += 1;
                let Some(moving) = acc.scratch.moving_value(input, sample, acc.derivative) else {
                    return;
                };
                acc.valid += 1;
                let diff = moving - sample.value;
                acc.sum += diff * diff;
                if acc.derivative {
                    for (g, &dm) in acc.gradient.iter_mut().zip(&acc.scratch.dmoving) {
                        *g += 2.0 * diff * dm;
                    }
                }
            },
        );
        self.core.check(sums.valid, sums.total)?;

        let norm = if sums.valid > 0 { 1.0 / sums.valid as f64 } else { 0.0 };
        if let Some(d) = derivative {
            for (out, &g) in d.iter_mut().zip(&sums.gradient) {
                *out = g * norm;
            }
        }
        Ok(sums.sum * norm)
    }
}

impl Component for AdvancedMeanSquares {
    fn name(&self) -> &'static str {
        "AdvancedMeanSquares"
    }
}

impl Metric for AdvancedMeanSquares {
    fn value(&mut self, input: &MetricInput<'_>) -> MultiRegResult<f64> {
        self.evaluate(input, None)
    }

    fn value_and_derivative(
        &mut self,
        input: &MetricInput<'_>,
        derivative: &mut [f64],
    ) -> MultiRegResult<f64> {
        self.evaluate(input, Some(derivative))
    }

    fn sampler_aware(&mut self) -> Option<&mut dyn SamplerAware> {
        Some(&mut self.core)
    }
}
