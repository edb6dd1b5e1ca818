//! Negated normalized cross correlation.
//!
//! With `N` valid samples, fixed values `f` and moving values `m`:
//!
//! ```text
//! sff = sum f^2 - (sum f)^2 / N
//! smm = sum m^2 - (sum m)^2 / N
//! sfm = sum f m - sum f sum m / N
//! value = -sfm / sqrt(sff smm)
//! ```
//!
//! A flat fixed or moving sample set has no defined correlation and yields 0.

use crate::component::Component;
use crate::kernel::{accumulate, Accumulator};
use crate::metric::{Metric, MetricInput, SamplerAware, SamplerCore, Scratch};
use crate::util::{MultiRegError, MultiRegResult};

const MIN_DENOMINATOR: f64 = 1e-12;

#[derive(Debug, Default)]
pub struct AdvancedNormalizedCorrelation {
    core: SamplerCore,
}

struct Sums {
    scratch: Scratch,
    derivative: bool,
    total: usize,
    valid: usize,
    sf: f64,
    sm: f64,
    sff: f64,
    smm: f64,
    sfm: f64,
    // sum dm, sum f dm, sum m dm
    d: Vec<f64>,
    fd: Vec<f64>,
    md: Vec<f64>,
}

impl Accumulator for Sums {
    fn merge(&mut self, other: Self) {
        self.total += other.total;
        self.valid += other.valid;
        self.sf += other.sf;
        self.sm += other.sm;
        self.sff += other.sff;
        self.smm += other.smm;
        self.sfm += other.sfm;
        for (a, b) in self.d.iter_mut().zip(&other.d) {
            *a += b;
        }
        for (a, b) in self.fd.iter_mut().zip(&other.fd) {
            *a += b;
        }
        for (a, b) in self.md.iter_mut().zip(&other.md) {
            *a += b;
        }
    }
}

impl AdvancedNormalizedCorrelation {
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
        let width = if with_derivative { parameters } else { 0 };
        let samples = self.core.samples()?;
        let s = accumulate(
            samples,
            || Sums {
                scratch: Scratch::for_input(input),
                derivative: with_derivative,
                total: 0,
                valid: 0,
                sf: 0.0,
                sm: 0.0,
                sff: 0.0,
                smm: 0.0,
                sfm: 0.0,
                d: vec![0.0; width],
                fd: vec![0.0; width],
                md: vec![0.0; width],
            },
            |acc, sample| {
                acc.total += 1;
                let Some(m) = acc.scratch.moving_value(input, sample, acc.derivative) else {
                    return;
                };
                let f = sample.value;
                acc.valid += 1;
                acc.sf += f;
                acc.sm += m;
                acc.sff += f * f;
                acc.smm += m * m;
                acc.sfm += f * m;
                if acc.derivative {
                    for (p, &dm) in acc.scratch.dmoving.iter().enumerate() {
                        acc.d[p] += dm;
                        acc.fd[p] += f * dm;
                        acc.md[p] += m * dm;
                    }
                }
            },
        );
        self.core.check(s.valid, s.total)?;

        let zero = |derivative: Option<&mut [f64]>| {
            if let Some(d) = derivative {
                d.iter_mut().for_each(|v| *v = 0.0);
            }
            Ok(0.0)
        };
        if s.valid == 0 {
            return zero(derivative);
        }
        let n = s.valid as f64;
        let sff = s.sff - s.sf * s.sf / n;
        let smm = s.smm - s.sm * s.sm / n;
        let sfm = s.sfm - s.sf * s.sm / n;
        let denom = (sff * smm).sqrt();
        if !(denom > MIN_DENOMINATOR) {
            return zero(derivative);
        }

        if let Some(d) = derivative {
            let fmean = s.sf / n;
            let mmean = s.sm / n;
            for p in 0..parameters {
                let dsfm = s.fd[p] - fmean * s.d[p];
                let dsmm = 2.0 * (s.md[p] - mmean * s.d[p]);
                d[p] = -dsfm / denom + sfm * dsmm / (2.0 * smm * denom);
            }
        }
        Ok(-sfm / denom)
    }
}

impl Component for AdvancedNormalizedCorrelation {
    fn name(&self) -> &'static str {
        "AdvancedNormalizedCorrelation"
    }
}

impl Metric for AdvancedNormalizedCorrelation {
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

#[cfg(test)]
mod tests {
    use super::AdvancedNormalizedCorrelation;
    use crate::image::Image;
    use crate::metric::tests::{blob, full_sampler, input};
    use crate::metric::{Metric, SamplerAware};
    use crate::transform::TranslationTransform;
    use std::sync::Arc;

    #[test]
    fn perfect_linear_relation_gives_minus_one() {
        let fixed = blob(21, 10.0, 10.0);
        let scaled: Vec<f32> = fixed.data().iter().map(|&v| 3.0 * v + 7.0).collect();
        let moving = Image::from_geometry(fixed.geometry().clone(), scaled).unwrap();
        let mut metric = AdvancedNormalizedCorrelation::default();
        metric
            .sampler_aware()
            .unwrap()
            .set_image_sampler(Some(full_sampler(Arc::clone(&fixed))));
        let t = TranslationTransform::with_offset(vec![0.0, 0.0]);
        let v = metric.value(&input(&moving, &t)).unwrap();
        assert!((v + 1.0).abs() < 1e-9, "{v}");
    }

    #[test]
    fn derivative_matches_finite_differences() {
        let fixed = blob(21, 10.0, 10.0);
        let moving = blob(21, 11.3, 9.6);
        let mut metric = AdvancedNormalizedCorrelation::default();
        metric
            .sampler_aware()
            .unwrap()
            .set_image_sampler(Some(full_sampler(fixed)));

        let at = [0.4, -0.3];
        let t = TranslationTransform::with_offset(at.to_vec());
        let mut d = [0.0; 2];
        metric.value_and_derivative(&input(&moving, &t), &mut d).unwrap();

        let h = 1e-4;
        for axis in 0..2 {
            let mut plus = at;
            let mut minus = at;
            plus[axis] += h;
            minus[axis] -= h;
            let vp = metric
                .value(&input(&moving, &TranslationTransform::with_offset(plus.to_vec())))
                .unwrap();
            let vm = metric
                .value(&input(&moving, &TranslationTransform::with_offset(minus.to_vec())))
                .unwrap();
            let numeric = (vp - vm) / (2.0 * h);
            assert!((numeric - d[axis]).abs() < 1e-3, "axis {axis}: {numeric} vs {}", d[axis]);
        }
    }

    #[test]
    fn flat_images_yield_zero() {
        let fixed = blob(9, 4.0, 4.0);
        let flat = Image::from_geometry(fixed.geometry().clone(), vec![5.0; 81]).unwrap();
        let mut metric = AdvancedNormalizedCorrelation::default();
        metric
            .sampler_aware()
            .unwrap()
            .set_image_sampler(Some(full_sampler(fixed)));
        let t = TranslationTransform::with_offset(vec![0.0, 0.0]);
        let mut d = [1.0; 2];
        assert_eq!(metric.value_and_derivative(&input(&flat, &t), &mut d).unwrap(), 0.0);
        assert_eq!(d, [0.0, 0.0]);
    }
}
