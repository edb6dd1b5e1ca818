//! Per-metric sampling protocol: valid-sample ratio, sample reselection and
//! exact values.
//!
//! The stage keeps one [`SamplingCoordinator`] next to each metric. Exact
//! values are computed by temporarily installing a full sampler with the
//! input of the metric's own sampler; the swap is reverted by a drop guard,
//! so the metric's sampler is back in place however the evaluation ends.

use crate::component::HookContext;
use crate::metric::{Metric, MetricInput, DEFAULT_REQUIRED_RATIO};
use crate::sampler::{FullSampler, ImageSampler};
use crate::sink::LogSink;
use crate::util::{MultiRegError, MultiRegResult};

pub struct SamplingCoordinator {
    label: String,
    column: String,
    show_exact_value: bool,
    full: Option<Box<dyn ImageSampler>>,
}

impl std::fmt::Debug for SamplingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplingCoordinator")
            .field("label", &self.label)
            .field("show_exact_value", &self.show_exact_value)
            .field("full_sampler_cached", &self.full.is_some())
            .finish()
    }
}

impl SamplingCoordinator {
    /// Coordinator for the metric with configuration label `label`.
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            column: format!("Exact{label}"),
            label,
            show_exact_value: false,
            full: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Iteration-table column of the exact value.
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn shows_exact_value(&self) -> bool {
        self.show_exact_value
    }

    /// Reads the level's sampling settings and installs them on the metric.
    ///
    /// `CheckNumberOfSamples` (default true) switches the ratio check;
    /// disabled, the required ratio is 0. `RequiredRatioOfValidSamples`
    /// (default 0.25) must lie in `[0, 1]`. `ShowExactMetricValue` (default
    /// false) adds the exact-value column.
    pub fn before_each_resolution(
        &mut self,
        ctx: &HookContext<'_>,
        metric: &mut dyn Metric,
    ) -> MultiRegResult<()> {
        let ctx = ctx.for_label(&self.label);
        ctx.sink.iteration().remove_column(&self.column);

        self.show_exact_value = ctx.read_for_level("ShowExactMetricValue", false)?;
        if self.show_exact_value {
            ctx.sink.iteration().add_column(&self.column);
        }

        let check: bool = ctx.read_for_level("CheckNumberOfSamples", true)?;
        let ratio: f64 = ctx.read_for_level("RequiredRatioOfValidSamples", DEFAULT_REQUIRED_RATIO)?;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(MultiRegError::InvalidParameter {
                key: "RequiredRatioOfValidSamples".into(),
                value: ratio.to_string(),
                expected: "a ratio between 0 and 1",
            });
        }
        if let Some(aware) = metric.sampler_aware() {
            aware.set_required_ratio_of_valid_samples(if check { ratio } else { 0.0 });
        }
        Ok(())
    }

    /// Asks the metric's sampler for a new selection; warns if it has none.
    pub fn select_new_samples(&self, metric: &mut dyn Metric, sink: &LogSink) {
        match metric.sampler_aware().and_then(|a| a.image_sampler_mut()) {
            Some(sampler) => sampler.select_new_samples(),
            None => sink.warn(format!(
                "{} ({}) does not use an image sampler; no new samples are selected",
                self.label,
                metric.name()
            )),
        }
    }

    /// Metric value over all valid voxels.
    ///
    /// A metric without a sampler reports 0. A metric that already samples
    /// every voxel is evaluated as is.
    pub fn exact_value(
        &mut self,
        metric: &mut dyn Metric,
        input: &MetricInput<'_>,
    ) -> MultiRegResult<f64> {
        let sampler_input = {
            let Some(sampler) = metric.sampler_aware().and_then(|a| a.image_sampler()) else {
                return Ok(0.0);
            };
            if sampler.is_full() {
                return metric.value(input);
            }
            sampler
                .input()
                .cloned()
                .ok_or(MultiRegError::MissingInput("sampler input"))?
        };

        let mut full = self
            .full
            .take()
            .unwrap_or_else(|| Box::new(FullSampler::default()));
        full.set_input(sampler_input);
        let swap = SamplerSwap::install(metric, full);
        let result = swap.metric.value(input);
        self.full = swap.restore();
        result
    }

    /// Computes and reports the exact value when enabled.
    pub fn after_each_iteration(
        &mut self,
        sink: &LogSink,
        metric: &mut dyn Metric,
        input: &MetricInput<'_>,
    ) -> MultiRegResult<()> {
        if !self.show_exact_value {
            return Ok(());
        }
        let value = self.exact_value(metric, input)?;
        sink.iteration().set(&self.column, value);
        Ok(())
    }
}

/// Restores a metric's original sampler when dropped.
struct SamplerSwap<'m> {
    metric: &'m mut dyn Metric,
    original: Option<Box<dyn ImageSampler>>,
    restored: bool,
}

impl<'m> SamplerSwap<'m> {
    fn install(metric: &'m mut dyn Metric, full: Box<dyn ImageSampler>) -> Self {
        let original = metric
            .sampler_aware()
            .and_then(|a| a.set_image_sampler(Some(full)));
        Self {
            metric,
            original,
            restored: false,
        }
    }

    /// Puts the original sampler back and returns the full sampler.
    fn restore(mut self) -> Option<Box<dyn ImageSampler>> {
        self.swap_back()
    }

    fn swap_back(&mut self) -> Option<Box<dyn ImageSampler>> {
        if self.restored {
            return None;
        }
        self.restored = true;
        let original = self.original.take();
        self.metric
            .sampler_aware()
            .and_then(|a| a.set_image_sampler(original))
    }
}

impl Drop for SamplerSwap<'_> {
    fn drop(&mut self) {
        self.swap_back();
    }
}

#[cfg(test)]
mod tests {
    use super::SamplingCoordinator;
    use crate::component::{Component, HookContext};
    use crate::config::{Configuration, ParameterMap};
    use crate::image::Image;
    use crate::metric::tests::{blob, input};
    use crate::metric::{Metric, MetricInput, SamplerAware, SamplerCore};
    use crate::sampler::{FullSampler, ImageSampler, RandomSampler, SamplerInput};
    use crate::sink::{LogLevel, LogSink};
    use crate::transform::TranslationTransform;
    use crate::util::{MultiRegError, MultiRegResult};
    use std::sync::Arc;

    /// Counts evaluations and can be told to fail on the full sampler.
    #[derive(Default)]
    struct Probe {
        core: SamplerCore,
        evaluations: usize,
        fail_on_full: bool,
    }

    impl Component for Probe {
        fn name(&self) -> &'static str {
            "Probe"
        }
    }

    impl Metric for Probe {
        fn value(&mut self, _input: &MetricInput<'_>) -> MultiRegResult<f64> {
            self.evaluations += 1;
            let count = self.core.samples()?.len() as f64;
            let full = self.core.image_sampler().is_some_and(|s| s.is_full());
            if full && self.fail_on_full {
                return Err(MultiRegError::InvalidInput("probe failure"));
            }
            Ok(count)
        }

        fn value_and_derivative(
            &mut self,
            input: &MetricInput<'_>,
            derivative: &mut [f64],
        ) -> MultiRegResult<f64> {
            derivative.iter_mut().for_each(|d| *d = 0.0);
            self.value(input)
        }

        fn sampler_aware(&mut self) -> Option<&mut dyn SamplerAware> {
            Some(&mut self.core)
        }
    }

    /// A metric without sampler support.
    struct Plain;

    impl Component for Plain {
        fn name(&self) -> &'static str {
            "Plain"
        }
    }

    impl Metric for Plain {
        fn value(&mut self, _input: &MetricInput<'_>) -> MultiRegResult<f64> {
            Ok(42.0)
        }

        fn value_and_derivative(
            &mut self,
            _input: &MetricInput<'_>,
            _derivative: &mut [f64],
        ) -> MultiRegResult<f64> {
            Ok(42.0)
        }
    }

    fn random_probe(image: Arc<Image>) -> Probe {
        let mut sampler = RandomSampler::new(10, 1);
        sampler.set_input(SamplerInput::new(image));
        let mut probe = Probe::default();
        probe.core.set_image_sampler(Some(Box::new(sampler)));
        probe
    }

    fn sampler_addr(probe: &Probe) -> *const () {
        let sampler = probe.core.image_sampler().unwrap();
        sampler as *const dyn ImageSampler as *const ()
    }

    #[test]
    fn exact_value_swaps_and_restores_the_sampler() {
        let image = blob(8, 4.0, 4.0);
        let t = TranslationTransform::with_offset(vec![0.0, 0.0]);
        let mut probe = random_probe(Arc::clone(&image));
        let before = sampler_addr(&probe);

        let mut coordinator = SamplingCoordinator::new("Metric0");
        let exact = coordinator.exact_value(&mut probe, &input(&image, &t)).unwrap();
        assert_eq!(exact, 64.0);
        assert_eq!(sampler_addr(&probe), before);
        assert_eq!(probe.core.image_sampler().unwrap().name(), "Random");
        assert_eq!(probe.value(&input(&image, &t)).unwrap(), 10.0);
    }

    #[test]
    fn exact_value_restores_the_sampler_when_evaluation_fails() {
        let image = blob(8, 4.0, 4.0);
        let t = TranslationTransform::with_offset(vec![0.0, 0.0]);
        let mut probe = random_probe(Arc::clone(&image));
        probe.fail_on_full = true;
        let before = sampler_addr(&probe);

        let mut coordinator = SamplingCoordinator::new("Metric0");
        assert!(coordinator.exact_value(&mut probe, &input(&image, &t)).is_err());
        assert_eq!(sampler_addr(&probe), before);
        assert!(!probe.core.image_sampler().unwrap().is_full());
    }

    #[test]
    fn full_sampler_means_a_single_plain_evaluation() {
        let image = blob(8, 4.0, 4.0);
        let t = TranslationTransform::with_offset(vec![0.0, 0.0]);
        let mut full = FullSampler::default();
        full.set_input(SamplerInput::new(Arc::clone(&image)));
        let mut probe = Probe::default();
        probe.core.set_image_sampler(Some(Box::new(full)));
        let before = sampler_addr(&probe);

        let mut coordinator = SamplingCoordinator::new("Metric0");
        assert_eq!(coordinator.exact_value(&mut probe, &input(&image, &t)).unwrap(), 64.0);
        assert_eq!(probe.evaluations, 1);
        assert_eq!(sampler_addr(&probe), before);
    }

    #[test]
    fn metrics_without_sampler_report_zero_and_warn_on_reselect() {
        let image = blob(4, 2.0, 2.0);
        let t = TranslationTransform::with_offset(vec![0.0, 0.0]);
        let sink = LogSink::in_memory();
        let mut coordinator = SamplingCoordinator::new("Metric0");
        assert_eq!(coordinator.exact_value(&mut Plain, &input(&image, &t)).unwrap(), 0.0);
        coordinator.select_new_samples(&mut Plain, &sink);
        assert_eq!(sink.lines(LogLevel::Warning).len(), 1);
    }

    #[test]
    fn level_settings_install_the_ratio() {
        let config = Configuration::from_parameters(
            ParameterMap::parse(
                "(RequiredRatioOfValidSamples 0.5)\n(CheckNumberOfSamples[1] \"false\")\n(ShowExactMetricValue \"true\")",
            )
            .unwrap(),
        );
        let sink = LogSink::in_memory();
        let ctx = HookContext::new(&config, &sink, 0);
        let mut probe = Probe::default();
        let mut coordinator = SamplingCoordinator::new("Metric0");

        coordinator.before_each_resolution(&ctx, &mut probe).unwrap();
        assert_eq!(probe.core.required_ratio_of_valid_samples(), 0.5);
        assert!(sink.iteration().has_column("ExactMetric0"));

        coordinator
            .before_each_resolution(&ctx.at_level(1), &mut probe)
            .unwrap();
        assert_eq!(probe.core.required_ratio_of_valid_samples(), 0.0);
        assert!(sink.iteration().has_column("ExactMetric0"));
        assert_eq!(
            sink.iteration().columns().iter().filter(|c| *c == "ExactMetric0").count(),
            1
        );
    }
}
