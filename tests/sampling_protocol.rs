use multireg::component::HookContext;
use multireg::interpolator::LinearInterpolator;
use multireg::metric::{AdvancedMeanSquares, Metric, MetricInput, SamplerAware, SamplingCoordinator};
use multireg::sampler::{FullSampler, ImageSampler, RandomSampler, SamplerInput};
use multireg::transform::TranslationTransform;
use multireg::{Configuration, Geometry, Image, LogSink, MultiRegError, ParameterMap};
use std::sync::Arc;

fn ramp(size: usize) -> Arc<Image> {
    let geometry = Geometry::new(vec![size, size]).unwrap();
    Arc::new(Image::from_fn(geometry, |idx| (idx[0] + 2 * idx[1]) as f32))
}

fn configured(text: &str, metric: &mut dyn Metric) -> Result<(), MultiRegError> {
    let config = Configuration::from_parameters(ParameterMap::parse(text).unwrap());
    let sink = LogSink::in_memory();
    let ctx = HookContext::new(&config, &sink, 0);
    SamplingCoordinator::new("Metric0").before_each_resolution(&ctx, metric)
}

fn mean_squares(image: &Arc<Image>) -> AdvancedMeanSquares {
    let mut sampler = FullSampler::default();
    sampler.set_input(SamplerInput::new(Arc::clone(image)));
    let mut metric = AdvancedMeanSquares::default();
    metric
        .sampler_aware()
        .unwrap()
        .set_image_sampler(Some(Box::new(sampler)));
    metric
}

fn value_at(metric: &mut AdvancedMeanSquares, image: &Image, shift: f64) -> Result<f64, MultiRegError> {
    let transform = TranslationTransform::with_offset(vec![shift, 0.0]);
    let input = MetricInput {
        moving: image,
        moving_mask: None,
        transform: &transform,
        interpolator: &LinearInterpolator,
    };
    metric.value(&input)
}

#[test]
fn disabled_check_accepts_no_valid_samples() {
    let image = ramp(10);
    let mut metric = mean_squares(&image);
    configured("(CheckNumberOfSamples \"false\")", &mut metric).unwrap();
    assert_eq!(
        metric.sampler_aware().unwrap().required_ratio_of_valid_samples(),
        0.0
    );
    // every sample maps outside the moving image
    assert_eq!(value_at(&mut metric, &image, 50.0).unwrap(), 0.0);
}

#[test]
fn ratio_below_threshold_fails() {
    let image = ramp(10);
    let mut metric = mean_squares(&image);
    configured(
        "(CheckNumberOfSamples \"true\")\n(RequiredRatioOfValidSamples 0.5)",
        &mut metric,
    )
    .unwrap();

    // a shift of 6 voxels keeps columns 0..=3 inside: 40 of 100 samples
    assert_eq!(
        value_at(&mut metric, &image, 6.0).unwrap_err(),
        MultiRegError::SampleValidity {
            valid: 40,
            total: 100,
            required: 0.5,
        }
    );
    // 50 of 100 is enough
    assert!(value_at(&mut metric, &image, 5.0).is_ok());
}

#[test]
fn label_specific_ratio_and_range_check() {
    let image = ramp(4);
    let mut metric = mean_squares(&image);
    configured("(Metric0RequiredRatioOfValidSamples 0.75)", &mut metric).unwrap();
    assert_eq!(
        metric.sampler_aware().unwrap().required_ratio_of_valid_samples(),
        0.75
    );

    let err = configured("(RequiredRatioOfValidSamples 1.5)", &mut metric).unwrap_err();
    assert!(matches!(err, MultiRegError::InvalidParameter { ref key, .. } if key == "RequiredRatioOfValidSamples"));
}

#[test]
fn exact_value_restores_a_random_sampler() {
    let image = ramp(12);
    let mut random = RandomSampler::new(16, 3);
    random.set_input(SamplerInput::new(Arc::clone(&image)));
    let mut metric = AdvancedMeanSquares::default();
    metric
        .sampler_aware()
        .unwrap()
        .set_image_sampler(Some(Box::new(random)));

    let transform = TranslationTransform::with_offset(vec![1.0, 0.0]);
    let input = MetricInput {
        moving: &image,
        moving_mask: None,
        transform: &transform,
        interpolator: &LinearInterpolator,
    };
    let mut coordinator = SamplingCoordinator::new("Metric0");
    let exact = coordinator.exact_value(&mut metric, &input).unwrap();
    // shifting a unit-slope ramp by one voxel gives a squared difference of 1
    assert!((exact - 1.0).abs() < 1e-9, "{exact}");

    let sampler = metric.sampler_aware().unwrap().image_sampler().unwrap();
    assert_eq!(sampler.name(), "Random");
    assert!(!sampler.is_full());
}
