use multireg::{ArgumentMap, Configuration, MultiRegError, ParameterMap};
use std::fs;
use std::path::PathBuf;

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("multireg-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

const PARAMETERS: &str = r#"
// Two-level affine stage.
(Registration "MultiResolutionRegistration")
(Metric "AdvancedNormalizedCorrelation")
(NumberOfResolutions 3)
(MaximumNumberOfIterations 200 100 50)
(MaximumNumberOfIterations[2] 25)
(Scales 1000.0 1000.0 1000.0 1000.0 1.0 1.0)
(Metric0RequiredRatioOfValidSamples 0.5)
(FixedImagePyramidSchedule 4 4 2 2 1 1)
"#;

#[test]
fn parameter_file_from_disk_resolves_per_level() {
    let dir = temp_dir("config");
    let path = dir.join("stage.txt");
    fs::write(&path, PARAMETERS).unwrap();

    let map = ParameterMap::from_path(&path).unwrap();
    let config = Configuration::from_parameters(map);

    let metric: String = config.read_required("Metric", "", 0, 0).unwrap();
    assert_eq!(metric, "AdvancedNormalizedCorrelation");

    let iterations = |level| -> u32 {
        config
            .read_for_level("MaximumNumberOfIterations", "Optimizer0", level, 0)
            .unwrap()
    };
    assert_eq!(iterations(0), 200);
    assert_eq!(iterations(1), 100);
    // the level override wins over the third default value
    assert_eq!(iterations(2), 25);

    let scales: Vec<f64> = config.read_vector("Scales", "Transform0", 0).unwrap().unwrap();
    assert_eq!(scales.len(), 6);
    assert_eq!(config.count_values("FixedImagePyramidSchedule", "", 0), 6);

    let ratio: f64 = config
        .read_or("RequiredRatioOfValidSamples", "Metric0", 0, 0, 0.25)
        .unwrap();
    assert_eq!(ratio, 0.5);
    let other: f64 = config
        .read_or("RequiredRatioOfValidSamples", "Metric1", 0, 0, 0.25)
        .unwrap();
    assert_eq!(other, 0.25);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn level_override_only_applies_to_its_level() {
    let map = ParameterMap::parse("(SP_a 400.0)\n(SP_a[2] 50.0)").unwrap();
    let config = Configuration::from_parameters(map);
    for (level, expected) in [(0, 400.0), (1, 400.0), (2, 50.0), (3, 400.0)] {
        let value: f64 = config.read_required("SP_a", "Optimizer0", level, 0).unwrap();
        assert_eq!(value, expected, "level {level}");
    }
}

#[test]
fn failures_name_the_offending_key() {
    let map = ParameterMap::parse("(NumberOfResolutions \"three\")").unwrap();
    let config = Configuration::from_parameters(map);

    let err = config
        .read_required::<u32>("NumberOfResolutions", "Registration0", 0, 0)
        .unwrap_err();
    assert!(matches!(
        &err,
        MultiRegError::InvalidParameter { key, value, .. }
            if key == "NumberOfResolutions" && value == "three"
    ));
    assert!(err.is_configuration_error());

    let err = config
        .read_required::<String>("Transform", "", 0, 0)
        .unwrap_err();
    assert!(matches!(err, MultiRegError::MissingParameter { ref key, .. } if key == "Transform"));
    assert_eq!(
        config.read::<String>("Transform", "", 0, 0, false).unwrap(),
        None
    );
}

#[test]
fn arguments_travel_with_each_stage() {
    let args = ArgumentMap::from_args(
        "multireg",
        &["-p", "a.txt", "-out", "results", "-p", "b.txt", "-threads", "2"],
    );
    assert_eq!(args.parameter_files(), ["a.txt", "b.txt"]);
    assert_eq!(args.get("-p(1)"), Some("a.txt"));
    assert_eq!(args.get("-p(2)"), Some("b.txt"));

    let stage = Configuration::new(ParameterMap::new(), args.for_stage("b.txt"));
    assert_eq!(stage.argument("-p"), Some("b.txt"));
    assert_eq!(stage.argument("-threads"), Some("2"));
    assert!(stage.argument("-out").unwrap().ends_with(std::path::MAIN_SEPARATOR));
}

#[cfg(feature = "json")]
#[test]
fn json_parameter_files_are_accepted() {
    let dir = temp_dir("config-json");
    let path = dir.join("stage.json");
    fs::write(
        &path,
        r#"{"Metric": "AdvancedMeanSquares", "NumberOfResolutions": 2, "Scales": [1.0, 2.0]}"#,
    )
    .unwrap();
    let config = Configuration::from_parameters(ParameterMap::from_path(&path).unwrap());
    let levels: u32 = config.read_required("NumberOfResolutions", "", 0, 0).unwrap();
    assert_eq!(levels, 2);
    let scales: Vec<f64> = config.read_vector("Scales", "", 0).unwrap().unwrap();
    assert_eq!(scales, vec![1.0, 2.0]);
    fs::remove_dir_all(&dir).unwrap();
}
