//! Multi-stage registration driver.
//!
//! The driver validates the command line, opens the log sink in the output
//! directory, then runs one [`StageRunner`] per `-p` parameter file. Each
//! stage receives the transform and images the previous stage produced. The
//! first failing stage stops the run; its error code becomes the exit code.

use crate::component::ComponentRegistry;
use crate::config::{ArgumentMap, Configuration, ParameterMap};
use crate::image::{Image, ImageContainers, Mask};
use crate::sink::LogSink;
use crate::stage::{StageOutput, StageRunner};
use crate::trace::{trace_event, trace_span};
use crate::transform::parameters_file::read_chain;
use crate::transform::TransformChain;
use crate::util::math::format_dhms;
use crate::util::{MultiRegError, MultiRegResult};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Name of the log file opened in the output directory.
pub const LOG_FILE_NAME: &str = "elastix.log";
/// Exit code when no `-p` was given.
pub const EXIT_NO_PARAMETER_FILE: i32 = -1;
/// Exit code when `-out` is missing or does not name an existing directory.
pub const EXIT_NO_OUTPUT_DIRECTORY: i32 = -2;

/// Reads input images for the first stage.
pub trait ImageLoader {
    fn load_image(&self, path: &Path) -> MultiRegResult<Image>;
    fn load_mask(&self, path: &Path) -> MultiRegResult<Mask>;
}

/// Stores result images.
pub trait ImageWriter {
    /// File extension used for written images, without the dot.
    fn extension(&self) -> &str;
    fn write_image(&self, image: &Image, path: &Path) -> MultiRegResult<()>;
}

/// Result of a completed run.
#[derive(Clone, Debug)]
pub struct DriverOutcome {
    /// Outputs of every stage, in order.
    pub stages: Vec<StageOutput>,
    /// Final transform of the last stage.
    pub transform: Option<Arc<TransformChain>>,
    pub images: ImageContainers,
    pub elapsed: Duration,
}

/// Checks the arguments every run needs before any stage starts.
///
/// All problems are returned, not only the first.
pub fn check_arguments(args: &ArgumentMap) -> Vec<MultiRegError> {
    let mut problems = Vec::new();
    if args.parameter_files().is_empty() {
        problems.push(MultiRegError::NoParameterFile);
    }
    match args.output_directory() {
        None => problems.push(MultiRegError::NoOutputDirectory),
        Some(dir) if !dir.is_dir() => problems.push(MultiRegError::OutputDirectoryMissing {
            path: dir.display().to_string(),
        }),
        Some(_) => {}
    }
    problems
}

/// Exit code for a set of argument problems; output directory problems win.
pub fn setup_exit_code(problems: &[MultiRegError]) -> i32 {
    let out_problem = problems.iter().any(|p| {
        matches!(
            p,
            MultiRegError::NoOutputDirectory | MultiRegError::OutputDirectoryMissing { .. }
        )
    });
    match (out_problem, problems.is_empty()) {
        (true, _) => EXIT_NO_OUTPUT_DIRECTORY,
        (false, false) => EXIT_NO_PARAMETER_FILE,
        (false, true) => 0,
    }
}

/// Runs configured registration stages in sequence.
pub struct RegistrationDriver {
    registry: ComponentRegistry,
    loader: Option<Box<dyn ImageLoader>>,
    writer: Option<Box<dyn ImageWriter>>,
    echo: bool,
}

impl RegistrationDriver {
    pub fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry,
            loader: None,
            writer: None,
            echo: true,
        }
    }

    pub fn with_loader(mut self, loader: impl ImageLoader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    pub fn with_writer(mut self, writer: impl ImageWriter + 'static) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Keeps log output out of stdout/stderr; the log file is still written.
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Runs every stage and returns the process exit code. The registry is
    /// unloaded on every path, including argument errors.
    pub fn run(&mut self, args: &ArgumentMap) -> i32 {
        let problems = check_arguments(args);
        if !problems.is_empty() {
            let console = LogSink::console();
            for problem in &problems {
                console.error(problem.to_string());
            }
            self.registry.unload_all();
            return setup_exit_code(&problems);
        }
        match self.execute(args, ImageContainers::default()) {
            Ok(_) => 0,
            Err(err) => err.exit_code(),
        }
    }

    /// Runs every stage starting from `images`; an empty container set makes
    /// the driver load `-f`/`-m`/`-fMask`/`-mMask` through its loader.
    ///
    /// The registry is unloaded when this returns, whatever the outcome.
    pub fn execute(
        &mut self,
        args: &ArgumentMap,
        images: ImageContainers,
    ) -> MultiRegResult<DriverOutcome> {
        let result = self.execute_stages(args, images);
        self.registry.unload_all();
        result
    }

    fn execute_stages(
        &self,
        args: &ArgumentMap,
        images: ImageContainers,
    ) -> MultiRegResult<DriverOutcome> {
        if let Some(problem) = check_arguments(args).into_iter().next() {
            return Err(problem);
        }
        let dir = args
            .output_directory()
            .ok_or(MultiRegError::NoOutputDirectory)?;
        let mut sink = LogSink::open(&dir.join(LOG_FILE_NAME))?;
        if !self.echo {
            sink = sink.quiet();
        }
        let result = self.run_stages(args, images, &sink);
        if let Err(err) = &result {
            sink.error(format!(
                "Errors occurred during registration (exit code {}): {err}",
                err.exit_code()
            ));
        }
        result
    }

    fn run_stages(
        &self,
        args: &ArgumentMap,
        mut images: ImageContainers,
        sink: &LogSink,
    ) -> MultiRegResult<DriverOutcome> {
        let _span = trace_span!("driver", stages = args.parameter_files().len()).entered();
        let started = Instant::now();
        sink.info(format!(
            "multireg is started at {}.",
            chrono::Local::now().format("%a %b %e %T %Y")
        ));
        for warning in args.warnings() {
            sink.warn(warning);
        }
        for (key, value) in args.iter() {
            sink.info(format!("{key:<8} {value}"));
        }
        self.configure_threads(args, sink)?;

        let mut transform = match args.get("-t0") {
            Some(path) => {
                let chain = read_chain(Path::new(path), &self.registry)?;
                sink.info(format!("Initial transform read from \"{path}\""));
                Some(chain)
            }
            None => None,
        };
        if images.is_empty() {
            images = self.load_images(args)?;
        }

        let mut stages = Vec::with_capacity(args.parameter_files().len());
        for (stage, file) in args.parameter_files().iter().enumerate() {
            let stage_started = Instant::now();
            sink.info(format!("Running stage {stage} with \"{file}\"."));
            trace_event!("stage_start", stage = stage);
            let parameters = ParameterMap::from_path(Path::new(file))?;
            for warning in parameters.warnings() {
                sink.warn(warning);
            }
            let config = Configuration::new(parameters, args.for_stage(file));

            // The runner and its components are dropped before the next
            // stage is built.
            let output = {
                let mut runner = StageRunner::new(config, &self.registry, sink, stage);
                runner.set_initial_transform(transform.take());
                runner.set_images(std::mem::take(&mut images));
                runner.set_writer(self.writer.as_deref());
                runner.run()?
            };
            transform = Some(Arc::clone(&output.transform));
            images = output.images.clone();
            sink.info(format!(
                "Stage {stage} finished in {}.",
                format_dhms(stage_started.elapsed())
            ));
            stages.push(output);
        }

        let elapsed = started.elapsed();
        sink.info(format!("Total time elapsed: {}.", format_dhms(elapsed)));
        Ok(DriverOutcome {
            stages,
            transform,
            images,
            elapsed,
        })
    }

    fn load_images(&self, args: &ArgumentMap) -> MultiRegResult<ImageContainers> {
        let mut images = ImageContainers::default();
        let Some(loader) = self.loader.as_deref() else {
            if args.contains("-f") || args.contains("-m") {
                return Err(MultiRegError::MissingInput("image loader"));
            }
            return Ok(images);
        };
        if let Some(path) = args.get("-f") {
            images.fixed_images.push(Arc::new(loader.load_image(Path::new(path))?));
        }
        if let Some(path) = args.get("-m") {
            images.moving_images.push(Arc::new(loader.load_image(Path::new(path))?));
        }
        if let Some(path) = args.get("-fMask") {
            images.fixed_masks.push(Arc::new(loader.load_mask(Path::new(path))?));
        }
        if let Some(path) = args.get("-mMask") {
            images.moving_masks.push(Arc::new(loader.load_mask(Path::new(path))?));
        }
        Ok(images)
    }

    #[cfg(feature = "rayon")]
    fn configure_threads(&self, args: &ArgumentMap, sink: &LogSink) -> MultiRegResult<()> {
        let Some(value) = args.get("-threads") else {
            return Ok(());
        };
        let threads = value
            .parse::<usize>()
            .map_err(|_| MultiRegError::InvalidParameter {
                key: "-threads".to_string(),
                value: value.to_string(),
                expected: "unsigned integer",
            })?;
        if let Err(reason) = crate::kernel::rayon::configure_threads(threads) {
            sink.warn(format!("-threads {threads} ignored: {reason}"));
        }
        Ok(())
    }

    #[cfg(not(feature = "rayon"))]
    fn configure_threads(&self, args: &ArgumentMap, sink: &LogSink) -> MultiRegResult<()> {
        if args.contains("-threads") {
            sink.warn("-threads is ignored; built without the rayon feature");
        }
        Ok(())
    }
}
