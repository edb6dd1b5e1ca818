use clap::Parser;
use multireg::config::args::USAGE_HINT;
use multireg::image::io::ImageFileIo;
use multireg::{CommandLine, ComponentRegistry, RegistrationDriver};
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
multireg registers a moving image to a fixed image in one or more stages.

Usage:
  multireg -f <fixed> -m <moving> -p <parameters> [-p <parameters> ...] -out <dir>

Required:
  -p       parameter file of one stage; repeat for more stages, run in order
  -out     existing output directory (log, transform parameters, result images)

Optional:
  -f       fixed image
  -m       moving image
  -fMask   mask for the fixed image
  -mMask   mask for the moving image
  -t0      transform parameter file used as the initial transform
  -threads number of worker threads

  --help, -help   print this help
  --version       print the version

Set RUST_LOG (for example RUST_LOG=multireg=info) to emit tracing output.";

#[derive(Parser, Debug)]
#[command(name = "multireg", disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    /// Registration arguments as `-key value` pairs.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
    args: Vec<String>,
}

fn run(argv0: &str, args: &[String]) -> i32 {
    match CommandLine::parse(argv0, args) {
        CommandLine::Usage => {
            println!("{USAGE_HINT}");
            0
        }
        CommandLine::Help => {
            println!("{HELP}");
            0
        }
        CommandLine::Version => {
            println!("multireg version: {}", env!("CARGO_PKG_VERSION"));
            0
        }
        CommandLine::Run(arguments) => {
            let registry = match ComponentRegistry::with_builtins() {
                Ok(registry) => registry,
                Err(err) => {
                    eprintln!("ERROR: {err}");
                    return err.exit_code();
                }
            };
            let mut driver = RegistrationDriver::new(registry)
                .with_loader(ImageFileIo)
                .with_writer(ImageFileIo);
            let code = driver.run(&arguments);
            tracing::info!(exit_code = code, "multireg finished");
            code
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .init();
    }

    let argv0 = std::env::args().next().unwrap_or_else(|| "multireg".to_string());
    std::process::exit(run(&argv0, &cli.args));
}
