//! Error types for multireg.

use crate::component::ComponentKind;
use thiserror::Error;

/// Result alias for multireg operations.
pub type MultiRegResult<T> = std::result::Result<T, MultiRegError>;

/// Errors that can occur while configuring or running a registration.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum MultiRegError {
    /// The input data or parameters are invalid.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Image dimensions are zero or overflow.
    #[error("invalid image size {size:?}")]
    InvalidDimensions { size: Vec<usize> },
    /// The provided buffer is smaller than the image requires.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// Two objects that must share a dimensionality do not.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// A required stage input (image, sampler, ...) is absent.
    #[error("missing input: {0}")]
    MissingInput(&'static str),
    /// A required parameter did not resolve to any value.
    #[error("missing required parameter \"{key}\" (component \"{label}\")")]
    MissingParameter { key: String, label: String },
    /// A parameter value could not be converted to the requested type.
    #[error("parameter \"{key}\": cannot read \"{value}\" as {expected}")]
    InvalidParameter {
        key: String,
        value: String,
        expected: &'static str,
    },
    /// A parameter file could not be parsed.
    #[error("parameter file syntax error at line {line}: {reason}")]
    ParameterFileSyntax { line: usize, reason: String },
    /// A pyramid schedule does not match the level count or dimensionality.
    #[error(
        "invalid pyramid schedule: expected {expected_levels}x{expected_dimension}, got {levels}x{dimension}"
    )]
    InvalidSchedule {
        levels: usize,
        dimension: usize,
        expected_levels: usize,
        expected_dimension: usize,
    },
    /// No `-p` argument was given.
    #[error("no command line option \"-p\" given")]
    NoParameterFile,
    /// No `-out` argument was given.
    #[error("no command line option \"-out\" given")]
    NoOutputDirectory,
    /// The `-out` directory does not exist; it is never created.
    #[error("the output directory \"{path}\" does not exist")]
    OutputDirectoryMissing { path: String },
    /// No factory is registered under this kind and name.
    #[error("unknown {kind} component \"{name}\"")]
    UnknownComponent { kind: ComponentKind, name: String },
    /// A factory with this kind and name is already registered.
    #[error("{kind} component \"{name}\" is already registered")]
    DuplicateComponent { kind: ComponentKind, name: String },
    /// Too few samples mapped validly inside the moving image or mask.
    #[error("too few valid samples: {valid} of {total} (required ratio {required})")]
    SampleValidity {
        valid: usize,
        total: usize,
        required: f64,
    },
    /// Reading or writing a file failed.
    #[error("i/o error on \"{path}\": {reason}")]
    Io { path: String, reason: String },
    /// Decoding or encoding an image failed.
    #[error("image i/o error: {reason}")]
    ImageIo { reason: String },
}

impl MultiRegError {
    /// Returns true for errors in the configuration class.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::MissingParameter { .. }
                | Self::InvalidParameter { .. }
                | Self::ParameterFileSyntax { .. }
                | Self::InvalidSchedule { .. }
                | Self::NoParameterFile
                | Self::NoOutputDirectory
                | Self::OutputDirectoryMissing { .. }
        )
    }

    /// Stable non-zero code reported when a stage fails with this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            _ if self.is_configuration_error() => 1,
            Self::UnknownComponent { .. } | Self::DuplicateComponent { .. } => 2,
            Self::SampleValidity { .. } => 3,
            Self::Io { .. } | Self::ImageIo { .. } => 4,
            _ => 5,
        }
    }

    pub(crate) fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}
