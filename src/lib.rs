//! multireg drives multi-stage, multi-resolution image registration.
//!
//! A run is a sequence of stages, one per parameter file. Each stage builds
//! its components (registration method, pyramids, sampler, interpolator,
//! metric, transform, optimizer) from a [`ComponentRegistry`], runs them
//! coarse-to-fine through the lifecycle hooks, and hands its transform to the
//! next stage as the initial transform. Metric evaluation is chunked over
//! samples and runs in parallel with the `rayon` feature.

pub mod builtin;
pub mod component;
pub mod config;
pub mod driver;
pub mod image;
pub mod interpolator;
pub mod kernel;
pub mod metric;
pub mod optimizer;
pub mod pyramid;
pub mod registration;
pub mod sampler;
pub mod sink;
pub mod stage;
mod trace;
pub mod transform;
pub mod util;

pub use component::{
    Component, ComponentBinding, ComponentKind, ComponentModule, ComponentRegistry, Hook,
    HookContext,
};
pub use config::{ArgumentMap, CommandLine, Configuration, FromParameter, ParameterMap};
pub use driver::{DriverOutcome, ImageLoader, ImageWriter, RegistrationDriver};
pub use image::{Geometry, Image, ImageContainers, Mask, Region};
pub use pyramid::Schedule;
pub use sink::LogSink;
pub use stage::{StageOutput, StageRunner, StageState};
pub use transform::{CombinationMode, Transform, TransformChain};
pub use util::{MultiRegError, MultiRegResult};
