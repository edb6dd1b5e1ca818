//! Spatial transforms and transform chains.
//!
//! A stage optimizes one [`TransformComponent`]. When the stage starts from
//! an initial transform (the result of the previous stage, or a `-t0` file),
//! the optimized transform is combined with it per `HowToCombineTransforms`:
//!
//! * `Compose`: `T(x) = Tc(T0(x))`
//! * `Add`: `T(x) = T0(x) + Tc(x) - x`
//!
//! The result of a stage is handed on as an owned [`TransformChain`].

pub mod affine;
pub mod parameters_file;
pub mod translation;

pub use affine::AffineTransform;
pub use translation::TranslationTransform;

use crate::component::Component;
use crate::config::{FromParameter, ParameterMap};
use crate::image::Geometry;
use crate::util::{MultiRegError, MultiRegResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A mapping of physical points from the fixed to the moving image domain.
pub trait Transform: Send + Sync + fmt::Debug {
    fn dimension(&self) -> usize;

    /// Writes the image of `point` into `out`.
    fn transform_point(&self, point: &[f64], out: &mut [f64]);
}

/// A transform with a parameter vector and a spatial Jacobian.
pub trait Differentiable: Transform {
    fn number_of_parameters(&self) -> usize;

    /// Writes `dT_d / dmu_p` at `point` into `out`, row-major with one row
    /// per output dimension.
    fn jacobian(&self, point: &[f64], out: &mut [f64]);
}

/// How the optimized transform is combined with the initial transform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CombinationMode {
    #[default]
    Compose,
    Add,
}

impl CombinationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CombinationMode::Compose => "Compose",
            CombinationMode::Add => "Add",
        }
    }
}

impl FromParameter for CombinationMode {
    const EXPECTED: &'static str = "\"Compose\" or \"Add\"";

    fn from_parameter(value: &str) -> Option<Self> {
        match value {
            "Compose" => Some(CombinationMode::Compose),
            "Add" => Some(CombinationMode::Add),
            _ => None,
        }
    }
}

/// Stage context a transform needs before registration starts.
#[derive(Clone, Debug)]
pub struct TransformSetup {
    pub fixed: Geometry,
    pub moving: Geometry,
    pub initial: Option<Arc<TransformChain>>,
    pub mode: CombinationMode,
}

impl TransformSetup {
    /// Physical center of the fixed image mapped through the initial
    /// transform.
    pub fn mapped_fixed_center(&self) -> Vec<f64> {
        self.map_through_initial(&self.fixed.center())
    }

    /// `T0(point)`, or `point` without an initial transform.
    pub fn map_through_initial(&self, point: &[f64]) -> Vec<f64> {
        let mut out = point.to_vec();
        if let Some(initial) = &self.initial {
            initial.transform_point(point, &mut out);
        }
        out
    }
}

/// The transform a stage optimizes.
pub trait TransformComponent: Component + Differentiable {
    /// Hands over fixed/moving geometry and the initial transform.
    fn set_setup(&mut self, setup: TransformSetup);

    fn parameters(&self) -> &[f64];

    fn set_parameters(&mut self, parameters: &[f64]) -> MultiRegResult<()>;

    /// Per-parameter optimizer scales.
    fn scales(&self) -> Vec<f64>;

    /// Immutable copy of the transform with its current parameters.
    fn snapshot(&self) -> Arc<dyn Transform>;

    /// Adds transform-specific entries to a transform parameter file.
    fn write_parameters(&self, _map: &mut ParameterMap) {}

    /// Restores the transform from a transform parameter file.
    fn read_parameters(&mut self, map: &ParameterMap) -> MultiRegResult<()>;
}

fn check_len(expected: usize, got: usize) -> MultiRegResult<()> {
    if expected != got {
        return Err(MultiRegError::DimensionMismatch { expected, got });
    }
    Ok(())
}

/// Reads the parameter vector and dimension stored in a transform parameter
/// file.
pub(crate) fn stored_parameters(map: &ParameterMap) -> MultiRegResult<(usize, Vec<f64>)> {
    let dimension = stored::<usize>(map, "FixedImageDimension")?;
    let values = map
        .values("TransformParameters")
        .ok_or_else(|| MultiRegError::MissingParameter {
            key: "TransformParameters".into(),
            label: String::new(),
        })?;
    let parameters = values
        .iter()
        .map(|v| parse_stored("TransformParameters", v))
        .collect::<MultiRegResult<Vec<f64>>>()?;
    if let Some(count) = map.values("NumberOfParameters").and_then(|v| v.first()) {
        check_len(parse_stored("NumberOfParameters", count)?, parameters.len())?;
    }
    Ok((dimension, parameters))
}

fn stored<T: FromParameter>(map: &ParameterMap, key: &str) -> MultiRegResult<T> {
    let value = map
        .values(key)
        .and_then(|v| v.first())
        .ok_or_else(|| MultiRegError::MissingParameter {
            key: key.to_string(),
            label: String::new(),
        })?;
    parse_stored(key, value)
}

fn parse_stored<T: FromParameter>(key: &str, value: &str) -> MultiRegResult<T> {
    T::from_parameter(value).ok_or_else(|| MultiRegError::InvalidParameter {
        key: key.to_string(),
        value: value.to_string(),
        expected: T::EXPECTED,
    })
}

/// `T0` combined with `Tc`.
fn combine<C: Transform + ?Sized>(
    initial: Option<&TransformChain>,
    mode: CombinationMode,
    current: &C,
    point: &[f64],
    out: &mut [f64],
) {
    let Some(initial) = initial else {
        current.transform_point(point, out);
        return;
    };
    match mode {
        CombinationMode::Compose => {
            let mut mid = vec![0.0; point.len()];
            initial.transform_point(point, &mut mid);
            current.transform_point(&mid, out);
        }
        CombinationMode::Add => {
            let mut other = vec![0.0; point.len()];
            initial.transform_point(point, out);
            current.transform_point(point, &mut other);
            for ((o, &c), &x) in out.iter_mut().zip(&other).zip(point) {
                *o += c - x;
            }
        }
    }
}

/// Borrowed view of the transform under optimization combined with the
/// stage's initial transform. This is what metrics evaluate.
#[derive(Debug)]
pub struct CombinedTransform<'a, T: ?Sized> {
    initial: Option<&'a TransformChain>,
    mode: CombinationMode,
    current: &'a T,
}

impl<'a, T: ?Sized> CombinedTransform<'a, T> {
    pub fn new(initial: Option<&'a TransformChain>, mode: CombinationMode, current: &'a T) -> Self {
        Self {
            initial,
            mode,
            current,
        }
    }
}

impl<T: Differentiable + ?Sized> Transform for CombinedTransform<'_, T> {
    fn dimension(&self) -> usize {
        self.current.dimension()
    }

    fn transform_point(&self, point: &[f64], out: &mut [f64]) {
        combine(self.initial, self.mode, self.current, point, out);
    }
}

impl<T: Differentiable + ?Sized> Differentiable for CombinedTransform<'_, T> {
    fn number_of_parameters(&self) -> usize {
        self.current.number_of_parameters()
    }

    fn jacobian(&self, point: &[f64], out: &mut [f64]) {
        match (self.initial, self.mode) {
            (Some(initial), CombinationMode::Compose) => {
                let mut mid = vec![0.0; point.len()];
                initial.transform_point(point, &mut mid);
                self.current.jacobian(&mid, out);
            }
            _ => self.current.jacobian(point, out),
        }
    }
}

/// The owned result of a stage: the optimized transform, its parameters, and
/// the initial transform it was combined with.
#[derive(Clone, Debug)]
pub struct TransformChain {
    name: String,
    current: Arc<dyn Transform>,
    parameters: Vec<f64>,
    initial: Option<Arc<TransformChain>>,
    mode: CombinationMode,
    source: Option<PathBuf>,
}

impl TransformChain {
    pub fn new(
        name: impl Into<String>,
        current: Arc<dyn Transform>,
        parameters: Vec<f64>,
        initial: Option<Arc<TransformChain>>,
        mode: CombinationMode,
    ) -> Self {
        Self {
            name: name.into(),
            current,
            parameters,
            initial,
            mode,
            source: None,
        }
    }

    /// Records the transform parameter file this chain was written to or read
    /// from.
    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// Registered name of the outermost transform.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    pub fn initial(&self) -> Option<&Arc<TransformChain>> {
        self.initial.as_ref()
    }

    pub fn mode(&self) -> CombinationMode {
        self.mode
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Number of transforms in the chain.
    pub fn depth(&self) -> usize {
        1 + self.initial.as_ref().map_or(0, |i| i.depth())
    }
}

impl Transform for TransformChain {
    fn dimension(&self) -> usize {
        self.current.dimension()
    }

    fn transform_point(&self, point: &[f64], out: &mut [f64]) {
        combine(
            self.initial.as_deref(),
            self.mode,
            self.current.as_ref(),
            point,
            out,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{CombinationMode, CombinedTransform, Differentiable, Transform, TransformChain};
    use crate::transform::translation::TranslationTransform;
    use std::sync::Arc;

    fn shift(offset: Vec<f64>) -> TranslationTransform {
        TranslationTransform::with_offset(offset)
    }

    fn chain(offset: Vec<f64>) -> TransformChain {
        let t = shift(offset.clone());
        TransformChain::new("TranslationTransform", Arc::new(t), offset, None, CombinationMode::Compose)
    }

    #[test]
    fn compose_and_add_combine_translations() {
        let initial = chain(vec![1.0, 2.0]);
        let current = shift(vec![0.5, -1.0]);
        let mut out = [0.0; 2];

        CombinedTransform::new(Some(&initial), CombinationMode::Compose, &current)
            .transform_point(&[1.0, 1.0], &mut out);
        assert_eq!(out, [2.5, 2.0]);

        CombinedTransform::new(Some(&initial), CombinationMode::Add, &current)
            .transform_point(&[1.0, 1.0], &mut out);
        assert_eq!(out, [2.5, 2.0]);
    }

    #[test]
    fn chain_depth_and_point_mapping() {
        let first = Arc::new(chain(vec![1.0, 0.0]));
        let second = TransformChain::new(
            "TranslationTransform",
            Arc::new(shift(vec![0.0, 3.0])),
            vec![0.0, 3.0],
            Some(first),
            CombinationMode::Compose,
        );
        let mut out = [0.0; 2];
        second.transform_point(&[0.0, 0.0], &mut out);
        assert_eq!(out, [1.0, 3.0]);
        assert_eq!(second.depth(), 2);
    }

    #[test]
    fn combined_jacobian_comes_from_current_transform() {
        let initial = chain(vec![1.0, 2.0]);
        let current = shift(vec![0.0, 0.0]);
        let combined = CombinedTransform::new(Some(&initial), CombinationMode::Compose, &current);
        let mut j = [0.0; 4];
        combined.jacobian(&[0.0, 0.0], &mut j);
        assert_eq!(combined.number_of_parameters(), 2);
        assert_eq!(j, [1.0, 0.0, 0.0, 1.0]);
    }
}
