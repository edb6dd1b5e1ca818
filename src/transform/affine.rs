//! Affine transform about a center of rotation.
//!
//! `T(x) = A (x - c) + t + c` with parameters `[A (row-major), t]`. The
//! center `c` is fixed during optimization: the `CenterOfRotation` index of
//! the fixed image if given, its geometric center otherwise (mapped through
//! the initial transform when combining by composition).

use crate::component::{Component, HookContext};
use crate::config::ParameterMap;
use crate::transform::{
    check_len, parse_stored, stored_parameters, CombinationMode, Differentiable, Transform,
    TransformComponent, TransformSetup,
};
use crate::util::{MultiRegError, MultiRegResult};
use std::sync::Arc;

/// Default optimizer scale of the matrix entries relative to translations.
const DEFAULT_MATRIX_SCALE: f64 = 100_000.0;

#[derive(Clone, Debug, Default)]
pub struct AffineTransform {
    dimension: usize,
    parameters: Vec<f64>,
    center: Vec<f64>,
    scales: Vec<f64>,
    setup: Option<TransformSetup>,
}

impl AffineTransform {
    /// Identity transform of `dimension` about `center`.
    pub fn identity(center: Vec<f64>) -> Self {
        let dimension = center.len();
        let mut t = Self {
            dimension,
            center,
            ..Self::default()
        };
        t.reset();
        t
    }

    pub fn center(&self) -> &[f64] {
        &self.center
    }

    fn reset(&mut self) {
        let d = self.dimension;
        self.parameters = vec![0.0; d * d + d];
        for i in 0..d {
            self.parameters[i * d + i] = 1.0;
        }
        self.scales = (0..d * d + d)
            .map(|p| if p < d * d { DEFAULT_MATRIX_SCALE } else { 1.0 })
            .collect();
    }

    fn translation_mut(&mut self) -> &mut [f64] {
        let d = self.dimension;
        &mut self.parameters[d * d..]
    }
}

impl Component for AffineTransform {
    fn name(&self) -> &'static str {
        "AffineTransform"
    }

    fn before_registration(&mut self, ctx: &HookContext<'_>) -> MultiRegResult<()> {
        let setup = self
            .setup
            .clone()
            .ok_or(MultiRegError::MissingInput("transform setup"))?;
        self.dimension = setup.fixed.dimension();
        self.reset();
        let d = self.dimension;

        self.center = match ctx.config.read_vector::<f64>("CenterOfRotation", ctx.label, 0)? {
            Some(index) => {
                check_len(d, index.len())?;
                setup.fixed.index_to_point(&index)
            }
            None => setup.fixed.center(),
        };
        if setup.initial.is_some() && setup.mode == CombinationMode::Compose {
            self.center = setup.map_through_initial(&self.center);
        }

        if ctx.read_or("AutomaticTransformInitialization", false)? {
            let from = setup.mapped_fixed_center();
            let to = setup.moving.center();
            for ((t, a), b) in self.translation_mut().iter_mut().zip(&to).zip(&from) {
                *t = a - b;
            }
        }

        match ctx.config.read_vector::<f64>("Scales", ctx.label, 0)? {
            Some(scales) if scales.len() == 1 => {
                for s in &mut self.scales[..d * d] {
                    *s = scales[0];
                }
            }
            Some(scales) => {
                check_len(self.parameters.len(), scales.len())?;
                self.scales = scales;
            }
            None => {}
        }
        ctx.sink.info(format!("Center of rotation: {:?}", self.center));
        Ok(())
    }
}

impl Transform for AffineTransform {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn transform_point(&self, point: &[f64], out: &mut [f64]) {
        let d = self.dimension;
        let (matrix, translation) = self.parameters.split_at(d * d);
        for i in 0..d {
            let mut v = translation[i] + self.center[i];
            for j in 0..d {
                v += matrix[i * d + j] * (point[j] - self.center[j]);
            }
            out[i] = v;
        }
    }
}

impl Differentiable for AffineTransform {
    fn number_of_parameters(&self) -> usize {
        self.parameters.len()
    }

    fn jacobian(&self, point: &[f64], out: &mut [f64]) {
        let d = self.dimension;
        let n = self.parameters.len();
        out.iter_mut().for_each(|v| *v = 0.0);
        for i in 0..d {
            let row = &mut out[i * n..(i + 1) * n];
            for j in 0..d {
                row[i * d + j] = point[j] - self.center[j];
            }
            row[d * d + i] = 1.0;
        }
    }
}

impl TransformComponent for AffineTransform {
    fn set_setup(&mut self, setup: TransformSetup) {
        self.dimension = setup.fixed.dimension();
        self.center = setup.fixed.center();
        self.reset();
        self.setup = Some(setup);
    }

    fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    fn set_parameters(&mut self, parameters: &[f64]) -> MultiRegResult<()> {
        check_len(self.parameters.len(), parameters.len())?;
        self.parameters.copy_from_slice(parameters);
        Ok(())
    }

    fn scales(&self) -> Vec<f64> {
        self.scales.clone()
    }

    fn snapshot(&self) -> Arc<dyn Transform> {
        Arc::new(Self {
            setup: None,
            ..self.clone()
        })
    }

    fn write_parameters(&self, map: &mut ParameterMap) {
        map.set("CenterOfRotationPoint", self.center.iter().map(f64::to_string));
    }

    fn read_parameters(&mut self, map: &ParameterMap) -> MultiRegResult<()> {
        let (dimension, parameters) = stored_parameters(map)?;
        check_len(dimension * dimension + dimension, parameters.len())?;
        let center = map
            .values("CenterOfRotationPoint")
            .ok_or_else(|| MultiRegError::MissingParameter {
                key: "CenterOfRotationPoint".into(),
                label: String::new(),
            })?
            .iter()
            .map(|v| parse_stored::<f64>("CenterOfRotationPoint", v))
            .collect::<MultiRegResult<Vec<_>>>()?;
        check_len(dimension, center.len())?;
        self.dimension = dimension;
        self.center = center;
        self.reset();
        self.parameters = parameters;
        Ok(())
    }
}
