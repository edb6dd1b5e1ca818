//! Translation transform: `T(x) = x + d`.

use crate::component::{Component, HookContext};
use crate::config::ParameterMap;
use crate::transform::{
    check_len, stored_parameters, Differentiable, Transform, TransformComponent, TransformSetup,
};
use crate::util::{MultiRegError, MultiRegResult};
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct TranslationTransform {
    offset: Vec<f64>,
    scales: Option<Vec<f64>>,
    setup: Option<TransformSetup>,
}

impl TranslationTransform {
    pub fn with_offset(offset: Vec<f64>) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }

    pub fn offset(&self) -> &[f64] {
        &self.offset
    }
}

impl Component for TranslationTransform {
    fn name(&self) -> &'static str {
        "TranslationTransform"
    }

    fn before_registration(&mut self, ctx: &HookContext<'_>) -> MultiRegResult<()> {
        let setup = self
            .setup
            .as_ref()
            .ok_or(MultiRegError::MissingInput("transform setup"))?;
        let dim = setup.fixed.dimension();
        self.offset = vec![0.0; dim];

        if ctx.read_or("AutomaticTransformInitialization", false)? {
            let from = setup.mapped_fixed_center();
            let to = setup.moving.center();
            self.offset = to.iter().zip(&from).map(|(t, f)| t - f).collect();
            ctx.sink.info(format!(
                "Transform initialized by aligning image centers: {:?}",
                self.offset
            ));
        }

        self.scales = ctx.config.read_vector::<f64>("Scales", ctx.label, 0)?;
        if let Some(scales) = &self.scales {
            check_len(dim, scales.len())?;
        }
        Ok(())
    }
}

impl Transform for TranslationTransform {
    fn dimension(&self) -> usize {
        self.offset.len()
    }

    fn transform_point(&self, point: &[f64], out: &mut [f64]) {
        for ((o, &p), &d) in out.iter_mut().zip(point).zip(&self.offset) {
            *o = p + d;
        }
    }
}

impl Differentiable for TranslationTransform {
    fn number_of_parameters(&self) -> usize {
        self.offset.len()
    }

    fn jacobian(&self, _point: &[f64], out: &mut [f64]) {
        let n = self.offset.len();
        out.iter_mut().for_each(|v| *v = 0.0);
        for d in 0..n {
            out[d * n + d] = 1.0;
        }
    }
}

impl TransformComponent for TranslationTransform {
    fn set_setup(&mut self, setup: TransformSetup) {
        self.offset = vec![0.0; setup.fixed.dimension()];
        self.setup = Some(setup);
    }

    fn parameters(&self) -> &[f64] {
        &self.offset
    }

    fn set_parameters(&mut self, parameters: &[f64]) -> MultiRegResult<()> {
        check_len(self.offset.len(), parameters.len())?;
        self.offset.copy_from_slice(parameters);
        Ok(())
    }

    fn scales(&self) -> Vec<f64> {
        self.scales
            .clone()
            .unwrap_or_else(|| vec![1.0; self.offset.len()])
    }

    fn snapshot(&self) -> Arc<dyn Transform> {
        Arc::new(Self::with_offset(self.offset.clone()))
    }

    fn read_parameters(&mut self, map: &ParameterMap) -> MultiRegResult<()> {
        let (dimension, parameters) = stored_parameters(map)?;
        check_len(dimension, parameters.len())?;
        self.offset = parameters;
        Ok(())
    }
}
