//! Registration methods: how many resolution levels a stage runs.

use crate::component::{Component, HookContext};
use crate::pyramid::DEFAULT_NUMBER_OF_RESOLUTIONS;
use crate::util::{MultiRegError, MultiRegResult};

pub trait RegistrationMethod: Component {
    /// Number of resolution levels, known after `BeforeRegistration`.
    fn number_of_resolutions(&self) -> usize;
}

/// Plain coarse-to-fine registration over `NumberOfResolutions` levels.
#[derive(Clone, Debug)]
pub struct MultiResolutionRegistration {
    levels: usize,
}

impl Default for MultiResolutionRegistration {
    fn default() -> Self {
        Self {
            levels: DEFAULT_NUMBER_OF_RESOLUTIONS,
        }
    }
}

impl Component for MultiResolutionRegistration {
    fn name(&self) -> &'static str {
        "MultiResolutionRegistration"
    }

    fn before_registration(&mut self, ctx: &HookContext<'_>) -> MultiRegResult<()> {
        self.levels = ctx
            .config
            .read_or("NumberOfResolutions", "", 0, 0, DEFAULT_NUMBER_OF_RESOLUTIONS)?;
        if self.levels == 0 {
            return Err(MultiRegError::InvalidParameter {
                key: "NumberOfResolutions".into(),
                value: "0".into(),
                expected: "at least one resolution",
            });
        }
        Ok(())
    }

    fn before_each_resolution(&mut self, ctx: &HookContext<'_>) -> MultiRegResult<()> {
        ctx.sink.info(format!("Resolution: {}", ctx.level));
        Ok(())
    }
}

impl RegistrationMethod for MultiResolutionRegistration {
    fn number_of_resolutions(&self) -> usize {
        self.levels
    }
}
